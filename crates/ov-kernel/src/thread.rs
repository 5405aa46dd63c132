//! Guest thread records
//!
//! Every guest thread runs on its own host thread. Blocking in a kernel
//! primitive sets the status to [`ThreadStatus::Wait`] and parks the host
//! thread on the record's condition variable; whichever operation hands the
//! resource over sets the status back to [`ThreadStatus::Run`] and notifies.

use crate::objects::{KernelObject, ObjectId, ObjectType};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Instant;

/// Thread ID type
pub type ThreadId = ObjectId;

/// Thread priority range, lower value runs first
pub const PRIORITY_HIGHEST: i32 = 64;
pub const PRIORITY_LOWEST: i32 = 191;
pub const PRIORITY_DEFAULT: i32 = 160;

/// Execution status of a guest thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Run,
    Wait,
    /// Halted by the debugger between single steps
    Step,
    Exit,
}

impl ThreadStatus {
    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(self, to: ThreadStatus) -> bool {
        use ThreadStatus::*;
        match (self, to) {
            (Exit, _) => false,
            (_, Exit) => true,
            (Run, Wait) | (Step, Wait) => true,
            (Wait, Run) => true,
            (Run, Step) | (Step, Run) => true,
            _ => false,
        }
    }
}

/// Why a waiting thread was resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The resource was handed over; carries a primitive-specific value
    Signaled(u32),
    /// The primitive was deleted while the thread waited on it
    Deleted,
    /// The wait was cancelled
    Cancelled,
}

#[derive(Debug)]
struct ThreadSlot {
    status: ThreadStatus,
    wake: Option<WakeReason>,
}

/// Kernel-side record of a guest thread
pub struct GuestThread {
    id: ThreadId,
    name: String,
    priority: i32,
    slot: Mutex<ThreadSlot>,
    status_cond: Condvar,
}

impl GuestThread {
    pub fn new(id: ThreadId, name: &str, priority: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            priority,
            slot: Mutex::new(ThreadSlot {
                status: ThreadStatus::Run,
                wake: None,
            }),
            status_cond: Condvar::new(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn status(&self) -> ThreadStatus {
        self.slot.lock().status
    }

    /// Apply a transition, returning `false` when it is not legal
    pub fn set_status(&self, to: ThreadStatus) -> bool {
        let mut slot = self.slot.lock();
        if !slot.status.can_transition_to(to) {
            ov_core::kernel_warn!(
                "thread {} ({}): rejected transition {:?} -> {:?}",
                self.id,
                self.name,
                slot.status,
                to
            );
            return false;
        }
        slot.status = to;
        if to == ThreadStatus::Run {
            self.status_cond.notify_all();
        }
        true
    }

    /// Mark the thread as waiting. Called with the primitive's lock held,
    /// before the thread is queued.
    pub(crate) fn prepare_wait(&self) -> bool {
        let mut slot = self.slot.lock();
        if !slot.status.can_transition_to(ThreadStatus::Wait) {
            return false;
        }
        slot.status = ThreadStatus::Wait;
        slot.wake = None;
        true
    }

    /// Resume a waiting thread. Returns `false` if it was not waiting.
    pub(crate) fn wake(&self, reason: WakeReason) -> bool {
        let mut slot = self.slot.lock();
        if slot.status != ThreadStatus::Wait {
            return false;
        }
        slot.status = ThreadStatus::Run;
        slot.wake = Some(reason);
        self.status_cond.notify_one();
        true
    }

    /// Park until resumed or until `deadline` passes. `None` means the
    /// deadline expired while the thread was still waiting.
    pub(crate) fn park(&self, deadline: Option<Instant>) -> Option<WakeReason> {
        let mut slot = self.slot.lock();
        while slot.status == ThreadStatus::Wait {
            match deadline {
                Some(deadline) => {
                    if self.status_cond.wait_until(&mut slot, deadline).timed_out()
                        && slot.status == ThreadStatus::Wait
                    {
                        return None;
                    }
                }
                None => self.status_cond.wait(&mut slot),
            }
        }
        slot.wake.take()
    }

    /// Leave the wait state after withdrawing from a queue on timeout
    pub(crate) fn abandon_wait(&self) {
        let mut slot = self.slot.lock();
        if slot.status == ThreadStatus::Wait {
            slot.status = ThreadStatus::Run;
        }
        slot.wake = None;
    }

    /// Wake reason left by a waker that beat a timed-out thread to the queue
    pub(crate) fn take_wake(&self) -> Option<WakeReason> {
        self.slot.lock().wake.take()
    }
}

impl std::fmt::Debug for GuestThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority())
            .field("status", &self.status())
            .finish()
    }
}

impl KernelObject for GuestThread {
    fn object_type(&self) -> ObjectType {
        ObjectType::Thread
    }

    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        use ThreadStatus::*;
        assert!(Run.can_transition_to(Wait));
        assert!(Wait.can_transition_to(Run));
        assert!(Run.can_transition_to(Step));
        assert!(Step.can_transition_to(Run));
        assert!(Wait.can_transition_to(Exit));
        assert!(!Wait.can_transition_to(Step));
        assert!(!Exit.can_transition_to(Run));
    }

    #[test]
    fn test_set_status_rejects_invalid() {
        let thread = GuestThread::new(1, "main", PRIORITY_DEFAULT);
        assert!(thread.set_status(ThreadStatus::Exit));
        assert!(!thread.set_status(ThreadStatus::Run));
        assert_eq!(thread.status(), ThreadStatus::Exit);
        assert!(!thread.prepare_wait());
    }

    #[test]
    fn test_wake_before_park() {
        let thread = GuestThread::new(1, "main", PRIORITY_DEFAULT);
        assert!(thread.prepare_wait());
        assert_eq!(thread.status(), ThreadStatus::Wait);
        assert!(thread.wake(WakeReason::Signaled(7)));
        assert!(!thread.wake(WakeReason::Signaled(8)));
        assert_eq!(thread.park(None), Some(WakeReason::Signaled(7)));
        assert_eq!(thread.status(), ThreadStatus::Run);
    }

    #[test]
    fn test_park_deadline_expires() {
        let thread = GuestThread::new(1, "main", PRIORITY_DEFAULT);
        assert!(thread.prepare_wait());
        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(thread.park(Some(deadline)), None);
        assert_eq!(thread.status(), ThreadStatus::Wait);
        thread.abandon_wait();
        assert_eq!(thread.status(), ThreadStatus::Run);
    }

    #[test]
    fn test_cross_thread_wake() {
        let thread = Arc::new(GuestThread::new(1, "worker", PRIORITY_DEFAULT));
        assert!(thread.prepare_wait());

        let waker = Arc::clone(&thread);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            waker.wake(WakeReason::Deleted)
        });

        assert_eq!(thread.park(None), Some(WakeReason::Deleted));
        assert!(handle.join().unwrap());
    }
}
