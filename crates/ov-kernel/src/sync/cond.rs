//! Condition variable and lightweight condition variable
//!
//! A condition variable is bound to one mutex of the same weight at creation.
//! The binding is stored as the mutex ID and resolved on every wait, so a
//! deleted mutex surfaces as an unknown-mutex error instead of a dangling
//! reference.

use super::mutex::{self, Mutex};
use super::{block_on, check_create, clip_name, queue_order, wake_thread, SyncWeight};
use crate::objects::{KernelObject, ObjectId, ObjectType};
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::WaitQueue;
use ov_core::error::KernelError;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;
use std::time::Duration;

/// Which waiters a signal resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    /// The head of the wait queue
    Any,
    /// One named thread, which must be waiting
    Specific(ThreadId),
    All,
}

/// Guest condition variable
pub struct Condvar {
    id: ObjectId,
    name: String,
    attr: u32,
    weight: SyncWeight,
    mutex_id: ObjectId,
    state: ParkingMutex<CondState>,
}

#[derive(Debug)]
struct CondState {
    waiting: WaitQueue<()>,
    deleted: bool,
}

/// Snapshot returned by `condvar_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondvarInfo {
    pub id: ObjectId,
    pub name: String,
    pub attr: u32,
    pub mutex_id: ObjectId,
    pub waiting_threads: Vec<ThreadId>,
}

fn object_type(weight: SyncWeight) -> ObjectType {
    match weight {
        SyncWeight::Light => ObjectType::LwCond,
        SyncWeight::Heavy => ObjectType::Cond,
    }
}

fn unknown_id(weight: SyncWeight) -> KernelError {
    match weight {
        SyncWeight::Light => KernelError::UnknownLwCondId,
        SyncWeight::Heavy => KernelError::UnknownCondId,
    }
}

impl Condvar {
    pub fn new(id: ObjectId, name: &str, attr: u32, mutex_id: ObjectId, weight: SyncWeight) -> Self {
        Self {
            id,
            name: clip_name(name),
            attr,
            weight,
            mutex_id,
            state: ParkingMutex::new(CondState {
                waiting: WaitQueue::new(queue_order(attr)),
                deleted: false,
            }),
        }
    }

    pub fn mutex_id(&self) -> ObjectId {
        self.mutex_id
    }

    fn associated_mutex(&self, kernel: &KernelState) -> Result<Arc<Mutex>, KernelError> {
        mutex::syscalls::get(kernel, self.mutex_id, self.weight)
    }

    /// Release the associated mutex, wait for a signal, then take the mutex
    /// back with the lock count held before the wait
    pub fn wait(&self, kernel: &KernelState, thread: &GuestThread, timeout: Option<Duration>) -> Result<(), KernelError> {
        let mutex = self.associated_mutex(kernel)?;

        let mut state = self.state.lock();
        if state.deleted {
            return Err(unknown_id(self.weight));
        }

        let held = mutex.release_all(kernel, thread.id())?;
        if !thread.prepare_wait() {
            drop(state);
            mutex.lock(kernel, thread, held, None, false)?;
            return Err(KernelError::UnknownThreadId);
        }
        state.waiting.push(thread.id(), thread.priority(), ());

        let tid = thread.id();
        let waited = block_on(kernel, thread, &self.state, state, timeout, |s| {
            s.waiting.remove(tid).is_some()
        });

        let relocked = mutex.lock(kernel, thread, held, None, false);
        waited.and(relocked)
    }

    /// Resume the waiters selected by `target`, returning how many woke
    pub fn signal(&self, kernel: &KernelState, target: SignalTarget) -> Result<usize, KernelError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(unknown_id(self.weight));
        }

        let woken = match target {
            SignalTarget::Any => match state.waiting.pop() {
                Some(waiter) => vec![waiter.thread],
                None => Vec::new(),
            },
            SignalTarget::Specific(thread) => match state.waiting.remove(thread) {
                Some(waiter) => vec![waiter.thread],
                None => return Err(KernelError::CondSignalTargetNotWaiting),
            },
            SignalTarget::All => state.waiting.drain().into_iter().map(|w| w.thread).collect(),
        };

        for &thread in &woken {
            wake_thread(kernel, thread, WakeReason::Signaled(0));
        }
        Ok(woken.len())
    }

    /// `None` when `keep_if_waited` is set and threads are waiting
    pub(crate) fn retire(&self, kernel: &KernelState, keep_if_waited: bool) -> Option<usize> {
        let mut state = self.state.lock();
        if keep_if_waited && !state.waiting.is_empty() {
            return None;
        }
        state.deleted = true;
        let waiters = state.waiting.drain();
        for waiter in &waiters {
            wake_thread(kernel, waiter.thread, WakeReason::Deleted);
        }
        Some(waiters.len())
    }

    pub fn info(&self) -> CondvarInfo {
        let state = self.state.lock();
        CondvarInfo {
            id: self.id,
            name: self.name.clone(),
            attr: self.attr,
            mutex_id: self.mutex_id,
            waiting_threads: state.waiting.threads(),
        }
    }
}

impl KernelObject for Condvar {
    fn object_type(&self) -> ObjectType {
        object_type(self.weight)
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

/// Condition variable kernel calls
pub mod syscalls {
    use super::*;

    fn get(kernel: &KernelState, cond_id: ObjectId, weight: SyncWeight) -> Result<Arc<Condvar>, KernelError> {
        kernel.lookup::<Condvar>(cond_id, object_type(weight), unknown_id(weight))
    }

    pub fn condvar_create(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        name: &str,
        attributes: u32,
        mutex_id: ObjectId,
        weight: SyncWeight,
    ) -> Result<ObjectId, KernelError> {
        check_create(name, attributes)?;
        mutex::syscalls::get(kernel, mutex_id, weight)?;

        let id = kernel.objects().next_id();
        let condvar = Arc::new(Condvar::new(id, name, attributes, mutex_id, weight));
        kernel.objects().register(condvar);

        ov_core::kernel_debug!(
            "{}: uid: {} thread_id: {} name: \"{}\" attr: {:#x} assoc_mutexid: {}",
            export_name,
            id,
            thread_id,
            name,
            attributes,
            mutex_id
        );
        Ok(id)
    }

    pub fn condvar_wait(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        cond_id: ObjectId,
        timeout: Option<Duration>,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let condvar = get(kernel, cond_id, weight)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} timeout: {:?}", export_name, cond_id, thread_id, timeout);
        condvar.wait(kernel, &thread, timeout)
    }

    pub fn condvar_signal(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        cond_id: ObjectId,
        target: SignalTarget,
        weight: SyncWeight,
    ) -> Result<usize, KernelError> {
        let condvar = get(kernel, cond_id, weight)?;
        if let SignalTarget::Specific(target_id) = target {
            kernel.thread(target_id)?;
        }
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} target: {:?}", export_name, cond_id, thread_id, target);
        condvar.signal(kernel, target)
    }

    pub fn condvar_delete(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        cond_id: ObjectId,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let condvar = get(kernel, cond_id, weight)?;

        let Some(woken) = condvar.retire(kernel, kernel.config().strict_delete) else {
            ov_core::kernel_warn!("{}: condvar {} has waiting threads, not deleting", export_name, cond_id);
            return Ok(());
        };
        kernel.objects().unregister(cond_id);
        ov_core::kernel_debug!("{}: uid: {} thread_id: {} deleted, {} waiters resumed", export_name, cond_id, thread_id, woken);
        Ok(())
    }

    pub fn condvar_find(kernel: &KernelState, name: &str, weight: SyncWeight) -> Result<ObjectId, KernelError> {
        kernel
            .objects()
            .find_by_name(object_type(weight), name)
            .ok_or(unknown_id(weight))
    }

    pub fn condvar_get_info(kernel: &KernelState, cond_id: ObjectId, weight: SyncWeight) -> Result<CondvarInfo, KernelError> {
        Ok(get(kernel, cond_id, weight)?.info())
    }
}

#[cfg(test)]
mod tests {
    use super::syscalls::*;
    use super::*;
    use crate::sync::attr;
    use crate::sync::mutex::syscalls::{mutex_create, mutex_get_info, mutex_lock, mutex_unlock};

    const HEAVY: SyncWeight = SyncWeight::Heavy;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    fn spawn_waiter(
        kernel: &Arc<KernelState>,
        thread_id: ThreadId,
        mutex_id: ObjectId,
        cond_id: ObjectId,
    ) -> std::thread::JoinHandle<Result<(), KernelError>> {
        let k = Arc::clone(kernel);
        std::thread::spawn(move || {
            mutex_lock(&k, "test", thread_id, mutex_id, 1, None, HEAVY)?;
            condvar_wait(&k, "test", thread_id, cond_id, None, HEAVY)?;
            mutex_unlock(&k, "test", thread_id, mutex_id, 1, HEAVY)
        })
    }

    #[test]
    fn test_create_requires_mutex_of_same_weight() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let lw = mutex_create(&kernel, "test", t, "lw", 0, 0, SyncWeight::Light).unwrap();

        assert_eq!(
            condvar_create(&kernel, "test", t, "c", 0, lw, HEAVY),
            Err(KernelError::UnknownMutexId)
        );
        let id = condvar_create(&kernel, "test", t, "c", 0, lw, SyncWeight::Light).unwrap();
        assert_eq!(condvar_find(&kernel, "c", SyncWeight::Light), Ok(id));
        assert_eq!(
            condvar_get_info(&kernel, id, HEAVY),
            Err(KernelError::UnknownCondId)
        );
    }

    #[test]
    fn test_wait_requires_owned_mutex() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let m = mutex_create(&kernel, "test", t, "m", 0, 0, HEAVY).unwrap();
        let c = condvar_create(&kernel, "test", t, "c", 0, m, HEAVY).unwrap();

        assert_eq!(
            condvar_wait(&kernel, "test", t, c, None, HEAVY),
            Err(KernelError::MutexUnlockUnderflow)
        );
    }

    #[test]
    fn test_signal_any_wakes_one() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let m = mutex_create(&kernel, "test", main, "m", 0, 0, HEAVY).unwrap();
        let c = condvar_create(&kernel, "test", main, "c", attr::TH_PRIO, m, HEAVY).unwrap();

        let low = kernel.create_thread("low", 150);
        let high = kernel.create_thread("high", 80);
        let low_handle = spawn_waiter(&kernel, low, m, c);
        wait_until(|| condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads.len() == 1);
        let high_handle = spawn_waiter(&kernel, high, m, c);
        wait_until(|| condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads.len() == 2);

        assert_eq!(condvar_signal(&kernel, "test", main, c, SignalTarget::Any, HEAVY), Ok(1));
        assert_eq!(high_handle.join().unwrap(), Ok(()));
        assert_eq!(condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads, vec![low]);

        assert_eq!(condvar_signal(&kernel, "test", main, c, SignalTarget::All, HEAVY), Ok(1));
        assert_eq!(low_handle.join().unwrap(), Ok(()));
        assert_eq!(mutex_get_info(&kernel, m, HEAVY).unwrap().owner, None);
    }

    #[test]
    fn test_signal_specific() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let m = mutex_create(&kernel, "test", main, "m", 0, 0, HEAVY).unwrap();
        let c = condvar_create(&kernel, "test", main, "c", 0, m, HEAVY).unwrap();

        let first = kernel.create_thread("first", 100);
        let second = kernel.create_thread("second", 100);
        let first_handle = spawn_waiter(&kernel, first, m, c);
        wait_until(|| condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads.len() == 1);
        let second_handle = spawn_waiter(&kernel, second, m, c);
        wait_until(|| condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads.len() == 2);

        assert_eq!(
            condvar_signal(&kernel, "test", main, c, SignalTarget::Specific(main), HEAVY),
            Err(KernelError::CondSignalTargetNotWaiting)
        );
        assert_eq!(
            condvar_signal(&kernel, "test", main, c, SignalTarget::Specific(second), HEAVY),
            Ok(1)
        );
        assert_eq!(second_handle.join().unwrap(), Ok(()));
        assert_eq!(condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads, vec![first]);

        condvar_delete(&kernel, "test", main, c, HEAVY).unwrap();
        assert_eq!(first_handle.join().unwrap(), Err(KernelError::WaitDelete));
    }

    #[test]
    fn test_wait_restores_recursive_count() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let waiter = kernel.create_thread("waiter", 100);
        let m = mutex_create(&kernel, "test", main, "m", attr::RECURSIVE, 0, HEAVY).unwrap();
        let c = condvar_create(&kernel, "test", main, "c", 0, m, HEAVY).unwrap();

        let k = Arc::clone(&kernel);
        let handle = std::thread::spawn(move || {
            mutex_lock(&k, "test", waiter, m, 3, None, HEAVY)?;
            condvar_wait(&k, "test", waiter, c, None, HEAVY)?;
            Ok::<i32, KernelError>(mutex_get_info(&k, m, HEAVY)?.lock_count)
        });

        wait_until(|| condvar_get_info(&kernel, c, HEAVY).unwrap().waiting_threads.len() == 1);
        assert_eq!(mutex_get_info(&kernel, m, HEAVY).unwrap().owner, None);
        condvar_signal(&kernel, "test", main, c, SignalTarget::Any, HEAVY).unwrap();
        assert_eq!(handle.join().unwrap(), Ok(3));
        assert_eq!(mutex_get_info(&kernel, m, HEAVY).unwrap().owner, Some(waiter));
    }

    #[test]
    fn test_wait_timeout_reacquires_mutex() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let m = mutex_create(&kernel, "test", t, "m", 0, 1, HEAVY).unwrap();
        let c = condvar_create(&kernel, "test", t, "c", 0, m, HEAVY).unwrap();

        assert_eq!(
            condvar_wait(&kernel, "test", t, c, Some(Duration::from_millis(10)), HEAVY),
            Err(KernelError::WaitTimeout)
        );
        let info = mutex_get_info(&kernel, m, HEAVY).unwrap();
        assert_eq!(info.owner, Some(t));
        assert_eq!(info.lock_count, 1);
    }
}
