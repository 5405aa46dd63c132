//! Synchronization primitives

pub mod cond;
pub mod event_flag;
pub mod msg_pipe;
pub mod mutex;
pub mod semaphore;

use crate::objects::MAX_NAME_LENGTH;
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::QueueOrder;
use ov_core::error::KernelError;
use parking_lot::{Mutex as ParkingMutex, MutexGuard};
use std::time::Duration;

/// Creation attribute bits shared by every primitive
pub mod attr {
    /// Wake waiters in priority order instead of arrival order
    pub const TH_PRIO: u32 = 0x0000_2000;
    /// Allow several threads to wait at once (event flags)
    pub const MULTI: u32 = 0x0000_1000;
    /// Reject names longer than the object name limit
    pub const CHECK_NAME: u32 = 0x0000_0080;
    /// Mutex may be relocked by its owner
    pub const RECURSIVE: u32 = 0x0000_0002;

    pub(crate) const KNOWN: u32 = TH_PRIO | MULTI | CHECK_NAME | RECURSIVE;
}

/// Lightweight primitives live partly in guest memory and report their own error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWeight {
    Light,
    Heavy,
}

pub(crate) fn queue_order(attr: u32) -> QueueOrder {
    if attr & attr::TH_PRIO != 0 {
        QueueOrder::Priority
    } else {
        QueueOrder::Fifo
    }
}

/// Validate the name and attribute word passed to a create call
pub(crate) fn check_create(name: &str, attributes: u32) -> Result<(), KernelError> {
    if attributes & !attr::KNOWN != 0 {
        return Err(KernelError::IllegalAttr);
    }
    if name.len() > MAX_NAME_LENGTH && attributes & attr::CHECK_NAME != 0 {
        return Err(KernelError::UidNameTooLong);
    }
    Ok(())
}

/// Stored names are clipped to the object name limit
pub(crate) fn clip_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LENGTH).collect()
}

impl WakeReason {
    pub(crate) fn into_result(self) -> Result<u32, KernelError> {
        match self {
            WakeReason::Signaled(value) => Ok(value),
            WakeReason::Deleted => Err(KernelError::WaitDelete),
            WakeReason::Cancelled => Err(KernelError::WaitCancel),
        }
    }
}

/// Release the primitive lock and park `thread` until a waker resumes it.
///
/// The thread must already be in the wait state and queued. On timeout the
/// thread withdraws itself through `withdraw`; if a waker dequeued it first,
/// the waker's outcome wins.
pub(crate) fn block_on<S>(
    kernel: &KernelState,
    thread: &GuestThread,
    lock: &ParkingMutex<S>,
    guard: MutexGuard<'_, S>,
    timeout: Option<Duration>,
    withdraw: impl FnOnce(&mut S) -> bool,
) -> Result<u32, KernelError> {
    let deadline = kernel.deadline(timeout);
    drop(guard);

    if let Some(reason) = thread.park(deadline) {
        return reason.into_result();
    }

    let mut state = lock.lock();
    if withdraw(&mut state) {
        thread.abandon_wait();
        ov_core::kernel_trace!("thread {} wait timed out", thread.id());
        return Err(KernelError::WaitTimeout);
    }
    drop(state);

    match thread.take_wake() {
        Some(reason) => reason.into_result(),
        None => Err(KernelError::WaitTimeout),
    }
}

/// Resume a queued waiter by ID; exited threads are skipped
pub(crate) fn wake_thread(kernel: &KernelState, thread: ThreadId, reason: WakeReason) -> bool {
    match kernel.thread(thread) {
        Ok(waiter) => waiter.wake(reason),
        Err(_) => {
            ov_core::kernel_warn!("waiter {} no longer exists", thread);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_check() {
        let long = "x".repeat(40);
        assert!(check_create(&long, 0).is_ok());
        assert_eq!(check_create(&long, attr::CHECK_NAME), Err(KernelError::UidNameTooLong));
        assert!(check_create("short", attr::CHECK_NAME).is_ok());
        assert_eq!(check_create("short", 0x0001_0000), Err(KernelError::IllegalAttr));
        assert_eq!(clip_name(&long).len(), MAX_NAME_LENGTH);
    }

    #[test]
    fn test_queue_order_from_attr() {
        assert_eq!(queue_order(0), QueueOrder::Fifo);
        assert_eq!(queue_order(attr::TH_PRIO), QueueOrder::Priority);
    }

    #[test]
    fn test_wake_reason_results() {
        assert_eq!(WakeReason::Signaled(3).into_result(), Ok(3));
        assert_eq!(WakeReason::Deleted.into_result(), Err(KernelError::WaitDelete));
        assert_eq!(WakeReason::Cancelled.into_result(), Err(KernelError::WaitCancel));
    }
}
