//! Counting semaphore

use super::{block_on, check_create, clip_name, queue_order, wake_thread};
use crate::objects::{KernelObject, ObjectId, ObjectType};
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::WaitQueue;
use ov_core::error::KernelError;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;
use std::time::Duration;

/// Guest semaphore
pub struct Semaphore {
    id: ObjectId,
    name: String,
    attr: u32,
    max: i32,
    state: ParkingMutex<SemaphoreState>,
}

#[derive(Debug)]
struct SemaphoreState {
    val: i32,
    /// Payload is the count each waiter needs
    waiting: WaitQueue<i32>,
    deleted: bool,
}

/// Snapshot returned by `semaphore_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreInfo {
    pub id: ObjectId,
    pub name: String,
    pub attr: u32,
    pub val: i32,
    pub max: i32,
    pub waiting_threads: Vec<ThreadId>,
}

impl Semaphore {
    pub fn new(id: ObjectId, name: &str, attr: u32, init_val: i32, max_val: i32) -> Self {
        Self {
            id,
            name: clip_name(name),
            attr,
            max: max_val,
            state: ParkingMutex::new(SemaphoreState {
                val: init_val,
                waiting: WaitQueue::new(queue_order(attr)),
                deleted: false,
            }),
        }
    }

    /// Take `signal` units, blocking while fewer are available
    pub fn wait(
        &self,
        kernel: &KernelState,
        thread: &GuestThread,
        signal: i32,
        timeout: Option<Duration>,
    ) -> Result<(), KernelError> {
        if signal <= 0 || signal > self.max {
            return Err(KernelError::IllegalCount);
        }

        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownSemaId);
        }

        if state.val >= signal {
            state.val -= signal;
            return Ok(());
        }

        if !thread.prepare_wait() {
            return Err(KernelError::UnknownThreadId);
        }
        state.waiting.push(thread.id(), thread.priority(), signal);

        let tid = thread.id();
        block_on(kernel, thread, &self.state, state, timeout, |s| {
            s.waiting.remove(tid).is_some()
        })
        .map(|_| ())
    }

    /// Take `signal` units without blocking
    pub fn poll(&self, signal: i32) -> Result<(), KernelError> {
        if signal <= 0 {
            return Err(KernelError::IllegalCount);
        }
        let mut state = self.state.lock();
        if state.val < signal {
            return Err(KernelError::SemaZero);
        }
        state.val -= signal;
        Ok(())
    }

    /// Return `signal` units and resume waiters, in queue order, while the
    /// head waiter's request fits
    pub fn signal(&self, kernel: &KernelState, signal: i32) -> Result<(), KernelError> {
        if signal <= 0 {
            return Err(KernelError::IllegalCount);
        }

        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownSemaId);
        }
        if state.val.saturating_add(signal) > self.max {
            return Err(KernelError::SemaOverflow);
        }
        state.val += signal;

        while let Some(needed) = state.waiting.front().map(|w| w.data) {
            if state.val < needed {
                break;
            }
            let Some(waiter) = state.waiting.pop() else {
                break;
            };
            if wake_thread(kernel, waiter.thread, WakeReason::Signaled(0)) {
                state.val -= needed;
            }
        }
        Ok(())
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

    pub fn info(&self) -> SemaphoreInfo {
        let state = self.state.lock();
        SemaphoreInfo {
            id: self.id,
            name: self.name.clone(),
            attr: self.attr,
            val: state.val,
            max: self.max,
            waiting_threads: state.waiting.threads(),
        }
    }
}

impl KernelObject for Semaphore {
    fn object_type(&self) -> ObjectType {
        ObjectType::Semaphore
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

/// Semaphore kernel calls
pub mod syscalls {
    use super::*;

    fn get(kernel: &KernelState, sema_id: ObjectId) -> Result<Arc<Semaphore>, KernelError> {
        kernel.lookup::<Semaphore>(sema_id, ObjectType::Semaphore, KernelError::UnknownSemaId)
    }

    pub fn semaphore_create(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        name: &str,
        attributes: u32,
        init_val: i32,
        max_val: i32,
    ) -> Result<ObjectId, KernelError> {
        check_create(name, attributes)?;
        if init_val < 0 || max_val <= 0 || init_val > max_val {
            return Err(KernelError::IllegalCount);
        }

        let id = kernel.objects().next_id();
        let semaphore = Arc::new(Semaphore::new(id, name, attributes, init_val, max_val));
        kernel.objects().register(semaphore);

        ov_core::kernel_debug!(
            "{}: uid: {} thread_id: {} name: \"{}\" attr: {:#x} init_val: {} max_val: {}",
            export_name,
            id,
            thread_id,
            name,
            attributes,
            init_val,
            max_val
        );
        Ok(id)
    }

    pub fn semaphore_wait(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        sema_id: ObjectId,
        signal: i32,
        timeout: Option<Duration>,
    ) -> Result<(), KernelError> {
        let semaphore = get(kernel, sema_id)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} signal: {}", export_name, sema_id, thread_id, signal);
        semaphore.wait(kernel, &thread, signal, timeout)
    }

    pub fn semaphore_poll(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        sema_id: ObjectId,
        signal: i32,
    ) -> Result<(), KernelError> {
        let semaphore = get(kernel, sema_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} signal: {}", export_name, sema_id, thread_id, signal);
        semaphore.poll(signal)
    }

    pub fn semaphore_signal(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        sema_id: ObjectId,
        signal: i32,
    ) -> Result<(), KernelError> {
        let semaphore = get(kernel, sema_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} signal: {}", export_name, sema_id, thread_id, signal);
        semaphore.signal(kernel, signal)
    }

    pub fn semaphore_delete(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        sema_id: ObjectId,
    ) -> Result<(), KernelError> {
        let semaphore = get(kernel, sema_id)?;

        let Some(woken) = semaphore.retire(kernel, kernel.config().strict_delete) else {
            ov_core::kernel_warn!("{}: semaphore {} has waiting threads, not deleting", export_name, sema_id);
            return Ok(());
        };
        kernel.objects().unregister(sema_id);
        ov_core::kernel_debug!("{}: uid: {} thread_id: {} deleted, {} waiters resumed", export_name, sema_id, thread_id, woken);
        Ok(())
    }

    pub fn semaphore_find(kernel: &KernelState, name: &str) -> Result<ObjectId, KernelError> {
        kernel
            .objects()
            .find_by_name(ObjectType::Semaphore, name)
            .ok_or(KernelError::UnknownSemaId)
    }

    pub fn semaphore_get_info(kernel: &KernelState, sema_id: ObjectId) -> Result<SemaphoreInfo, KernelError> {
        Ok(get(kernel, sema_id)?.info())
    }
}
