//! Mutex and lightweight mutex

use super::{attr, block_on, check_create, clip_name, queue_order, wake_thread, SyncWeight};
use crate::objects::{KernelObject, ObjectId, ObjectType};
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::WaitQueue;
use ov_core::error::KernelError;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;
use std::time::Duration;

/// Guest mutex; `weight` selects the lightweight error codes
pub struct Mutex {
    id: ObjectId,
    name: String,
    attr: u32,
    weight: SyncWeight,
    init_count: i32,
    state: ParkingMutex<MutexState>,
}

#[derive(Debug)]
struct MutexState {
    lock_count: i32,
    owner: Option<ThreadId>,
    /// Payload is the lock count each waiter asked for
    waiting: WaitQueue<i32>,
    deleted: bool,
}

/// Snapshot returned by `mutex_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexInfo {
    pub id: ObjectId,
    pub name: String,
    pub attr: u32,
    pub init_count: i32,
    pub lock_count: i32,
    pub owner: Option<ThreadId>,
    pub waiting_threads: Vec<ThreadId>,
}

pub(crate) fn object_type(weight: SyncWeight) -> ObjectType {
    match weight {
        SyncWeight::Light => ObjectType::LwMutex,
        SyncWeight::Heavy => ObjectType::Mutex,
    }
}

pub(crate) fn unknown_id(weight: SyncWeight) -> KernelError {
    match weight {
        SyncWeight::Light => KernelError::UnknownLwMutexId,
        SyncWeight::Heavy => KernelError::UnknownMutexId,
    }
}

fn recursive_error(weight: SyncWeight) -> KernelError {
    match weight {
        SyncWeight::Light => KernelError::LwMutexRecursive,
        SyncWeight::Heavy => KernelError::MutexRecursive,
    }
}

fn failed_to_own(weight: SyncWeight) -> KernelError {
    match weight {
        SyncWeight::Light => KernelError::LwMutexFailedToOwn,
        SyncWeight::Heavy => KernelError::MutexFailedToOwn,
    }
}

fn unlock_underflow(weight: SyncWeight) -> KernelError {
    match weight {
        SyncWeight::Light => KernelError::LwMutexUnlockUnderflow,
        SyncWeight::Heavy => KernelError::MutexUnlockUnderflow,
    }
}

impl Mutex {
    pub fn new(id: ObjectId, name: &str, attr: u32, init_count: i32, owner: Option<ThreadId>, weight: SyncWeight) -> Self {
        Self {
            id,
            name: clip_name(name),
            attr,
            weight,
            init_count,
            state: ParkingMutex::new(MutexState {
                lock_count: init_count,
                owner: if init_count > 0 { owner } else { None },
                waiting: WaitQueue::new(queue_order(attr)),
                deleted: false,
            }),
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.attr & attr::RECURSIVE != 0
    }

    pub fn weight(&self) -> SyncWeight {
        self.weight
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    pub fn lock_count(&self) -> i32 {
        self.state.lock().lock_count
    }

    /// Acquire `count` locks, blocking behind the current owner unless `only_try`
    pub fn lock(
        &self,
        kernel: &KernelState,
        thread: &GuestThread,
        count: i32,
        timeout: Option<Duration>,
        only_try: bool,
    ) -> Result<(), KernelError> {
        if count <= 0 {
            return Err(KernelError::IllegalCount);
        }

        let mut state = self.state.lock();
        if state.deleted {
            return Err(unknown_id(self.weight));
        }

        if state.lock_count > 0 {
            if state.owner == Some(thread.id()) {
                if !self.is_recursive() {
                    return Err(recursive_error(self.weight));
                }
                state.lock_count = state
                    .lock_count
                    .checked_add(count)
                    .ok_or(KernelError::MutexLockOverflow)?;
                return Ok(());
            }

            if only_try {
                return Err(failed_to_own(self.weight));
            }

            if !thread.prepare_wait() {
                return Err(KernelError::UnknownThreadId);
            }
            state.waiting.push(thread.id(), thread.priority(), count);
            ov_core::kernel_trace!(
                "mutex {} \"{}\": thread {} waits behind {:?}, {} queued",
                self.id,
                self.name,
                thread.id(),
                state.owner,
                state.waiting.len()
            );

            let tid = thread.id();
            return block_on(kernel, thread, &self.state, state, timeout, |s| {
                s.waiting.remove(tid).is_some()
            })
            .map(|_| ());
        }

        state.lock_count = count;
        state.owner = Some(thread.id());
        Ok(())
    }

    /// Release `count` locks held by `thread_id`, handing ownership to the
    /// head waiter once the count reaches zero
    pub fn unlock(&self, kernel: &KernelState, thread_id: ThreadId, count: i32) -> Result<(), KernelError> {
        if count <= 0 {
            return Err(KernelError::IllegalCount);
        }

        let mut state = self.state.lock();
        if state.deleted {
            return Err(unknown_id(self.weight));
        }

        if state.owner != Some(thread_id) || count > state.lock_count {
            return Err(unlock_underflow(self.weight));
        }

        state.lock_count -= count;
        if state.lock_count == 0 {
            state.owner = None;
            self.hand_over(kernel, &mut state);
        }
        Ok(())
    }

    /// Drop every lock `thread_id` holds, returning how many there were
    pub(crate) fn release_all(&self, kernel: &KernelState, thread_id: ThreadId) -> Result<i32, KernelError> {
        let mut state = self.state.lock();
        if state.owner != Some(thread_id) || state.lock_count <= 0 {
            return Err(unlock_underflow(self.weight));
        }
        let held = state.lock_count;
        state.lock_count = 0;
        state.owner = None;
        self.hand_over(kernel, &mut state);
        Ok(held)
    }

    fn hand_over(&self, kernel: &KernelState, state: &mut MutexState) {
        while let Some(next) = state.waiting.pop() {
            state.owner = Some(next.thread);
            state.lock_count = next.data;
            if wake_thread(kernel, next.thread, WakeReason::Signaled(0)) {
                ov_core::kernel_trace!(
                    "mutex {} \"{}\": ownership handed to thread {}",
                    self.id,
                    self.name,
                    next.thread
                );
                return;
            }
            state.owner = None;
            state.lock_count = 0;
        }
    }

    /// Mark the mutex deleted and resume every waiter with `WaitDelete`
    ///
    /// With `keep_if_waited` set, a primitive that has waiters is left alone
    /// and `None` is returned.
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

    pub fn info(&self) -> MutexInfo {
        let state = self.state.lock();
        MutexInfo {
            id: self.id,
            name: self.name.clone(),
            attr: self.attr,
            init_count: self.init_count,
            lock_count: state.lock_count,
            owner: state.owner,
            waiting_threads: state.waiting.threads(),
        }
    }
}

impl KernelObject for Mutex {
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

/// Mutex kernel calls
pub mod syscalls {
    use super::*;

    pub(crate) fn get(kernel: &KernelState, mutex_id: ObjectId, weight: SyncWeight) -> Result<Arc<Mutex>, KernelError> {
        kernel.lookup::<Mutex>(mutex_id, object_type(weight), unknown_id(weight))
    }

    /// Create a mutex; a positive `init_count` makes the caller its owner
    pub fn mutex_create(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        name: &str,
        attributes: u32,
        init_count: i32,
        weight: SyncWeight,
    ) -> Result<ObjectId, KernelError> {
        check_create(name, attributes)?;
        if init_count < 0 {
            return Err(KernelError::IllegalCount);
        }
        if init_count > 1 && attributes & attr::RECURSIVE == 0 {
            return Err(KernelError::IllegalCount);
        }
        if init_count > 0 {
            kernel.thread(thread_id)?;
        }

        let id = kernel.objects().next_id();
        let mutex = Arc::new(Mutex::new(id, name, attributes, init_count, Some(thread_id), weight));
        kernel.objects().register(mutex);

        ov_core::kernel_debug!(
            "{}: uid: {} thread_id: {} name: \"{}\" attr: {:#x} init_count: {}",
            export_name,
            id,
            thread_id,
            name,
            attributes,
            init_count
        );
        Ok(id)
    }

    pub fn mutex_lock(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        mutex_id: ObjectId,
        lock_count: i32,
        timeout: Option<Duration>,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let mutex = get(kernel, mutex_id, weight)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} lock_count: {}", export_name, mutex_id, thread_id, lock_count);
        mutex.lock(kernel, &thread, lock_count, timeout, false)
    }

    pub fn mutex_try_lock(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        mutex_id: ObjectId,
        lock_count: i32,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let mutex = get(kernel, mutex_id, weight)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} lock_count: {}", export_name, mutex_id, thread_id, lock_count);
        mutex.lock(kernel, &thread, lock_count, None, true)
    }

    pub fn mutex_unlock(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        mutex_id: ObjectId,
        unlock_count: i32,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let mutex = get(kernel, mutex_id, weight)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} unlock_count: {}", export_name, mutex_id, thread_id, unlock_count);
        mutex.unlock(kernel, thread_id, unlock_count)
    }

    /// Delete a mutex. Waiters are resumed with `WaitDelete` unless the
    /// kernel is configured to keep primitives that still have waiters.
    pub fn mutex_delete(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        mutex_id: ObjectId,
        weight: SyncWeight,
    ) -> Result<(), KernelError> {
        let mutex = get(kernel, mutex_id, weight)?;

        let Some(woken) = mutex.retire(kernel, kernel.config().strict_delete) else {
            ov_core::kernel_warn!("{}: mutex {} has waiting threads, not deleting", export_name, mutex_id);
            return Ok(());
        };
        kernel.objects().unregister(mutex_id);
        ov_core::kernel_debug!("{}: uid: {} thread_id: {} deleted, {} waiters resumed", export_name, mutex_id, thread_id, woken);
        Ok(())
    }

    pub fn mutex_find(kernel: &KernelState, name: &str, weight: SyncWeight) -> Result<ObjectId, KernelError> {
        kernel
            .objects()
            .find_by_name(object_type(weight), name)
            .ok_or(unknown_id(weight))
    }

    pub fn mutex_get_info(kernel: &KernelState, mutex_id: ObjectId, weight: SyncWeight) -> Result<MutexInfo, KernelError> {
        Ok(get(kernel, mutex_id, weight)?.info())
    }
}
