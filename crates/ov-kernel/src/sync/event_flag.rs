//! Event flag
//!
//! Event flags let threads wait for a bit pattern. Setting bits resumes every
//! waiter whose condition now holds, in queue order, applying each waiter's
//! clear mode before the next one is tested.

use super::{attr, block_on, check_create, clip_name, queue_order, wake_thread};
use crate::objects::{KernelObject, ObjectId, ObjectType};
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::WaitQueue;
use ov_core::error::KernelError;
use parking_lot::Mutex as ParkingMutex;
use std::sync::Arc;
use std::time::Duration;

/// Event flag wait modes
pub mod wait_mode {
    /// Wait for all of the specified bits
    pub const AND: u32 = 0x0000;
    /// Wait for any of the specified bits
    pub const OR: u32 = 0x0001;
    /// Clear every bit once the wait is satisfied
    pub const CLEAR_ALL: u32 = 0x0002;
    /// Clear the waited-for bits once the wait is satisfied
    pub const CLEAR_PAT: u32 = 0x0004;
}

#[derive(Debug, Clone, Copy)]
struct EventWait {
    pattern: u32,
    mode: u32,
}

/// Guest event flag
pub struct EventFlag {
    id: ObjectId,
    name: String,
    attr: u32,
    state: ParkingMutex<EventFlagState>,
}

#[derive(Debug)]
struct EventFlagState {
    pattern: u32,
    waiting: WaitQueue<EventWait>,
    deleted: bool,
}

/// Snapshot returned by `eventflag_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFlagInfo {
    pub id: ObjectId,
    pub name: String,
    pub attr: u32,
    pub pattern: u32,
    pub waiting_threads: Vec<ThreadId>,
}

fn condition_met(current: u32, pattern: u32, mode: u32) -> bool {
    if mode & wait_mode::OR != 0 {
        current & pattern != 0
    } else {
        current & pattern == pattern
    }
}

fn apply_clear(current: &mut u32, pattern: u32, mode: u32) {
    if mode & wait_mode::CLEAR_ALL != 0 {
        *current = 0;
    }
    if mode & wait_mode::CLEAR_PAT != 0 {
        *current &= !pattern;
    }
}

impl EventFlag {
    pub fn new(id: ObjectId, name: &str, attr: u32, init_pattern: u32) -> Self {
        Self {
            id,
            name: clip_name(name),
            attr,
            state: ParkingMutex::new(EventFlagState {
                pattern: init_pattern,
                waiting: WaitQueue::new(queue_order(attr)),
                deleted: false,
            }),
        }
    }

    pub fn pattern(&self) -> u32 {
        self.state.lock().pattern
    }

    /// Wait until `pattern` is satisfied under `mode`, returning the flag
    /// value at the moment it was satisfied
    pub fn wait(
        &self,
        kernel: &KernelState,
        thread: &GuestThread,
        pattern: u32,
        mode: u32,
        timeout: Option<Duration>,
    ) -> Result<u32, KernelError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownEventFlagId);
        }

        if condition_met(state.pattern, pattern, mode) {
            let result = state.pattern;
            apply_clear(&mut state.pattern, pattern, mode);
            return Ok(result);
        }

        if self.attr & attr::MULTI == 0 && !state.waiting.is_empty() {
            return Err(KernelError::EventFlagMulti);
        }

        if !thread.prepare_wait() {
            return Err(KernelError::UnknownThreadId);
        }
        state.waiting.push(thread.id(), thread.priority(), EventWait { pattern, mode });
        ov_core::kernel_debug!(
            "EventFlag {}: thread {} waits for {:#010x} mode {:#x}, pattern {:#010x}",
            self.id,
            thread.id(),
            pattern,
            mode,
            state.pattern
        );

        let tid = thread.id();
        block_on(kernel, thread, &self.state, state, timeout, |s| {
            s.waiting.remove(tid).is_some()
        })
    }

    /// Non-blocking variant of [`EventFlag::wait`]
    pub fn poll(&self, pattern: u32, mode: u32) -> Result<u32, KernelError> {
        let mut state = self.state.lock();
        if !condition_met(state.pattern, pattern, mode) {
            return Err(KernelError::EventFlagCondition);
        }
        let result = state.pattern;
        apply_clear(&mut state.pattern, pattern, mode);
        Ok(result)
    }

    /// OR `bits` into the pattern and resume every waiter it satisfies
    pub fn set(&self, kernel: &KernelState, bits: u32) -> Result<usize, KernelError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownEventFlagId);
        }
        state.pattern |= bits;

        let EventFlagState { pattern, waiting, .. } = &mut *state;
        let mut results = Vec::new();
        let satisfied = waiting.extract_if(|w| {
            if !condition_met(*pattern, w.data.pattern, w.data.mode) {
                return false;
            }
            results.push(*pattern);
            apply_clear(pattern, w.data.pattern, w.data.mode);
            true
        });

        for (waiter, result) in satisfied.iter().zip(results) {
            wake_thread(kernel, waiter.thread, WakeReason::Signaled(result));
        }

        ov_core::kernel_debug!(
            "EventFlag {}: set bits {:#010x}, pattern now {:#010x}, {} woken",
            self.id,
            bits,
            state.pattern,
            satisfied.len()
        );
        Ok(satisfied.len())
    }

    /// Keep only the bits present in `bits`
    pub fn clear(&self, bits: u32) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownEventFlagId);
        }
        state.pattern &= bits;
        Ok(())
    }

    /// Replace the pattern and resume every waiter with `WaitCancel`
    pub fn cancel(&self, kernel: &KernelState, new_pattern: u32) -> Result<usize, KernelError> {
        let mut state = self.state.lock();
        if state.deleted {
            return Err(KernelError::UnknownEventFlagId);
        }
        state.pattern = new_pattern;
        let waiters = state.waiting.drain();
        for waiter in &waiters {
            wake_thread(kernel, waiter.thread, WakeReason::Cancelled);
        }
        Ok(waiters.len())
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

    pub fn info(&self) -> EventFlagInfo {
        let state = self.state.lock();
        EventFlagInfo {
            id: self.id,
            name: self.name.clone(),
            attr: self.attr,
            pattern: state.pattern,
            waiting_threads: state.waiting.threads(),
        }
    }
}

impl KernelObject for EventFlag {
    fn object_type(&self) -> ObjectType {
        ObjectType::EventFlag
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

/// Event flag kernel calls
pub mod syscalls {
    use super::*;

    fn get(kernel: &KernelState, evf_id: ObjectId) -> Result<Arc<EventFlag>, KernelError> {
        kernel.lookup::<EventFlag>(evf_id, ObjectType::EventFlag, KernelError::UnknownEventFlagId)
    }

    pub fn eventflag_create(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        name: &str,
        attributes: u32,
        init_pattern: u32,
    ) -> Result<ObjectId, KernelError> {
        check_create(name, attributes)?;

        let id = kernel.objects().next_id();
        let event = Arc::new(EventFlag::new(id, name, attributes, init_pattern));
        kernel.objects().register(event);

        ov_core::kernel_debug!(
            "{}: uid: {} thread_id: {} name: \"{}\" attr: {:#x} pattern: {:#b}",
            export_name,
            id,
            thread_id,
            name,
            attributes,
            init_pattern
        );
        Ok(id)
    }

    pub fn eventflag_wait(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        evf_id: ObjectId,
        pattern: u32,
        mode: u32,
        timeout: Option<Duration>,
    ) -> Result<u32, KernelError> {
        let event = get(kernel, evf_id)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} pattern: {:#b} mode: {:#x}", export_name, evf_id, thread_id, pattern, mode);
        event.wait(kernel, &thread, pattern, mode, timeout)
    }

    pub fn eventflag_poll(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        evf_id: ObjectId,
        pattern: u32,
        mode: u32,
    ) -> Result<u32, KernelError> {
        let event = get(kernel, evf_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} pattern: {:#b} mode: {:#x}", export_name, evf_id, thread_id, pattern, mode);
        event.poll(pattern, mode)
    }

    pub fn eventflag_set(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        evf_id: ObjectId,
        bits: u32,
    ) -> Result<(), KernelError> {
        let event = get(kernel, evf_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} bits: {:#b}", export_name, evf_id, thread_id, bits);
        event.set(kernel, bits).map(|_| ())
    }

    pub fn eventflag_clear(kernel: &KernelState, export_name: &str, evf_id: ObjectId, bits: u32) -> Result<(), KernelError> {
        let event = get(kernel, evf_id)?;
        ov_core::kernel_trace!("{}: uid: {} bits: {:#b}", export_name, evf_id, bits);
        event.clear(bits)
    }

    /// Returns the number of waiters that were cancelled
    pub fn eventflag_cancel(
        kernel: &KernelState,
        export_name: &str,
        evf_id: ObjectId,
        new_pattern: u32,
    ) -> Result<usize, KernelError> {
        let event = get(kernel, evf_id)?;
        ov_core::kernel_trace!("{}: uid: {} new pattern: {:#b}", export_name, evf_id, new_pattern);
        event.cancel(kernel, new_pattern)
    }

    pub fn eventflag_delete(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        evf_id: ObjectId,
    ) -> Result<(), KernelError> {
        let event = get(kernel, evf_id)?;

        let Some(woken) = event.retire(kernel, kernel.config().strict_delete) else {
            ov_core::kernel_warn!("{}: event flag {} has waiting threads, not deleting", export_name, evf_id);
            return Ok(());
        };
        kernel.objects().unregister(evf_id);
        ov_core::kernel_debug!("{}: uid: {} thread_id: {} deleted, {} waiters resumed", export_name, evf_id, thread_id, woken);
        Ok(())
    }

    pub fn eventflag_find(kernel: &KernelState, name: &str) -> Result<ObjectId, KernelError> {
        kernel
            .objects()
            .find_by_name(ObjectType::EventFlag, name)
            .ok_or(KernelError::UnknownEventFlagId)
    }

    pub fn eventflag_get_info(kernel: &KernelState, evf_id: ObjectId) -> Result<EventFlagInfo, KernelError> {
        Ok(get(kernel, evf_id)?.info())
    }
}

#[cfg(test)]
mod tests {
    use super::syscalls::*;
    use super::wait_mode::*;
    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_condition_modes() {
        assert!(condition_met(0b1011, 0b0011, AND));
        assert!(!condition_met(0b1001, 0b0011, AND));
        assert!(condition_met(0b1001, 0b0011, OR));
        assert!(!condition_met(0b1000, 0b0011, OR));

        let mut pattern = 0b1111;
        apply_clear(&mut pattern, 0b0011, CLEAR_PAT);
        assert_eq!(pattern, 0b1100);
        apply_clear(&mut pattern, 0b0100, CLEAR_ALL);
        assert_eq!(pattern, 0);
    }

    #[test]
    fn test_poll_and_clear() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let id = eventflag_create(&kernel, "test", t, "evf", 0, 0b0101).unwrap();

        assert_eq!(eventflag_poll(&kernel, "test", t, id, 0b0010, OR), Err(KernelError::EventFlagCondition));
        assert_eq!(eventflag_poll(&kernel, "test", t, id, 0b0100, OR | CLEAR_PAT), Ok(0b0101));
        assert_eq!(eventflag_get_info(&kernel, id).unwrap().pattern, 0b0001);

        eventflag_set(&kernel, "test", t, id, 0b1110).unwrap();
        eventflag_clear(&kernel, "test", id, 0b0011).unwrap();
        assert_eq!(eventflag_get_info(&kernel, id).unwrap().pattern, 0b0011);
        assert_eq!(eventflag_find(&kernel, "evf"), Ok(id));
    }

    #[test]
    fn test_set_wakes_satisfied_waiters() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let id = eventflag_create(&kernel, "test", main, "evf", attr::MULTI, 0).unwrap();

        let and_waiter = kernel.create_thread("and", 100);
        let or_waiter = kernel.create_thread("or", 100);

        let k = Arc::clone(&kernel);
        let and_handle =
            std::thread::spawn(move || eventflag_wait(&k, "test", and_waiter, id, 0b0011, AND | CLEAR_PAT, None));
        wait_until(|| eventflag_get_info(&kernel, id).unwrap().waiting_threads.len() == 1);
        let k = Arc::clone(&kernel);
        let or_handle = std::thread::spawn(move || eventflag_wait(&k, "test", or_waiter, id, 0b0100, OR, None));
        wait_until(|| eventflag_get_info(&kernel, id).unwrap().waiting_threads.len() == 2);

        eventflag_set(&kernel, "test", main, id, 0b0001).unwrap();
        assert_eq!(eventflag_get_info(&kernel, id).unwrap().waiting_threads.len(), 2);

        eventflag_set(&kernel, "test", main, id, 0b0110).unwrap();
        assert_eq!(and_handle.join().unwrap(), Ok(0b0111));
        assert_eq!(or_handle.join().unwrap(), Ok(0b0100));
        assert_eq!(eventflag_get_info(&kernel, id).unwrap().pattern, 0b0100);
    }

    #[test]
    fn test_single_waiter_flag_rejects_second_waiter() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let first = kernel.create_thread("first", 100);
        let id = eventflag_create(&kernel, "test", main, "single", 0, 0).unwrap();

        let k = Arc::clone(&kernel);
        let handle = std::thread::spawn(move || eventflag_wait(&k, "test", first, id, 1, AND, None));
        wait_until(|| eventflag_get_info(&kernel, id).unwrap().waiting_threads.len() == 1);

        assert_eq!(
            eventflag_wait(&kernel, "test", main, id, 1, AND, None),
            Err(KernelError::EventFlagMulti)
        );
        assert_eq!(eventflag_cancel(&kernel, "test", id, 0b1000), Ok(1));
        assert_eq!(handle.join().unwrap(), Err(KernelError::WaitCancel));
        assert_eq!(eventflag_get_info(&kernel, id).unwrap().pattern, 0b1000);
    }

    #[test]
    fn test_wait_timeout() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let id = eventflag_create(&kernel, "test", t, "evf", 0, 0).unwrap();
        assert_eq!(
            eventflag_wait(&kernel, "test", t, id, 1, OR, Some(Duration::from_millis(10))),
            Err(KernelError::WaitTimeout)
        );
        assert!(eventflag_get_info(&kernel, id).unwrap().waiting_threads.is_empty());
    }
}
