//! Message pipe
//!
//! A byte pipe carrying whole messages. Receivers consume greedily across
//! message boundaries. A sender that asked to wait stays blocked until its
//! message has been taken: fully for `FULL` sends, partially for `ASAP` sends.

use super::{block_on, check_create, clip_name, queue_order, wake_thread};
use crate::objects::{KernelObject, ObjectId, ObjectType};
use crate::state::KernelState;
use crate::thread::{GuestThread, ThreadId, WakeReason};
use crate::wait_queue::{QueueOrder, WaitQueue};
use ov_core::error::KernelError;
use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Send and receive mode bits
pub mod pipe_mode {
    /// Complete as soon as any data has moved
    pub const ASAP: u32 = 0x0000;
    /// Complete only once the whole request has moved
    pub const FULL: u32 = 0x0001;
    pub const WAIT: u32 = 0x0000;
    pub const DONT_WAIT: u32 = 0x0010;
    /// Receive without consuming (peek)
    pub const DONT_REMOVE: u32 = 0x0100;
}

#[derive(Debug)]
struct PipeMessage {
    data: Vec<u8>,
    read: usize,
    /// Sender still blocked on this message
    sender: Option<ThreadId>,
    full: bool,
}

impl PipeMessage {
    fn remaining(&self) -> &[u8] {
        &self.data[self.read..]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendWait {
    /// Waiting for buffer space
    Space,
    /// Waiting for a receiver to take the queued message
    Consumed,
}

/// Guest message pipe
pub struct MsgPipe {
    id: ObjectId,
    name: String,
    attr: u32,
    /// Buffer size in bytes, 0 for unbounded
    capacity: usize,
    state: ParkingMutex<PipeState>,
}

#[derive(Debug)]
struct PipeState {
    messages: VecDeque<PipeMessage>,
    buffered: usize,
    receivers: WaitQueue<()>,
    senders: WaitQueue<SendWait>,
    deleted: bool,
}

/// Snapshot returned by `msgpipe_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgPipeInfo {
    pub id: ObjectId,
    pub name: String,
    pub attr: u32,
    pub capacity: usize,
    pub buffered: usize,
    pub sender_threads: Vec<ThreadId>,
    pub receiver_threads: Vec<ThreadId>,
}

impl PipeState {
    fn fits(&self, capacity: usize, len: usize) -> bool {
        capacity == 0 || self.buffered == 0 || self.buffered + len <= capacity
    }

    /// Copy up to `size` bytes out, consuming them unless `peek`. Returns the
    /// data and the senders whose wait is now over.
    fn take(&mut self, size: usize, peek: bool) -> (Vec<u8>, Vec<ThreadId>) {
        let mut out = Vec::with_capacity(size.min(self.buffered));
        let mut released = Vec::new();

        if peek {
            for msg in &self.messages {
                let take = (size - out.len()).min(msg.remaining().len());
                out.extend_from_slice(&msg.remaining()[..take]);
                if out.len() == size {
                    break;
                }
            }
            return (out, released);
        }

        while out.len() < size {
            let Some(msg) = self.messages.front_mut() else {
                break;
            };
            let take = (size - out.len()).min(msg.remaining().len());
            out.extend_from_slice(&msg.remaining()[..take]);
            msg.read += take;
            self.buffered -= take;

            let done = msg.read == msg.data.len();
            if done || !msg.full {
                if let Some(sender) = msg.sender.take() {
                    released.push(sender);
                }
            }
            if done {
                self.messages.pop_front();
            }
        }
        (out, released)
    }
}

impl MsgPipe {
    pub fn new(id: ObjectId, name: &str, attr: u32, capacity: usize) -> Self {
        Self {
            id,
            name: clip_name(name),
            attr,
            capacity,
            state: ParkingMutex::new(PipeState {
                messages: VecDeque::new(),
                buffered: 0,
                receivers: WaitQueue::new(queue_order(attr)),
                senders: WaitQueue::new(QueueOrder::Fifo),
                deleted: false,
            }),
        }
    }

    /// Queue `data` as one message. Returns the number of bytes sent.
    pub fn send(
        &self,
        kernel: &KernelState,
        thread: &GuestThread,
        mode: u32,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, KernelError> {
        let dont_wait = mode & pipe_mode::DONT_WAIT != 0;
        let tid = thread.id();

        loop {
            let mut state = self.state.lock();
            if state.deleted {
                return Err(KernelError::UnknownMsgPipeId);
            }

            if !state.fits(self.capacity, data.len()) {
                if dont_wait {
                    return Err(KernelError::MsgPipeFull);
                }
                if !thread.prepare_wait() {
                    return Err(KernelError::UnknownThreadId);
                }
                state.senders.push(tid, thread.priority(), SendWait::Space);
                block_on(kernel, thread, &self.state, state, timeout, |s| {
                    s.senders.remove(tid).is_some()
                })?;
                continue;
            }

            state.messages.push_back(PipeMessage {
                data: data.to_vec(),
                read: 0,
                sender: if dont_wait { None } else { Some(tid) },
                full: mode & pipe_mode::FULL != 0,
            });
            state.buffered += data.len();

            if let Some(receiver) = state.receivers.pop() {
                wake_thread(kernel, receiver.thread, WakeReason::Signaled(0));
            }

            ov_core::kernel_trace!(
                "msgpipe {} \"{}\": thread {} queued {} bytes, {} buffered",
                self.id,
                self.name,
                tid,
                data.len(),
                state.buffered
            );

            if dont_wait {
                return Ok(data.len());
            }

            if !thread.prepare_wait() {
                return Err(KernelError::UnknownThreadId);
            }
            state.senders.push(tid, thread.priority(), SendWait::Consumed);
            block_on(kernel, thread, &self.state, state, timeout, |s| {
                for msg in s.messages.iter_mut().filter(|m| m.sender == Some(tid)) {
                    msg.sender = None;
                }
                s.senders.remove(tid).is_some()
            })?;
            return Ok(data.len());
        }
    }

    /// Receive up to `size` bytes
    pub fn recv(
        &self,
        kernel: &KernelState,
        thread: &GuestThread,
        mode: u32,
        size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, KernelError> {
        let full = mode & pipe_mode::FULL != 0;
        let peek = mode & pipe_mode::DONT_REMOVE != 0;
        let tid = thread.id();

        loop {
            let mut state = self.state.lock();
            if state.deleted {
                return Err(KernelError::UnknownMsgPipeId);
            }

            let ready = if full {
                state.buffered >= size
            } else {
                state.buffered > 0 || size == 0
            };

            if ready {
                let (out, released) = state.take(size, peek);

                for sender in released {
                    if state.senders.remove(sender).is_some() {
                        wake_thread(kernel, sender, WakeReason::Signaled(0));
                    }
                }
                if !peek {
                    let space = state.senders.extract_if(|w| w.data == SendWait::Space);
                    for waiter in space {
                        wake_thread(kernel, waiter.thread, WakeReason::Signaled(0));
                    }
                }
                if state.buffered > 0 {
                    if let Some(next) = state.receivers.pop() {
                        wake_thread(kernel, next.thread, WakeReason::Signaled(0));
                    }
                }
                return Ok(out);
            }

            if mode & pipe_mode::DONT_WAIT != 0 {
                return Err(KernelError::MsgPipeEmpty);
            }

            if !thread.prepare_wait() {
                return Err(KernelError::UnknownThreadId);
            }
            state.receivers.push(tid, thread.priority(), ());
            block_on(kernel, thread, &self.state, state, timeout, |s| {
                s.receivers.remove(tid).is_some()
            })?;
        }
    }

    /// `None` when `keep_if_waited` is set and threads are waiting
    pub(crate) fn retire(&self, kernel: &KernelState, keep_if_waited: bool) -> Option<usize> {
        let mut state = self.state.lock();
        if keep_if_waited && !(state.receivers.is_empty() && state.senders.is_empty()) {
            return None;
        }
        state.deleted = true;
        let mut waiters = state.receivers.drain().into_iter().map(|w| w.thread).collect::<Vec<_>>();
        waiters.extend(state.senders.drain().into_iter().map(|w| w.thread));
        for &thread in &waiters {
            wake_thread(kernel, thread, WakeReason::Deleted);
        }
        Some(waiters.len())
    }

    pub fn info(&self) -> MsgPipeInfo {
        let state = self.state.lock();
        MsgPipeInfo {
            id: self.id,
            name: self.name.clone(),
            attr: self.attr,
            capacity: self.capacity,
            buffered: state.buffered,
            sender_threads: state.senders.threads(),
            receiver_threads: state.receivers.threads(),
        }
    }
}

impl KernelObject for MsgPipe {
    fn object_type(&self) -> ObjectType {
        ObjectType::MsgPipe
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

/// Message pipe kernel calls
pub mod syscalls {
    use super::*;

    fn get(kernel: &KernelState, pipe_id: ObjectId) -> Result<Arc<MsgPipe>, KernelError> {
        kernel.lookup::<MsgPipe>(pipe_id, ObjectType::MsgPipe, KernelError::UnknownMsgPipeId)
    }

    pub fn msgpipe_create(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        name: &str,
        attributes: u32,
        buffer_size: usize,
    ) -> Result<ObjectId, KernelError> {
        check_create(name, attributes)?;

        let id = kernel.objects().next_id();
        let pipe = Arc::new(MsgPipe::new(id, name, attributes, buffer_size));
        kernel.objects().register(pipe);

        ov_core::kernel_debug!(
            "{}: uid: {} thread_id: {} name: \"{}\" attr: {:#x} buffer_size: {}",
            export_name,
            id,
            thread_id,
            name,
            attributes,
            buffer_size
        );
        Ok(id)
    }

    pub fn msgpipe_find(kernel: &KernelState, name: &str) -> Result<ObjectId, KernelError> {
        kernel
            .objects()
            .find_by_name(ObjectType::MsgPipe, name)
            .ok_or(KernelError::UnknownMsgPipeId)
    }

    pub fn msgpipe_send(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        pipe_id: ObjectId,
        mode: u32,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, KernelError> {
        let pipe = get(kernel, pipe_id)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} mode: {:#x} size: {}", export_name, pipe_id, thread_id, mode, data.len());
        pipe.send(kernel, &thread, mode, data, timeout)
    }

    pub fn msgpipe_recv(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        pipe_id: ObjectId,
        mode: u32,
        size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, KernelError> {
        let pipe = get(kernel, pipe_id)?;
        let thread = kernel.thread(thread_id)?;
        ov_core::kernel_trace!("{}: uid: {} thread_id: {} mode: {:#x} size: {}", export_name, pipe_id, thread_id, mode, size);
        pipe.recv(kernel, &thread, mode, size, timeout)
    }

    pub fn msgpipe_delete(
        kernel: &KernelState,
        export_name: &str,
        thread_id: ThreadId,
        pipe_id: ObjectId,
    ) -> Result<(), KernelError> {
        let pipe = get(kernel, pipe_id)?;

        let Some(woken) = pipe.retire(kernel, kernel.config().strict_delete) else {
            ov_core::kernel_warn!("{}: message pipe {} has waiting threads, not deleting", export_name, pipe_id);
            return Ok(());
        };
        kernel.objects().unregister(pipe_id);
        ov_core::kernel_debug!("{}: uid: {} thread_id: {} deleted, {} waiters resumed", export_name, pipe_id, thread_id, woken);
        Ok(())
    }

    pub fn msgpipe_get_info(kernel: &KernelState, pipe_id: ObjectId) -> Result<MsgPipeInfo, KernelError> {
        Ok(get(kernel, pipe_id)?.info())
    }
}

#[cfg(test)]
mod tests {
    use super::pipe_mode::*;
    use super::syscalls::*;
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
    fn test_send_recv_non_blocking() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let id = msgpipe_create(&kernel, "test", t, "pipe", 0, 0).unwrap();

        assert_eq!(
            msgpipe_recv(&kernel, "test", t, id, DONT_WAIT, 4, None),
            Err(KernelError::MsgPipeEmpty)
        );
        assert_eq!(msgpipe_send(&kernel, "test", t, id, DONT_WAIT, b"abc", None), Ok(3));
        assert_eq!(msgpipe_send(&kernel, "test", t, id, DONT_WAIT, b"defg", None), Ok(4));

        assert_eq!(
            msgpipe_recv(&kernel, "test", t, id, FULL | DONT_WAIT, 8, None),
            Err(KernelError::MsgPipeEmpty)
        );
        assert_eq!(
            msgpipe_recv(&kernel, "test", t, id, FULL | DONT_WAIT | DONT_REMOVE, 5, None).unwrap(),
            b"abcde".to_vec()
        );
        assert_eq!(msgpipe_recv(&kernel, "test", t, id, FULL | DONT_WAIT, 5, None).unwrap(), b"abcde".to_vec());
        assert_eq!(msgpipe_recv(&kernel, "test", t, id, ASAP | DONT_WAIT, 8, None).unwrap(), b"fg".to_vec());
        assert_eq!(msgpipe_get_info(&kernel, id).unwrap().buffered, 0);
        assert_eq!(msgpipe_find(&kernel, "pipe"), Ok(id));
    }

    #[test]
    fn test_bounded_pipe_reports_full() {
        let kernel = KernelState::default();
        let t = kernel.create_thread("t", 100);
        let id = msgpipe_create(&kernel, "test", t, "small", 0, 4).unwrap();

        msgpipe_send(&kernel, "test", t, id, DONT_WAIT, b"1234", None).unwrap();
        assert_eq!(
            msgpipe_send(&kernel, "test", t, id, DONT_WAIT, b"5", None),
            Err(KernelError::MsgPipeFull)
        );
        msgpipe_recv(&kernel, "test", t, id, DONT_WAIT, 2, None).unwrap();
        assert_eq!(msgpipe_send(&kernel, "test", t, id, DONT_WAIT, b"56", None), Ok(2));
    }

    #[test]
    fn test_blocked_receiver_woken_by_send() {
        let kernel = Arc::new(KernelState::default());
        let sender = kernel.create_thread("sender", 100);
        let receiver = kernel.create_thread("receiver", 100);
        let id = msgpipe_create(&kernel, "test", sender, "pipe", 0, 0).unwrap();

        let k = Arc::clone(&kernel);
        let handle = std::thread::spawn(move || msgpipe_recv(&k, "test", receiver, id, FULL | WAIT, 6, None));
        wait_until(|| msgpipe_get_info(&kernel, id).unwrap().receiver_threads == vec![receiver]);

        msgpipe_send(&kernel, "test", sender, id, DONT_WAIT, b"hel", None).unwrap();
        msgpipe_send(&kernel, "test", sender, id, DONT_WAIT, b"lo!", None).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), b"hello!".to_vec());
    }

    #[test]
    fn test_waiting_sender_released_on_consume() {
        let kernel = Arc::new(KernelState::default());
        let sender = kernel.create_thread("sender", 100);
        let receiver = kernel.create_thread("receiver", 100);
        let id = msgpipe_create(&kernel, "test", sender, "pipe", 0, 0).unwrap();

        let k = Arc::clone(&kernel);
        let handle = std::thread::spawn(move || msgpipe_send(&k, "test", sender, id, FULL | WAIT, b"data", None));
        wait_until(|| msgpipe_get_info(&kernel, id).unwrap().sender_threads == vec![sender]);

        assert_eq!(msgpipe_recv(&kernel, "test", receiver, id, DONT_WAIT, 2, None).unwrap(), b"da".to_vec());
        assert_eq!(msgpipe_get_info(&kernel, id).unwrap().sender_threads, vec![sender]);

        assert_eq!(msgpipe_recv(&kernel, "test", receiver, id, DONT_WAIT, 2, None).unwrap(), b"ta".to_vec());
        assert_eq!(handle.join().unwrap(), Ok(4));
    }

    #[test]
    fn test_delete_resumes_receivers() {
        let kernel = Arc::new(KernelState::default());
        let main = kernel.create_thread("main", 100);
        let receiver = kernel.create_thread("receiver", 100);
        let id = msgpipe_create(&kernel, "test", main, "pipe", 0, 0).unwrap();

        let k = Arc::clone(&kernel);
        let handle = std::thread::spawn(move || msgpipe_recv(&k, "test", receiver, id, WAIT, 1, None));
        wait_until(|| msgpipe_get_info(&kernel, id).unwrap().receiver_threads.len() == 1);

        msgpipe_delete(&kernel, "test", main, id).unwrap();
        assert_eq!(handle.join().unwrap(), Err(KernelError::WaitDelete));
        assert_eq!(msgpipe_find(&kernel, "pipe"), Err(KernelError::UnknownMsgPipeId));
    }
}
