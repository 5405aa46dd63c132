//! Waiting-thread queues
//!
//! Entries are ordered by ascending priority value; equal priorities keep
//! arrival order. FIFO primitives push every waiter with priority 0, so the
//! queue degenerates to plain arrival order.

use crate::thread::ThreadId;

/// Wake order of a primitive's waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    Fifo,
    Priority,
}

/// A thread waiting on a primitive, with the primitive-specific payload
#[derive(Debug, Clone)]
pub struct WaitingThread<T> {
    pub thread: ThreadId,
    pub priority: i32,
    pub data: T,
}

/// Stable priority queue of waiting threads
#[derive(Debug)]
pub struct WaitQueue<T> {
    order: QueueOrder,
    entries: Vec<WaitingThread<T>>,
}

impl<T> WaitQueue<T> {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            order,
            entries: Vec::new(),
        }
    }

    /// Insert a waiter behind every entry with the same or better priority
    pub fn push(&mut self, thread: ThreadId, priority: i32, data: T) {
        let priority = match self.order {
            QueueOrder::Fifo => 0,
            QueueOrder::Priority => priority,
        };
        let pos = self.entries.partition_point(|e| e.priority <= priority);
        self.entries.insert(
            pos,
            WaitingThread {
                thread,
                priority,
                data,
            },
        );
    }

    pub fn front(&self) -> Option<&WaitingThread<T>> {
        self.entries.first()
    }

    pub fn pop(&mut self) -> Option<WaitingThread<T>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Remove the entry belonging to `thread`, if it is queued
    pub fn remove(&mut self, thread: ThreadId) -> Option<WaitingThread<T>> {
        let pos = self.entries.iter().position(|e| e.thread == thread)?;
        Some(self.entries.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitingThread<T>> {
        self.entries.iter()
    }

    /// Remove and return every entry matching `pred`, keeping queue order
    pub fn extract_if(&mut self, mut pred: impl FnMut(&mut WaitingThread<T>) -> bool) -> Vec<WaitingThread<T>> {
        let mut taken = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if pred(&mut self.entries[i]) {
                taken.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        taken
    }

    /// Remove every entry, in wake order
    pub fn drain(&mut self) -> Vec<WaitingThread<T>> {
        std::mem::take(&mut self.entries)
    }

    /// Thread IDs in wake order
    pub fn threads(&self) -> Vec<ThreadId> {
        self.entries.iter().map(|e| e.thread).collect()
    }
}
