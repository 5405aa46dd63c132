//! Guest kernel emulation (HLE) for oxidized-vita
//!
//! Implements the kernel's thread wait/resume machinery and the
//! synchronization objects guest code builds on: mutexes, semaphores,
//! condition variables, event flags and message pipes.

pub mod objects;
pub mod state;
pub mod sync;
pub mod thread;
pub mod wait_queue;

pub use objects::{KernelObject, ObjectId, ObjectManager, ObjectType};
pub use state::KernelState;
pub use sync::SyncWeight;
pub use thread::{GuestThread, ThreadId, ThreadStatus};
