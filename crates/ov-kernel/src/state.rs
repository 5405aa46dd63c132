//! Kernel state handle passed to every kernel call

use crate::objects::{KernelObject, ObjectId, ObjectManager, ObjectType};
use crate::thread::{GuestThread, ThreadId, ThreadStatus};
use ov_core::config::KernelConfig;
use ov_core::error::KernelError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Kernel instance: object table plus emulation policy
pub struct KernelState {
    objects: ObjectManager,
    config: KernelConfig,
}

impl KernelState {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            objects: ObjectManager::new(),
            config,
        }
    }

    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register a guest thread record and return its ID
    pub fn create_thread(&self, name: &str, priority: i32) -> ThreadId {
        let id = self.objects.next_id();
        let thread = Arc::new(GuestThread::new(id, name, priority));
        self.objects.register(thread);
        ov_core::kernel_debug!("thread {} \"{}\" created, priority {}", id, name, priority);
        id
    }

    /// Register a guest thread with the configured default priority
    pub fn create_default_thread(&self, name: &str) -> ThreadId {
        let priority = i32::try_from(self.config.default_thread_priority)
            .unwrap_or(crate::thread::PRIORITY_DEFAULT);
        self.create_thread(name, priority)
    }

    pub fn thread(&self, id: ThreadId) -> Result<Arc<GuestThread>, KernelError> {
        self.objects
            .get::<GuestThread>(id, ObjectType::Thread)
            .ok_or(KernelError::UnknownThreadId)
    }

    /// Mark a thread as exited and drop its record
    pub fn exit_thread(&self, id: ThreadId) -> Result<(), KernelError> {
        let thread = self.thread(id)?;
        thread.set_status(ThreadStatus::Exit);
        self.objects.unregister(id);
        Ok(())
    }

    /// Typed lookup, mapping a miss to `missing`
    pub(crate) fn lookup<T: KernelObject + 'static>(
        &self,
        id: ObjectId,
        obj_type: ObjectType,
        missing: KernelError,
    ) -> Result<Arc<T>, KernelError> {
        self.objects.get::<T>(id, obj_type).ok_or(missing)
    }

    /// Deadline for a guest timeout, honouring the timeout policy
    pub(crate) fn deadline(&self, timeout: Option<Duration>) -> Option<Instant> {
        if !self.config.honour_timeouts {
            return None;
        }
        timeout.map(|t| Instant::now() + t)
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_registry() {
        let kernel = KernelState::default();
        let id = kernel.create_thread("main", 100);
        let thread = kernel.thread(id).unwrap();
        assert_eq!(thread.name(), "main");
        assert_eq!(thread.priority(), 100);

        kernel.exit_thread(id).unwrap();
        assert_eq!(thread.status(), ThreadStatus::Exit);
        assert_eq!(kernel.thread(id).unwrap_err(), KernelError::UnknownThreadId);
    }

    #[test]
    fn test_deadline_policy() {
        let kernel = KernelState::default();
        assert!(kernel.deadline(Some(Duration::from_millis(1))).is_some());
        assert!(kernel.deadline(None).is_none());

        let config = KernelConfig {
            honour_timeouts: false,
            ..KernelConfig::default()
        };
        let kernel = KernelState::new(config);
        assert!(kernel.deadline(Some(Duration::from_millis(1))).is_none());
    }

    #[test]
    fn test_default_priority_from_config() {
        let kernel = KernelState::default();
        let id = kernel.create_default_thread("worker");
        assert_eq!(kernel.thread(id).unwrap().priority(), 160);
    }
}
