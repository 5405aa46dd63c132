//! Kernel object lifetime management

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Kernel object ID type
pub type ObjectId = u32;

/// Longest name a kernel object may carry
pub const MAX_NAME_LENGTH: usize = 31;

/// Kernel object types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Thread,
    Mutex,
    LwMutex,
    Semaphore,
    Cond,
    LwCond,
    EventFlag,
    MsgPipe,
}

/// Trait for kernel objects
pub trait KernelObject: Send + Sync + std::any::Any {
    fn object_type(&self) -> ObjectType;
    fn id(&self) -> ObjectId;
    fn name(&self) -> &str;

    /// Helper for downcasting
    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync>;
}

/// Object table shared by every kernel object kind
///
/// The table lock only guards insertion, removal and lookup. Callers clone
/// the `Arc` out and release the table before touching the object itself.
pub struct ObjectManager {
    next_id: AtomicU32,
    objects: RwLock<HashMap<ObjectId, Arc<dyn KernelObject>>>,
}

impl ObjectManager {
    /// Create a new object manager
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1), // 0 is never a valid ID
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a new unique object ID
    pub fn next_id(&self) -> ObjectId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a kernel object
    pub fn register(&self, object: Arc<dyn KernelObject>) -> ObjectId {
        let id = object.id();
        self.objects.write().insert(id, object);
        id
    }

    /// Unregister a kernel object, returning it if it was present
    pub fn unregister(&self, id: ObjectId) -> Option<Arc<dyn KernelObject>> {
        self.objects.write().remove(&id)
    }

    /// Get a kernel object by ID if it has the expected type
    pub fn get<T: KernelObject + 'static>(&self, id: ObjectId, obj_type: ObjectType) -> Option<Arc<T>> {
        let object = {
            let objects = self.objects.read();
            Arc::clone(objects.get(&id)?)
        };
        if object.object_type() != obj_type {
            return None;
        }
        object.as_any().downcast::<T>().ok()
    }

    /// Find the first object of a type carrying `name`
    pub fn find_by_name(&self, obj_type: ObjectType, name: &str) -> Option<ObjectId> {
        self.objects
            .read()
            .values()
            .filter(|obj| obj.object_type() == obj_type && obj.name() == name)
            .map(|obj| obj.id())
            .min()
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestObject {
        id: ObjectId,
        name: String,
        obj_type: ObjectType,
    }

    impl KernelObject for TestObject {
        fn object_type(&self) -> ObjectType {
            self.obj_type
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

    fn object(manager: &ObjectManager, name: &str, obj_type: ObjectType) -> Arc<TestObject> {
        Arc::new(TestObject {
            id: manager.next_id(),
            name: name.to_string(),
            obj_type,
        })
    }

    #[test]
    fn test_object_manager() {
        let manager = ObjectManager::new();

        let obj1 = object(&manager, "first", ObjectType::Mutex);
        let id1 = obj1.id();
        assert_ne!(id1, 0);

        manager.register(Arc::clone(&obj1) as Arc<dyn KernelObject>);

        let retrieved: Arc<TestObject> = manager.get(id1, ObjectType::Mutex).unwrap();
        assert_eq!(retrieved.id(), id1);

        assert!(manager.unregister(id1).is_some());
        assert!(manager.get::<TestObject>(id1, ObjectType::Mutex).is_none());
        assert!(manager.unregister(id1).is_none());
    }

    #[test]
    fn test_typed_lookup_rejects_other_kinds() {
        let manager = ObjectManager::new();
        let lw = object(&manager, "lw", ObjectType::LwMutex);
        let id = manager.register(lw as Arc<dyn KernelObject>);

        assert!(manager.get::<TestObject>(id, ObjectType::Mutex).is_none());
        assert!(manager.get::<TestObject>(id, ObjectType::LwMutex).is_some());
    }

    #[test]
    fn test_object_types_and_names() {
        let manager = ObjectManager::new();

        let mutex = object(&manager, "shared", ObjectType::Mutex);
        let mutex_id = manager.register(mutex as Arc<dyn KernelObject>);
        let pipe = object(&manager, "shared", ObjectType::MsgPipe);
        let pipe_id = manager.register(pipe as Arc<dyn KernelObject>);

        assert_ne!(mutex_id, pipe_id);
        assert_eq!(manager.find_by_name(ObjectType::Cond, "shared"), None);
        assert_eq!(manager.find_by_name(ObjectType::Mutex, "shared"), Some(mutex_id));
        assert_eq!(manager.find_by_name(ObjectType::MsgPipe, "shared"), Some(pipe_id));
        assert_eq!(manager.find_by_name(ObjectType::MsgPipe, "missing"), None);
    }
}
