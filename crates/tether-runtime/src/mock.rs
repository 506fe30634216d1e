use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::{
    Capabilities, ClassInfo, ExecutionEnvironment, Handle, ObjectCategory, ObjectId, ObjectRef,
    Result, RuntimeError,
};

#[derive(Debug, Clone)]
struct MockObject {
    class: String,
    category: ObjectCategory,
}

/// A partial backend that only knows about objects, classes and the
/// transport slot. Every other operation keeps its `NotImplemented` default.
#[derive(Debug, Default)]
pub struct MockEnvironment {
    classes: Mutex<HashMap<String, ClassInfo>>,
    objects: Mutex<HashMap<ObjectId, MockObject>>,
    transport: Mutex<Option<ObjectId>>,
    holds: Mutex<BTreeMap<Handle, ObjectId>>,
    next_handle: AtomicU64,
    registrations: AtomicUsize,
    released: Mutex<Vec<Handle>>,
    registration_delay: Mutex<Option<Duration>>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&self, info: ClassInfo) {
        self.classes.lock().insert(info.name.clone(), info);
    }

    /// Add an object, creating an empty class entry for `class` if needed.
    pub fn insert_object(&self, id: ObjectId, class: &str, category: ObjectCategory) -> ObjectRef {
        self.classes
            .lock()
            .entry(class.to_string())
            .or_insert_with(|| ClassInfo {
                name: class.to_string(),
                source_file: None,
                fields: Vec::new(),
                methods: Vec::new(),
                lines: Vec::new(),
            });
        self.objects.lock().insert(
            id,
            MockObject {
                class: class.to_string(),
                category,
            },
        );
        ObjectRef {
            id,
            runtime_type: class.to_string(),
        }
    }

    /// Sleep this long inside every registration, between reading the slot
    /// and assigning the handle.
    pub fn set_registration_delay(&self, delay: Duration) {
        *self.registration_delay.lock() = Some(delay);
    }

    /// The next registration will be assigned `raw + 1`.
    pub fn set_next_handle(&self, raw: u64) {
        self.next_handle.store(raw, Ordering::SeqCst);
    }

    /// How many times the transport slot was picked up.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<Handle> {
        self.released.lock().clone()
    }

    pub fn is_held(&self, handle: Handle) -> bool {
        self.holds.lock().contains_key(&handle)
    }

    fn object(&self, id: ObjectId) -> Result<MockObject> {
        self.objects
            .lock()
            .get(&id)
            .cloned()
            .ok_or(RuntimeError::InvalidObjectId(id))
    }
}

impl ExecutionEnvironment for MockEnvironment {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            object_transport: true,
            ..Capabilities::default()
        }
    }

    fn class_info(&self, name: &str) -> Result<ClassInfo> {
        self.classes
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))
    }

    fn object_class(&self, object: ObjectId) -> Result<String> {
        Ok(self.object(object)?.class)
    }

    fn object_category(&self, object: ObjectId) -> Result<ObjectCategory> {
        Ok(self.object(object)?.category)
    }

    fn install_transport(&self, object: ObjectId) -> Result<()> {
        self.object(object)?;
        *self.transport.lock() = Some(object);
        Ok(())
    }

    fn take_transport(&self) -> Result<Handle> {
        let object = self
            .transport
            .lock()
            .take()
            .ok_or(RuntimeError::TransportEmpty)?;
        let delay = *self.registration_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let handle = Handle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.holds.lock().insert(handle, object);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn release(&self, handle: Handle) -> Result<()> {
        self.holds
            .lock()
            .remove(&handle)
            .ok_or(RuntimeError::InvalidHandle(handle))?;
        self.released.lock().push(handle);
        Ok(())
    }
}
