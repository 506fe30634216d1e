use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_runtime::{ExecutionEnvironment, Handle, ObjectId, ObjectRef, RuntimeError};

use crate::error::{DebugError, DebugResult};
use crate::mirror::{ClassMirror, ObjectMirror};

#[derive(Default)]
struct TrackerState {
    by_object: HashMap<ObjectId, ObjectMirror>,
    by_handle: HashMap<Handle, ObjectRef>,
    classes: HashMap<String, Arc<ClassMirror>>,
    /// scope -> name -> object.
    names: BTreeMap<String, BTreeMap<String, ObjectMirror>>,
}

impl TrackerState {
    fn class_mirror(
        &mut self,
        env: &dyn ExecutionEnvironment,
        name: &str,
    ) -> DebugResult<Arc<ClassMirror>> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class.clone());
        }
        let class = Arc::new(ClassMirror::from(env.class_info(name)?));
        self.classes.insert(name.to_string(), class.clone());
        Ok(class)
    }

    fn remove(&mut self, object: ObjectId) -> Option<ObjectMirror> {
        let mirror = self.by_object.remove(&object)?;
        self.by_handle.remove(&mirror.handle());
        for scope in self.names.values_mut() {
            scope.retain(|_, named| *named != mirror);
        }
        self.names.retain(|_, scope| !scope.is_empty());
        Some(mirror)
    }
}

/// Identity cache between debuggee objects and the handles the controller
/// addresses them by.
///
/// At most one handle exists per object: lookup-or-register runs entirely
/// under the tracker lock, so concurrent callers for the same object observe
/// the first caller's registration. The tracker is owned by a session and
/// shared with the components that need it.
pub struct ObjectTracker {
    env: Arc<dyn ExecutionEnvironment>,
    state: Mutex<TrackerState>,
}

impl ObjectTracker {
    pub fn new(env: Arc<dyn ExecutionEnvironment>) -> Self {
        Self {
            env,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// The mirror for `object`, registering it with the debuggee on first use.
    ///
    /// Returns `Ok(None)` for objects that cannot be mirrored (VM-internal
    /// objects, dangling ids); the reason goes to the log.
    pub fn get_handle(&self, object: &ObjectRef) -> DebugResult<Option<ObjectMirror>> {
        let mut state = self.state.lock();
        if let Some(mirror) = state.by_object.get(&object.id) {
            return Ok(Some(mirror.clone()));
        }

        let category = match self.env.object_category(object.id) {
            Ok(category) => category,
            Err(RuntimeError::InvalidObjectId(id)) => {
                tracing::error!(target: "tether.debug", object = id, "cannot mirror a dangling object id");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if !category.is_mirrorable() {
            tracing::error!(
                target: "tether.debug",
                object = object.id,
                ?category,
                "object category cannot be mirrored"
            );
            return Ok(None);
        }

        let class_name = self.env.object_class(object.id)?;
        state.class_mirror(self.env.as_ref(), &class_name)?;
        self.env.install_transport(object.id)?;
        let handle = self.env.take_transport()?;

        if let Some(existing) = state.by_handle.get(&handle) {
            if existing.id != object.id {
                tracing::error!(
                    target: "tether.debug",
                    %handle,
                    existing = existing.id,
                    object = object.id,
                    "debuggee reused a live handle"
                );
                if let Err(err) = self.env.release(handle) {
                    tracing::warn!(target: "tether.debug", %handle, error = %err, "failed to release reused handle");
                }
                return Err(DebugError::CacheCorrupted {
                    handle,
                    existing: existing.id,
                    object: object.id,
                });
            }
        }

        let mirror = ObjectMirror::new(handle, class_name.clone());
        state.by_object.insert(object.id, mirror.clone());
        state.by_handle.insert(
            handle,
            ObjectRef {
                id: object.id,
                runtime_type: class_name,
            },
        );
        tracing::trace!(target: "tether.debug", %handle, object = object.id, "object tracked");
        Ok(Some(mirror))
    }

    /// Drop the entry for `object` and release the debuggee's hold on it.
    /// Forgetting an untracked object does nothing.
    pub fn forget(&self, object: ObjectId) -> DebugResult<()> {
        let removed = self.state.lock().remove(object);
        match removed {
            Some(mirror) => self.release(mirror.handle()),
            None => Ok(()),
        }
    }

    /// [`ObjectTracker::forget`] addressed by mirror.
    pub fn forget_mirror(&self, mirror: &ObjectMirror) -> DebugResult<()> {
        let removed = {
            let mut state = self.state.lock();
            match state.by_handle.get(&mirror.handle()).map(|o| o.id) {
                Some(object) => state.remove(object),
                None => None,
            }
        };
        match removed {
            Some(mirror) => self.release(mirror.handle()),
            None => Ok(()),
        }
    }

    fn release(&self, handle: Handle) -> DebugResult<()> {
        match self.env.release(handle) {
            Ok(()) => Ok(()),
            Err(RuntimeError::InvalidHandle(_)) => {
                tracing::debug!(target: "tether.debug", %handle, "debuggee no longer holds handle");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drop every entry, name and class mirror. Debuggee holds are not
    /// released; this is meant for a debuggee that is going away anyway.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let entries = state.by_object.len();
        *state = TrackerState::default();
        tracing::debug!(target: "tether.debug", entries, "identity cache cleared");
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object_for(&self, handle: Handle) -> Option<ObjectRef> {
        self.state.lock().by_handle.get(&handle).cloned()
    }

    pub fn resolve(&self, mirror: &ObjectMirror) -> DebugResult<ObjectRef> {
        self.object_for(mirror.handle())
            .ok_or(DebugError::UnknownHandle(mirror.handle()))
    }

    pub fn class_mirror(&self, name: &str) -> DebugResult<Arc<ClassMirror>> {
        self.state.lock().class_mirror(self.env.as_ref(), name)
    }

    /// Bind `name` to a tracked object in `scope`, replacing any previous
    /// binding of that name in the scope.
    pub fn name_object(&self, scope: &str, name: &str, mirror: &ObjectMirror) -> DebugResult<()> {
        let mut state = self.state.lock();
        if !state.by_handle.contains_key(&mirror.handle()) {
            return Err(DebugError::UnknownHandle(mirror.handle()));
        }
        state
            .names
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), mirror.clone());
        Ok(())
    }

    pub fn unname_object(&self, scope: &str, name: &str) -> Option<ObjectMirror> {
        let mut state = self.state.lock();
        let scope_names = state.names.get_mut(scope)?;
        let removed = scope_names.remove(name);
        if scope_names.is_empty() {
            state.names.remove(scope);
        }
        removed
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.state
            .lock()
            .names
            .values()
            .any(|scope| scope.contains_key(name))
    }

    /// Every named object, across scopes, as of one instant. A name bound in
    /// several scopes resolves to the binding in the scope that sorts last.
    pub fn snapshot_named_objects(&self) -> BTreeMap<String, ObjectMirror> {
        let state = self.state.lock();
        let mut snapshot = BTreeMap::new();
        for scope in state.names.values() {
            for (name, mirror) in scope {
                snapshot.insert(name.clone(), mirror.clone());
            }
        }
        snapshot
    }
}
