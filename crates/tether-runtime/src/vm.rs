use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::bridge::PendingCall;
use crate::breakpoints::BreakpointTable;
use crate::class::{ClassDef, MethodKind, Overload};
use crate::heap::Heap;
use crate::thread::ExecThread;
use crate::{
    BreakpointLocation, BreakpointRequest, CallContext, Capabilities, ClassInfo,
    ExceptionDescription, ExecResult, ExecutionEnvironment, FieldInfo, FrameInfo, Handle,
    ObjectCategory, ObjectId, ObjectRef, Primitive, PrimitiveKind, Result, RuntimeError,
    StepKind, ThreadId, ThreadInfo, ThreadStatus, Thrown, Value, VmEvent, MAIN_GROUP,
    SYSTEM_GROUP,
};

/// Internal class whose static field is the transport slot.
pub const TRANSPORT_CLASS: &str = "tether.runtime.Transport";

/// Name of the transport slot field on [`TRANSPORT_CLASS`].
pub const TRANSPORT_FIELD: &str = "slot";

const STRING_CLASS: &str = "String";

const SYSTEM_THREADS: [&str; 3] = ["Reference Handler", "Finalizer", "Signal Dispatcher"];

#[derive(Debug, Default)]
struct Holds {
    by_handle: HashMap<Handle, ObjectId>,
    next: u64,
}

pub(crate) struct VmInner {
    classes: RwLock<HashMap<String, Arc<ClassDef>>>,
    pub(crate) heap: Mutex<Heap>,
    threads: Mutex<BTreeMap<ThreadId, Arc<ExecThread>>>,
    main_thread: Mutex<Option<ThreadId>>,
    next_thread_id: AtomicU64,
    pub(crate) breakpoints: Mutex<BreakpointTable>,
    holds: Mutex<Holds>,
    subscribers: Mutex<Vec<Sender<VmEvent>>>,
    launched: AtomicBool,
    break_on_uncaught: AtomicBool,
}

impl VmInner {
    pub(crate) fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.read().get(name).cloned()
    }

    pub(crate) fn emit(&self, event: VmEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub(crate) fn break_on_uncaught(&self) -> bool {
        self.break_on_uncaught.load(Ordering::SeqCst)
    }

    pub(crate) fn allocate_string(&self, value: &str) -> ObjectRef {
        let class = self.class(STRING_CLASS);
        let mut heap = self.heap.lock();
        match class {
            Some(class) => heap.allocate_string(&class, value),
            // The string class is defined in `LocalVm::new` and never removed.
            None => heap.allocate_string(&Arc::new(string_class()), value),
        }
    }

    /// Box `primitive` into a fresh holder object of the matching kind.
    pub(crate) fn box_primitive(&self, primitive: Primitive) -> Option<ObjectRef> {
        let class = self.class(primitive.kind().holder_class())?;
        let mut heap = self.heap.lock();
        let holder = heap.allocate(&class);
        heap.set_field(holder.id, "value", Value::Primitive(primitive))
            .then_some(holder)
    }

    fn start_thread(self: &Arc<Self>, name: &str, group: &str) -> Result<ThreadId> {
        let id = self.next_thread_id.fetch_add(1, Ordering::SeqCst) + 1;
        let thread = ExecThread::spawn(self, id, name, group)
            .map_err(|err| RuntimeError::Other(format!("failed to spawn thread {name}: {err}")))?;
        self.threads.lock().insert(id, thread);
        self.emit(VmEvent::ThreadStarted { thread: id });
        tracing::debug!(target: "tether.runtime", thread = name, group, id, "thread started");
        Ok(id)
    }

    fn thread(&self, id: ThreadId) -> Result<Arc<ExecThread>> {
        self.threads
            .lock()
            .get(&id)
            .cloned()
            .ok_or(RuntimeError::UnknownThread(id))
    }

    fn main(&self) -> Result<Arc<ExecThread>> {
        let id = (*self.main_thread.lock()).ok_or(RuntimeError::NotLaunched)?;
        self.thread(id)
    }

    fn require_launched(&self) -> Result<()> {
        if self.launched.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RuntimeError::NotLaunched)
        }
    }
}

fn string_class() -> ClassDef {
    ClassDef::builder(STRING_CLASS)
        .category(ObjectCategory::String)
        .build()
}

/// An in-process debuggee.
///
/// Classes are registered with [`LocalVm::define_class`]; [`launch`] starts
/// the `main` execution thread plus idle system threads. All invocation
/// entry points of [`ExecutionEnvironment`] run on the main thread through the
/// [`crate::bridge`].
///
/// [`launch`]: ExecutionEnvironment::launch
pub struct LocalVm {
    inner: Arc<VmInner>,
}

impl Default for LocalVm {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalVm {
    pub fn new() -> Self {
        let vm = Self {
            inner: Arc::new(VmInner {
                classes: RwLock::new(HashMap::new()),
                heap: Mutex::new(Heap::default()),
                threads: Mutex::new(BTreeMap::new()),
                main_thread: Mutex::new(None),
                next_thread_id: AtomicU64::new(0),
                breakpoints: Mutex::new(BreakpointTable::default()),
                holds: Mutex::new(Holds::default()),
                subscribers: Mutex::new(Vec::new()),
                launched: AtomicBool::new(false),
                break_on_uncaught: AtomicBool::new(false),
            }),
        };

        vm.define_class(string_class());
        for kind in PrimitiveKind::ALL {
            vm.define_class(
                ClassDef::builder(kind.holder_class())
                    .category(ObjectCategory::ResultHolder)
                    .field("value", kind.type_name())
                    .build(),
            );
        }
        vm.define_class(
            ClassDef::builder(TRANSPORT_CLASS)
                .internal()
                .static_field(TRANSPORT_FIELD, "Object")
                .build(),
        );
        vm
    }

    /// Register a class. A class with the same name is replaced.
    pub fn define_class(&self, class: ClassDef) {
        let class = Arc::new(class);
        self.inner.heap.lock().init_statics(&class);
        tracing::debug!(target: "tether.runtime", class = %class.name, "class defined");
        self.inner.classes.write().insert(class.name.clone(), class);
    }

    /// Start an additional user execution thread in the `main` group.
    pub fn spawn_thread(&self, name: &str) -> Result<ThreadId> {
        self.inner.require_launched()?;
        self.inner.start_thread(name, MAIN_GROUP)
    }

    /// Queue `body` on `thread` and return the caller's side of the call.
    pub fn run_on<F>(&self, thread: ThreadId, body: F) -> Result<PendingCall>
    where
        F: FnOnce(&mut CallContext<'_>) -> std::result::Result<Value, Thrown> + Send + 'static,
    {
        let thread = self.inner.thread(thread)?;
        Ok(thread.submit(Box::new(body)))
    }

    /// Number of objects currently held on behalf of the controller.
    pub fn held_objects(&self) -> usize {
        self.inner.holds.lock().by_handle.len()
    }

    pub fn heap_size(&self) -> usize {
        self.inner.heap.lock().len()
    }

    pub fn breakpoint_count(&self) -> usize {
        self.inner.breakpoints.lock().len()
    }

    fn run_on_main<F>(&self, body: F) -> Result<PendingCall>
    where
        F: FnOnce(&mut CallContext<'_>) -> std::result::Result<Value, Thrown> + Send + 'static,
    {
        let main = self.inner.main()?;
        Ok(main.submit(Box::new(body)))
    }

    fn require_class(&self, name: &str) -> Result<Arc<ClassDef>> {
        self.inner
            .class(name)
            .ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))
    }

    fn missing_entry_point(&self, class: &str, method: &str, param_types: &[String]) -> PendingCall {
        tracing::error!(
            target: "tether.runtime",
            class,
            method,
            params = %param_types.join(", "),
            "no matching method to invoke"
        );
        PendingCall::resolved(ExecResult::Exception(ExceptionDescription::internal()))
    }
}

impl Drop for LocalVm {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl ExecutionEnvironment for LocalVm {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn launch(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.launched.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "tether.runtime", "launch ignored, already running");
            return Ok(());
        }
        {
            let classes = inner.classes.read();
            let mut heap = inner.heap.lock();
            for class in classes.values() {
                heap.init_statics(class);
            }
        }
        inner.breakpoints.lock().reset_hits();
        inner.emit(VmEvent::Started);

        let main = inner.start_thread("main", MAIN_GROUP)?;
        *inner.main_thread.lock() = Some(main);
        for name in SYSTEM_THREADS {
            inner.start_thread(name, SYSTEM_GROUP)?;
        }
        tracing::info!(target: "tether.runtime", "debuggee launched");
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.launched.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        *inner.main_thread.lock() = None;
        let threads = std::mem::take(&mut *inner.threads.lock());
        for thread in threads.into_values() {
            thread.terminate(inner);
        }
        inner.holds.lock().by_handle.clear();
        inner.heap.lock().reset();
        inner.emit(VmEvent::Terminated);
        tracing::info!(target: "tether.runtime", "debuggee terminated");
        Ok(())
    }

    fn is_launched(&self) -> bool {
        self.inner.launched.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> Result<Receiver<VmEvent>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.subscribers.lock().push(tx);
        Ok(rx)
    }

    fn class_info(&self, name: &str) -> Result<ClassInfo> {
        Ok(self.require_class(name)?.info())
    }

    fn get_static(&self, class: &str, field: &str) -> Result<Value> {
        self.require_class(class)?;
        self.inner
            .heap
            .lock()
            .static_field(class, field)
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuchField {
                class: class.to_string(),
                field: field.to_string(),
            })
    }

    fn object_class(&self, object: ObjectId) -> Result<String> {
        self.inner
            .heap
            .lock()
            .get(object)
            .map(|o| o.class.name.clone())
            .ok_or(RuntimeError::InvalidObjectId(object))
    }

    fn object_category(&self, object: ObjectId) -> Result<ObjectCategory> {
        self.inner
            .heap
            .lock()
            .get(object)
            .map(|o| o.category())
            .ok_or(RuntimeError::InvalidObjectId(object))
    }

    fn object_fields(&self, object: ObjectId) -> Result<Vec<(FieldInfo, Value)>> {
        let heap = self.inner.heap.lock();
        let o = heap.get(object).ok_or(RuntimeError::InvalidObjectId(object))?;
        Ok(o.class
            .instance_fields()
            .zip(&o.fields)
            .map(|(info, (_, value))| (info.clone(), value.clone()))
            .collect())
    }

    fn string_value(&self, object: ObjectId) -> Result<Option<String>> {
        self.inner
            .heap
            .lock()
            .get(object)
            .map(|o| o.string.clone())
            .ok_or(RuntimeError::InvalidObjectId(object))
    }

    fn new_string(&self, value: &str) -> Result<ObjectRef> {
        self.inner.require_launched()?;
        Ok(self.inner.allocate_string(value))
    }

    fn box_value(&self, value: Primitive) -> Result<ObjectRef> {
        self.inner.require_launched()?;
        self.inner
            .box_primitive(value)
            .ok_or_else(|| RuntimeError::ClassNotFound(value.kind().holder_class().to_string()))
    }

    fn new_instance(
        &self,
        class: &str,
        param_types: &[String],
        args: Vec<Value>,
    ) -> Result<PendingCall> {
        self.inner.require_launched()?;
        let def = self.require_class(class)?;
        let ctor = if def.has_constructors() {
            match def.find_method("", MethodKind::Constructor, Overload::Types(param_types)) {
                Some(ctor) => Some(ctor.clone()),
                None => return Ok(self.missing_entry_point(class, "<init>", param_types)),
            }
        } else if param_types.is_empty() {
            None
        } else {
            return Ok(self.missing_entry_point(class, "<init>", param_types));
        };
        self.run_on_main(move |ctx| {
            ctx.construct(&def, ctor.as_ref(), &args)
                .map(Value::Object)
        })
    }

    fn invoke_static(
        &self,
        class: &str,
        method: &str,
        param_types: &[String],
        args: Vec<Value>,
    ) -> Result<PendingCall> {
        self.inner.require_launched()?;
        let def = self.require_class(class)?;
        let Some(target) = def
            .find_method(method, MethodKind::Static, Overload::Types(param_types))
            .cloned()
        else {
            return Ok(self.missing_entry_point(class, method, param_types));
        };
        self.run_on_main(move |ctx| ctx.call(&def, &target, None, &args))
    }

    fn invoke_method(
        &self,
        object: &ObjectRef,
        method: &str,
        param_types: &[String],
        args: Vec<Value>,
    ) -> Result<PendingCall> {
        self.inner.require_launched()?;
        let def = self
            .inner
            .heap
            .lock()
            .get(object.id)
            .map(|o| o.class.clone())
            .ok_or(RuntimeError::InvalidObjectId(object.id))?;
        let Some(target) = def
            .find_method(method, MethodKind::Instance, Overload::Types(param_types))
            .cloned()
        else {
            return Ok(self.missing_entry_point(&def.name, method, param_types));
        };
        let receiver = object.clone();
        self.run_on_main(move |ctx| ctx.call(&def, &target, Some(receiver), &args))
    }

    fn install_transport(&self, object: ObjectId) -> Result<()> {
        let mut heap = self.inner.heap.lock();
        let object_ref = heap
            .get(object)
            .map(|o| o.as_ref(object))
            .ok_or(RuntimeError::InvalidObjectId(object))?;
        if heap.set_static(TRANSPORT_CLASS, TRANSPORT_FIELD, Value::Object(object_ref)) {
            Ok(())
        } else {
            Err(RuntimeError::ClassNotFound(TRANSPORT_CLASS.to_string()))
        }
    }

    fn take_transport(&self) -> Result<Handle> {
        let mut heap = self.inner.heap.lock();
        let slot = heap
            .static_field(TRANSPORT_CLASS, TRANSPORT_FIELD)
            .cloned()
            .unwrap_or(Value::Null);
        let Value::Object(object) = slot else {
            return Err(RuntimeError::TransportEmpty);
        };
        heap.set_static(TRANSPORT_CLASS, TRANSPORT_FIELD, Value::Null);
        drop(heap);

        let mut holds = self.inner.holds.lock();
        holds.next += 1;
        let handle = Handle::from_raw(holds.next);
        holds.by_handle.insert(handle, object.id);
        tracing::trace!(target: "tether.runtime", %handle, object = object.id, "object registered");
        Ok(handle)
    }

    fn release(&self, handle: Handle) -> Result<()> {
        self.inner
            .holds
            .lock()
            .by_handle
            .remove(&handle)
            .map(|_| ())
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>> {
        self.inner.require_launched()?;
        Ok(self
            .inner
            .threads
            .lock()
            .values()
            .map(|thread| thread.info())
            .collect())
    }

    fn main_thread(&self) -> Result<ThreadId> {
        (*self.inner.main_thread.lock()).ok_or(RuntimeError::NotLaunched)
    }

    fn frames(&self, thread: ThreadId) -> Result<Vec<FrameInfo>> {
        self.inner.thread(thread)?.frames()
    }

    fn resume(&self, thread: ThreadId, step: Option<StepKind>) -> Result<()> {
        self.inner.thread(thread)?.resume(&self.inner, step)
    }

    fn halt(&self, thread: ThreadId) -> Result<()> {
        self.inner.thread(thread)?.halt()
    }

    fn terminate_thread(&self, thread: ThreadId) -> Result<()> {
        self.inner.thread(thread)?.terminate(&self.inner);
        Ok(())
    }

    fn wait_for_stop(&self, thread: ThreadId, timeout: Duration) -> Result<ThreadStatus> {
        Ok(self.inner.thread(thread)?.wait_for_stop(timeout))
    }

    fn set_breakpoint(&self, request: &BreakpointRequest) -> Result<()> {
        let class = self.require_class(request.location.class_name())?;
        match &request.location {
            BreakpointLocation::Line { line, .. } => {
                if !class.executable_lines().contains(line) {
                    return Err(RuntimeError::NoCodeAtLine {
                        class: class.name.clone(),
                        line: *line,
                    });
                }
            }
            BreakpointLocation::Method { method, .. } => {
                if class.find_by_name(method).is_none() {
                    return Err(RuntimeError::NoSuchMethod {
                        class: class.name.clone(),
                        method: method.clone(),
                        params: String::new(),
                    });
                }
            }
        }
        self.inner.breakpoints.lock().insert(request);
        tracing::debug!(target: "tether.runtime", location = %request.location, "breakpoint installed");
        Ok(())
    }

    fn clear_breakpoint(&self, location: &BreakpointLocation) -> Result<bool> {
        Ok(self.inner.breakpoints.lock().remove(location))
    }

    fn set_break_on_uncaught(&self, enabled: bool) -> Result<()> {
        self.inner.break_on_uncaught.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}
