use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_config::DebuggerConfig;
use tether_runtime::{
    BreakpointLocation, CallContext, Capabilities, ExceptionDescription, ExecResult,
    ExecutionEnvironment, LocalVm, ObjectRef, RuntimeError, ThreadId, ThreadStatus, Thrown,
    Value,
};

use crate::breakpoints::{BreakpointProperties, BreakpointRegistry};
use crate::debugger::{Debugger, MirrorResult};
use crate::error::{DebugError, DebugResult};
use crate::events::{DebuggerEvent, DebuggerListener, EventDispatcher, ListenerId};
use crate::literal::{parse_literal, Literal};
use crate::mirror::{ClassMirror, FieldEntry, MirrorValue, ObjectMirror};
use crate::naming;
use crate::thread::{ThreadController, ThreadGroupNode};
use crate::tracker::ObjectTracker;

/// Scope the CLI registers objects under.
pub const DEFAULT_SCOPE: &str = "bench";

const STATUS_POLL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    NotReady,
    /// Launched, no thread running user code.
    Idle,
    Running,
    /// At least one user thread is suspended.
    Suspended,
    Terminated,
    /// Disabled after a fatal error; only `close` is accepted.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    NotReady,
    Launched,
    Terminated,
    Failed,
}

/// State shared between a session and its thread controllers.
pub(crate) struct SessionCore {
    pub(crate) env: Arc<dyn ExecutionEnvironment>,
    pub(crate) tracker: Arc<ObjectTracker>,
    pub(crate) config: DebuggerConfig,
    events: EventDispatcher,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionCore {
    pub(crate) fn ensure_usable(&self) -> DebugResult<()> {
        match *self.lifecycle.lock() {
            Lifecycle::Failed => Err(DebugError::SessionFailed),
            _ => Ok(()),
        }
    }

    /// Mirror `object`, disabling the session if that reveals corruption.
    pub(crate) fn track(&self, object: &ObjectRef) -> DebugResult<Option<ObjectMirror>> {
        self.tracker.get_handle(object).map_err(|err| self.check_fatal(err))
    }

    fn check_fatal(&self, err: DebugError) -> DebugError {
        if err.is_fatal() {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Failed {
                *lifecycle = Lifecycle::Failed;
                tracing::error!(target: "tether.debug", error = %err, "session disabled");
                self.events.emit(DebuggerEvent::Disabled {
                    reason: err.to_string(),
                });
            }
        }
        err
    }

    fn to_value(&self, arg: MirrorValue) -> DebugResult<Value> {
        Ok(match arg {
            MirrorValue::Null => Value::Null,
            MirrorValue::Primitive(p) => Value::Primitive(p),
            MirrorValue::Object(mirror) => Value::Object(self.tracker.resolve(&mirror)?),
        })
    }

    fn to_mirror_value(&self, value: Value) -> DebugResult<MirrorValue> {
        Ok(match value {
            Value::Null | Value::Void => MirrorValue::Null,
            Value::Primitive(p) => MirrorValue::Primitive(p),
            Value::Object(object) => match self.track(&object)? {
                Some(mirror) => MirrorValue::Object(mirror),
                None => MirrorValue::Null,
            },
        })
    }

    fn mirror_result(&self, result: ExecResult<Option<ObjectRef>>) -> DebugResult<MirrorResult> {
        if let ExecResult::Exception(description) = &result {
            tracing::debug!(
                target: "tether.debug",
                exception = %description.type_name,
                internal = description.is_internal(),
                "call completed with an exception"
            );
        }
        result.try_map(|object| match object {
            Some(object) => self.track(&object),
            None => Ok(None),
        })
    }
}

/// A debugging session over one execution environment.
///
/// The session owns the identity cache, the breakpoint registry, the thread
/// controllers and the listener notifier. Dropping it does not shut the
/// debuggee down; call [`Debugger::close`] for that.
pub struct Session<E: ExecutionEnvironment + 'static> {
    env: Arc<E>,
    core: Arc<SessionCore>,
    breakpoints: BreakpointRegistry,
    threads: Mutex<BTreeMap<ThreadId, Arc<ThreadController>>>,
    hide_system: AtomicBool,
}

impl<E: ExecutionEnvironment + 'static> Session<E> {
    pub fn new(env: Arc<E>, config: DebuggerConfig) -> Self {
        let dyn_env: Arc<dyn ExecutionEnvironment> = env.clone();
        let vm_events = match dyn_env.subscribe() {
            Ok(events) => Some(events),
            Err(err) => {
                tracing::debug!(target: "tether.debug", error = %err, "backend offers no event stream");
                None
            }
        };
        let hide_system = config.hide_system_threads;
        Self {
            env,
            core: Arc::new(SessionCore {
                tracker: Arc::new(ObjectTracker::new(dyn_env.clone())),
                env: dyn_env,
                config,
                events: EventDispatcher::start(vm_events),
                lifecycle: Mutex::new(Lifecycle::NotReady),
            }),
            breakpoints: BreakpointRegistry::default(),
            threads: Mutex::new(BTreeMap::new()),
            hide_system: AtomicBool::new(hide_system),
        }
    }

    pub fn env(&self) -> &Arc<E> {
        &self.env
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.core.tracker
    }

    /// Mirror a reference obtained directly from the environment. `None` for
    /// objects that never cross to the controller.
    pub fn mirror(&self, object: &ObjectRef) -> DebugResult<Option<ObjectMirror>> {
        self.core.ensure_usable()?;
        self.core.track(object)
    }

    /// Breakpoints the debuggee accepted, with their properties.
    pub fn breakpoints(&self) -> Vec<(BreakpointLocation, BreakpointProperties)> {
        self.breakpoints.list()
    }

    /// Block until every event raised so far has reached the listeners.
    pub fn flush_events(&self) -> bool {
        self.core.events.flush(self.core.config.wait_timeout())
    }

    fn refresh_threads(&self) -> DebugResult<BTreeMap<ThreadId, Arc<ThreadController>>> {
        self.core.ensure_usable()?;
        let infos = self.core.env.threads()?;
        let mut threads = self.threads.lock();
        threads.retain(|id, _| infos.iter().any(|info| info.id == *id));
        for info in &infos {
            threads
                .entry(info.id)
                .or_insert_with(|| Arc::new(ThreadController::new(self.core.clone(), info)));
        }
        Ok(threads.clone())
    }

    fn mirror_from_literal(&self, literal: Literal) -> DebugResult<ObjectMirror> {
        let object = match literal {
            Literal::Null => return Err(DebugError::NotAnObject),
            Literal::Str(text) => self.core.env.new_string(&text)?,
            Literal::Primitive(p) => self.core.env.box_value(p)?,
            Literal::Handle(handle) => {
                return self
                    .core
                    .tracker
                    .object_for(handle)
                    .and_then(|object| self.core.track(&object).transpose())
                    .unwrap_or(Err(DebugError::UnknownHandle(handle)));
            }
            Literal::Name(name) => {
                return self
                    .core
                    .tracker
                    .snapshot_named_objects()
                    .remove(&name)
                    .ok_or(DebugError::InvalidLiteral(name));
            }
        };
        self.core.track(&object)?.ok_or(DebugError::NotAnObject)
    }
}

impl Session<LocalVm> {
    /// Run `body` on the main execution thread and mirror what it returns.
    pub fn execute<F>(&self, body: F) -> DebugResult<MirrorResult>
    where
        F: FnOnce(&mut CallContext<'_>) -> Result<Value, Thrown> + Send + 'static,
    {
        self.core.ensure_usable()?;
        let main = self.env.main_thread()?;
        let result = self.env.run_on(main, body)?.wait();
        self.core.mirror_result(result)
    }
}

impl<E: ExecutionEnvironment + 'static> Debugger for Session<E> {
    fn capabilities(&self) -> Capabilities {
        self.core.env.capabilities()
    }

    fn launch(&self) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.core.env.launch()?;
        if self.core.config.break_on_uncaught {
            match self.core.env.set_break_on_uncaught(true) {
                Ok(()) | Err(RuntimeError::NotImplemented(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        *self.core.lifecycle.lock() = Lifecycle::Launched;
        tracing::info!(target: "tether.debug", "session launched");
        Ok(())
    }

    fn close(&self, restart: bool) -> DebugResult<()> {
        self.core.tracker.clear();
        self.threads.lock().clear();
        let shutdown = self.core.env.shutdown();
        *self.core.lifecycle.lock() = Lifecycle::Terminated;
        shutdown?;
        tracing::info!(target: "tether.debug", restart, "session closed");
        if restart {
            self.launch()?;
        }
        Ok(())
    }

    fn get_status(&self) -> SessionStatus {
        match *self.core.lifecycle.lock() {
            Lifecycle::NotReady => return SessionStatus::NotReady,
            Lifecycle::Terminated => return SessionStatus::Terminated,
            Lifecycle::Failed => return SessionStatus::Failed,
            Lifecycle::Launched => {}
        }
        if !self.core.env.is_launched() {
            return SessionStatus::Terminated;
        }
        let Ok(threads) = self.core.env.threads() else {
            return SessionStatus::Idle;
        };
        if threads.iter().any(|t| t.status.is_suspended()) {
            SessionStatus::Suspended
        } else if threads.iter().any(|t| t.status == ThreadStatus::Running) {
            SessionStatus::Running
        } else {
            SessionStatus::Idle
        }
    }

    fn wait_for_status(
        &self,
        predicate: &dyn Fn(SessionStatus) -> bool,
        timeout: Duration,
    ) -> DebugResult<SessionStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.get_status();
            if predicate(status) {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(DebugError::Timeout(status));
            }
            std::thread::sleep(STATUS_POLL);
        }
    }

    fn instantiate_class(
        &self,
        class: &str,
        param_types: &[String],
        args: Vec<MirrorValue>,
    ) -> DebugResult<MirrorResult> {
        self.core.ensure_usable()?;
        let args = args
            .into_iter()
            .map(|arg| self.core.to_value(arg))
            .collect::<DebugResult<Vec<_>>>()?;
        let result = self.core.env.new_instance(class, param_types, args)?.wait();
        self.core.mirror_result(result)
    }

    fn run_class_main(&self, class: &str) -> DebugResult<MirrorResult> {
        self.core.ensure_usable()?;
        let info = self.get_class(class)?;
        let (param_types, args) = if info.static_method("main", &[]).is_some() {
            (Vec::new(), Vec::new())
        } else if info.static_method("main", &["String[]"]).is_some() {
            (vec!["String[]".to_string()], vec![Value::Null])
        } else {
            tracing::error!(target: "tether.debug", class, "class has no static main method");
            return Ok(ExecResult::Exception(ExceptionDescription::internal()));
        };
        let result = self
            .core
            .env
            .invoke_static(class, "main", &param_types, args)?
            .wait();
        self.core.mirror_result(result)
    }

    fn invoke_method(
        &self,
        object: &ObjectMirror,
        method: &str,
        param_types: &[String],
        args: Vec<MirrorValue>,
    ) -> DebugResult<MirrorResult> {
        self.core.ensure_usable()?;
        let receiver = self.core.tracker.resolve(object)?;
        let args = args
            .into_iter()
            .map(|arg| self.core.to_value(arg))
            .collect::<DebugResult<Vec<_>>>()?;
        let result = self
            .core
            .env
            .invoke_method(&receiver, method, param_types, args)?
            .wait();
        self.core.mirror_result(result)
    }

    fn get_class(&self, name: &str) -> DebugResult<Arc<ClassMirror>> {
        self.core.ensure_usable()?;
        self.core.tracker.class_mirror(name)
    }

    fn get_static_value(&self, class: &str, field: &str) -> DebugResult<Option<ObjectMirror>> {
        self.core.ensure_usable()?;
        let object = match self.core.env.get_static(class, field)? {
            Value::Object(object) => object,
            Value::Null | Value::Void => return Ok(None),
            Value::Primitive(p) => self.core.env.box_value(p)?,
        };
        self.core.track(&object)
    }

    fn add_object(&self, scope: &str, name: &str, object: &ObjectMirror) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.core.tracker.name_object(scope, name, object)
    }

    fn remove_object(&self, scope: &str, name: &str) -> DebugResult<bool> {
        self.core.ensure_usable()?;
        Ok(self.core.tracker.unname_object(scope, name).is_some())
    }

    fn get_objects(&self) -> DebugResult<BTreeMap<String, ObjectMirror>> {
        self.core.ensure_usable()?;
        Ok(self.core.tracker.snapshot_named_objects())
    }

    fn guess_new_name(&self, class_name: &str) -> DebugResult<String> {
        self.core.ensure_usable()?;
        let tracker = &self.core.tracker;
        Ok(naming::guess_new_name(class_name, |candidate| {
            tracker.is_name_taken(candidate)
        }))
    }

    fn get_mirror(&self, literal: &str) -> DebugResult<ObjectMirror> {
        self.core.ensure_usable()?;
        self.mirror_from_literal(parse_literal(literal)?)
    }

    fn object_fields(&self, object: &ObjectMirror) -> DebugResult<Vec<FieldEntry>> {
        self.core.ensure_usable()?;
        let target = self.core.tracker.resolve(object)?;
        self.core
            .env
            .object_fields(target.id)?
            .into_iter()
            .filter(|(info, _)| !info.is_static)
            .map(|(info, value)| {
                Ok(FieldEntry {
                    name: info.name,
                    type_name: info.type_name,
                    value: self.core.to_mirror_value(value)?,
                })
            })
            .collect()
    }

    fn field_value(&self, object: &ObjectMirror, field: &str) -> DebugResult<MirrorValue> {
        self.object_fields(object)?
            .into_iter()
            .find(|entry| entry.name == field)
            .map(|entry| entry.value)
            .ok_or_else(|| DebugError::NoSuchField {
                class: object.class_name().to_string(),
                field: field.to_string(),
            })
    }

    fn string_value(&self, object: &ObjectMirror) -> DebugResult<Option<String>> {
        self.core.ensure_usable()?;
        let target = self.core.tracker.resolve(object)?;
        Ok(self.core.env.string_value(target.id)?)
    }

    fn forget_object(&self, object: &ObjectMirror) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.core.tracker.forget_mirror(object)
    }

    fn toggle_breakpoint(
        &self,
        location: &BreakpointLocation,
        set: bool,
        properties: &BreakpointProperties,
    ) -> Option<String> {
        if let Err(err) = self.core.ensure_usable() {
            return Some(err.to_string());
        }
        self.breakpoints
            .toggle(self.core.env.as_ref(), location, set, properties)
    }

    fn remove_breakpoints_for_class(&self, class: &str) -> DebugResult<()> {
        self.core.ensure_usable()?;
        let removed = self
            .breakpoints
            .remove_for_class(self.core.env.as_ref(), class)?;
        tracing::debug!(target: "tether.debug", class, removed, "breakpoints removed");
        Ok(())
    }

    fn set_break_on_uncaught(&self, enabled: bool) -> DebugResult<()> {
        self.core.ensure_usable()?;
        Ok(self.core.env.set_break_on_uncaught(enabled)?)
    }

    fn hide_system_threads(&self, hide: bool) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.hide_system.store(hide, Ordering::SeqCst);
        Ok(())
    }

    fn get_threads(&self) -> DebugResult<Vec<Arc<ThreadController>>> {
        let hide = self.hide_system.load(Ordering::SeqCst);
        Ok(self
            .refresh_threads()?
            .into_values()
            .filter(|thread| !(hide && thread.is_known_system_thread()))
            .collect())
    }

    fn get_thread(&self, id: ThreadId) -> DebugResult<Arc<ThreadController>> {
        self.refresh_threads()?
            .remove(&id)
            .ok_or(DebugError::UnknownThread(id))
    }

    fn get_thread_tree(&self) -> DebugResult<Vec<ThreadGroupNode>> {
        let mut groups: BTreeMap<String, Vec<Arc<ThreadController>>> = BTreeMap::new();
        for thread in self.get_threads()? {
            groups
                .entry(thread.group().to_string())
                .or_default()
                .push(thread);
        }
        Ok(groups
            .into_iter()
            .map(|(name, threads)| ThreadGroupNode { name, threads })
            .collect())
    }

    fn add_listener(&self, listener: Arc<dyn DebuggerListener>) -> DebugResult<ListenerId> {
        Ok(self.core.events.add(listener))
    }

    fn remove_listener(&self, id: ListenerId) -> DebugResult<bool> {
        Ok(self.core.events.remove(id))
    }
}
