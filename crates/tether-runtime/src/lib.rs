//! Execution-environment façade for Tether.
//!
//! `tether-debug` consumes this crate to drive and inspect a debuggee: class
//! lookup, field access, invocation on the debuggee's own execution threads,
//! stack introspection, breakpoints and stepping, and the transport slot used
//! to move object references across the controller/debuggee boundary.
//!
//! [`LocalVm`] is the full in-process implementation. Backends that only cover
//! part of [`ExecutionEnvironment`] leave the remaining methods at their
//! defaults, which fail with [`RuntimeError::NotImplemented`].

pub mod bridge;
mod breakpoints;
mod class;
mod context;
mod heap;
mod outcome;
mod thread;
mod value;
mod vm;

#[cfg(any(test, feature = "test-support"))]
mod mock;

use std::time::Duration;

use crossbeam_channel::Receiver;
use thiserror::Error;

pub use bridge::PendingCall;
pub use class::{ClassBuilder, ClassDef, ClassInfo, FieldInfo, MethodBody, MethodInfo};
pub use context::CallContext;
pub use outcome::{
    ExceptionDescription, ExceptionKind, ExecResult, SourceLocation, Thrown, PANIC_TYPE_NAME,
};
pub use value::{ObjectRef, Primitive, PrimitiveKind, Value};
pub use vm::{LocalVm, TRANSPORT_CLASS, TRANSPORT_FIELD};

#[cfg(any(test, feature = "test-support"))]
pub use mock::MockEnvironment;

pub type ObjectId = u64;
pub type ThreadId = u64;

/// Thread group that hosts the debuggee's infrastructure threads.
pub const SYSTEM_GROUP: &str = "system";

/// Thread group of the user execution thread(s).
pub const MAIN_GROUP: &str = "main";

/// Opaque reference to a debuggee object held on behalf of the controller.
///
/// Handles are assigned by the debuggee when an object is picked up from the
/// transport slot and stay valid until released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Runtime category of a debuggee object, used to decide whether it can be
/// mirrored to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    Instance,
    String,
    /// Single-field holder produced when a primitive result is boxed.
    ResultHolder,
    /// VM infrastructure that never crosses the boundary.
    Internal,
}

impl ObjectCategory {
    pub fn is_mirrorable(self) -> bool {
        !matches!(self, ObjectCategory::Internal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Step,
    Halt,
    Exception,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Waiting for work on its task queue.
    Idle,
    Running,
    Suspended(StopReason),
    Terminated,
}

impl ThreadStatus {
    pub fn is_suspended(self) -> bool {
        matches!(self, ThreadStatus::Suspended(_))
    }

    pub fn describe(self) -> &'static str {
        match self {
            ThreadStatus::Idle => "waiting",
            ThreadStatus::Running => "running",
            ThreadStatus::Suspended(StopReason::Breakpoint) => "at breakpoint",
            ThreadStatus::Suspended(StopReason::Step) => "stepping",
            ThreadStatus::Suspended(StopReason::Halt) => "halted",
            ThreadStatus::Suspended(StopReason::Exception) => "at exception",
            ThreadStatus::Terminated => "finished",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub group: String,
    pub status: ThreadStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub type_name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameInfo {
    pub class_name: String,
    pub method_name: String,
    pub source_file: Option<String>,
    pub line: u32,
    pub locals: Vec<LocalVariable>,
    /// Receiver of the call, `None` for static methods.
    pub this: Option<ObjectRef>,
}

impl FrameInfo {
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            class_name: self.class_name.clone(),
            file_name: self.source_file.clone(),
            method_name: self.method_name.clone(),
            line: self.line,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Stop at the next line event in the same or a returning frame.
    Over,
    /// Stop at the next line event, descending into calls.
    Into,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BreakpointLocation {
    Line { class: String, line: u32 },
    Method { class: String, method: String },
}

impl BreakpointLocation {
    pub fn class_name(&self) -> &str {
        match self {
            BreakpointLocation::Line { class, .. } | BreakpointLocation::Method { class, .. } => {
                class
            }
        }
    }
}

impl std::fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointLocation::Line { class, line } => write!(f, "{class}:{line}"),
            BreakpointLocation::Method { class, method } => write!(f, "{class}.{method}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakpointRequest {
    pub location: BreakpointLocation,
    /// Break only on the N-th hit (1-based). `None` breaks on every hit.
    pub hit_count: Option<u32>,
}

/// Asynchronous notifications emitted by an execution environment.
#[derive(Clone, Debug, PartialEq)]
pub enum VmEvent {
    Started,
    Terminated,
    ThreadStarted {
        thread: ThreadId,
    },
    ThreadDied {
        thread: ThreadId,
    },
    Suspended {
        thread: ThreadId,
        reason: StopReason,
        location: Option<SourceLocation>,
        exception: Option<ExceptionDescription>,
    },
    Resumed {
        thread: ThreadId,
    },
    /// An exception escaped a task without suspending the thread.
    UncaughtException {
        thread: ThreadId,
        description: ExceptionDescription,
    },
}

/// What a backend can do. Callers may probe this, but unsupported operations
/// still fail with [`RuntimeError::NotImplemented`] when invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub launch: bool,
    pub breakpoints: bool,
    pub stepping: bool,
    pub invocation: bool,
    pub object_transport: bool,
    pub thread_introspection: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            launch: true,
            breakpoints: true,
            stepping: true,
            invocation: true,
            object_transport: true,
            thread_introspection: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("operation `{0}` is not implemented by this execution environment")]
    NotImplemented(&'static str),
    #[error("debuggee is not running")]
    NotLaunched,
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("class {class} has no field `{field}`")]
    NoSuchField { class: String, field: String },
    #[error("class {class} has no method {method}({params})")]
    NoSuchMethod {
        class: String,
        method: String,
        params: String,
    },
    #[error("no code at line {line} in class {class}")]
    NoCodeAtLine { class: String, line: u32 },
    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),
    #[error("thread {0} is not suspended")]
    ThreadNotSuspended(ThreadId),
    #[error("thread {0} has terminated")]
    ThreadTerminated(ThreadId),
    #[error("transport slot is empty")]
    TransportEmpty,
    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

/// The execution environment a debugger session drives.
///
/// Every method has a default that fails with
/// [`RuntimeError::NotImplemented`], so partial backends only override what
/// they can actually do.
pub trait ExecutionEnvironment: Send + Sync {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn launch(&self) -> Result<()> {
        Err(RuntimeError::NotImplemented("launch"))
    }

    /// Terminate every execution thread and discard debuggee state.
    fn shutdown(&self) -> Result<()> {
        Err(RuntimeError::NotImplemented("shutdown"))
    }

    fn is_launched(&self) -> bool {
        false
    }

    /// Register a new event subscriber. Events are delivered in the order the
    /// underlying transitions happened.
    fn subscribe(&self) -> Result<Receiver<VmEvent>> {
        Err(RuntimeError::NotImplemented("subscribe"))
    }

    fn class_info(&self, _name: &str) -> Result<ClassInfo> {
        Err(RuntimeError::NotImplemented("class_info"))
    }

    fn get_static(&self, _class: &str, _field: &str) -> Result<Value> {
        Err(RuntimeError::NotImplemented("get_static"))
    }

    fn object_class(&self, _object: ObjectId) -> Result<String> {
        Err(RuntimeError::NotImplemented("object_class"))
    }

    fn object_category(&self, _object: ObjectId) -> Result<ObjectCategory> {
        Err(RuntimeError::NotImplemented("object_category"))
    }

    fn object_fields(&self, _object: ObjectId) -> Result<Vec<(FieldInfo, Value)>> {
        Err(RuntimeError::NotImplemented("object_fields"))
    }

    fn string_value(&self, _object: ObjectId) -> Result<Option<String>> {
        Err(RuntimeError::NotImplemented("string_value"))
    }

    fn new_string(&self, _value: &str) -> Result<ObjectRef> {
        Err(RuntimeError::NotImplemented("new_string"))
    }

    /// Box a primitive into a fresh result holder object.
    fn box_value(&self, _value: Primitive) -> Result<ObjectRef> {
        Err(RuntimeError::NotImplemented("box_value"))
    }

    /// Construct an instance on the main execution thread.
    fn new_instance(
        &self,
        _class: &str,
        _param_types: &[String],
        _args: Vec<Value>,
    ) -> Result<PendingCall> {
        Err(RuntimeError::NotImplemented("new_instance"))
    }

    /// Invoke a static method on the main execution thread.
    fn invoke_static(
        &self,
        _class: &str,
        _method: &str,
        _param_types: &[String],
        _args: Vec<Value>,
    ) -> Result<PendingCall> {
        Err(RuntimeError::NotImplemented("invoke_static"))
    }

    /// Invoke an instance method on the main execution thread.
    fn invoke_method(
        &self,
        _object: &ObjectRef,
        _method: &str,
        _param_types: &[String],
        _args: Vec<Value>,
    ) -> Result<PendingCall> {
        Err(RuntimeError::NotImplemented("invoke_method"))
    }

    /// Place a reference in the agreed transport slot.
    fn install_transport(&self, _object: ObjectId) -> Result<()> {
        Err(RuntimeError::NotImplemented("install_transport"))
    }

    /// Register whatever reference the transport slot holds, clear the slot,
    /// and return the freshly assigned handle.
    fn take_transport(&self) -> Result<Handle> {
        Err(RuntimeError::NotImplemented("take_transport"))
    }

    /// Drop the debuggee-side hold behind `handle`.
    fn release(&self, _handle: Handle) -> Result<()> {
        Err(RuntimeError::NotImplemented("release"))
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>> {
        Err(RuntimeError::NotImplemented("threads"))
    }

    fn main_thread(&self) -> Result<ThreadId> {
        Err(RuntimeError::NotImplemented("main_thread"))
    }

    /// Frames of a suspended thread, innermost first.
    fn frames(&self, _thread: ThreadId) -> Result<Vec<FrameInfo>> {
        Err(RuntimeError::NotImplemented("frames"))
    }

    fn resume(&self, _thread: ThreadId, _step: Option<StepKind>) -> Result<()> {
        Err(RuntimeError::NotImplemented("resume"))
    }

    fn halt(&self, _thread: ThreadId) -> Result<()> {
        Err(RuntimeError::NotImplemented("halt"))
    }

    fn terminate_thread(&self, _thread: ThreadId) -> Result<()> {
        Err(RuntimeError::NotImplemented("terminate_thread"))
    }

    /// Block until `thread` is suspended or terminated, or `timeout` elapses.
    /// Returns the thread status observed last.
    fn wait_for_stop(&self, _thread: ThreadId, _timeout: Duration) -> Result<ThreadStatus> {
        Err(RuntimeError::NotImplemented("wait_for_stop"))
    }

    fn set_breakpoint(&self, _request: &BreakpointRequest) -> Result<()> {
        Err(RuntimeError::NotImplemented("set_breakpoint"))
    }

    /// Returns whether a breakpoint was installed at `location`.
    fn clear_breakpoint(&self, _location: &BreakpointLocation) -> Result<bool> {
        Err(RuntimeError::NotImplemented("clear_breakpoint"))
    }

    fn set_break_on_uncaught(&self, _enabled: bool) -> Result<()> {
        Err(RuntimeError::NotImplemented("set_break_on_uncaught"))
    }
}
