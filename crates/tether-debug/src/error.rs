use tether_runtime::{Handle, ObjectId, RuntimeError, ThreadId};
use thiserror::Error;

use crate::session::SessionStatus;

pub type DebugResult<T> = Result<T, DebugError>;

#[derive(Error, Debug)]
pub enum DebugError {
    #[error("operation `{0}` is not supported by this debugger")]
    Unsupported(&'static str),
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("debuggee is not running")]
    NotLaunched,
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),
    #[error("thread {0} is not suspended")]
    NotSuspended(ThreadId),
    #[error("thread {0} has terminated")]
    ThreadTerminated(ThreadId),
    #[error("no frame {index} on thread {thread}")]
    InvalidFrame { thread: ThreadId, index: usize },
    #[error("frame {frame} has no local variable {index}")]
    InvalidVariable { frame: usize, index: usize },
    #[error("value is not an object")]
    NotAnObject,
    #[error("unknown object handle {0}")]
    UnknownHandle(Handle),
    #[error("class {class} has no field `{field}`")]
    NoSuchField { class: String, field: String },
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("identity cache corrupted: handle {handle} is bound to object {existing}, not {object}")]
    CacheCorrupted {
        handle: Handle,
        existing: ObjectId,
        object: ObjectId,
    },
    #[error("session disabled after a fatal error")]
    SessionFailed,
    #[error("timed out waiting for session status (last: {0:?})")]
    Timeout(SessionStatus),
    #[error("runtime: {0}")]
    Runtime(RuntimeError),
}

impl DebugError {
    /// Whether the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DebugError::CacheCorrupted { .. })
    }
}

impl From<RuntimeError> for DebugError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotImplemented(op) => DebugError::Unsupported(op),
            RuntimeError::ClassNotFound(name) => DebugError::ClassNotFound(name),
            RuntimeError::NotLaunched => DebugError::NotLaunched,
            RuntimeError::UnknownThread(id) => DebugError::UnknownThread(id),
            RuntimeError::ThreadNotSuspended(id) => DebugError::NotSuspended(id),
            RuntimeError::ThreadTerminated(id) => DebugError::ThreadTerminated(id),
            RuntimeError::NoSuchField { class, field } => DebugError::NoSuchField { class, field },
            RuntimeError::InvalidHandle(handle) => DebugError::UnknownHandle(handle),
            other => DebugError::Runtime(other),
        }
    }
}
