use std::fmt;

use crate::FrameInfo;

/// Exception type reported when a method body panics instead of throwing.
pub const PANIC_TYPE_NAME: &str = "rust.panic";

/// Generic message shown to users for internal failures. The full detail goes
/// to the diagnostic log.
const INTERNAL_ERROR_MESSAGE: &str = "internal debugger error (see log for details)";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub class_name: String,
    pub file_name: Option<String>,
    pub method_name: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_name {
            Some(file) => write!(
                f,
                "{}.{}({}:{})",
                self.class_name, self.method_name, file, self.line
            ),
            None => write!(
                f,
                "{}.{}(line {})",
                self.class_name, self.method_name, self.line
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Raised by code running in the debuggee.
    User,
    /// A failure inside the bridge or controller itself.
    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionDescription {
    pub kind: ExceptionKind,
    pub type_name: String,
    pub message: Option<String>,
    /// Captured top frame first.
    pub stack: Vec<SourceLocation>,
}

impl ExceptionDescription {
    /// Description surfaced for an internal failure. Callers log `detail`
    /// themselves; only a generic message reaches the user.
    pub fn internal() -> Self {
        Self {
            kind: ExceptionKind::Internal,
            type_name: "tether.InternalError".to_string(),
            message: Some(INTERNAL_ERROR_MESSAGE.to_string()),
            stack: Vec::new(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind == ExceptionKind::Internal
    }
}

impl fmt::Display for ExceptionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message)?,
            None => write!(f, "{}", self.type_name)?,
        }
        for location in &self.stack {
            write!(f, "\n\tat {location}")?;
        }
        Ok(())
    }
}

/// Outcome of running code in the debuggee. Exactly one variant applies.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecResult<T> {
    Success(T),
    Exception(ExceptionDescription),
    /// The executing thread terminated before producing a result.
    Terminated,
}

impl<T> ExecResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExecResult<U> {
        match self {
            ExecResult::Success(value) => ExecResult::Success(f(value)),
            ExecResult::Exception(description) => ExecResult::Exception(description),
            ExecResult::Terminated => ExecResult::Terminated,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<ExecResult<U>, E> {
        Ok(match self {
            ExecResult::Success(value) => ExecResult::Success(f(value)?),
            ExecResult::Exception(description) => ExecResult::Exception(description),
            ExecResult::Terminated => ExecResult::Terminated,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecResult::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            ExecResult::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&ExceptionDescription> {
        match self {
            ExecResult::Exception(description) => Some(description),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThrownKind {
    Exception,
    /// Unwinds a thread that is being terminated.
    ThreadDeath,
}

/// An exception propagating through debuggee frames.
///
/// Created through [`crate::CallContext::throw`], which records the frames
/// live at the throw site. Method bodies propagate it with `?`.
#[derive(Clone, Debug)]
pub struct Thrown {
    kind: ThrownKind,
    type_name: String,
    message: Option<String>,
    /// Frames at the throw site, innermost last.
    frames: Vec<FrameInfo>,
}

impl Thrown {
    pub(crate) fn new(type_name: String, message: Option<String>, frames: Vec<FrameInfo>) -> Self {
        Self {
            kind: ThrownKind::Exception,
            type_name,
            message,
            frames,
        }
    }

    pub(crate) fn thread_death() -> Self {
        Self {
            kind: ThrownKind::ThreadDeath,
            type_name: "tether.ThreadDeath".to_string(),
            message: None,
            frames: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this unwinds a terminated thread. Bodies must not swallow it.
    pub fn is_thread_death(&self) -> bool {
        self.kind == ThrownKind::ThreadDeath
    }

    /// Number of frames that were live when the exception was thrown.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn frames(&self) -> &[FrameInfo] {
        &self.frames
    }

    pub fn describe(&self) -> ExceptionDescription {
        ExceptionDescription {
            kind: ExceptionKind::User,
            type_name: self.type_name.clone(),
            message: self.message.clone(),
            stack: self.frames.iter().rev().map(FrameInfo::location).collect(),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => write!(f, "{}", self.type_name),
        }
    }
}
