//! Tether debugger controller.
//!
//! A [`Session`] drives one execution environment (see `tether-runtime`):
//! launching and closing the debuggee, running code on its main execution
//! thread, breakpoints, thread control and object inspection. Debuggee objects
//! are seen through [`ObjectMirror`]s, handed out by the session's
//! [`ObjectTracker`] so each object has exactly one handle. State transitions
//! reach [`DebuggerListener`]s on a dedicated notifier thread.

pub mod breakpoints;
pub mod debugger;
pub mod demo;
pub mod error;
pub mod events;
pub mod format;
pub mod literal;
pub mod mirror;
pub mod naming;
pub mod session;
pub mod thread;
pub mod tracker;

pub use crate::breakpoints::{BreakpointProperties, HIT_COUNT};
pub use crate::debugger::{Debugger, MirrorResult};
pub use crate::error::{DebugError, DebugResult};
pub use crate::events::{DebuggerEvent, DebuggerListener, ListenerId};
pub use crate::literal::{parse_literal, Literal};
pub use crate::mirror::{ClassMirror, FieldEntry, FieldMirror, MethodMirror, MirrorValue, ObjectMirror};
pub use crate::session::{Session, SessionStatus, DEFAULT_SCOPE};
pub use crate::thread::{ThreadController, ThreadGroupNode};
pub use crate::tracker::ObjectTracker;

/// Result and location values shared with the execution environment.
pub use tether_runtime::{
    BreakpointLocation as BreakpointKey, Capabilities, ExceptionDescription, ExceptionKind,
    ExecResult, SourceLocation,
};
