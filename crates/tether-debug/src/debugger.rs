use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tether_runtime::{BreakpointLocation, Capabilities, ExecResult, ThreadId};

use crate::breakpoints::BreakpointProperties;
use crate::error::{DebugError, DebugResult};
use crate::events::{DebuggerListener, ListenerId};
use crate::mirror::{ClassMirror, FieldEntry, MirrorValue, ObjectMirror};
use crate::session::SessionStatus;
use crate::thread::{ThreadController, ThreadGroupNode};

pub type MirrorResult = ExecResult<Option<ObjectMirror>>;

/// Controller-side operations on a debuggee.
///
/// Every method fails with [`DebugError::Unsupported`] unless an
/// implementation overrides it; [`Debugger::toggle_breakpoint`] reports the
/// same through its message. Implementations may probe
/// [`Debugger::capabilities`] first, but an unsupported operation still fails
/// when called.
pub trait Debugger: Send + Sync {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn launch(&self) -> DebugResult<()> {
        Err(DebugError::Unsupported("launch"))
    }

    /// Terminate the debuggee and reset session state, then relaunch if
    /// `restart` is set.
    fn close(&self, _restart: bool) -> DebugResult<()> {
        Err(DebugError::Unsupported("close"))
    }

    fn get_status(&self) -> SessionStatus {
        SessionStatus::NotReady
    }

    /// Poll the status until `predicate` accepts it or `timeout` elapses.
    fn wait_for_status(
        &self,
        _predicate: &dyn Fn(SessionStatus) -> bool,
        _timeout: Duration,
    ) -> DebugResult<SessionStatus> {
        Err(DebugError::Unsupported("wait_for_status"))
    }

    fn instantiate_class(
        &self,
        _class: &str,
        _param_types: &[String],
        _args: Vec<MirrorValue>,
    ) -> DebugResult<MirrorResult> {
        Err(DebugError::Unsupported("instantiate_class"))
    }

    fn run_class_main(&self, _class: &str) -> DebugResult<MirrorResult> {
        Err(DebugError::Unsupported("run_class_main"))
    }

    fn invoke_method(
        &self,
        _object: &ObjectMirror,
        _method: &str,
        _param_types: &[String],
        _args: Vec<MirrorValue>,
    ) -> DebugResult<MirrorResult> {
        Err(DebugError::Unsupported("invoke_method"))
    }

    fn get_class(&self, _name: &str) -> DebugResult<Arc<ClassMirror>> {
        Err(DebugError::Unsupported("get_class"))
    }

    fn get_static_value(&self, _class: &str, _field: &str) -> DebugResult<Option<ObjectMirror>> {
        Err(DebugError::Unsupported("get_static_value"))
    }

    fn add_object(&self, _scope: &str, _name: &str, _object: &ObjectMirror) -> DebugResult<()> {
        Err(DebugError::Unsupported("add_object"))
    }

    /// Returns whether `name` was bound in `scope`.
    fn remove_object(&self, _scope: &str, _name: &str) -> DebugResult<bool> {
        Err(DebugError::Unsupported("remove_object"))
    }

    fn get_objects(&self) -> DebugResult<BTreeMap<String, ObjectMirror>> {
        Err(DebugError::Unsupported("get_objects"))
    }

    fn guess_new_name(&self, _class_name: &str) -> DebugResult<String> {
        Err(DebugError::Unsupported("guess_new_name"))
    }

    /// [`Debugger::guess_new_name`] for the class of an existing object.
    fn guess_object_name(&self, object: &ObjectMirror) -> DebugResult<String> {
        self.guess_new_name(object.class_name())
    }

    /// Mirror of the value a literal denotes; see [`crate::parse_literal`].
    fn get_mirror(&self, _literal: &str) -> DebugResult<ObjectMirror> {
        Err(DebugError::Unsupported("get_mirror"))
    }

    fn object_fields(&self, _object: &ObjectMirror) -> DebugResult<Vec<FieldEntry>> {
        Err(DebugError::Unsupported("object_fields"))
    }

    fn field_value(&self, _object: &ObjectMirror, _field: &str) -> DebugResult<MirrorValue> {
        Err(DebugError::Unsupported("field_value"))
    }

    fn string_value(&self, _object: &ObjectMirror) -> DebugResult<Option<String>> {
        Err(DebugError::Unsupported("string_value"))
    }

    fn forget_object(&self, _object: &ObjectMirror) -> DebugResult<()> {
        Err(DebugError::Unsupported("forget_object"))
    }

    /// `None` on success, otherwise a message saying why nothing changed.
    fn toggle_breakpoint(
        &self,
        _location: &BreakpointLocation,
        _set: bool,
        _properties: &BreakpointProperties,
    ) -> Option<String> {
        Some(DebugError::Unsupported("toggle_breakpoint").to_string())
    }

    fn remove_breakpoints_for_class(&self, _class: &str) -> DebugResult<()> {
        Err(DebugError::Unsupported("remove_breakpoints_for_class"))
    }

    fn set_break_on_uncaught(&self, _enabled: bool) -> DebugResult<()> {
        Err(DebugError::Unsupported("set_break_on_uncaught"))
    }

    fn hide_system_threads(&self, _hide: bool) -> DebugResult<()> {
        Err(DebugError::Unsupported("hide_system_threads"))
    }

    fn get_threads(&self) -> DebugResult<Vec<Arc<ThreadController>>> {
        Err(DebugError::Unsupported("get_threads"))
    }

    fn get_thread(&self, _id: ThreadId) -> DebugResult<Arc<ThreadController>> {
        Err(DebugError::Unsupported("get_thread"))
    }

    fn get_thread_tree(&self) -> DebugResult<Vec<ThreadGroupNode>> {
        Err(DebugError::Unsupported("get_thread_tree"))
    }

    fn add_listener(&self, _listener: Arc<dyn DebuggerListener>) -> DebugResult<ListenerId> {
        Err(DebugError::Unsupported("add_listener"))
    }

    fn remove_listener(&self, _id: ListenerId) -> DebugResult<bool> {
        Err(DebugError::Unsupported("remove_listener"))
    }
}
