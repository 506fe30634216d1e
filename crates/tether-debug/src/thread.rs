use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_runtime::{
    FrameInfo, LocalVariable, StepKind, ThreadId, ThreadInfo, ThreadStatus, Value, SYSTEM_GROUP,
};

use crate::error::{DebugError, DebugResult};
use crate::mirror::ObjectMirror;
use crate::session::SessionCore;

/// Controls one debuggee execution thread.
///
/// Introspection re-reads the debuggee on every call and only works while the
/// thread is suspended; frame data goes stale as soon as the thread resumes.
pub struct ThreadController {
    core: Arc<SessionCore>,
    id: ThreadId,
    name: String,
    group: String,
    system: bool,
    selected_frame: Mutex<usize>,
}

impl std::fmt::Debug for ThreadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadController")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl ThreadController {
    pub(crate) fn new(core: Arc<SessionCore>, info: &ThreadInfo) -> Self {
        let system = info.group == SYSTEM_GROUP
            || core
                .config
                .system_threads
                .iter()
                .any(|name| *name == info.name);
        Self {
            core,
            id: info.id,
            name: info.name.clone(),
            group: info.group.clone(),
            system,
            selected_frame: Mutex::new(0),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Threads that belong to the debuggee's infrastructure rather than to
    /// user code. Only affects listings.
    pub fn is_known_system_thread(&self) -> bool {
        self.system
    }

    /// Current status. A thread the debuggee no longer reports is terminated.
    pub fn status(&self) -> ThreadStatus {
        match self.core.env.threads() {
            Ok(threads) => threads
                .into_iter()
                .find(|thread| thread.id == self.id)
                .map(|thread| thread.status)
                .unwrap_or(ThreadStatus::Terminated),
            Err(_) => ThreadStatus::Terminated,
        }
    }

    pub fn status_text(&self) -> &'static str {
        self.status().describe()
    }

    pub fn is_suspended(&self) -> bool {
        self.status().is_suspended()
    }

    /// Frames, innermost first.
    pub fn get_stack(&self) -> DebugResult<Vec<FrameInfo>> {
        Ok(self.core.env.frames(self.id)?)
    }

    fn frame(&self, index: usize) -> DebugResult<FrameInfo> {
        self.get_stack()?
            .into_iter()
            .nth(index)
            .ok_or(DebugError::InvalidFrame {
                thread: self.id,
                index,
            })
    }

    fn variable(&self, frame: usize, index: usize) -> DebugResult<LocalVariable> {
        self.frame(frame)?
            .locals
            .into_iter()
            .nth(index)
            .ok_or(DebugError::InvalidVariable { frame, index })
    }

    pub fn get_local_variables(&self, frame: usize) -> DebugResult<Vec<LocalVariable>> {
        Ok(self.frame(frame)?.locals)
    }

    pub fn var_is_object(&self, frame: usize, index: usize) -> DebugResult<bool> {
        Ok(matches!(self.variable(frame, index)?.value, Value::Object(_)))
    }

    /// Mirror of the object held by a local variable.
    pub fn get_stack_object(&self, frame: usize, index: usize) -> DebugResult<ObjectMirror> {
        match self.variable(frame, index)?.value {
            Value::Object(object) => self.core.track(&object)?.ok_or(DebugError::NotAnObject),
            _ => Err(DebugError::NotAnObject),
        }
    }

    /// The frame's receiver; `None` in a static method.
    pub fn get_current_object(&self, frame: usize) -> DebugResult<Option<ObjectMirror>> {
        match self.frame(frame)?.this {
            Some(object) => self.core.track(&object),
            None => Ok(None),
        }
    }

    pub fn get_class_source_name(&self, frame: usize) -> DebugResult<Option<String>> {
        Ok(self.frame(frame)?.source_file)
    }

    pub fn get_line_number(&self, frame: usize) -> DebugResult<u32> {
        Ok(self.frame(frame)?.line)
    }

    pub fn set_selected_frame(&self, index: usize) {
        *self.selected_frame.lock() = index;
    }

    pub fn selected_frame(&self) -> usize {
        *self.selected_frame.lock()
    }

    /// Run to the next line in the current or a calling frame.
    pub fn step(&self) -> DebugResult<()> {
        self.resume(Some(StepKind::Over))
    }

    /// Run to the next line, descending into calls.
    pub fn step_into(&self) -> DebugResult<()> {
        self.resume(Some(StepKind::Into))
    }

    /// Run until the next stop.
    pub fn cont(&self) -> DebugResult<()> {
        self.resume(None)
    }

    fn resume(&self, step: Option<StepKind>) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.core.env.resume(self.id, step)?;
        *self.selected_frame.lock() = 0;
        tracing::debug!(target: "tether.debug", thread = self.id, ?step, "thread resumed");
        Ok(())
    }

    /// Ask the thread to stop at its next line.
    pub fn halt(&self) -> DebugResult<()> {
        self.core.ensure_usable()?;
        Ok(self.core.env.halt(self.id)?)
    }

    /// Stop the thread for good. Calls queued on it resolve as terminated.
    pub fn terminate(&self) -> DebugResult<()> {
        self.core.ensure_usable()?;
        self.core.env.terminate_thread(self.id)?;
        tracing::debug!(target: "tether.debug", thread = self.id, name = %self.name, "thread terminated");
        Ok(())
    }

    /// Block until the thread is suspended. Returns `false` when it terminated
    /// or `timeout` elapsed first.
    pub fn wait_until_suspended(&self, timeout: Duration) -> DebugResult<bool> {
        Ok(self.core.env.wait_for_stop(self.id, timeout)?.is_suspended())
    }
}

/// A thread group and its (visible) threads.
#[derive(Clone, Debug)]
pub struct ThreadGroupNode {
    pub name: String,
    pub threads: Vec<Arc<ThreadController>>,
}
