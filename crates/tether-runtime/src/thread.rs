use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::bridge::{self, PendingCall, Task, TaskBody};
use crate::vm::VmInner;
use crate::{
    ExceptionDescription, FrameInfo, LocalVariable, ObjectRef, RuntimeError, StepKind,
    StopReason, ThreadId, ThreadInfo, ThreadStatus, Thrown, Value, VmEvent,
};

pub(crate) enum Message {
    Run(Task),
    Shutdown,
}

#[derive(Clone, Copy, Debug)]
struct StepRequest {
    kind: StepKind,
    /// Frame depth when the step was requested.
    depth: usize,
}

impl StepRequest {
    fn reached(&self, depth: usize) -> bool {
        match self.kind {
            StepKind::Into => true,
            StepKind::Over => depth <= self.depth,
        }
    }
}

struct ThreadState {
    status: ThreadStatus,
    /// Innermost frame last.
    frames: Vec<FrameInfo>,
    step: Option<StepRequest>,
    halt_requested: bool,
}

/// A debuggee execution thread: an OS thread draining its own task queue.
///
/// The thread runs tasks one at a time. While a task runs, every
/// [`crate::CallContext::line`] call is a safe point where breakpoints,
/// stepping, halting and termination take effect.
pub(crate) struct ExecThread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    pub(crate) group: String,
    queue_tx: Sender<Message>,
    queue_rx: Receiver<Message>,
    state: Mutex<ThreadState>,
    /// Signalled on every status change.
    changed: Condvar,
}

impl ExecThread {
    pub(crate) fn spawn(
        vm: &Arc<VmInner>,
        id: ThreadId,
        name: &str,
        group: &str,
    ) -> std::io::Result<Arc<Self>> {
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        let thread = Arc::new(Self {
            id,
            name: name.to_string(),
            group: group.to_string(),
            queue_tx,
            queue_rx,
            state: Mutex::new(ThreadState {
                status: ThreadStatus::Idle,
                frames: Vec::new(),
                step: None,
                halt_requested: false,
            }),
            changed: Condvar::new(),
        });

        let worker = thread.clone();
        let vm = Arc::downgrade(vm);
        std::thread::Builder::new()
            .name(format!("tether-{}", name.to_ascii_lowercase().replace(' ', "-")))
            .spawn(move || worker.run_loop(vm))?;
        Ok(thread)
    }

    fn run_loop(self: Arc<Self>, vm: Weak<VmInner>) {
        while let Ok(message) = self.queue_rx.recv() {
            let task = match message {
                Message::Run(task) => task,
                Message::Shutdown => break,
            };
            let Some(vm) = vm.upgrade() else {
                task.discard();
                break;
            };
            if !self.begin_task() {
                task.discard();
                continue;
            }

            let (body, slot) = task.into_parts();
            let result = bridge::run_body(body, &vm, &self);
            self.finish_task();
            slot.complete(result);
        }
        tracing::debug!(target: "tether.runtime", thread = %self.name, "execution thread exited");
    }

    fn begin_task(&self) -> bool {
        let mut state = self.state.lock();
        if state.status == ThreadStatus::Terminated {
            return false;
        }
        state.status = ThreadStatus::Running;
        state.frames.clear();
        state.step = None;
        state.halt_requested = false;
        true
    }

    fn finish_task(&self) {
        let mut state = self.state.lock();
        state.frames.clear();
        state.step = None;
        if state.status != ThreadStatus::Terminated {
            state.status = ThreadStatus::Idle;
        }
        self.changed.notify_all();
    }

    /// Enqueue `body` and return the caller's side of the rendezvous. Never
    /// blocks; a terminated thread resolves the call immediately.
    pub(crate) fn submit(&self, body: TaskBody) -> PendingCall {
        let (task, pending) = Task::new(body);
        // Hold the state lock while sending so `terminate` either sees the
        // task in its drain or we see the terminated status.
        let state = self.state.lock();
        if state.status == ThreadStatus::Terminated {
            drop(state);
            task.discard();
            return pending;
        }
        if let Err(err) = self.queue_tx.send(Message::Run(task)) {
            if let Message::Run(task) = err.0 {
                task.discard();
            }
        }
        pending
    }

    pub(crate) fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            name: self.name.clone(),
            group: self.group.clone(),
            status: self.state.lock().status,
        }
    }

    // --- called from the execution thread itself -------------------------

    pub(crate) fn push_frame(&self, frame: FrameInfo) {
        self.state.lock().frames.push(frame);
    }

    pub(crate) fn pop_frame(&self) {
        self.state.lock().frames.pop();
    }

    pub(crate) fn depth(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub(crate) fn snapshot_frames(&self) -> Vec<FrameInfo> {
        self.state.lock().frames.clone()
    }

    pub(crate) fn top_this(&self) -> Option<ObjectRef> {
        self.state.lock().frames.last()?.this.clone()
    }

    pub(crate) fn set_local(&self, name: &str, value: Value) {
        let mut state = self.state.lock();
        let Some(frame) = state.frames.last_mut() else {
            return;
        };
        let type_name = value.type_name().to_string();
        match frame.locals.iter_mut().find(|local| local.name == name) {
            Some(local) => {
                local.value = value;
                local.type_name = type_name;
            }
            None => frame.locals.push(LocalVariable {
                name: name.to_string(),
                type_name,
                value,
            }),
        }
    }

    pub(crate) fn local(&self, name: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .frames
            .last()?
            .locals
            .iter()
            .find(|local| local.name == name)
            .map(|local| local.value.clone())
    }

    /// Line safe point.
    pub(crate) fn line(&self, vm: &VmInner, line: u32) -> Result<(), Thrown> {
        let mut state = self.state.lock();
        if state.status == ThreadStatus::Terminated {
            return Err(Thrown::thread_death());
        }
        let depth = state.frames.len();
        let Some(frame) = state.frames.last_mut() else {
            return Ok(());
        };
        frame.line = line;
        let at_breakpoint = vm.breakpoints.lock().hit_line(&frame.class_name, line);

        let reason = if at_breakpoint {
            Some(StopReason::Breakpoint)
        } else if state.halt_requested {
            Some(StopReason::Halt)
        } else if state.step.is_some_and(|step| step.reached(depth)) {
            Some(StopReason::Step)
        } else {
            None
        };

        match reason {
            Some(reason) => self.suspend(&mut state, vm, reason, None),
            None => Ok(()),
        }
    }

    /// Method-entry safe point, checked right after the callee frame is pushed.
    pub(crate) fn method_entry(&self, vm: &VmInner, class: &str, method: &str) -> Result<(), Thrown> {
        let mut state = self.state.lock();
        if state.status == ThreadStatus::Terminated {
            return Err(Thrown::thread_death());
        }
        if vm.breakpoints.lock().hit_method(class, method) {
            return self.suspend(&mut state, vm, StopReason::Breakpoint, None);
        }
        Ok(())
    }

    /// Suspend with the throw-site frames of an uncaught exception restored
    /// so they can be inspected.
    pub(crate) fn suspend_on_exception(
        &self,
        vm: &VmInner,
        thrown: &Thrown,
        description: ExceptionDescription,
    ) -> Result<(), Thrown> {
        let mut state = self.state.lock();
        if state.status == ThreadStatus::Terminated {
            return Err(Thrown::thread_death());
        }
        state.frames = thrown.frames().to_vec();
        let result = self.suspend(&mut state, vm, StopReason::Exception, Some(description));
        state.frames.clear();
        result
    }

    fn suspend(
        &self,
        state: &mut MutexGuard<'_, ThreadState>,
        vm: &VmInner,
        reason: StopReason,
        exception: Option<ExceptionDescription>,
    ) -> Result<(), Thrown> {
        state.status = ThreadStatus::Suspended(reason);
        state.step = None;
        state.halt_requested = false;
        let location = state.frames.last().map(FrameInfo::location);
        tracing::debug!(
            target: "tether.runtime",
            thread = %self.name,
            ?reason,
            location = ?location,
            "thread suspended"
        );
        vm.emit(VmEvent::Suspended {
            thread: self.id,
            reason,
            location,
            exception,
        });
        self.changed.notify_all();

        while state.status.is_suspended() {
            self.changed.wait(state);
        }
        if state.status == ThreadStatus::Terminated {
            return Err(Thrown::thread_death());
        }
        Ok(())
    }

    // --- called from the controller --------------------------------------

    /// Frames of the suspended thread, innermost first.
    pub(crate) fn frames(&self) -> Result<Vec<FrameInfo>, RuntimeError> {
        let state = self.state.lock();
        match state.status {
            ThreadStatus::Suspended(_) => Ok(state.frames.iter().rev().cloned().collect()),
            ThreadStatus::Terminated => Err(RuntimeError::ThreadTerminated(self.id)),
            _ => Err(RuntimeError::ThreadNotSuspended(self.id)),
        }
    }

    pub(crate) fn resume(&self, vm: &VmInner, step: Option<StepKind>) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        match state.status {
            ThreadStatus::Suspended(_) => {}
            ThreadStatus::Terminated => return Err(RuntimeError::ThreadTerminated(self.id)),
            _ => return Err(RuntimeError::ThreadNotSuspended(self.id)),
        }
        let depth = state.frames.len();
        state.step = step.map(|kind| StepRequest { kind, depth });
        state.status = ThreadStatus::Running;
        vm.emit(VmEvent::Resumed { thread: self.id });
        self.changed.notify_all();
        Ok(())
    }

    /// Request a stop at the next safe point. Idle and suspended threads are
    /// left alone.
    pub(crate) fn halt(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        match state.status {
            ThreadStatus::Running => state.halt_requested = true,
            ThreadStatus::Terminated => return Err(RuntimeError::ThreadTerminated(self.id)),
            ThreadStatus::Idle | ThreadStatus::Suspended(_) => {}
        }
        Ok(())
    }

    /// Irreversibly terminate the thread. Queued tasks resolve to
    /// `Terminated` without running; a running task unwinds at its next safe
    /// point.
    pub(crate) fn terminate(&self, vm: &VmInner) {
        {
            let mut state = self.state.lock();
            if state.status == ThreadStatus::Terminated {
                return;
            }
            state.status = ThreadStatus::Terminated;
            state.frames.clear();
            state.step = None;
            self.changed.notify_all();

            let mut discarded = 0usize;
            for message in self.queue_rx.try_iter() {
                if let Message::Run(task) = message {
                    task.discard();
                    discarded += 1;
                }
            }
            let _ = self.queue_tx.send(Message::Shutdown);
            tracing::debug!(
                target: "tether.runtime",
                thread = %self.name,
                discarded,
                "thread terminated"
            );
        }
        vm.emit(VmEvent::ThreadDied { thread: self.id });
    }

    pub(crate) fn wait_for_stop(&self, timeout: Duration) -> ThreadStatus {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !(state.status.is_suspended() || state.status == ThreadStatus::Terminated) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.status
    }
}
