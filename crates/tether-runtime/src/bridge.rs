//! Synchronous invocation on a debuggee execution thread.
//!
//! A caller wraps the code to run in a [`Task`], pushes it onto the target
//! thread's queue and blocks on the returned [`PendingCall`]. The target thread
//! runs the body when it next picks up work, adapts the outcome into an
//! [`ExecResult`] and completes the task's slot, waking the caller.
//!
//! Each slot is a capacity-1 channel that is completed at most once. A slot
//! that is dropped without being completed resolves to
//! [`ExecResult::Terminated`], which is also what terminating the owning
//! thread does to every task still waiting in its queue. There is no implicit
//! timeout; use [`PendingCall::wait_timeout`] where one is needed.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::thread::ExecThread;
use crate::vm::VmInner;
use crate::{
    CallContext, ExceptionDescription, ExecResult, ObjectRef, Thrown, Value, VmEvent,
};

pub(crate) type TaskBody = Box<dyn FnOnce(&mut CallContext<'_>) -> Result<Value, Thrown> + Send>;

type Outcome = ExecResult<Option<ObjectRef>>;

/// A unit of work queued on an execution thread, together with the slot its
/// outcome is delivered to.
pub(crate) struct Task {
    body: TaskBody,
    slot: CompletionSlot,
}

impl Task {
    pub(crate) fn new(body: TaskBody) -> (Self, PendingCall) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let task = Self {
            body,
            slot: CompletionSlot { tx },
        };
        (task, PendingCall { rx })
    }

    /// Resolve the task as `Terminated` without running it.
    pub(crate) fn discard(self) {
        self.slot.complete(ExecResult::Terminated);
    }

    pub(crate) fn into_parts(self) -> (TaskBody, CompletionSlot) {
        (self.body, self.slot)
    }
}

pub(crate) struct CompletionSlot {
    tx: Sender<Outcome>,
}

impl CompletionSlot {
    /// Consumes the slot, so a task completes at most once.
    pub(crate) fn complete(self, result: Outcome) {
        // The waiter may have given up; nobody is left to tell.
        let _ = self.tx.try_send(result);
    }
}

/// Caller's side of a queued task.
#[derive(Debug)]
#[must_use = "a pending call does nothing unless waited on"]
pub struct PendingCall {
    rx: Receiver<Outcome>,
}

impl PendingCall {
    /// A call whose outcome is known before anything is queued.
    pub(crate) fn resolved(result: Outcome) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the task completes.
    pub fn wait(self) -> ExecResult<Option<ObjectRef>> {
        self.rx.recv().unwrap_or(ExecResult::Terminated)
    }

    /// Like [`PendingCall::wait`], but hands the call back if it has not
    /// completed within `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<ExecResult<Option<ObjectRef>>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Disconnected) => Ok(ExecResult::Terminated),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Run a task body on `thread` and turn whatever it produced into an outcome.
pub(crate) fn run_body(body: TaskBody, vm: &VmInner, thread: &ExecThread) -> Outcome {
    let mut ctx = CallContext::new(vm, thread);
    let ctx_ref = &mut ctx;
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || body(ctx_ref)));
    match outcome {
        Ok(Ok(value)) => adapt(vm, value),
        Ok(Err(thrown)) if thrown.is_thread_death() => {
            tracing::debug!(target: "tether.bridge", thread = %thread.name, "task unwound by termination");
            ExecResult::Terminated
        }
        Ok(Err(thrown)) => uncaught(vm, thread, thrown),
        Err(payload) => {
            let thrown = ctx.panic_thrown(payload.as_ref());
            uncaught(vm, thread, thrown)
        }
    }
}

/// Map a returned value into the shape the controller receives.
pub(crate) fn adapt(vm: &VmInner, value: Value) -> Outcome {
    match value {
        Value::Null | Value::Void => ExecResult::Success(None),
        Value::Object(object) => ExecResult::Success(Some(object)),
        Value::Primitive(primitive) => match vm.box_primitive(primitive) {
            Some(holder) => ExecResult::Success(Some(holder)),
            None => {
                tracing::error!(
                    target: "tether.bridge",
                    kind = primitive.type_name(),
                    "no holder class for primitive result"
                );
                ExecResult::Exception(ExceptionDescription::internal())
            }
        },
    }
}

fn uncaught(vm: &VmInner, thread: &ExecThread, thrown: Thrown) -> Outcome {
    let description = thrown.describe();
    tracing::debug!(
        target: "tether.bridge",
        thread = %thread.name,
        exception = %thrown,
        depth = thrown.depth(),
        "task ended with an uncaught exception"
    );
    if vm.break_on_uncaught() {
        if thread
            .suspend_on_exception(vm, &thrown, description.clone())
            .is_err()
        {
            return ExecResult::Terminated;
        }
    } else {
        vm.emit(VmEvent::UncaughtException {
            thread: thread.id,
            description: description.clone(),
        });
    }
    ExecResult::Exception(description)
}
