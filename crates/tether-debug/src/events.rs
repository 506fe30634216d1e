//! Listener notification.
//!
//! Every debugger state transition is turned into a [`DebuggerEvent`] and
//! delivered to the registered listeners on a dedicated `tether-events`
//! thread, in the order the transitions happened. Listeners never run on the
//! thread that caused the transition.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::Mutex;
use tether_runtime::{ExceptionDescription, SourceLocation, StopReason, ThreadId, VmEvent};

#[derive(Clone, Debug, PartialEq)]
pub enum DebuggerEvent {
    /// The debuggee was launched.
    Started,
    /// The debuggee terminated.
    Stopped,
    Breakpoint {
        thread: ThreadId,
        location: Option<SourceLocation>,
    },
    Exception {
        thread: ThreadId,
        description: ExceptionDescription,
        /// Whether the thread was suspended at the throw site.
        suspended: bool,
    },
    /// The session hit a fatal error and no longer accepts commands.
    Disabled { reason: String },
    /// A thread stopped for a reason other than a breakpoint or exception.
    DebuggerPaused {
        thread: ThreadId,
        reason: StopReason,
        location: Option<SourceLocation>,
    },
    DebuggerResumed { thread: ThreadId },
}

impl DebuggerEvent {
    fn from_vm(event: VmEvent) -> Option<Self> {
        Some(match event {
            VmEvent::Started => DebuggerEvent::Started,
            VmEvent::Terminated => DebuggerEvent::Stopped,
            VmEvent::Suspended {
                thread,
                reason: StopReason::Breakpoint,
                location,
                ..
            } => DebuggerEvent::Breakpoint { thread, location },
            VmEvent::Suspended {
                thread,
                reason: StopReason::Exception,
                exception: Some(description),
                ..
            } => DebuggerEvent::Exception {
                thread,
                description,
                suspended: true,
            },
            VmEvent::Suspended {
                thread,
                reason,
                location,
                ..
            } => DebuggerEvent::DebuggerPaused {
                thread,
                reason,
                location,
            },
            VmEvent::Resumed { thread } => DebuggerEvent::DebuggerResumed { thread },
            VmEvent::UncaughtException {
                thread,
                description,
            } => DebuggerEvent::Exception {
                thread,
                description,
                suspended: false,
            },
            VmEvent::ThreadStarted { thread } | VmEvent::ThreadDied { thread } => {
                tracing::trace!(target: "tether.debug", thread, "thread lifecycle event");
                return None;
            }
        })
    }
}

pub trait DebuggerListener: Send + Sync {
    fn process_event(&self, event: &DebuggerEvent);
}

impl<F> DebuggerListener for F
where
    F: Fn(&DebuggerEvent) + Send + Sync,
{
    fn process_event(&self, event: &DebuggerEvent) {
        self(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listeners = Arc<Mutex<Vec<(ListenerId, Arc<dyn DebuggerListener>)>>>;

enum Control {
    Emit(DebuggerEvent),
    Flush(Sender<()>),
    Shutdown,
}

/// Owns the notifier thread and the listener list.
pub(crate) struct EventDispatcher {
    listeners: Listeners,
    next_id: AtomicU64,
    control: Sender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Start the notifier thread. `vm_events` is the debuggee's event stream,
    /// if the backend offers one.
    pub(crate) fn start(vm_events: Option<Receiver<VmEvent>>) -> Self {
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let (control, control_rx) = crossbeam_channel::unbounded();
        let worker_listeners = listeners.clone();
        let worker = std::thread::Builder::new()
            .name("tether-events".to_string())
            .spawn(move || {
                let vm_events = vm_events.unwrap_or_else(crossbeam_channel::never);
                run(control_rx, vm_events, worker_listeners)
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(target: "tether.debug", error = %err, "failed to start event thread");
                None
            }
        };
        Self {
            listeners,
            next_id: AtomicU64::new(1),
            control,
            worker: Mutex::new(worker),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn DebuggerListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Queue an event raised by the controller itself.
    pub(crate) fn emit(&self, event: DebuggerEvent) {
        let _ = self.control.send(Control::Emit(event));
    }

    /// Block until every event queued before this call has been delivered.
    /// Returns `false` if that takes longer than `timeout`.
    pub(crate) fn flush(&self, timeout: Duration) -> bool {
        let (ack, done) = crossbeam_channel::bounded(1);
        if self.control.send(Control::Flush(ack)).is_err() {
            return false;
        }
        done.recv_timeout(timeout).is_ok()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run(control: Receiver<Control>, vm_events: Receiver<VmEvent>, listeners: Listeners) {
    loop {
        select! {
            recv(control) -> msg => match msg {
                Ok(msg) => {
                    if !handle(msg, Some(&vm_events), &listeners) {
                        return;
                    }
                }
                Err(_) => return,
            },
            recv(vm_events) -> event => match event {
                Ok(event) => translate(&listeners, event),
                Err(_) => {
                    tracing::debug!(target: "tether.debug", "debuggee event stream closed");
                    break;
                }
            },
        }
    }
    for msg in control.iter() {
        if !handle(msg, None, &listeners) {
            return;
        }
    }
}

/// Returns `false` once the dispatcher is shutting down.
fn handle(msg: Control, vm_events: Option<&Receiver<VmEvent>>, listeners: &Listeners) -> bool {
    match msg {
        Control::Emit(event) => deliver(listeners, &event),
        Control::Flush(ack) => {
            if let Some(vm_events) = vm_events {
                while let Ok(event) = vm_events.try_recv() {
                    translate(listeners, event);
                }
            }
            let _ = ack.send(());
        }
        Control::Shutdown => return false,
    }
    true
}

fn translate(listeners: &Listeners, event: VmEvent) {
    if let Some(event) = DebuggerEvent::from_vm(event) {
        deliver(listeners, &event);
    }
}

fn deliver(listeners: &Listeners, event: &DebuggerEvent) {
    let snapshot: Vec<_> = listeners
        .lock()
        .iter()
        .map(|(id, listener)| (*id, listener.clone()))
        .collect();
    tracing::debug!(target: "tether.debug", ?event, listeners = snapshot.len(), "dispatching event");
    for (id, listener) in snapshot {
        let result = panic::catch_unwind(AssertUnwindSafe(|| listener.process_event(event)));
        if result.is_err() {
            tracing::error!(target: "tether.debug", listener = id.0, "listener panicked");
        }
    }
}
