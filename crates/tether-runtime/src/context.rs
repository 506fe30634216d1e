use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::class::{ClassDef, MethodDef, MethodKind, Overload};
use crate::thread::ExecThread;
use crate::vm::VmInner;
use crate::{FrameInfo, LocalVariable, ObjectRef, Thrown, Value, PANIC_TYPE_NAME};

/// The view a running method body has of the debuggee.
///
/// A context only exists on an execution thread, for the duration of one
/// task. Every [`CallContext::line`] call is a safe point.
pub struct CallContext<'a> {
    vm: &'a VmInner,
    thread: &'a ExecThread,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(vm: &'a VmInner, thread: &'a ExecThread) -> Self {
        Self { vm, thread }
    }

    /// Receiver of the innermost frame.
    pub fn this(&self) -> Option<ObjectRef> {
        self.thread.top_this()
    }

    /// Number of live frames on this thread.
    pub fn depth(&self) -> usize {
        self.thread.depth()
    }

    /// Report that execution reached `line` of the current method.
    ///
    /// Returns `Err` only when the thread is being terminated; bodies must
    /// propagate it with `?`.
    pub fn line(&mut self, line: u32) -> Result<(), Thrown> {
        self.thread.line(self.vm, line)
    }

    pub fn set_local(&mut self, name: &str, value: impl Into<Value>) {
        self.thread.set_local(name, value.into());
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.thread.local(name)
    }

    /// Build an exception carrying the frames that are live right now.
    pub fn throw(&self, type_name: &str, message: impl Into<String>) -> Thrown {
        Thrown::new(
            type_name.to_string(),
            Some(message.into()),
            self.thread.snapshot_frames(),
        )
    }

    pub fn require_object(&self, value: &Value) -> Result<ObjectRef, Thrown> {
        match value {
            Value::Object(object) => Ok(object.clone()),
            other => Err(self.throw(
                "NullPointerException",
                format!("expected an object, found {}", other.type_name()),
            )),
        }
    }

    pub fn get_field(&self, object: &ObjectRef, field: &str) -> Result<Value, Thrown> {
        let heap = self.vm.heap.lock();
        match heap.field(object.id, field) {
            Some(value) => Ok(value.clone()),
            None => {
                drop(heap);
                Err(self.no_such_field(&object.runtime_type, field))
            }
        }
    }

    pub fn set_field(
        &mut self,
        object: &ObjectRef,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), Thrown> {
        let stored = self.vm.heap.lock().set_field(object.id, field, value.into());
        if stored {
            Ok(())
        } else {
            Err(self.no_such_field(&object.runtime_type, field))
        }
    }

    pub fn get_static(&self, class: &str, field: &str) -> Result<Value, Thrown> {
        let value = self.vm.heap.lock().static_field(class, field).cloned();
        value.ok_or_else(|| self.no_such_field(class, field))
    }

    pub fn set_static(
        &mut self,
        class: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), Thrown> {
        let stored = self.vm.heap.lock().set_static(class, field, value.into());
        if stored {
            Ok(())
        } else {
            Err(self.no_such_field(class, field))
        }
    }

    pub fn new_string(&mut self, value: &str) -> Value {
        Value::Object(self.vm.allocate_string(value))
    }

    /// Contents of a string object; `None` for anything else.
    pub fn string(&self, value: &Value) -> Option<String> {
        let id = value.object_id()?;
        self.vm.heap.lock().get(id)?.string.clone()
    }

    /// Allocate and construct an instance of `class`, choosing the
    /// constructor by the runtime types of `args`.
    pub fn new_object(&mut self, class: &str, args: &[Value]) -> Result<Value, Thrown> {
        let Some(def) = self.vm.class(class) else {
            return Err(self.throw("NoClassDefFoundError", class));
        };
        let ctor = if def.has_constructors() {
            match def.find_method("", MethodKind::Constructor, Overload::Args(args)) {
                Some(ctor) => Some(ctor.clone()),
                None => {
                    return Err(self.throw(
                        "NoSuchMethodError",
                        format!("{class}.<init>({})", describe_args(args)),
                    ))
                }
            }
        } else if args.is_empty() {
            None
        } else {
            return Err(self.throw(
                "NoSuchMethodError",
                format!("{class}.<init>({})", describe_args(args)),
            ));
        };
        self.construct(&def, ctor.as_ref(), args).map(Value::Object)
    }

    pub fn invoke_static(
        &mut self,
        class: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        let Some(def) = self.vm.class(class) else {
            return Err(self.throw("NoClassDefFoundError", class));
        };
        let Some(target) = def
            .find_method(method, MethodKind::Static, Overload::Args(args))
            .cloned()
        else {
            return Err(self.throw(
                "NoSuchMethodError",
                format!("{class}.{method}({})", describe_args(args)),
            ));
        };
        self.call(&def, &target, None, args)
    }

    /// Invoke an instance method, dispatching on the receiver's runtime class.
    pub fn invoke_virtual(
        &mut self,
        object: &ObjectRef,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        let def = self.vm.heap.lock().get(object.id).map(|o| o.class.clone());
        let Some(def) = def else {
            return Err(self.throw("NullPointerException", format!("stale reference {}", object.id)));
        };
        let Some(target) = def
            .find_method(method, MethodKind::Instance, Overload::Args(args))
            .cloned()
        else {
            return Err(self.throw(
                "NoSuchMethodError",
                format!("{}.{method}({})", def.name, describe_args(args)),
            ));
        };
        self.call(&def, &target, Some(object.clone()), args)
    }

    pub(crate) fn construct(
        &mut self,
        class: &Arc<ClassDef>,
        ctor: Option<&MethodDef>,
        args: &[Value],
    ) -> Result<ObjectRef, Thrown> {
        let object = self.vm.heap.lock().allocate(class);
        if let Some(ctor) = ctor {
            self.call(class, ctor, Some(object.clone()), args)?;
        }
        Ok(object)
    }

    /// Push a frame for `method`, run its body and pop the frame again. A
    /// panicking body is turned into a thrown exception.
    pub(crate) fn call(
        &mut self,
        class: &Arc<ClassDef>,
        method: &MethodDef,
        this: Option<ObjectRef>,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        let locals = method
            .params
            .iter()
            .zip(args)
            .map(|((name, type_name), value)| LocalVariable {
                name: name.clone(),
                type_name: type_name.clone(),
                value: value.clone(),
            })
            .collect();
        self.thread.push_frame(FrameInfo {
            class_name: class.name.clone(),
            method_name: method.name.clone(),
            source_file: class.source_file.clone(),
            line: method.first_line(),
            locals,
            this,
        });

        let body = method.body.clone();
        let result = match self.thread.method_entry(self.vm, &class.name, &method.name) {
            Err(thrown) => Err(thrown),
            Ok(()) => match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self, args))) {
                Ok(result) => result,
                Err(payload) => Err(self.panic_thrown(payload.as_ref())),
            },
        };

        self.thread.pop_frame();
        result
    }

    pub(crate) fn panic_thrown(&self, payload: &(dyn Any + Send)) -> Thrown {
        let message = panic_message(payload);
        tracing::warn!(
            target: "tether.runtime",
            thread = %self.thread.name,
            %message,
            "method body panicked"
        );
        Thrown::new(
            PANIC_TYPE_NAME.to_string(),
            Some(message),
            self.thread.snapshot_frames(),
        )
    }

    fn no_such_field(&self, class: &str, field: &str) -> Thrown {
        self.throw("NoSuchFieldError", format!("{class}.{field}"))
    }
}

fn describe_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::type_name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
