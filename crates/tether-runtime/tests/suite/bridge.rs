use std::sync::Arc;

use pretty_assertions::assert_eq;
use tether_runtime::{
    ExceptionKind, ExecResult, ExecutionEnvironment, ObjectCategory, PrimitiveKind, RuntimeError,
    Value, VmEvent, PANIC_TYPE_NAME,
};

use crate::harness::{launched_vm, sample, types, WAIT};

#[test]
fn static_call_result_is_boxed_into_a_holder() {
    let vm = launched_vm();
    let result = vm
        .invoke_static("Calc", "add", &types(&["int", "int"]), vec![2.into(), 3.into()])
        .unwrap()
        .wait();

    let holder = result.success().flatten().expect("boxed int result");
    assert_eq!(holder.runtime_type, "tether.runtime.IntResult");
    assert_eq!(
        vm.object_category(holder.id).unwrap(),
        ObjectCategory::ResultHolder
    );
    let fields = vm.object_fields(holder.id).unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].0.name, "value");
    assert_eq!(fields[0].1, Value::from(5));
}

#[test]
fn every_primitive_kind_round_trips_through_its_holder() {
    let vm = launched_vm();
    for kind in PrimitiveKind::ALL {
        let method = format!("make_{}", kind.type_name());
        let holder = vm
            .invoke_static("Calc", &method, &[], Vec::new())
            .unwrap()
            .wait()
            .success()
            .flatten()
            .unwrap_or_else(|| panic!("{method} produced no holder"));
        assert_eq!(holder.runtime_type, kind.holder_class());

        let fields = vm.object_fields(holder.id).unwrap();
        assert_eq!(fields[0].0.type_name, kind.type_name());
        assert_eq!(fields[0].1, Value::Primitive(sample(kind)), "{method}");
    }
}

#[test]
fn void_and_null_results_are_empty_successes() {
    let vm = launched_vm();
    let void = vm.invoke_static("Calc", "nothing", &[], Vec::new()).unwrap().wait();
    assert_eq!(void, ExecResult::Success(None));
    let null = vm
        .invoke_static("Calc", "nothing_at_all", &[], Vec::new())
        .unwrap()
        .wait();
    assert_eq!(null, ExecResult::Success(None));
}

#[test]
fn references_pass_through_unchanged() {
    let vm = launched_vm();
    let name = vm.new_string("tether").unwrap();
    let greeting = vm
        .invoke_static("Calc", "greet", &types(&["String"]), vec![name.into()])
        .unwrap()
        .wait()
        .success()
        .flatten()
        .unwrap();
    assert_eq!(greeting.runtime_type, "String");
    assert_eq!(
        vm.string_value(greeting.id).unwrap().as_deref(),
        Some("hello, tether")
    );
}

#[test]
fn thrown_exception_carries_the_throw_site_stack() {
    let vm = launched_vm();
    let events = vm.subscribe().unwrap();
    let reason = vm.new_string("bad input").unwrap();
    let result = vm
        .invoke_static("Calc", "fail", &types(&["String"]), vec![reason.into()])
        .unwrap()
        .wait();

    let description = result.exception().cloned().expect("exception result");
    assert_eq!(description.kind, ExceptionKind::User);
    assert_eq!(description.type_name, "IllegalArgumentException");
    assert_eq!(description.message.as_deref(), Some("bad input"));

    let stack: Vec<_> = description
        .stack
        .iter()
        .map(|loc| (loc.method_name.as_str(), loc.line))
        .collect();
    assert_eq!(stack, vec![("check", 14), ("fail", 11)]);
    assert_eq!(description.stack[0].file_name.as_deref(), Some("Calc.java"));

    let uncaught = events
        .iter()
        .find(|event| matches!(event, VmEvent::UncaughtException { .. }))
        .unwrap();
    assert!(matches!(
        uncaught,
        VmEvent::UncaughtException { description: d, .. } if d.type_name == "IllegalArgumentException"
    ));
}

#[test]
fn panicking_body_becomes_an_exception() {
    let vm = launched_vm();
    let result = vm.invoke_static("Calc", "explode", &[], Vec::new()).unwrap().wait();
    let description = result.exception().unwrap();
    assert_eq!(description.type_name, PANIC_TYPE_NAME);
    assert_eq!(description.message.as_deref(), Some("kaboom"));
    assert_eq!(description.stack[0].method_name, "explode");
    assert_eq!(description.stack[0].line, 16);

    // The thread survives and keeps serving calls.
    let again = vm.invoke_static("Calc", "nothing", &[], Vec::new()).unwrap().wait();
    assert!(again.is_success());
}

#[test]
fn missing_entry_point_is_an_internal_exception() {
    let vm = launched_vm();
    let result = vm
        .invoke_static("Calc", "add", &types(&["long"]), vec![1_i64.into()])
        .unwrap()
        .wait();
    let description = result.exception().unwrap();
    assert!(description.is_internal());
    assert!(description.stack.is_empty());

    assert!(matches!(
        vm.invoke_static("Nope", "main", &[], Vec::new()),
        Err(RuntimeError::ClassNotFound(name)) if name == "Nope"
    ));
}

#[test]
fn constructed_instances_keep_their_state() {
    let vm = launched_vm();
    let counter = vm
        .new_instance("com.example.Counter", &types(&["int"]), vec![10.into()])
        .unwrap()
        .wait()
        .success()
        .flatten()
        .unwrap();
    assert_eq!(counter.runtime_type, "com.example.Counter");

    let result = vm
        .invoke_method(&counter, "add_times", &types(&["int"]), vec![3.into()])
        .unwrap()
        .wait();
    let holder = result.success().flatten().unwrap();
    assert_eq!(vm.object_fields(holder.id).unwrap()[0].1, Value::from(13));
    assert_eq!(
        vm.get_static("com.example.Counter", "created").unwrap(),
        Value::from(1)
    );

    let missing_ctor = vm
        .new_instance("com.example.Counter", &[], Vec::new())
        .unwrap()
        .wait();
    assert!(missing_ctor.exception().is_some_and(|e| e.is_internal()));
}

#[test]
fn closures_run_on_the_requested_thread() {
    let vm = launched_vm();
    let worker = vm.spawn_thread("worker").unwrap();
    let result = vm
        .run_on(worker, |ctx| {
            let text = ctx.new_string("from worker");
            Ok(text)
        })
        .unwrap()
        .wait();
    let text = result.success().flatten().unwrap();
    assert_eq!(
        vm.string_value(text.id).unwrap().as_deref(),
        Some("from worker")
    );
}

#[test]
fn terminating_a_thread_unblocks_every_queued_caller() {
    let vm = Arc::new(launched_vm());
    let main = vm.main_thread().unwrap();

    let running = vm.invoke_static("Calc", "spin", &[], Vec::new()).unwrap();
    let queued: Vec<_> = (0..2)
        .map(|_| vm.invoke_static("Calc", "nothing", &[], Vec::new()).unwrap())
        .collect();

    let waiters: Vec<_> = queued
        .into_iter()
        .map(|call| std::thread::spawn(move || call.wait()))
        .collect();

    // Make sure the spinning task is actually executing before terminating.
    let running = match running.wait_timeout(std::time::Duration::from_millis(50)) {
        Ok(early) => panic!("spin finished early: {early:?}"),
        Err(call) => call,
    };
    vm.terminate_thread(main).unwrap();

    assert_eq!(running.wait_timeout(WAIT).ok(), Some(ExecResult::Terminated));
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), ExecResult::Terminated);
    }

    let after = vm.invoke_static("Calc", "nothing", &[], Vec::new()).unwrap();
    assert_eq!(after.wait(), ExecResult::Terminated);
}

#[test]
fn shutdown_resolves_outstanding_calls() {
    let vm = launched_vm();
    let running = vm.invoke_static("Calc", "spin", &[], Vec::new()).unwrap();
    vm.shutdown().unwrap();
    assert_eq!(running.wait_timeout(WAIT).ok(), Some(ExecResult::Terminated));
    assert!(matches!(
        vm.invoke_static("Calc", "nothing", &[], Vec::new()),
        Err(RuntimeError::NotLaunched)
    ));
}
