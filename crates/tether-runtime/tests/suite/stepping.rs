use pretty_assertions::assert_eq;
use tether_runtime::{
    BreakpointLocation, BreakpointRequest, ExecResult, ExecutionEnvironment, LocalVm, StepKind,
    StopReason, ThreadStatus, Value, VmEvent,
};

use crate::harness::{launched_vm, types, WAIT};

fn line_bp(class: &str, line: u32, hit_count: Option<u32>) -> BreakpointRequest {
    BreakpointRequest {
        location: BreakpointLocation::Line {
            class: class.to_string(),
            line,
        },
        hit_count,
    }
}

fn top(vm: &LocalVm) -> (String, u32) {
    let main = vm.main_thread().unwrap();
    let frames = vm.frames(main).unwrap();
    (frames[0].method_name.clone(), frames[0].line)
}

fn wait_stopped(vm: &LocalVm) -> ThreadStatus {
    let main = vm.main_thread().unwrap();
    vm.wait_for_stop(main, WAIT).unwrap()
}

#[test]
fn breakpoint_suspends_and_exposes_frames() {
    let vm = launched_vm();
    let events = vm.subscribe().unwrap();
    vm.set_breakpoint(&line_bp("Steps", 40, None)).unwrap();

    let call = vm.invoke_static("Steps", "outer", &[], Vec::new()).unwrap();
    assert_eq!(
        wait_stopped(&vm),
        ThreadStatus::Suspended(StopReason::Breakpoint)
    );

    let main = vm.main_thread().unwrap();
    let frames = vm.frames(main).unwrap();
    let names: Vec<_> = frames.iter().map(|f| f.method_name.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer"]);
    assert_eq!(frames[0].line, 40);
    assert_eq!(frames[0].locals[0].name, "y");
    assert_eq!(frames[0].locals[0].value, Value::from(2));
    assert_eq!(frames[1].line, 31);
    assert_eq!(frames[1].locals[0].name, "x");

    let suspended = events
        .iter()
        .find(|event| matches!(event, VmEvent::Suspended { .. }))
        .unwrap();
    match suspended {
        VmEvent::Suspended {
            thread,
            reason,
            location,
            exception,
        } => {
            assert_eq!(thread, main);
            assert_eq!(reason, StopReason::Breakpoint);
            assert_eq!(location.unwrap().line, 40);
            assert!(exception.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }

    vm.resume(main, None).unwrap();
    assert_eq!(call.wait(), ExecResult::Success(None));
    assert!(matches!(
        vm.frames(main),
        Err(tether_runtime::RuntimeError::ThreadNotSuspended(_))
    ));
}

#[test]
fn step_over_skips_nested_calls_and_step_into_enters_them() {
    let vm = launched_vm();
    vm.set_breakpoint(&line_bp("Steps", 30, None)).unwrap();
    let main = vm.main_thread().unwrap();

    let call = vm.invoke_static("Steps", "outer", &[], Vec::new()).unwrap();
    assert!(wait_stopped(&vm).is_suspended());
    assert_eq!(top(&vm), ("outer".to_string(), 30));

    vm.resume(main, Some(StepKind::Over)).unwrap();
    assert_eq!(wait_stopped(&vm), ThreadStatus::Suspended(StopReason::Step));
    assert_eq!(top(&vm), ("outer".to_string(), 31));

    vm.resume(main, Some(StepKind::Over)).unwrap();
    assert_eq!(wait_stopped(&vm), ThreadStatus::Suspended(StopReason::Step));
    assert_eq!(top(&vm), ("outer".to_string(), 32));

    vm.resume(main, None).unwrap();
    assert_eq!(call.wait(), ExecResult::Success(None));

    let call = vm.invoke_static("Steps", "outer", &[], Vec::new()).unwrap();
    assert!(wait_stopped(&vm).is_suspended());
    vm.resume(main, Some(StepKind::Over)).unwrap();
    assert!(wait_stopped(&vm).is_suspended());
    assert_eq!(top(&vm), ("outer".to_string(), 31));

    vm.resume(main, Some(StepKind::Into)).unwrap();
    assert_eq!(wait_stopped(&vm), ThreadStatus::Suspended(StopReason::Step));
    assert_eq!(top(&vm), ("inner".to_string(), 40));

    vm.resume(main, None).unwrap();
    assert_eq!(call.wait(), ExecResult::Success(None));
}

#[test]
fn hit_count_skips_earlier_hits() {
    let vm = launched_vm();
    vm.set_breakpoint(&line_bp("com.example.Counter", 21, Some(3)))
        .unwrap();
    let main = vm.main_thread().unwrap();

    let counter = vm
        .new_instance("com.example.Counter", &types(&["int"]), vec![0.into()])
        .unwrap()
        .wait()
        .success()
        .flatten()
        .unwrap();
    let call = vm
        .invoke_method(&counter, "add_times", &types(&["int"]), vec![5.into()])
        .unwrap();
    assert!(wait_stopped(&vm).is_suspended());

    let frames = vm.frames(main).unwrap();
    let i = frames[0]
        .locals
        .iter()
        .find(|local| local.name == "i")
        .unwrap();
    assert_eq!(i.value, Value::from(2));
    assert_eq!(frames[0].this.as_ref(), Some(&counter));

    vm.resume(main, None).unwrap();
    assert!(call.wait().is_success());
}

#[test]
fn method_breakpoint_stops_on_entry() {
    let vm = launched_vm();
    vm.set_breakpoint(&BreakpointRequest {
        location: BreakpointLocation::Method {
            class: "Steps".to_string(),
            method: "inner".to_string(),
        },
        hit_count: None,
    })
    .unwrap();

    let call = vm.invoke_static("Steps", "outer", &[], Vec::new()).unwrap();
    assert!(wait_stopped(&vm).is_suspended());
    assert_eq!(top(&vm), ("inner".to_string(), 40));

    let main = vm.main_thread().unwrap();
    assert!(vm
        .clear_breakpoint(&BreakpointLocation::Method {
            class: "Steps".to_string(),
            method: "inner".to_string(),
        })
        .unwrap());
    vm.resume(main, None).unwrap();
    assert_eq!(call.wait(), ExecResult::Success(None));
}

#[test]
fn halt_stops_a_running_thread_at_the_next_line() {
    let vm = launched_vm();
    let main = vm.main_thread().unwrap();
    let call = vm.invoke_static("Calc", "spin", &[], Vec::new()).unwrap();
    let call = call
        .wait_timeout(std::time::Duration::from_millis(20))
        .expect_err("spin never returns on its own");

    vm.halt(main).unwrap();
    assert_eq!(wait_stopped(&vm), ThreadStatus::Suspended(StopReason::Halt));
    assert_eq!(top(&vm), ("spin".to_string(), 19));

    vm.terminate_thread(main).unwrap();
    assert_eq!(call.wait(), ExecResult::Terminated);
    assert_eq!(
        vm.wait_for_stop(main, WAIT).unwrap(),
        ThreadStatus::Terminated
    );
}

#[test]
fn uncaught_exception_suspends_when_requested() {
    let vm = launched_vm();
    vm.set_break_on_uncaught(true).unwrap();
    let main = vm.main_thread().unwrap();
    let reason = vm.new_string("stop here").unwrap();

    let call = vm
        .invoke_static("Calc", "fail", &types(&["String"]), vec![reason.into()])
        .unwrap();
    assert_eq!(
        wait_stopped(&vm),
        ThreadStatus::Suspended(StopReason::Exception)
    );
    assert_eq!(top(&vm), ("check".to_string(), 14));

    vm.resume(main, None).unwrap();
    let description = call.wait().exception().cloned().unwrap();
    assert_eq!(description.type_name, "IllegalArgumentException");
}

#[test]
fn resuming_a_running_thread_is_rejected() {
    let vm = launched_vm();
    let main = vm.main_thread().unwrap();
    assert!(matches!(
        vm.resume(main, None),
        Err(tether_runtime::RuntimeError::ThreadNotSuspended(id)) if id == main
    ));
    // Halting an idle thread is a no-op.
    vm.halt(main).unwrap();
    assert_eq!(
        vm.invoke_static("Calc", "nothing", &[], Vec::new())
            .unwrap()
            .wait(),
        ExecResult::Success(None)
    );
}
