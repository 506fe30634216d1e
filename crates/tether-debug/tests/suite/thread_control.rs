use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tether_config::DebuggerConfig;
use tether_debug::{
    demo, BreakpointKey, DebugError, Debugger, DebuggerEvent, ExecResult, MirrorValue,
    SessionStatus, ThreadController, HIT_COUNT,
};
use tether_runtime::{ExecutionEnvironment, Primitive, StopReason, ThreadStatus, Value};

use crate::harness::{
    in_background, launched_session, open_account, session_with, types, Recorder, WAIT,
};

fn line(class: &str, line: u32) -> BreakpointKey {
    BreakpointKey::Line {
        class: class.to_string(),
        line,
    }
}

fn main_thread(session: &tether_debug::Session<tether_runtime::LocalVm>) -> Arc<ThreadController> {
    let id = session.env().main_thread().unwrap();
    session.get_thread(id).unwrap()
}

fn top_line(thread: &ThreadController) -> (String, u32) {
    let frame = &thread.get_stack().unwrap()[0];
    (frame.method_name.clone(), frame.line)
}

#[test]
fn system_threads_are_hidden_by_default() {
    let session = launched_session();
    let names: Vec<_> = session
        .get_threads()
        .unwrap()
        .iter()
        .map(|thread| thread.name().to_string())
        .collect();
    assert_eq!(names, vec!["main"]);

    session.hide_system_threads(false).unwrap();
    let threads = session.get_threads().unwrap();
    assert_eq!(threads.len(), 4);
    assert_eq!(
        threads.iter().filter(|t| t.is_known_system_thread()).count(),
        3
    );
    let groups: Vec<_> = session
        .get_thread_tree()
        .unwrap()
        .into_iter()
        .map(|group| (group.name, group.threads.len()))
        .collect();
    assert_eq!(groups, vec![("main".to_string(), 1), ("system".to_string(), 3)]);
}

#[test]
fn configured_names_count_as_system_threads() {
    let session = session_with(DebuggerConfig {
        system_threads: vec!["Watchdog".to_string()],
        ..DebuggerConfig::default()
    });
    session.launch().unwrap();
    let watchdog = session.env().spawn_thread("Watchdog").unwrap();

    assert!(session.get_thread(watchdog).unwrap().is_known_system_thread());
    assert!(session
        .get_threads()
        .unwrap()
        .iter()
        .all(|thread| thread.id() != watchdog));
    assert!(matches!(
        session.get_thread(9_999),
        Err(DebugError::UnknownThread(9_999))
    ));
}

#[test]
fn introspection_requires_a_suspended_thread() {
    let session = launched_session();
    let main = main_thread(&session);
    assert_eq!(main.status(), ThreadStatus::Idle);
    assert!(!main.is_suspended());
    assert!(matches!(main.get_stack(), Err(DebugError::NotSuspended(_))));
    assert!(matches!(main.step(), Err(DebugError::NotSuspended(_))));
}

#[test]
fn breakpoint_stop_exposes_frames_and_locals() {
    let session = launched_session();
    let recorder = Recorder::attach(&*session);
    assert_eq!(
        session.toggle_breakpoint(&line(demo::ACCOUNT_CLASS, 11), true, &BTreeMap::new()),
        None
    );

    let runner = in_background(&session, |s| s.run_class_main(demo::MAIN_CLASS));
    let main = main_thread(&session);
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(main.status(), ThreadStatus::Suspended(StopReason::Breakpoint));
    assert_eq!(main.status_text(), "at breakpoint");
    assert_eq!(session.get_status(), SessionStatus::Suspended);

    let stack = main.get_stack().unwrap();
    let methods: Vec<_> = stack.iter().map(|f| f.method_name.as_str()).collect();
    assert_eq!(methods, vec!["deposit", "main"]);
    assert_eq!(main.get_line_number(0).unwrap(), 11);
    assert_eq!(main.get_line_number(1).unwrap(), 4);
    assert_eq!(
        main.get_class_source_name(0).unwrap().as_deref(),
        Some("Account.java")
    );

    let locals = main.get_local_variables(0).unwrap();
    assert_eq!(locals[0].name, "amount");
    assert_eq!(locals[0].value, Value::from(5));
    assert!(!main.var_is_object(0, 0).unwrap());

    let caller_locals: Vec<_> = main
        .get_local_variables(1)
        .unwrap()
        .into_iter()
        .map(|local| local.name)
        .collect();
    assert_eq!(caller_locals, vec!["args", "account", "round"]);
    assert!(main.var_is_object(1, 1).unwrap());
    let account = main.get_stack_object(1, 1).unwrap();
    assert_eq!(account.class_name(), demo::ACCOUNT_CLASS);
    assert_eq!(main.get_current_object(0).unwrap(), Some(account.clone()));
    assert_eq!(main.get_current_object(1).unwrap(), None);
    assert_eq!(
        session.field_value(&account, "balance").unwrap(),
        MirrorValue::from(10)
    );

    assert!(matches!(
        main.get_stack_object(0, 0),
        Err(DebugError::NotAnObject)
    ));
    assert!(matches!(
        main.get_local_variables(7),
        Err(DebugError::InvalidFrame { index: 7, .. })
    ));
    assert!(matches!(
        main.var_is_object(0, 4),
        Err(DebugError::InvalidVariable { frame: 0, index: 4 })
    ));

    main.set_selected_frame(1);
    assert_eq!(main.selected_frame(), 1);

    main.step().unwrap();
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(top_line(&main), ("deposit".to_string(), 12));
    assert_eq!(main.selected_frame(), 0);
    let balance = main
        .get_local_variables(0)
        .unwrap()
        .into_iter()
        .find(|local| local.name == "balance")
        .unwrap();
    assert_eq!(balance.value, Value::from(15));

    session
        .remove_breakpoints_for_class(demo::ACCOUNT_CLASS)
        .unwrap();
    main.cont().unwrap();
    assert_eq!(runner.join().unwrap().unwrap(), ExecResult::Success(None));

    assert!(session.flush_events());
    let events = recorder.events();
    let hit = events
        .iter()
        .find_map(|event| match event {
            DebuggerEvent::Breakpoint { thread, location } => Some((*thread, location.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(hit.0, main.id());
    let location = hit.1.unwrap();
    assert_eq!(location.class_name, demo::ACCOUNT_CLASS);
    assert_eq!(location.line, 11);
    assert!(events.iter().any(|event| matches!(
        event,
        DebuggerEvent::DebuggerPaused { reason: StopReason::Step, .. }
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, DebuggerEvent::DebuggerResumed { .. })));
}

#[test]
fn step_into_descends_into_calls() {
    let session = launched_session();
    assert_eq!(
        session.toggle_breakpoint(&line(demo::MAIN_CLASS, 4), true, &BTreeMap::new()),
        None
    );
    let runner = in_background(&session, |s| s.run_class_main(demo::MAIN_CLASS));
    let main = main_thread(&session);
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(top_line(&main), ("main".to_string(), 4));

    main.step_into().unwrap();
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(top_line(&main), ("deposit".to_string(), 10));

    main.step().unwrap();
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(top_line(&main), ("deposit".to_string(), 11));

    assert_eq!(
        session.toggle_breakpoint(&line(demo::MAIN_CLASS, 4), false, &BTreeMap::new()),
        None
    );
    main.cont().unwrap();
    assert_eq!(runner.join().unwrap().unwrap(), ExecResult::Success(None));
}

#[test]
fn hit_count_skips_earlier_hits() {
    let session = launched_session();
    let third = BTreeMap::from([(HIT_COUNT.to_string(), "3".to_string())]);
    assert_eq!(
        session.toggle_breakpoint(&line(demo::ACCOUNT_CLASS, 11), true, &third),
        None
    );

    let runner = in_background(&session, |s| s.run_class_main(demo::MAIN_CLASS));
    let main = main_thread(&session);
    assert!(main.wait_until_suspended(WAIT).unwrap());
    let amount = &main.get_local_variables(0).unwrap()[0];
    assert_eq!(amount.value, Value::Primitive(Primitive::Int(15)));

    main.cont().unwrap();
    assert_eq!(runner.join().unwrap().unwrap(), ExecResult::Success(None));
}

#[test]
fn halt_and_terminate_a_busy_thread() {
    let session = launched_session();
    let recorder = Recorder::attach(&*session);
    let runner = in_background(&session, |s| {
        s.execute(|ctx| ctx.invoke_static("fixture.Worker", "spin", &[]))
    });
    session
        .wait_for_status(&|status| status == SessionStatus::Running, WAIT)
        .unwrap();

    let main = main_thread(&session);
    main.halt().unwrap();
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(main.status(), ThreadStatus::Suspended(StopReason::Halt));
    assert_eq!(top_line(&main).0, "spin");

    main.terminate().unwrap();
    assert_eq!(runner.join().unwrap().unwrap(), ExecResult::Terminated);
    assert_eq!(main.status(), ThreadStatus::Terminated);
    assert!(!main.wait_until_suspended(WAIT).unwrap());
    assert!(matches!(main.cont(), Err(DebugError::ThreadTerminated(_))));

    assert!(session.flush_events());
    assert!(recorder.events().iter().any(|event| matches!(
        event,
        DebuggerEvent::DebuggerPaused { reason: StopReason::Halt, .. }
    )));
}

#[test]
fn uncaught_exceptions_suspend_when_requested() {
    let session = launched_session();
    let recorder = Recorder::attach(&*session);
    session.set_break_on_uncaught(true).unwrap();
    let account = open_account(&session, "ada", 10);

    let target = account.clone();
    let runner = in_background(&session, move |s| {
        s.invoke_method(
            &target,
            "withdraw",
            &types(&["int"]),
            vec![MirrorValue::from(1000)],
        )
    });
    let main = main_thread(&session);
    assert!(main.wait_until_suspended(WAIT).unwrap());
    assert_eq!(main.status(), ThreadStatus::Suspended(StopReason::Exception));
    assert_eq!(top_line(&main), ("withdraw".to_string(), 17));
    assert_eq!(main.get_current_object(0).unwrap(), Some(account));

    main.cont().unwrap();
    let result = runner.join().unwrap().unwrap();
    assert_eq!(
        result.exception().unwrap().type_name,
        "IllegalStateException"
    );

    assert!(session.flush_events());
    assert!(recorder.events().iter().any(|event| matches!(
        event,
        DebuggerEvent::Exception { suspended: true, description, .. }
            if description.message.as_deref() == Some("insufficient funds")
    )));
}
