use std::sync::{Arc, Barrier};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tether_config::DebuggerConfig;
use tether_debug::{DebugError, Debugger, DebuggerEvent, ObjectTracker, Session, SessionStatus};
use tether_runtime::{Handle, MockEnvironment, ObjectCategory};

use crate::harness::Recorder;

fn mock_tracker() -> (Arc<MockEnvironment>, Arc<ObjectTracker>) {
    let env = Arc::new(MockEnvironment::new());
    let tracker = Arc::new(ObjectTracker::new(env.clone()));
    (env, tracker)
}

#[test]
fn forgetting_an_untracked_object_is_a_no_op() {
    let (env, tracker) = mock_tracker();
    let widget = env.insert_object(1, "com.example.Widget", ObjectCategory::Instance);

    tracker.forget(widget.id).unwrap();
    assert!(tracker.is_empty());
    assert!(env.released().is_empty());
}

#[test]
fn forget_is_idempotent() {
    let (env, tracker) = mock_tracker();
    let widget = env.insert_object(1, "com.example.Widget", ObjectCategory::Instance);
    let mirror = tracker.get_handle(&widget).unwrap().unwrap();
    assert!(env.is_held(mirror.handle()));

    tracker.forget(widget.id).unwrap();
    tracker.forget(widget.id).unwrap();
    tracker.forget_mirror(&mirror).unwrap();

    assert!(tracker.is_empty());
    assert!(!env.is_held(mirror.handle()));
    assert_eq!(env.released(), vec![mirror.handle()]);
}

#[test]
fn repeated_lookups_return_the_cached_mirror() {
    let (env, tracker) = mock_tracker();
    let widget = env.insert_object(1, "com.example.Widget", ObjectCategory::Instance);

    let first = tracker.get_handle(&widget).unwrap().unwrap();
    let second = tracker.get_handle(&widget).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.class_name(), "com.example.Widget");
    assert_eq!(tracker.len(), 1);
    assert_eq!(env.registrations(), 1);
}

#[test]
fn concurrent_lookups_register_the_object_once() {
    let (env, tracker) = mock_tracker();
    env.set_registration_delay(Duration::from_millis(20));
    let widget = env.insert_object(7, "com.example.Widget", ObjectCategory::Instance);

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let tracker = tracker.clone();
            let barrier = barrier.clone();
            let widget = widget.clone();
            std::thread::spawn(move || {
                barrier.wait();
                tracker.get_handle(&widget).unwrap().unwrap().handle()
            })
        })
        .collect();
    let seen: Vec<Handle> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(seen.iter().all(|handle| *handle == seen[0]), "{seen:?}");
    assert_eq!(env.registrations(), 1);
    assert_eq!(tracker.len(), 1);
}

#[test]
fn a_reused_handle_is_reported_as_corruption() {
    let (env, tracker) = mock_tracker();
    let first = env.insert_object(1, "com.example.Widget", ObjectCategory::Instance);
    let second = env.insert_object(2, "com.example.Widget", ObjectCategory::Instance);

    let mirror = tracker.get_handle(&first).unwrap().unwrap();
    env.set_next_handle(mirror.handle().as_u64() - 1);
    assert!(env.released().is_empty());

    let err = tracker.get_handle(&second).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        DebugError::CacheCorrupted { handle, existing: 1, object: 2 } if handle == mirror.handle()
    ));
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.object_for(mirror.handle()).unwrap().id, 1);
    // The hold taken for the rejected registration is given back.
    assert_eq!(env.released(), vec![mirror.handle()]);
    assert!(!env.is_held(mirror.handle()));
}

#[test]
fn corruption_disables_the_session() {
    let env = Arc::new(MockEnvironment::new());
    let first = env.insert_object(1, "com.example.Widget", ObjectCategory::Instance);
    let second = env.insert_object(2, "com.example.Widget", ObjectCategory::Instance);
    let session = Session::new(env.clone(), DebuggerConfig::default());
    let events = Recorder::attach(&session);

    let mirror = session.mirror(&first).unwrap().unwrap();
    env.set_next_handle(mirror.handle().as_u64() - 1);
    assert!(matches!(
        session.mirror(&second),
        Err(DebugError::CacheCorrupted { .. })
    ));

    assert_eq!(session.get_status(), SessionStatus::Failed);
    assert!(matches!(session.mirror(&first), Err(DebugError::SessionFailed)));
    let message = session
        .toggle_breakpoint(
            &tether_debug::BreakpointKey::Line {
                class: "com.example.Widget".to_string(),
                line: 1,
            },
            true,
            &Default::default(),
        )
        .unwrap();
    assert!(message.contains("disabled"), "{message}");

    let released = env.released();
    let failed = |result: Result<(), DebugError>| matches!(result, Err(DebugError::SessionFailed));
    assert!(failed(session.get_class("com.example.Widget").map(drop)));
    assert!(failed(session.get_objects().map(drop)));
    assert!(failed(session.add_object("bench", "widget1", &mirror)));
    assert!(failed(session.remove_object("bench", "widget1").map(drop)));
    assert!(failed(session.guess_new_name("com.example.Widget").map(drop)));
    assert!(failed(session.guess_object_name(&mirror).map(drop)));
    assert!(failed(session.object_fields(&mirror).map(drop)));
    assert!(failed(session.field_value(&mirror, "size").map(drop)));
    assert!(failed(session.string_value(&mirror).map(drop)));
    assert!(failed(session.forget_object(&mirror)));
    assert!(failed(session.remove_breakpoints_for_class("com.example.Widget")));
    assert!(failed(session.set_break_on_uncaught(true)));
    assert!(failed(session.hide_system_threads(false)));
    assert!(failed(session.get_threads().map(drop)));
    assert!(failed(session.get_thread(1).map(drop)));
    assert!(failed(session.get_thread_tree().map(drop)));
    assert_eq!(session.tracker().len(), 1);
    assert_eq!(env.released(), released);

    assert!(session.flush_events());
    let disabled: Vec<_> = events
        .events()
        .into_iter()
        .filter(|event| matches!(event, DebuggerEvent::Disabled { .. }))
        .collect();
    assert_eq!(disabled.len(), 1);
}
