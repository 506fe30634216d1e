use pretty_assertions::assert_eq;
use tether_runtime::{
    ExecutionEnvironment, LocalVm, RuntimeError, ThreadStatus, VmEvent, MAIN_GROUP, SYSTEM_GROUP,
};

use crate::harness::launched_vm;

#[test]
fn lifecycle_events_arrive_in_order() {
    let vm = LocalVm::new();
    let events = vm.subscribe().unwrap();
    vm.launch().unwrap();
    let main = vm.main_thread().unwrap();
    vm.shutdown().unwrap();

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.first(), Some(&VmEvent::Started));
    assert_eq!(received.get(1), Some(&VmEvent::ThreadStarted { thread: main }));
    assert_eq!(received.last(), Some(&VmEvent::Terminated));

    let started = received
        .iter()
        .filter(|e| matches!(e, VmEvent::ThreadStarted { .. }))
        .count();
    let died = received
        .iter()
        .filter(|e| matches!(e, VmEvent::ThreadDied { .. }))
        .count();
    assert_eq!(started, 4);
    assert_eq!(died, 4);
}

#[test]
fn spawned_threads_join_the_main_group() {
    let vm = launched_vm();
    let worker = vm.spawn_thread("worker").unwrap();
    let threads = vm.threads().unwrap();
    let info = threads.iter().find(|t| t.id == worker).unwrap();
    assert_eq!(info.name, "worker");
    assert_eq!(info.group, MAIN_GROUP);
    assert_eq!(info.status, ThreadStatus::Idle);
    assert_eq!(
        threads.iter().filter(|t| t.group == SYSTEM_GROUP).count(),
        3
    );
}

#[test]
fn unknown_and_terminated_threads_are_reported() {
    let vm = launched_vm();
    assert!(matches!(vm.frames(999), Err(RuntimeError::UnknownThread(999))));

    let worker = vm.spawn_thread("worker").unwrap();
    vm.terminate_thread(worker).unwrap();
    vm.terminate_thread(worker).unwrap();
    assert!(matches!(
        vm.frames(worker),
        Err(RuntimeError::ThreadTerminated(id)) if id == worker
    ));
    let status = vm
        .threads()
        .unwrap()
        .into_iter()
        .find(|t| t.id == worker)
        .unwrap()
        .status;
    assert_eq!(status, ThreadStatus::Terminated);
}

#[test]
fn relaunch_resets_debuggee_state() {
    let vm = launched_vm();
    let text = vm.new_string("short lived").unwrap();
    vm.install_transport(text.id).unwrap();
    let _handle = vm.take_transport().unwrap();
    assert_eq!(vm.held_objects(), 1);

    vm.shutdown().unwrap();
    assert_eq!(vm.heap_size(), 0);
    assert_eq!(vm.held_objects(), 0);
    assert!(matches!(vm.new_string("x"), Err(RuntimeError::NotLaunched)));

    vm.launch().unwrap();
    assert!(matches!(
        vm.object_class(text.id),
        Err(RuntimeError::InvalidObjectId(_))
    ));
    assert_eq!(vm.threads().unwrap().len(), 4);
}
