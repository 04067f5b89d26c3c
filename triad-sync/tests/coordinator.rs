mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use triad_core::{CancelFlag, NullMonitor, Resource};
use triad_sync::{ConcurrencyCoordinator, SchedulingRule};

use common::RecordingFlush;

fn project(name: &str) -> SchedulingRule {
    SchedulingRule::Project(name.to_string())
}

#[test]
fn disjoint_projects_proceed_concurrently() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let both_inside = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["p", "q"]
        .into_iter()
        .map(|name| {
            let coordinator = coordinator.clone();
            let both_inside = both_inside.clone();
            thread::spawn(move || {
                let mut monitor = NullMonitor::new();
                let token = coordinator
                    .acquire(project(name), Arc::new(RecordingFlush::default()), &mut monitor)
                    .expect("acquire");
                // Only reachable if the other thread holds its scope too.
                both_inside.wait();
                coordinator.release(token, &mut monitor);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }
}

#[test]
fn same_project_serializes() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let released = Arc::new(AtomicBool::new(false));
    let (held_tx, held_rx) = mpsc::channel();

    let holder = {
        let coordinator = coordinator.clone();
        let released = released.clone();
        thread::spawn(move || {
            let mut monitor = NullMonitor::new();
            let token = coordinator
                .acquire(project("p"), Arc::new(RecordingFlush::default()), &mut monitor)
                .expect("acquire");
            held_tx.send(()).expect("send");
            thread::sleep(Duration::from_millis(150));
            released.store(true, Ordering::SeqCst);
            coordinator.release(token, &mut monitor);
        })
    };

    held_rx.recv().expect("holder acquired");
    let mut monitor = NullMonitor::new();
    let token = coordinator
        .acquire(
            SchedulingRule::Resource(Resource::file("p/deep/file")),
            Arc::new(RecordingFlush::default()),
            &mut monitor,
        )
        .expect("acquire");
    assert!(released.load(Ordering::SeqCst), "second acquire did not wait");
    coordinator.release(token, &mut monitor);
    holder.join().expect("holder");
}

#[test]
fn cancelled_wait_unwinds_bookkeeping() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let holder = {
        let coordinator = coordinator.clone();
        thread::spawn(move || {
            let mut monitor = NullMonitor::new();
            let token = coordinator
                .acquire(project("p"), Arc::new(RecordingFlush::default()), &mut monitor)
                .expect("acquire");
            held_tx.send(()).expect("send");
            done_rx.recv().expect("done");
            coordinator.release(token, &mut monitor);
        })
    };
    held_rx.recv().expect("holder acquired");

    let flag = CancelFlag::new();
    let canceller = {
        let flag = flag.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.cancel();
        })
    };
    let err = coordinator
        .acquire(
            project("p"),
            Arc::new(RecordingFlush::default()),
            &mut NullMonitor::with_cancel(flag),
        )
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(coordinator.depth(), 0);
    assert!(coordinator.resource_changed(&Resource::file("p/a")).is_err());

    done_tx.send(()).expect("send");
    canceller.join().expect("canceller");
    holder.join().expect("holder");
}

#[test]
fn scope_is_visible_from_other_threads() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let mut monitor = NullMonitor::new();
    let token = coordinator
        .acquire(project("p"), Arc::new(RecordingFlush::default()), &mut monitor)
        .expect("acquire");

    let seen = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.is_within_active_operation_scope(&Resource::file("p/a")))
            .join()
            .expect("thread")
    };
    assert!(seen);
    coordinator.release(token, &mut monitor);
    assert!(!coordinator.is_within_active_operation_scope(&Resource::file("p/a")));
}

#[test]
fn first_flush_operation_wins_for_nested_scopes() {
    let coordinator = ConcurrencyCoordinator::new();
    let outer = Arc::new(RecordingFlush::default());
    let inner = Arc::new(RecordingFlush::default());
    let mut monitor = NullMonitor::new();

    let t1 = coordinator.acquire(project("p"), outer.clone(), &mut monitor).unwrap();
    let t2 = coordinator.acquire(project("p"), inner.clone(), &mut monitor).unwrap();
    coordinator.resource_changed(&Resource::file("p/a")).unwrap();
    coordinator.release(t2, &mut monitor);
    coordinator.release(t1, &mut monitor);

    assert_eq!(outer.calls(), 1);
    assert_eq!(inner.calls(), 0);
}

#[test]
fn multi_rule_locks_every_touched_project() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let mut monitor = NullMonitor::new();
    let token = coordinator
        .acquire(
            SchedulingRule::Multi(vec![
                SchedulingRule::Resource(Resource::file("p/a")),
                SchedulingRule::Resource(Resource::file("q/b")),
            ]),
            Arc::new(RecordingFlush::default()),
            &mut monitor,
        )
        .unwrap();
    assert!(coordinator.is_within_active_operation_scope(&Resource::file("q/z")));
    assert!(coordinator.is_within_active_operation_scope(&Resource::file("p/z")));
    assert!(!coordinator.is_within_active_operation_scope(&Resource::file("r/z")));
    coordinator.release(token, &mut monitor);
}

#[test]
fn crossing_nested_scopes_fail_fast_instead_of_waiting() {
    let coordinator = Arc::new(ConcurrencyCoordinator::new());
    let both_held = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [("p", "q"), ("q", "p")]
        .into_iter()
        .map(|(outer, inner)| {
            let coordinator = coordinator.clone();
            let both_held = both_held.clone();
            thread::spawn(move || {
                let mut monitor = NullMonitor::new();
                let flush = Arc::new(RecordingFlush::default());
                let _token = coordinator
                    .acquire(project(outer), flush.clone(), &mut monitor)
                    .expect("acquire");
                both_held.wait();
                coordinator
                    .acquire(project(inner), flush, &mut monitor)
                    .is_ok()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().is_err(), "widening a held scope must panic");
    }
}
