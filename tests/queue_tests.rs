//! Tests for the cross-thread action queue
//!
//! # Test Coverage
//!
//! Validates the queue's core contract:
//! - Submission order is preserved across a drain
//! - Enqueue never runs the action inline
//! - Actions submitted from other threads run exactly once
//! - Enqueues racing with a drain land in the next batch
//! - A panicking action is isolated and reported once
//! - A closed queue rejects submissions
//!
//! # Test Strategy
//!
//! The queue is exercised directly, below the dispatcher layer, with a
//! hand-built tick context. Cross-thread cases use real spawned threads
//! joined before draining so the assertions are deterministic.


use mainspring::error::ErrorHook;
use mainspring::queue::{ActionQueue, TickContext};
use mainspring::scheduler::MicroScheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing_util::TestTracing;

fn drain(queue: &ActionQueue, hook: &ErrorHook) -> usize {
    let mut update = MicroScheduler::new();
    let mut ctx = TickContext::new(&mut update, None, hook);
    queue.drain(&mut ctx, hook)
}

#[test]
fn drain_preserves_submission_order() {
    let _tracing = TestTracing::init();
    let queue = ActionQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for n in 0..5 {
        let log = Arc::clone(&log);
        queue
            .enqueue(Box::new(move |_| log.lock().unwrap().push(n)))
            .unwrap();
    }

    let hook = ErrorHook::new(|_| {});
    assert_eq!(drain(&queue, &hook), 5);
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn enqueue_never_runs_inline() {
    let _tracing = TestTracing::init();
    let queue = ActionQueue::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&ran);

    queue
        .enqueue(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0, "action must wait for drain");

    let hook = ErrorHook::new(|_| {});
    drain(&queue, &hook);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn cross_thread_submissions_run_exactly_once() {
    let _tracing = TestTracing::init();
    let queue = Arc::new(ActionQueue::new());
    let ran = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                queue
                    .enqueue(Box::new(move |_| {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let hook = ErrorHook::new(|_| {});
    assert_eq!(drain(&queue, &hook), 8);
    assert_eq!(ran.load(Ordering::SeqCst), 8);
    assert_eq!(drain(&queue, &hook), 0, "batch must not run twice");
}

#[test]
fn enqueue_during_drain_defers_to_next_batch() {
    let _tracing = TestTracing::init();
    let queue = Arc::new(ActionQueue::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    for n in 0..3 {
        let queue_again = Arc::clone(&queue);
        let log = Arc::clone(&log);
        queue
            .enqueue(Box::new(move |_| {
                log.lock().unwrap().push(("first", n));
                let log = Arc::clone(&log);
                queue_again
                    .enqueue(Box::new(move |_| log.lock().unwrap().push(("second", n))))
                    .unwrap();
            }))
            .unwrap();
    }

    let hook = ErrorHook::new(|_| {});
    assert_eq!(drain(&queue, &hook), 3, "re-enqueued actions wait a tick");
    assert_eq!(
        *log.lock().unwrap(),
        vec![("first", 0), ("first", 1), ("first", 2)]
    );

    assert_eq!(drain(&queue, &hook), 3);
    assert_eq!(
        log.lock().unwrap()[3..],
        [("second", 0), ("second", 1), ("second", 2)]
    );
}

#[test]
fn panicking_action_is_isolated_and_reported_once() {
    let _tracing = TestTracing::init();
    let queue = ActionQueue::new();
    let survivors = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&survivors);
    queue
        .enqueue(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    queue
        .enqueue(Box::new(|_| panic!("poisoned action")))
        .unwrap();
    let seen = Arc::clone(&survivors);
    queue
        .enqueue(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    let failures = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&failures);
    let hook = ErrorHook::new(move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(drain(&queue, &hook), 3);
    assert_eq!(survivors.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(queue.metrics().snapshot().failed, 1);
}

#[test]
fn closed_queue_rejects_submissions() {
    let _tracing = TestTracing::init();
    let queue = ActionQueue::new();
    assert!(queue.is_open());
    queue.close();
    assert!(!queue.is_open());

    let result = queue.enqueue(Box::new(|_| {}));
    assert!(matches!(
        result,
        Err(mainspring::DispatchError::ShuttingDown)
    ));
}

#[test]
fn metrics_track_the_queue_lifecycle() {
    let _tracing = TestTracing::init();
    let queue = ActionQueue::new();
    queue.enqueue(Box::new(|_| {})).unwrap();
    queue.enqueue(Box::new(|_| {})).unwrap();

    let snapshot = queue.metrics().snapshot();
    assert_eq!(snapshot.enqueued, 2);
    assert_eq!(snapshot.pending, 2);
    assert_eq!(snapshot.executed, 0);

    let hook = ErrorHook::new(|_| {});
    drain(&queue, &hook);

    let snapshot = queue.metrics().snapshot();
    assert_eq!(snapshot.executed, 2);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.failed, 0);
}
