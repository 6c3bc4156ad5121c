//! Tests for the frame-driven main loop and its submission handles
//!
//! # Test Coverage
//!
//! Validates the dispatcher's core responsibilities:
//! - Per-tick order: update event, then queue drain, then scheduler run
//! - Cross-thread submission runs exactly once on the owner thread
//! - Coroutine registration through a handle (eager start at drain time)
//! - End-of-frame coroutines wait for the end-of-frame tick
//! - Thread-affinity enforcement on tick entry points
//! - Quit keeps ticking but rejects new submissions
//! - Destroy, explicit or by plain drop, makes outstanding handles fail
//! - Subscriber panics are isolated per publish
//! - Stats snapshots serialize
//!
//! # Test Strategy
//!
//! Every test owns its loop on the test thread, so ticks are deterministic
//! function calls. Cross-thread cases spawn real producer threads and join
//! them before ticking.


use mainspring::{
    DispatchError, ErrorHook, LifecycleState, LifecycleStream, MainLoop, Phase, Step, Suspend,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing_util::TestTracing;

#[test]
fn update_tick_runs_event_then_actions_then_coroutines() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let events = Arc::clone(&log);
    main_loop.on_update(move |frame| events.lock().unwrap().push(format!("event:{frame}")));

    let actions = Arc::clone(&log);
    main_loop
        .handle()
        .submit(move || actions.lock().unwrap().push("action".into()))
        .unwrap();

    let resumes = Arc::clone(&log);
    main_loop
        .handle()
        .submit_coroutine(
            Phase::Update,
            mainspring::coroutine::from_fn(move || {
                resumes.lock().unwrap().push("coroutine".into());
                Ok(Step::Complete)
            }),
        )
        .unwrap();

    main_loop.update().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["event:1".to_string(), "action".into(), "coroutine".into()]
    );
}

#[test]
fn cross_thread_submissions_run_once_on_owner() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let dispatcher = main_loop.handle();
    let ran = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                assert!(!dispatcher.is_owner_thread());
                dispatcher
                    .submit(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    main_loop.update().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 4);

    main_loop.update().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 4, "actions never run twice");
}

#[test]
fn end_of_frame_coroutines_wait_for_their_tick() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let resumes = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&resumes);
    main_loop
        .handle()
        .submit_coroutine(
            Phase::EndOfFrame,
            mainspring::coroutine::from_fn(move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Step::Yielded(Suspend::NextTick))
            }),
        )
        .unwrap();

    // The drain eager-starts the coroutine; the update scheduler run must
    // not resume it again.
    main_loop.update().unwrap();
    assert_eq!(resumes.load(Ordering::SeqCst), 1);

    main_loop.end_of_frame().unwrap();
    assert_eq!(resumes.load(Ordering::SeqCst), 2);
}

#[test]
fn tick_entry_points_enforce_the_owner_thread() {
    let _tracing = TestTracing::init();
    let main_loop = MainLoop::new();

    let result = thread::spawn(move || {
        let mut stolen = main_loop;
        stolen.update()
    })
    .join()
    .unwrap();

    assert!(matches!(result, Err(DispatchError::WrongThread { .. })));
}

#[test]
fn quit_rejects_submissions_but_keeps_ticking() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let dispatcher = main_loop.handle();

    let quits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&quits);
    main_loop.on_quit(move |()| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let ran = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&ran);
    dispatcher
        .submit(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    main_loop.notify_quit().unwrap();
    assert_eq!(quits.load(Ordering::SeqCst), 1);
    assert_eq!(main_loop.state(), LifecycleState::Quitting);
    assert!(matches!(
        dispatcher.submit(|| {}),
        Err(DispatchError::ShuttingDown)
    ));

    // Work queued before the quit still drains.
    main_loop.update().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    // Quit is idempotent: the stream fires once.
    main_loop.notify_quit().unwrap();
    assert_eq!(quits.load(Ordering::SeqCst), 1);
}

#[test]
fn destroy_fails_outstanding_handles() {
    let _tracing = TestTracing::init();
    let main_loop = MainLoop::new();
    let dispatcher = main_loop.handle();

    main_loop.destroy();
    assert_eq!(dispatcher.state(), LifecycleState::Destroyed);
    assert!(matches!(
        dispatcher.submit(|| {}),
        Err(DispatchError::ShuttingDown)
    ));
}

#[test]
fn dropping_the_loop_closes_the_queue() {
    let _tracing = TestTracing::init();
    let main_loop = MainLoop::new();
    let dispatcher = main_loop.handle();

    // No explicit destroy(): plain drop must still retire the loop so
    // handles cannot keep feeding a queue nothing will drain.
    drop(main_loop);
    assert_eq!(dispatcher.state(), LifecycleState::Destroyed);
    assert!(matches!(
        dispatcher.submit(|| {}),
        Err(DispatchError::ShuttingDown)
    ));
}

#[test]
fn panicking_subscriber_does_not_abort_the_tick() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();

    let failures = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&failures);
    main_loop.set_error_hook(ErrorHook::new(move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    }));

    main_loop.on_update(|_| panic!("subscriber bug"));
    let delivered = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&delivered);
    main_loop.on_update(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    main_loop.update().unwrap();
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribed_callbacks_stop_firing() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let id = main_loop.on_late_update(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    main_loop.update().unwrap();
    main_loop.late_update().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(main_loop.unsubscribe(LifecycleStream::LateUpdate, id));
    main_loop.late_update().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn focus_and_pause_reach_subscribers() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let focus = Arc::clone(&log);
    main_loop.on_focus(move |focused| focus.lock().unwrap().push(("focus", focused)));
    let pause = Arc::clone(&log);
    main_loop.on_pause(move |paused| pause.lock().unwrap().push(("pause", paused)));

    main_loop.notify_focus(false).unwrap();
    main_loop.notify_pause(true).unwrap();
    main_loop.notify_focus(true).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![("focus", false), ("pause", true), ("focus", true)]
    );
}

#[test]
fn stats_snapshot_serializes() {
    let _tracing = TestTracing::init();
    let mut main_loop = MainLoop::new();
    main_loop.handle().submit(|| {}).unwrap();
    main_loop.update().unwrap();

    let stats = main_loop.stats();
    assert_eq!(stats.frame, 1);
    assert_eq!(stats.queue.executed, 1);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["frame"], 1);
    assert_eq!(json["state"], "Active");
    assert!(json["loop_id"].is_string());
}
