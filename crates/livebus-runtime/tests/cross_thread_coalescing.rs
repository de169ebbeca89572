//! Cross-thread publishing and liveness hand-off.
//!
//! Publishes from other threads land in a single pending slot and are
//! delivered by one task on the owning thread. Liveness transitions observed
//! off the owning thread are re-posted there before they touch any record.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use livebus_core::{LivenessState, LoopExecutor};
use livebus_harness::{Recorder, ScriptedSource, init_test_logging};
use livebus_runtime::{LiveBus, SubscriberId, Version};

fn setup<T: Send + Sync + 'static>() -> (Arc<LoopExecutor>, LiveBus<T>) {
    init_test_logging();
    let executor = Arc::new(LoopExecutor::for_current_thread());
    let bus = LiveBus::new(executor.clone());
    (executor, bus)
}

#[test]
fn two_remote_publishes_deliver_last_once() {
    let (executor, bus) = setup::<u32>();
    let seen = Recorder::new();
    bus.subscribe_forever(SubscriberId::next(), false, seen.callback())
        .unwrap();

    let remote = bus.clone();
    let scheduled = thread::spawn(move || (remote.publish_async(1), remote.publish_async(2)))
        .join()
        .unwrap();
    assert_eq!(scheduled, (true, false));
    assert_eq!(executor.queued(), 1);
    assert!(seen.values().is_empty());

    assert_eq!(executor.run_pending(), Ok(1));
    assert_eq!(seen.values(), vec![2]);
    assert_eq!(bus.version(), Version::FIRST);
}

#[test]
fn many_threads_schedule_one_drain() {
    let (executor, bus) = setup::<(usize, usize)>();
    let seen = Recorder::new();
    bus.subscribe_forever(SubscriberId::next(), false, seen.callback())
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let remote = bus.clone();
            thread::spawn(move || {
                (0..250)
                    .filter(|&i| remote.publish_async((t, i)))
                    .count()
            })
        })
        .collect();
    let scheduled: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(scheduled, 1);

    executor.run_pending().unwrap();
    let values = seen.values();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].1, 249, "last writer of some thread wins");
}

#[test]
fn owning_thread_publish_async_is_deferred() {
    let (executor, bus) = setup::<&'static str>();
    let seen = Recorder::new();
    bus.subscribe_forever(SubscriberId::next(), false, seen.callback())
        .unwrap();

    assert!(bus.publish_async("a"));
    assert!(!bus.publish_async("b"));
    assert!(seen.values().is_empty());
    assert!(bus.value().is_none());

    executor.run_pending().unwrap();
    assert_eq!(seen.values(), vec!["b"]);

    // The slot is free again after the drain.
    assert!(bus.publish_async("c"));
    executor.run_pending().unwrap();
    assert_eq!(seen.values(), vec!["b", "c"]);
    assert_eq!(bus.version().get(), 1);
}

#[test]
fn streaming_producer_is_delivered_in_order() {
    let (executor, bus) = setup::<u32>();
    let seen = Recorder::new();
    bus.subscribe_forever(SubscriberId::next(), false, seen.callback())
        .unwrap();

    let remote = bus.clone();
    let producer = thread::spawn(move || {
        for n in 1..=1_000 {
            remote.publish_async(n);
        }
    });

    while seen.last() != Some(1_000) {
        let ran = executor
            .run_next_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(ran, "producer stalled before the final value");
    }
    producer.join().unwrap();

    let values = seen.values();
    assert!(values.windows(2).all(|w| w[0] < w[1]), "{values:?}");
    assert_eq!(i64::try_from(values.len()).unwrap() - 1, bus.version().get());
}

#[test]
fn remote_liveness_change_is_applied_on_owning_thread() {
    let (executor, bus) = setup::<u32>();
    let owner = thread::current().id();
    let delivered_on = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered_on);

    let screen = ScriptedSource::new(LivenessState::Initialized);
    let id = SubscriberId::next();
    bus.subscribe_sticky(id, screen.clone(), move |v: &u32| {
        sink.lock().unwrap().push((*v, thread::current().id()));
    })
    .unwrap();
    bus.publish(3).unwrap();

    let remote = screen.clone();
    thread::spawn(move || remote.emit(LivenessState::Resumed))
        .join()
        .unwrap();
    assert!(!bus.subscription(id).unwrap().active);
    assert!(delivered_on.lock().unwrap().is_empty());

    executor.run_pending().unwrap();
    assert!(bus.subscription(id).unwrap().active);
    assert_eq!(*delivered_on.lock().unwrap(), vec![(3, owner)]);
}

#[test]
fn remote_destroy_is_applied_on_owning_thread() {
    let (executor, bus) = setup::<u32>();
    let screen = ScriptedSource::new(LivenessState::Resumed);
    bus.subscribe(SubscriberId::next(), screen.clone(), |_| {})
        .unwrap();

    let remote = screen.clone();
    thread::spawn(move || remote.emit(LivenessState::Destroyed))
        .join()
        .unwrap();
    assert!(bus.has_subscribers());

    executor.run_pending().unwrap();
    assert!(!bus.has_subscribers());
    assert_eq!(screen.observer_count(), 0);
}
