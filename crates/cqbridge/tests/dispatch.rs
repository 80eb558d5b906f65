use core::time::Duration;
use cqbridge::{
    CompletionQueue, Environment, EnvironmentConfig, EnvironmentSlot, LocalCompletionQueue, Tag,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::scope;

const WAIT: Duration = Duration::from_secs(10);

fn config(poller_count: usize) -> EnvironmentConfig {
    EnvironmentConfig::default()
        .with_poller_count(poller_count)
        .with_shared_capacity(256)
        .with_thread_local_capacity(16)
}

fn start(poller_count: usize) -> (Environment, Arc<LocalCompletionQueue>) {
    let queue = Arc::new(LocalCompletionQueue::new());
    let env = Environment::start(
        config(poller_count),
        Arc::clone(&queue) as Arc<dyn CompletionQueue>,
    )
    .unwrap();
    (env, queue)
}

/// Injected success flag for operation `i`.
fn flag(i: usize) -> bool {
    i % 7 != 3
}

#[test]
fn every_operation_completes_exactly_once() {
    const OPS: usize = 1_000;
    const PRODUCERS: usize = 4;

    let (env, queue) = start(2);
    let seen: Arc<Mutex<HashMap<usize, bool>>> = Arc::default();
    let duplicates = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    scope(|s| {
        for producer in 0..PRODUCERS {
            let env = &env;
            let queue = &queue;
            let seen = Arc::clone(&seen);
            let duplicates = Arc::clone(&duplicates);
            let done_tx = done_tx.clone();
            s.spawn(move || {
                for i in (producer..OPS).step_by(PRODUCERS) {
                    let mut ctx = env.lease_batch_context();
                    ctx.send_message_mut().extend_from_slice(&i.to_le_bytes());

                    let tag: Tag = env.registry().register_batch_completion(
                        ctx,
                        |success, ctx, (i, seen, duplicates, done_tx): (
                            usize,
                            Arc<Mutex<HashMap<usize, bool>>>,
                            Arc<AtomicUsize>,
                            mpsc::Sender<()>,
                        )| {
                            assert_eq!(ctx.send_message(), i.to_le_bytes());
                            if seen.lock().unwrap().insert(i, success).is_some() {
                                duplicates.fetch_add(1, Ordering::SeqCst);
                            }
                            done_tx.send(()).unwrap();
                        },
                        (i, Arc::clone(&seen), Arc::clone(&duplicates), done_tx.clone()),
                    );

                    // Half the operations complete later, as a native engine
                    // would report them.
                    if i % 2 == 0 {
                        queue.post(tag, flag(i));
                    } else {
                        queue.begin();
                        queue.finish(tag, flag(i));
                    }
                }
            });
        }
    });

    for _ in 0..OPS {
        done_rx.recv_timeout(WAIT).unwrap();
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), OPS);
    assert_eq!(duplicates.load(Ordering::SeqCst), 0);
    assert!(seen.iter().all(|(&i, &success)| success == flag(i)));
    assert!(env.registry().is_empty());
    assert_eq!(env.debug_stats().pending_batch_completions(), 0);
    assert!(env.debug_stats().check_ok());
}

#[test]
fn teardown_drains_in_flight_operations() {
    let (env, queue) = start(2);
    let delivered = Arc::new(AtomicUsize::new(0));

    let mut pending = Vec::new();
    for _ in 0..16 {
        let tag = env.registry().register_batch_completion(
            env.lease_batch_context(),
            |_, _, delivered: Arc<AtomicUsize>| {
                delivered.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&delivered),
        );
        queue.begin();
        pending.push(tag);
    }

    let engine = {
        let queue = Arc::clone(&queue);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            for tag in pending {
                queue.finish(tag, false);
            }
        })
    };

    let processor_target = env.processor().target_poller_count();
    let stats_env = env.clone();
    drop(env);
    // Still held by `stats_env`.
    assert!(stats_env.processor().is_running());

    stats_env.processor().stop().unwrap();
    assert_eq!(stats_env.processor().shutdown_pollers(), processor_target);
    assert_eq!(delivered.load(Ordering::SeqCst), 16);
    assert!(stats_env.registry().is_empty());
    engine.join().unwrap();
}

#[test]
fn slot_restarts_after_last_release() {
    let queues: Arc<Mutex<Vec<Arc<LocalCompletionQueue>>>> = Arc::default();
    let created = Arc::clone(&queues);
    let slot = EnvironmentSlot::new(config(2), move || {
        let queue = Arc::new(LocalCompletionQueue::new());
        created.lock().unwrap().push(Arc::clone(&queue));
        queue as Arc<dyn CompletionQueue>
    });

    let env = slot.acquire().unwrap();
    let again = slot.acquire().unwrap();
    assert!(env.same_environment(&again));
    drop(env);
    drop(again);

    {
        let queues = queues.lock().unwrap();
        assert_eq!(queues.len(), 1);
        assert!(queues[0].is_shutdown());
    }

    let fresh = slot.acquire().unwrap();
    assert!(fresh.processor().is_running());
    assert_eq!(queues.lock().unwrap().len(), 2);
}
