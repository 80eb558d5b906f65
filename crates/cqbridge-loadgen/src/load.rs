use crate::config::LoadConfig;
use anyhow::bail;
use core::time::Duration;
use cqbridge::{CompletionQueue, Environment, LocalCompletionQueue, RequestCallContext, Tag};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, scope};
use std::time::Instant;

/// Deferred operations a producer holds before completing them together.
const DEFER_BATCH: usize = 32;

/// Byte written into outgoing payloads.
const PAYLOAD_FILL: u8 = 0xA5;

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    request_calls: AtomicU64,
    payload_bytes: AtomicU64,
}

impl Counters {
    fn record(&self, success: bool, payload_len: usize) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.payload_bytes
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    fn delivered(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }
}

/// Outcome of one load run.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub delivered: u64,
    pub failed: u64,
    pub request_calls: u64,
    pub payload_bytes: u64,
    pub elapsed: Duration,
    /// Completions still registered when the run finished. Non-zero means
    /// the run lost operations.
    pub pending: i64,
}

impl LoadReport {
    pub fn ops_per_sec(&self) -> f64 {
        self.delivered as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

/// Runs `config.total_ops` operations through a fresh environment and tears
/// it down once every completion has been delivered.
pub fn run(config: &LoadConfig) -> anyhow::Result<LoadReport> {
    let queue = Arc::new(LocalCompletionQueue::new());
    let env = Environment::start(
        config.environment.clone(),
        Arc::clone(&queue) as Arc<dyn CompletionQueue>,
    )?;
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    scope(|s| {
        for producer in 0..config.producers {
            let ops = config.total_ops / config.producers
                + usize::from(producer < config.total_ops % config.producers);
            let env = &env;
            let queue = &*queue;
            let counters = &counters;
            s.spawn(move || produce(config, env, queue, counters, ops));
        }
    });

    #[cfg(feature = "tracing")]
    tracing::info!(
        "All {} operation(s) submitted in {:?}, waiting for delivery",
        config.total_ops,
        start.elapsed()
    );

    let total = config.total_ops as u64;
    let deadline = start + config.run_timeout;
    while counters.delivered() < total {
        if Instant::now() >= deadline {
            bail!(
                "timed out after {:?} with {} of {} completion(s) delivered",
                config.run_timeout,
                counters.delivered(),
                total
            );
        }
        thread::sleep(Duration::from_millis(1));
    }
    let elapsed = start.elapsed();
    let pending = env.debug_stats().pending_batch_completions();

    // Last handle: runs the shutdown handshake.
    drop(env);

    Ok(LoadReport {
        delivered: counters.delivered(),
        failed: counters.failed.load(Ordering::Relaxed),
        request_calls: counters.request_calls.load(Ordering::Relaxed),
        payload_bytes: counters.payload_bytes.load(Ordering::Relaxed),
        elapsed,
        pending,
    })
}

fn produce(
    config: &LoadConfig,
    env: &Environment,
    queue: &LocalCompletionQueue,
    counters: &Arc<Counters>,
    ops: usize,
) {
    let mut rng = rand::rng();
    let mut deferred: Vec<(Tag, bool)> = Vec::with_capacity(DEFER_BATCH);

    for _ in 0..ops {
        if env.registry().len() > config.max_in_flight {
            // Our own deferred operations count against the limit.
            finish_all(queue, &mut deferred);
            while env.registry().len() > config.max_in_flight {
                thread::yield_now();
            }
        }

        let success = !rng.random_bool(config.failure_ratio);
        let tag = if rng.random_bool(config.request_call_ratio) {
            let counters = Arc::clone(counters);
            env.registry().register_request_call_completion(
                RequestCallContext::new(),
                move |success, _| {
                    counters.request_calls.fetch_add(1, Ordering::Relaxed);
                    counters.record(success, 0);
                },
            )
        } else {
            let mut ctx = env.lease_batch_context();
            ctx.send_message_mut().resize(config.payload_size, PAYLOAD_FILL);
            env.registry().register_batch_completion(
                ctx,
                |success, ctx, counters: Arc<Counters>| {
                    counters.record(success, ctx.send_message().len());
                },
                Arc::clone(counters),
            )
        };

        if rng.random_bool(config.deferred_ratio) {
            queue.begin();
            deferred.push((tag, success));
            if deferred.len() == DEFER_BATCH {
                finish_all(queue, &mut deferred);
            }
        } else {
            queue.post(tag, success);
        }
    }

    finish_all(queue, &mut deferred);
}

fn finish_all(queue: &LocalCompletionQueue, deferred: &mut Vec<(Tag, bool)>) {
    for (tag, success) in deferred.drain(..) {
        queue.finish(tag, success);
    }
}
