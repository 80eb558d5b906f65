use crate::{
    BatchContext, CompletionQueue, CompletionRegistry, DebugStats, EnvironmentConfig,
    EventProcessor, Mutex, ObjectPool, Result,
};
use std::sync::{Arc, Weak};

struct EnvironmentInner {
    config: EnvironmentConfig,
    queue: Arc<dyn CompletionQueue>,
    registry: Arc<CompletionRegistry>,
    batch_pool: Arc<ObjectPool<BatchContext>>,
    processor: EventProcessor,
    stats: Arc<DebugStats>,
}

impl Drop for EnvironmentInner {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::info!("Last environment handle released, shutting down");

        if let Err(_e) = self.processor.stop() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Poller shutdown skipped: {_e}");
        }

        let _released = self.batch_pool.dispose();
        #[cfg(feature = "tracing")]
        tracing::debug!("Released {_released} pooled batch context(s)");

        self.stats.check_ok();

        #[cfg(feature = "tracing")]
        tracing::info!("Environment shut down");
    }
}

/// Shared handle to a running dispatch environment.
///
/// Owns the completion registry, the batch-context pool and the event
/// processor draining `queue`. Clones are cheap and share the same
/// environment; dropping the last clone shuts it down:
///
/// 1. the processor runs the queue shutdown handshake,
/// 2. the pool's shared tier is disposed,
/// 3. completions that were registered but never delivered are reported.
///
/// The last handle must not be dropped from inside a completion callback,
/// since teardown waits for every poller, including the one running that
/// callback.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl Environment {
    /// Validates `config` and starts an environment on `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] for an invalid configuration
    /// and [`crate::Error::Runtime`] if a poller thread cannot be spawned.
    pub fn start(config: EnvironmentConfig, queue: Arc<dyn CompletionQueue>) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(DebugStats::new());
        let registry = Arc::new(CompletionRegistry::new(Arc::clone(&stats)));
        let batch_pool = Arc::new(ObjectPool::for_batch_contexts(
            config.shared_capacity,
            config.thread_local_capacity,
        ));
        let processor = EventProcessor::start(&config, Arc::clone(&queue), Arc::clone(&registry))?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Environment started (pollers: {}, batch pool: {} shared / {} per thread)",
            config.poller_count,
            config.shared_capacity,
            config.thread_local_capacity
        );

        Ok(Self {
            inner: Arc::new(EnvironmentInner {
                config,
                queue,
                registry,
                batch_pool,
                processor,
                stats,
            }),
        })
    }

    /// Leases a batch context that returns to this environment's pool when
    /// recycled.
    pub fn lease_batch_context(&self) -> BatchContext {
        self.inner.batch_pool.lease_context()
    }

    pub fn registry(&self) -> &Arc<CompletionRegistry> {
        &self.inner.registry
    }

    pub fn queue(&self) -> &Arc<dyn CompletionQueue> {
        &self.inner.queue
    }

    pub fn batch_context_pool(&self) -> &Arc<ObjectPool<BatchContext>> {
        &self.inner.batch_pool
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.inner.processor
    }

    pub fn debug_stats(&self) -> &DebugStats {
        &self.inner.stats
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.inner.config
    }

    /// Number of live handles to this environment.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether `self` and `other` are handles to the same environment.
    pub fn same_environment(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for Environment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.inner.config)
            .field("processor", &self.inner.processor)
            .field("pending", &self.inner.registry.len())
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

type QueueFactory = Box<dyn Fn() -> Arc<dyn CompletionQueue> + Send + Sync>;

/// Hands out a shared [`Environment`], creating it on first acquisition.
///
/// The slot only holds a weak reference: once every handle it gave out has
/// been dropped the environment shuts down, and the next
/// [`EnvironmentSlot::acquire`] starts a fresh one on a new queue.
pub struct EnvironmentSlot {
    config: EnvironmentConfig,
    queue_factory: QueueFactory,
    current: Mutex<Weak<EnvironmentInner>>,
}

impl EnvironmentSlot {
    pub fn new<F>(config: EnvironmentConfig, queue_factory: F) -> Self
    where
        F: Fn() -> Arc<dyn CompletionQueue> + Send + Sync + 'static,
    {
        Self {
            config,
            queue_factory: Box::new(queue_factory),
            current: Mutex::new(Weak::new()),
        }
    }

    /// Returns the live environment, starting one if none is live.
    ///
    /// An environment whose teardown is still in progress is not live; a new
    /// one may start while the old one finishes shutting down.
    ///
    /// # Errors
    ///
    /// Propagates [`Environment::start`] failures.
    pub fn acquire(&self) -> Result<Environment> {
        let mut current = self.current.lock();
        if let Some(inner) = current.upgrade() {
            return Ok(Environment { inner });
        }

        let environment = Environment::start(self.config.clone(), (self.queue_factory)())?;
        *current = Arc::downgrade(&environment.inner);
        Ok(environment)
    }

    /// Whether an environment acquired from this slot is still live.
    pub fn is_live(&self) -> bool {
        self.current.lock().strong_count() > 0
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }
}

impl core::fmt::Debug for EnvironmentSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnvironmentSlot")
            .field("config", &self.config)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}
