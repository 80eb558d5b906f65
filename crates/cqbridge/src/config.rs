use crate::{Error, Result};
use core::time::Duration;

/// Default number of poller loops kept blocked on the completion queue.
pub const DEFAULT_POLLER_COUNT: usize = 4;

/// Default capacity of the shared batch-context tier.
pub const DEFAULT_SHARED_CAPACITY: usize = 10_000;

/// Default capacity of each thread's batch-context tier.
pub const DEFAULT_THREAD_LOCAL_CAPACITY: usize = 64;

/// Default time a thread that finished a callback waits to be handed the
/// queue before exiting.
pub const DEFAULT_SPARE_KEEP_ALIVE: Duration = Duration::from_secs(10);

/// Runtime configuration for an [`Environment`].
///
/// Every field has a production default; use the `with_*` methods to tune
/// individual values and [`EnvironmentConfig::validate`] (called by
/// [`Environment::start`]) to check the combination.
///
/// [`Environment`]: crate::Environment
/// [`Environment::start`]: crate::Environment::start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Number of poller loops kept available to pop the completion queue.
    pub poller_count: usize,

    /// Capacity of the shared (lock-protected) batch-context tier.
    pub shared_capacity: usize,

    /// Capacity of each thread's private batch-context tier.
    pub thread_local_capacity: usize,

    /// How long a thread that finished a callback stays parked as a spare
    /// poller before exiting. Spares absorb bursts without spawning threads.
    pub spare_keep_alive: Duration,

    /// How long teardown waits for callbacks still running on former pollers
    /// once every poller has observed shutdown.
    pub drain_timeout: Duration,

    /// Name prefix for poller threads.
    pub thread_name: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            poller_count: DEFAULT_POLLER_COUNT,
            shared_capacity: DEFAULT_SHARED_CAPACITY,
            thread_local_capacity: DEFAULT_THREAD_LOCAL_CAPACITY,
            spare_keep_alive: DEFAULT_SPARE_KEEP_ALIVE,
            drain_timeout: Duration::from_secs(5),
            thread_name: String::from("cq-poller"),
        }
    }
}

impl EnvironmentConfig {
    #[must_use]
    pub const fn with_poller_count(mut self, poller_count: usize) -> Self {
        self.poller_count = poller_count;
        self
    }

    #[must_use]
    pub const fn with_shared_capacity(mut self, shared_capacity: usize) -> Self {
        self.shared_capacity = shared_capacity;
        self
    }

    #[must_use]
    pub const fn with_thread_local_capacity(mut self, thread_local_capacity: usize) -> Self {
        self.thread_local_capacity = thread_local_capacity;
        self
    }

    #[must_use]
    pub const fn with_spare_keep_alive(mut self, spare_keep_alive: Duration) -> Self {
        self.spare_keep_alive = spare_keep_alive;
        self
    }

    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Checks that the configuration can run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if:
    /// - `poller_count` is zero.
    /// - `thread_name` contains a NUL byte, which no OS thread name can hold.
    pub fn validate(&self) -> Result<()> {
        if self.poller_count == 0 {
            return Err(Error::InvalidConfig {
                reason: String::from("poller_count must be greater than 0"),
            });
        }

        if self.thread_name.contains('\0') {
            return Err(Error::InvalidConfig {
                reason: format!("thread_name ({:?}) must not contain NUL", self.thread_name),
            });
        }

        Ok(())
    }
}
