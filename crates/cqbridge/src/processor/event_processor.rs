use crate::{
    CompletionEvent, CompletionQueue, CompletionRegistry, Condvar, EnvironmentConfig, Error,
    Mutex, Result, ShutdownLatch, Tag,
};
use core::time::Duration;
use crossbeam_utils::CachePadded;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

/// How often [`EventProcessor::stop`] reports pollers that have not yet
/// observed shutdown.
const STOP_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of an [`EventProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    Running = 0,
    ShuttingDown = 1,
    ShutDown = 2,
}

impl ProcessorState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::ShutDown,
        }
    }
}

/// Threads that finished a callback and are waiting to be handed the queue.
#[derive(Default)]
struct Spares {
    idle: usize,
    handoffs: Vec<Arc<dyn CompletionQueue>>,
    retiring: bool,
}

/// State shared between the processor handle and every poller thread.
///
/// Holds no reference to the queue: each poller owns its clone and passes it
/// on, so the queue is released once the last poller observes shutdown.
struct Shared {
    registry: Arc<CompletionRegistry>,
    thread_name: String,
    target: usize,
    spare_keep_alive: Duration,
    active: CachePadded<AtomicUsize>,
    shutdown_observed: CachePadded<AtomicUsize>,
    terminated: ShutdownLatch,
    spares: Mutex<Spares>,
    spare_ready: Condvar,
    running_callbacks: Mutex<usize>,
    callbacks_drained: Condvar,
}

impl Shared {
    fn spawn_poller(self: &Arc<Self>, queue: Arc<dyn CompletionQueue>) -> io::Result<()> {
        let shared = Arc::clone(self);
        // Detached: a poller reports back through the shared counters.
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || shared.run(queue))
            .map(drop)
    }

    fn run(self: Arc<Self>, mut queue: Arc<dyn CompletionQueue>) {
        loop {
            let event = queue.next();
            self.active.fetch_sub(1, Ordering::AcqRel);

            match event {
                CompletionEvent::OpComplete { tag, success } => {
                    let kept = self.hand_off(queue);
                    self.dispatch(tag, success);
                    queue = match kept {
                        Some(queue) => {
                            self.active.fetch_add(1, Ordering::AcqRel);
                            queue
                        }
                        None => match self.wait_for_handoff() {
                            Some(queue) => queue,
                            None => return,
                        },
                    };
                }
                CompletionEvent::Shutdown => {
                    drop(queue);
                    let observed = self.shutdown_observed.fetch_add(1, Ordering::AcqRel) + 1;
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Poller observed shutdown ({observed}/{})", self.target);
                    if observed == self.target {
                        self.terminated.signal();
                    }
                    return;
                }
            }
        }
    }

    /// Passes `queue` to an idle spare, or to a new thread if none is
    /// waiting. Returns the queue if no replacement could be started.
    fn hand_off(
        self: &Arc<Self>,
        queue: Arc<dyn CompletionQueue>,
    ) -> Option<Arc<dyn CompletionQueue>> {
        self.active.fetch_add(1, Ordering::AcqRel);

        {
            let mut spares = self.spares.lock();
            if spares.idle > 0 {
                spares.idle -= 1;
                spares.handoffs.push(queue);
                self.spare_ready.notify_one();
                return None;
            }
        }

        match self.spawn_poller(Arc::clone(&queue)) {
            Ok(()) => None,
            Err(_e) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                #[cfg(feature = "tracing")]
                tracing::error!(
                    "Failed to start replacement poller, resuming polling after the callback: {_e}"
                );
                Some(queue)
            }
        }
    }

    /// Parks the calling thread as a spare until a poller hands it the queue.
    /// Returns `None` once the spare has idled for the keep-alive or the
    /// processor has stopped.
    fn wait_for_handoff(&self) -> Option<Arc<dyn CompletionQueue>> {
        let mut spares = self.spares.lock();
        if spares.retiring {
            return None;
        }
        spares.idle += 1;

        let deadline = Instant::now() + self.spare_keep_alive;
        loop {
            if let Some(queue) = spares.handoffs.pop() {
                return Some(queue);
            }
            if spares.retiring {
                spares.idle -= 1;
                return None;
            }
            if self
                .spare_ready
                .wait_until(&mut spares, deadline)
                .timed_out()
                && spares.handoffs.is_empty()
            {
                spares.idle -= 1;
                return None;
            }
        }
    }

    fn dispatch(&self, tag: Tag, success: bool) {
        let Some(entry) = self.registry.try_extract(tag) else {
            // The engine and the registry no longer agree on what is in
            // flight; any further dispatch could run the wrong callback.
            #[cfg(feature = "tracing")]
            tracing::error!("Completion queue delivered unknown tag {tag}; aborting");
            std::process::abort();
        };

        *self.running_callbacks.lock() += 1;
        entry.invoke(success);

        let mut running = self.running_callbacks.lock();
        *running -= 1;
        if *running == 0 {
            self.callbacks_drained.notify_all();
        }
    }

    /// Waits up to `timeout` for callbacks still running on former pollers.
    /// Returns how many are still running.
    fn drain_callbacks(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut running = self.running_callbacks.lock();
        while *running > 0 {
            if self
                .callbacks_drained
                .wait_until(&mut running, deadline)
                .timed_out()
            {
                break;
            }
        }
        *running
    }

    fn retire_spares(&self) {
        self.spares.lock().retiring = true;
        self.spare_ready.notify_all();
    }
}

/// Keeps a target number of pollers draining a [`CompletionQueue`].
///
/// Each poller runs on its own thread and handles one event at a time. For
/// an operation completion it hands the queue to a replacement (an idle
/// spare thread, or a freshly spawned one) before invoking the continuation,
/// then waits as a spare itself. While the processor is running and no
/// callback is executing, exactly [`EventProcessor::target_poller_count`]
/// pollers are blocked on the queue. No thread cap is shared with
/// callbacks, so any number of blocking callbacks leave the queue served.
///
/// [`EventProcessor::stop`] runs the shutdown handshake. Dropping a running
/// processor stops it.
pub struct EventProcessor {
    shared: Arc<Shared>,
    queue: Mutex<Option<Arc<dyn CompletionQueue>>>,
    state: AtomicU8,
    drain_timeout: Duration,
}

impl EventProcessor {
    /// Starts `config.poller_count` poller threads on `queue`, dispatching
    /// completions through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate and
    /// [`Error::Runtime`] if a poller thread cannot be spawned. In the latter
    /// case `queue` is shut down so pollers already started exit.
    pub fn start(
        config: &EnvironmentConfig,
        queue: Arc<dyn CompletionQueue>,
        registry: Arc<CompletionRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            registry,
            thread_name: config.thread_name.clone(),
            target: config.poller_count,
            spare_keep_alive: config.spare_keep_alive,
            active: CachePadded::new(AtomicUsize::new(0)),
            shutdown_observed: CachePadded::new(AtomicUsize::new(0)),
            terminated: ShutdownLatch::new(),
            spares: Mutex::new(Spares::default()),
            spare_ready: Condvar::new(),
            running_callbacks: Mutex::new(0),
            callbacks_drained: Condvar::new(),
        });

        for _ in 0..shared.target {
            shared.active.fetch_add(1, Ordering::AcqRel);
            if let Err(e) = shared.spawn_poller(Arc::clone(&queue)) {
                shared.active.fetch_sub(1, Ordering::AcqRel);
                queue.shutdown();
                return Err(Error::Runtime {
                    context: format!("failed to spawn poller thread: {e}"),
                });
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Started {} completion queue poller(s) on '{}' threads",
            shared.target,
            config.thread_name
        );

        Ok(Self {
            shared,
            queue: Mutex::new(Some(queue)),
            state: AtomicU8::new(ProcessorState::Running as u8),
            drain_timeout: config.drain_timeout,
        })
    }

    /// Shuts the queue down and blocks until every poller has observed the
    /// shutdown, then releases the queue.
    ///
    /// The wait is unbounded: a completion the engine never delivers keeps
    /// `stop` waiting, with a warning logged periodically. Callbacks still
    /// running once the last poller exits get the configured drain timeout.
    ///
    /// Must not be called from a completion callback: the calling poller
    /// would be waiting for itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if the processor was already stopped.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.queue.lock();
        let Some(queue) = slot.take() else {
            return Err(Error::NotRunning);
        };
        self.set_state(ProcessorState::ShuttingDown);

        #[cfg(feature = "tracing")]
        tracing::info!("Shutting down completion queue");
        queue.shutdown();

        while !self.shared.terminated.wait_for(STOP_WARN_INTERVAL) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Still waiting for {} of {} poller(s) to observe shutdown ({} pending completion(s))",
                self.shared.target - self.shutdown_pollers(),
                self.shared.target,
                self.shared.registry.len()
            );
        }
        // Every poller has dropped its clone by now.
        drop(queue);

        let still_running = self.shared.drain_callbacks(self.drain_timeout);
        if still_running > 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "{still_running} callback(s) still running after {:?}; leaving them detached",
                self.drain_timeout
            );
        }
        self.shared.retire_spares();
        self.set_state(ProcessorState::ShutDown);

        #[cfg(feature = "tracing")]
        tracing::info!("All {} poller(s) terminated", self.shared.target);
        Ok(())
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }

    /// Pollers currently blocked on (or about to block on) the queue.
    pub fn active_pollers(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Pollers that have observed the shutdown event.
    pub fn shutdown_pollers(&self) -> usize {
        self.shared.shutdown_observed.load(Ordering::Acquire)
    }

    /// Continuations executing right now.
    pub fn running_callbacks(&self) -> usize {
        *self.shared.running_callbacks.lock()
    }

    pub fn target_poller_count(&self) -> usize {
        self.shared.target
    }

    fn set_state(&self, state: ProcessorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl core::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("state", &self.state())
            .field("target", &self.shared.target)
            .field("active", &self.active_pollers())
            .field("shutdown_observed", &self.shutdown_pollers())
            .finish_non_exhaustive()
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
