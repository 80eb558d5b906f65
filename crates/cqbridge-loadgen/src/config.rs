use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use cqbridge::{
    DEFAULT_POLLER_COUNT, DEFAULT_SHARED_CAPACITY, DEFAULT_SPARE_KEEP_ALIVE,
    DEFAULT_THREAD_LOCAL_CAPACITY, EnvironmentConfig,
};

/// Runtime configuration for the `cqbridge-loadgen` binary.
///
/// Producer threads lease batch contexts, register completions and submit
/// them to an in-process completion queue while the environment's pollers
/// dispatch the callbacks. All values are parsed from CLI arguments or
/// environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cqbridge-loadgen",
    version,
    about = "Drives synthetic completions through the cqbridge dispatch core"
)]
pub struct CliArgs {
    /// Total number of operations to submit across all producers.
    ///
    /// Environment variable: `TOTAL_OPS`
    #[arg(long, env = "TOTAL_OPS", default_value_t = 1_000_000)]
    pub total_ops: usize,

    /// Number of producer threads submitting operations.
    ///
    /// Environment variable: `PRODUCERS`
    #[arg(long, env = "PRODUCERS", default_value_t = num_cpus::get())]
    pub producers: usize,

    /// Upper bound on registered but undelivered completions. Producers
    /// back off while the registry holds more than this.
    ///
    /// Environment variable: `MAX_IN_FLIGHT`
    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = 10_000)]
    pub max_in_flight: usize,

    /// Bytes written into each batch context's outgoing message.
    ///
    /// Environment variable: `PAYLOAD_SIZE`
    #[arg(long, env = "PAYLOAD_SIZE", default_value_t = 64)]
    pub payload_size: usize,

    /// Probability that an operation completes with `success == false`.
    ///
    /// Environment variable: `FAILURE_RATIO`
    #[arg(long, env = "FAILURE_RATIO", default_value_t = 0.01)]
    pub failure_ratio: f64,

    /// Probability that an operation is begun and completed later instead of
    /// completing on submission.
    ///
    /// Environment variable: `DEFERRED_RATIO`
    #[arg(long, env = "DEFERRED_RATIO", default_value_t = 0.5)]
    pub deferred_ratio: f64,

    /// Probability that an operation is a server request call rather than a
    /// batch.
    ///
    /// Environment variable: `REQUEST_CALL_RATIO`
    #[arg(long, env = "REQUEST_CALL_RATIO", default_value_t = 0.05)]
    pub request_call_ratio: f64,

    /// Number of pollers kept blocked on the completion queue.
    ///
    /// Environment variable: `POLLER_COUNT`
    #[arg(long, env = "POLLER_COUNT", default_value_t = DEFAULT_POLLER_COUNT)]
    pub poller_count: usize,

    /// Capacity of the shared batch-context tier.
    ///
    /// Environment variable: `SHARED_CAPACITY`
    #[arg(long, env = "SHARED_CAPACITY", default_value_t = DEFAULT_SHARED_CAPACITY)]
    pub shared_capacity: usize,

    /// Capacity of each thread's batch-context tier.
    ///
    /// Environment variable: `THREAD_LOCAL_CAPACITY`
    #[arg(long, env = "THREAD_LOCAL_CAPACITY", default_value_t = DEFAULT_THREAD_LOCAL_CAPACITY)]
    pub thread_local_capacity: usize,

    /// Seconds a thread that finished a callback waits as a spare poller
    /// before exiting.
    ///
    /// Environment variable: `SPARE_KEEP_ALIVE_SECS`
    #[arg(long, env = "SPARE_KEEP_ALIVE_SECS", default_value_t = DEFAULT_SPARE_KEEP_ALIVE.as_secs())]
    pub spare_keep_alive_secs: u64,

    /// Seconds teardown waits for callbacks still running after the pollers
    /// exit.
    ///
    /// Environment variable: `DRAIN_TIMEOUT_SECS`
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 5)]
    pub drain_timeout_secs: u64,

    /// Seconds to wait for every callback before giving up on the run.
    ///
    /// Environment variable: `RUN_TIMEOUT_SECS`
    #[arg(long, env = "RUN_TIMEOUT_SECS", default_value_t = 300)]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub total_ops: usize,
    pub producers: usize,
    pub max_in_flight: usize,
    pub payload_size: usize,
    pub failure_ratio: f64,
    pub deferred_ratio: f64,
    pub request_call_ratio: f64,
    pub run_timeout: Duration,
    pub environment: EnvironmentConfig,
}

fn check_ratio(name: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{name} ({value}) must be within 0.0..=1.0");
    }
    Ok(())
}

impl TryFrom<CliArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.total_ops == 0 {
            bail!("TOTAL_OPS must be greater than 0");
        }

        if args.producers == 0 {
            bail!("PRODUCERS must be greater than 0");
        }

        if args.max_in_flight == 0 {
            bail!("MAX_IN_FLIGHT must be greater than 0");
        }

        check_ratio("FAILURE_RATIO", args.failure_ratio)?;
        check_ratio("DEFERRED_RATIO", args.deferred_ratio)?;
        check_ratio("REQUEST_CALL_RATIO", args.request_call_ratio)?;

        let environment = EnvironmentConfig::default()
            .with_poller_count(args.poller_count)
            .with_shared_capacity(args.shared_capacity)
            .with_thread_local_capacity(args.thread_local_capacity)
            .with_spare_keep_alive(Duration::from_secs(args.spare_keep_alive_secs))
            .with_drain_timeout(Duration::from_secs(args.drain_timeout_secs))
            .with_thread_name("loadgen-poller");
        environment.validate()?;

        Ok(Self {
            total_ops: args.total_ops,
            producers: args.producers,
            max_in_flight: args.max_in_flight,
            payload_size: args.payload_size,
            failure_ratio: args.failure_ratio,
            deferred_ratio: args.deferred_ratio,
            request_call_ratio: args.request_call_ratio,
            run_timeout: Duration::from_secs(args.run_timeout_secs),
            environment,
        })
    }
}
