#![doc = include_str!("../README.md")]

mod config;
mod load;
mod telemetry;

use clap::Parser;
use config::{CliArgs, LoadConfig};
use load::LoadReport;
use telemetry::init_telemetry;

// Using mimalloc for better performance under contention: every producer and
// poller thread allocates contexts and callback closures.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoadConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let report = load::run(&config)?;
    print_report(&report);

    if report.pending != 0 {
        anyhow::bail!(
            "{} completion(s) were registered but never delivered",
            report.pending
        );
    }
    Ok(())
}

fn log_startup_info(_config: &LoadConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting load run with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting load run: {} operation(s), {} producer(s), {} poller(s)",
            _config.total_ops,
            _config.producers,
            _config.environment.poller_count
        );
    }
}

fn print_report(report: &LoadReport) {
    println!(
        "delivered {} completion(s) in {:.3}s ({:.0} ops/s)",
        report.delivered,
        report.elapsed.as_secs_f64(),
        report.ops_per_sec()
    );
    println!(
        "  failed: {}  request calls: {}  payload bytes: {}",
        report.failed, report.request_calls, report.payload_bytes
    );
}
