//! Error types for the dispatch core.
//!
//! Only recoverable conditions are modelled here. Protocol-consistency
//! violations between the native engine and the registry (a tag registered
//! twice, a tag delivered that was never registered) are not errors: they
//! panic, because continuing would hide a corrupted correlation table.
//!
//! ## Error Cases
//! - `InvalidConfig`: an [`EnvironmentConfig`] failed validation.
//! - `Runtime`: a poller thread could not be spawned.
//! - `NotRunning`: `stop` was requested on a processor that already stopped.
//!
//! [`EnvironmentConfig`]: crate::EnvironmentConfig

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the dispatch core.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A thread hosting a poller loop failed to start.
    #[error("Runtime error: {context}")]
    Runtime { context: String },

    /// The event processor has already been stopped.
    #[error("Event processor is not running")]
    NotRunning,
}
