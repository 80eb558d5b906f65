//! Completion-queue dispatch core.
//!
//! Bridges a native asynchronous engine that reports finished operations on a
//! blocking completion queue to multi-threaded Rust callers:
//!
//! - [`CompletionRegistry`] correlates opaque [`Tag`]s with the continuation
//!   that must run when the matching completion arrives, exactly once.
//! - [`ObjectPool`] recycles per-operation contexts through a thread-local
//!   tier backed by a shared, lock-protected tier.
//! - [`EventProcessor`] keeps a fixed number of poller loops draining the
//!   queue and runs the shutdown handshake.
//! - [`Environment`] owns all of the above and tears them down when the last
//!   handle goes away.

mod config;
mod context;
mod environment;
mod error;
mod pool;
mod processor;
mod queue;
mod registry;
mod stats;
mod sync;
mod tag;

pub use crate::config::*;
pub use crate::context::*;
pub use crate::environment::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::processor::*;
pub use crate::queue::*;
pub use crate::registry::*;
pub use crate::stats::*;
pub use crate::sync::*;
pub use crate::tag::*;
