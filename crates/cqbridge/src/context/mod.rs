//! Per-operation contexts handed to the native engine.
//!
//! A context owns the native state block an operation writes its results
//! into. The block's address doubles as the operation's [`Tag`], so a context
//! is the only thing that can mint one.
//!
//! [`Tag`]: crate::Tag

mod batch;
mod request_call;

pub use batch::*;
pub use request_call::*;

/// Metadata as `(key, value)` pairs, in arrival order.
pub type Metadata = Vec<(String, Vec<u8>)>;
