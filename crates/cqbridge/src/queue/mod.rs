//! Boundary with the native engine's completion queue.
//!
//! The dispatch core never looks inside an operation; it only consumes the
//! events a queue produces. [`CompletionQueue`] is that boundary, and
//! [`LocalCompletionQueue`] is an in-process implementation honouring the same
//! contract.

mod local;

pub use local::*;

use crate::Tag;

/// One event popped from a completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    /// An operation submitted with `tag` finished.
    OpComplete { tag: Tag, success: bool },
    /// The queue is shutting down; the receiving poller must exit.
    Shutdown,
}

/// A blocking source of completion events with a shutdown handshake.
///
/// # Contract
///
/// - [`CompletionQueue::next`] blocks until an event is available and returns
///   exactly one event per call.
/// - After [`CompletionQueue::shutdown`] the queue keeps delivering pending
///   operation completions. Once no operation remains in flight, every call to
///   `next` returns [`CompletionEvent::Shutdown`], so each poller still
///   blocked on the queue observes exactly one shutdown event.
pub trait CompletionQueue: Send + Sync {
    fn next(&self) -> CompletionEvent;

    fn shutdown(&self);
}
