//! Poller loops draining the completion queue.
//!
//! The [`EventProcessor`] keeps a fixed number of pollers blocked on
//! [`CompletionQueue::next`], each on its own thread. A poller handles one
//! event at a time: on an operation completion it first hands the queue to a
//! replacement and only then runs the continuation, so a slow or blocking
//! callback never leaves the queue without a consumer. Threads that finish a
//! callback wait as spares for the next hand-off. On a shutdown event a
//! poller counts itself out and exits without a replacement.
//!
//! [`CompletionQueue::next`]: crate::CompletionQueue::next

mod event_processor;

pub use event_processor::*;
