use super::Metadata;
use crate::{ObjectPool, Tag};
use std::sync::{Arc, Weak};

/// Status received at the end of a client call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecvStatus {
    pub code: i32,
    pub details: String,
    pub trailing_metadata: Metadata,
}

/// Native result buffers of one batch of operations.
#[derive(Debug, Default)]
struct NativeBatchState {
    send_message: Vec<u8>,
    recv_initial_metadata: Metadata,
    recv_message: Option<Vec<u8>>,
    recv_status: Option<RecvStatus>,
    recv_close_on_server_cancelled: bool,
}

impl NativeBatchState {
    /// Clears every buffer but keeps their allocations.
    fn reset(&mut self) {
        self.send_message.clear();
        self.recv_initial_metadata.clear();
        self.recv_message = None;
        self.recv_status = None;
        self.recv_close_on_server_cancelled = false;
    }
}

/// Context carrying the send/receive state of one batch of operations.
///
/// A context has one of two release modes:
///
/// - *reset-on-release*: leased through [`ObjectPool::lease_context`], it
///   remembers its pool and [`BatchContext::recycle`] clears it and puts it
///   back.
/// - *dispose-on-release*: created with [`BatchContext::new`], recycling
///   simply drops it.
///
/// Dropping a context releases its native block.
#[derive(Debug)]
pub struct BatchContext {
    native: Box<NativeBatchState>,
    return_to: Option<Weak<ObjectPool<BatchContext>>>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchContext {
    pub fn new() -> Self {
        Self {
            native: Box::default(),
            return_to: None,
        }
    }

    /// The tag identifying this context's pending operation.
    pub fn tag(&self) -> Tag {
        Tag::from_ptr(&*self.native)
    }

    /// Whether [`BatchContext::recycle`] returns this context to a pool.
    pub fn is_reset_only(&self) -> bool {
        self.return_to.is_some()
    }

    /// Arms the context to return to `pool` when recycled.
    ///
    /// # Panics
    ///
    /// Panics if the context is already armed.
    pub fn set_return_to_pool(&mut self, pool: &Arc<ObjectPool<BatchContext>>) {
        assert!(
            self.return_to.is_none(),
            "batch context {} already has a pool to return to",
            self.tag()
        );
        self.return_to = Some(Arc::downgrade(pool));
    }

    /// Clears all send and receive buffers.
    pub fn reset(&mut self) {
        self.native.reset();
    }

    /// Releases the context after its completion was delivered.
    ///
    /// An armed context is reset and handed back to its pool; the pool link
    /// is cleared first so a cached context never keeps its pool alive. An
    /// unarmed context, or one whose pool is gone, is disposed.
    pub fn recycle(mut self) {
        match self.return_to.take().and_then(|pool| pool.upgrade()) {
            Some(pool) => {
                self.reset();
                pool.put_back_or_dispose(self);
            }
            None => drop(self),
        }
    }

    pub fn send_message(&self) -> &[u8] {
        &self.native.send_message
    }

    /// Buffer for the outgoing message; reuses the previous allocation.
    pub fn send_message_mut(&mut self) -> &mut Vec<u8> {
        &mut self.native.send_message
    }

    pub fn received_initial_metadata(&self) -> &Metadata {
        &self.native.recv_initial_metadata
    }

    pub fn push_received_initial_metadata(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.native.recv_initial_metadata.push((key.into(), value));
    }

    /// The received message, or `None` if the stream ended without one.
    pub fn received_message(&self) -> Option<&[u8]> {
        self.native.recv_message.as_deref()
    }

    pub fn set_received_message(&mut self, message: Option<Vec<u8>>) {
        self.native.recv_message = message;
    }

    pub fn take_received_message(&mut self) -> Option<Vec<u8>> {
        self.native.recv_message.take()
    }

    pub fn received_status(&self) -> Option<&RecvStatus> {
        self.native.recv_status.as_ref()
    }

    pub fn set_received_status(&mut self, status: RecvStatus) {
        self.native.recv_status = Some(status);
    }

    pub fn received_close_on_server_cancelled(&self) -> bool {
        self.native.recv_close_on_server_cancelled
    }

    pub fn set_received_close_on_server_cancelled(&mut self, cancelled: bool) {
        self.native.recv_close_on_server_cancelled = cancelled;
    }
}

impl ObjectPool<BatchContext> {
    /// Creates a pool of unarmed batch contexts.
    pub fn for_batch_contexts(shared_capacity: usize, thread_local_capacity: usize) -> Self {
        Self::new(BatchContext::new, shared_capacity, thread_local_capacity)
    }

    /// Leases a context armed to come back to this pool on recycle.
    pub fn lease_context(self: &Arc<Self>) -> BatchContext {
        let mut ctx = self.lease();
        ctx.set_return_to_pool(self);
        ctx
    }
}
