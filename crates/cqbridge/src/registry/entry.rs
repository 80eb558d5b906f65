use crate::{BatchContext, RequestCallContext, Tag};
use core::fmt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Continuation run when a batch completes.
pub type BatchCompletion = Box<dyn FnOnce(bool, &mut BatchContext) + Send>;

/// Continuation run when a requested server call arrives.
pub type RequestCallCompletion = Box<dyn FnOnce(bool, &mut RequestCallContext) + Send>;

/// A pending completion: the context the engine writes into and the
/// continuation to run once the engine reports it finished.
pub enum CompletionEntry {
    /// A batch of call operations. The context is recycled afterwards.
    Batch {
        ctx: BatchContext,
        callback: BatchCompletion,
    },
    /// A server "request call" operation. The context is disposed afterwards.
    RequestCall {
        ctx: RequestCallContext,
        callback: RequestCallCompletion,
    },
}

impl CompletionEntry {
    /// Binds `callback` and its `state` to a batch context.
    pub fn batch<S, F>(ctx: BatchContext, callback: F, state: S) -> Self
    where
        S: Send + 'static,
        F: FnOnce(bool, &mut BatchContext, S) + Send + 'static,
    {
        Self::Batch {
            ctx,
            callback: Box::new(move |success, ctx| callback(success, ctx, state)),
        }
    }

    pub fn request_call<F>(ctx: RequestCallContext, callback: F) -> Self
    where
        F: FnOnce(bool, &mut RequestCallContext) + Send + 'static,
    {
        Self::RequestCall {
            ctx,
            callback: Box::new(callback),
        }
    }

    /// The tag of the context this entry carries.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Batch { ctx, .. } => ctx.tag(),
            Self::RequestCall { ctx, .. } => ctx.tag(),
        }
    }

    /// Runs the continuation, then releases the context exactly once.
    ///
    /// A panicking continuation is caught and logged; it never reaches the
    /// poller that delivered the completion.
    pub fn invoke(self, success: bool) {
        match self {
            Self::Batch { mut ctx, callback } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(success, &mut ctx)));
                if let Err(_payload) = outcome {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        "Panic while invoking batch completion for tag {}: {}",
                        ctx.tag(),
                        panic_message(&*_payload)
                    );
                }
                ctx.recycle();
            }
            Self::RequestCall { mut ctx, callback } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(success, &mut ctx)));
                if let Err(_payload) = outcome {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        "Panic while invoking request call completion for tag {}: {}",
                        ctx.tag(),
                        panic_message(&*_payload)
                    );
                }
                drop(ctx);
            }
        }
    }
}

impl fmt::Debug for CompletionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Batch { .. } => "Batch",
            Self::RequestCall { .. } => "RequestCall",
        };
        f.debug_struct("CompletionEntry")
            .field("kind", &kind)
            .field("tag", &self.tag())
            .finish_non_exhaustive()
    }
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
