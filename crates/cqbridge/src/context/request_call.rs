use super::Metadata;
use crate::Tag;
use std::time::SystemTime;

#[derive(Debug, Default)]
struct NativeRequestCall {
    method: String,
    host: String,
    deadline: Option<SystemTime>,
    request_metadata: Metadata,
}

/// Context for a server-side "request a new call" operation.
///
/// The engine fills in the details of the incoming call when it completes.
/// Request-call contexts are never pooled: they are disposed once their
/// completion has been delivered.
#[derive(Debug, Default)]
pub struct RequestCallContext {
    native: Box<NativeRequestCall>,
}

impl RequestCallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self) -> Tag {
        Tag::from_ptr(&*self.native)
    }

    /// Records the details of the call that arrived.
    pub fn set_call_details(
        &mut self,
        method: impl Into<String>,
        host: impl Into<String>,
        deadline: Option<SystemTime>,
    ) {
        self.native.method = method.into();
        self.native.host = host.into();
        self.native.deadline = deadline;
    }

    pub fn push_request_metadata(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.native.request_metadata.push((key.into(), value));
    }

    pub fn method(&self) -> &str {
        &self.native.method
    }

    pub fn host(&self) -> &str {
        &self.native.host
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.native.deadline
    }

    pub fn request_metadata(&self) -> &Metadata {
        &self.native.request_metadata
    }
}
