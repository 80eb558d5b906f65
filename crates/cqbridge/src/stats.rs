use portable_atomic::{AtomicI64, Ordering};

/// Process-wide counters used to detect leaked completions at shutdown.
#[derive(Debug, Default)]
pub struct DebugStats {
    pending_batch_completions: AtomicI64,
}

impl DebugStats {
    pub const fn new() -> Self {
        Self {
            pending_batch_completions: AtomicI64::new(0),
        }
    }

    pub(crate) fn completion_registered(&self) {
        self.pending_batch_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completion_extracted(&self) {
        self.pending_batch_completions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Completions registered but not yet delivered.
    pub fn pending_batch_completions(&self) -> i64 {
        self.pending_batch_completions.load(Ordering::Relaxed)
    }

    /// Reports completions that were registered but never delivered.
    ///
    /// Returns `true` when nothing is pending. A non-zero count at shutdown
    /// means the engine dropped operations or callers registered tags they
    /// never submitted.
    pub fn check_ok(&self) -> bool {
        let pending = self.pending_batch_completions();
        if pending != 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Detected {pending} pending batch completion(s) at shutdown; completions were registered but never delivered"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_counter_is_ok() {
        let stats = DebugStats::new();
        stats.completion_registered();
        stats.completion_registered();
        stats.completion_extracted();
        assert_eq!(stats.pending_batch_completions(), 1);
        assert!(!stats.check_ok());

        stats.completion_extracted();
        assert!(stats.check_ok());
    }
}
