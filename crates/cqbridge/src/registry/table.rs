use super::CompletionEntry;
use crate::{BatchContext, DebugStats, Mutex, RequestCallContext, Tag};
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;

/// Concurrent table of pending completions keyed by [`Tag`].
///
/// Every tag is registered once and extracted once. Breaking either half of
/// that pairing means the engine and this table disagree about which
/// operations are in flight, and both [`CompletionRegistry::register`] and
/// [`CompletionRegistry::extract`] panic rather than guess.
///
/// Registrations and extractions on distinct tags proceed concurrently; the
/// map is sharded and needs no outer lock.
///
/// Each entry sits behind its own uncontended mutex so the table is `Sync`
/// while continuations only need to be `Send`.
#[derive(Debug)]
pub struct CompletionRegistry {
    entries: DashMap<Tag, Mutex<CompletionEntry>>,
    stats: Arc<DebugStats>,
}

impl CompletionRegistry {
    pub fn new(stats: Arc<DebugStats>) -> Self {
        Self {
            entries: DashMap::new(),
            stats,
        }
    }

    /// Registers `entry` under the tag of the context it carries and returns
    /// that tag.
    ///
    /// # Panics
    ///
    /// Panics if the tag already has a pending entry.
    pub fn register(&self, entry: CompletionEntry) -> Tag {
        let tag = entry.tag();
        self.register_under(tag, entry);
        tag
    }

    /// Files `entry` under `tag`. Callers outside this module go through
    /// [`CompletionRegistry::register`], which derives `tag` from the entry.
    pub(crate) fn register_under(&self, tag: Tag, entry: CompletionEntry) {
        match self.entries.entry(tag) {
            Entry::Occupied(_) => {
                panic!("completion for tag {tag} registered twice before delivery")
            }
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(entry));
            }
        }
        self.stats.completion_registered();
    }

    /// Registers `callback` to run with `state` when the batch submitted with
    /// `ctx` completes. Returns the tag to submit the batch with.
    pub fn register_batch_completion<S, F>(&self, ctx: BatchContext, callback: F, state: S) -> Tag
    where
        S: Send + 'static,
        F: FnOnce(bool, &mut BatchContext, S) + Send + 'static,
    {
        self.register(CompletionEntry::batch(ctx, callback, state))
    }

    /// Registers `callback` to run when the call requested with `ctx`
    /// arrives. Returns the tag to submit the request with.
    pub fn register_request_call_completion<F>(&self, ctx: RequestCallContext, callback: F) -> Tag
    where
        F: FnOnce(bool, &mut RequestCallContext) + Send + 'static,
    {
        self.register(CompletionEntry::request_call(ctx, callback))
    }

    /// Removes and returns the entry registered under `tag`.
    ///
    /// # Panics
    ///
    /// Panics if no entry is pending for `tag`: the engine delivered a tag
    /// that was never registered or was already delivered.
    pub fn extract(&self, tag: Tag) -> CompletionEntry {
        match self.try_extract(tag) {
            Some(entry) => entry,
            None => panic!("no pending completion for tag {tag}; unknown or already delivered"),
        }
    }

    /// Removes and returns the entry registered under `tag`, if any.
    pub fn try_extract(&self, tag: Tag) -> Option<CompletionEntry> {
        let (_, entry) = self.entries.remove(&tag)?;
        self.stats.completion_extracted();
        Some(entry.into_inner())
    }

    /// Number of completions registered but not yet extracted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
