use super::{CompletionEvent, CompletionQueue};
use crate::{Condvar, Mutex, Tag};
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<(Tag, bool)>,
    in_flight: usize,
    shutdown: bool,
}

/// In-process completion queue.
///
/// Plays the part of the native engine for tests, benchmarks and the load
/// generator. Operations are either completed immediately with
/// [`LocalCompletionQueue::post`] or submitted with
/// [`LocalCompletionQueue::begin`] and completed later with
/// [`LocalCompletionQueue::finish`]. Shutdown events are withheld until every
/// begun operation has finished, as a native queue would.
#[derive(Debug, Default)]
pub struct LocalCompletionQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl LocalCompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits and completes an operation in one step.
    ///
    /// # Panics
    ///
    /// Panics if the queue has been shut down.
    pub fn post(&self, tag: Tag, success: bool) {
        let mut state = self.state.lock();
        assert!(
            !state.shutdown,
            "operation {tag} submitted to a shut down completion queue"
        );
        state.ready.push_back((tag, success));
        drop(state);
        self.cond.notify_one();
    }

    /// Records an operation that will be completed later with
    /// [`LocalCompletionQueue::finish`].
    ///
    /// # Panics
    ///
    /// Panics if the queue has been shut down.
    pub fn begin(&self) {
        let mut state = self.state.lock();
        assert!(
            !state.shutdown,
            "operation submitted to a shut down completion queue"
        );
        state.in_flight += 1;
    }

    /// Completes an operation previously recorded with
    /// [`LocalCompletionQueue::begin`].
    ///
    /// # Panics
    ///
    /// Panics if no operation is in flight.
    pub fn finish(&self, tag: Tag, success: bool) {
        let mut state = self.state.lock();
        assert!(
            state.in_flight > 0,
            "operation {tag} finished without a matching begin"
        );
        state.in_flight -= 1;
        state.ready.push_back((tag, success));
        let drained = state.shutdown && state.in_flight == 0;
        drop(state);

        if drained {
            self.cond.notify_all();
        } else {
            self.cond.notify_one();
        }
    }

    /// Operations begun but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Completions waiting to be popped.
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

impl CompletionQueue for LocalCompletionQueue {
    fn next(&self) -> CompletionEvent {
        let mut state = self.state.lock();
        loop {
            if let Some((tag, success)) = state.ready.pop_front() {
                return CompletionEvent::OpComplete { tag, success };
            }
            if state.shutdown && state.in_flight == 0 {
                return CompletionEvent::Shutdown;
            }
            self.cond.wait(&mut state);
        }
    }

    fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn tag(raw: usize) -> Tag {
        Tag::from_raw(raw).unwrap()
    }

    #[test]
    fn events_are_fifo() {
        let queue = LocalCompletionQueue::new();
        queue.post(tag(1), true);
        queue.post(tag(2), false);

        assert_eq!(
            queue.next(),
            CompletionEvent::OpComplete {
                tag: tag(1),
                success: true
            }
        );
        assert_eq!(
            queue.next(),
            CompletionEvent::OpComplete {
                tag: tag(2),
                success: false
            }
        );
    }

    #[test]
    fn shutdown_drains_ready_events_first() {
        let queue = LocalCompletionQueue::new();
        queue.post(tag(1), true);
        queue.shutdown();

        assert!(matches!(queue.next(), CompletionEvent::OpComplete { .. }));
        assert_eq!(queue.next(), CompletionEvent::Shutdown);
        assert_eq!(queue.next(), CompletionEvent::Shutdown);
    }

    #[test]
    fn shutdown_waits_for_in_flight_operations() {
        let queue = Arc::new(LocalCompletionQueue::new());
        queue.begin();
        queue.shutdown();

        let finisher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.finish(tag(9), false);
            })
        };

        assert_eq!(
            queue.next(),
            CompletionEvent::OpComplete {
                tag: tag(9),
                success: false
            }
        );
        assert_eq!(queue.next(), CompletionEvent::Shutdown);
        assert_eq!(queue.in_flight(), 0);
        finisher.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "shut down completion queue")]
    fn post_after_shutdown_panics() {
        let queue = LocalCompletionQueue::new();
        queue.shutdown();
        queue.post(tag(1), true);
    }

    #[test]
    #[should_panic(expected = "without a matching begin")]
    fn finish_without_begin_panics() {
        let queue = LocalCompletionQueue::new();
        queue.finish(tag(1), true);
    }
}
