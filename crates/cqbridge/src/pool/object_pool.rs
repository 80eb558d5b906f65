//! Two-tier object pool.
//!
//! Each thread keeps a bounded private queue of free items. A shared queue
//! guarded by a single mutex backstops every thread. The shared lock is the
//! only place where items cross threads, and the pool works hard to touch it
//! rarely:
//!
//! - A lease that finds the local queue empty takes the lock once, keeps one
//!   item and moves up to `rent_limit` more into the local queue.
//! - If the shared queue could not supply `rent_limit` items, the shortfall
//!   is credited to a local *create budget*. The next leases fabricate new
//!   items instead of taking the lock again.
//! - Returns mirror this with a *dispose budget*: when the shared queue is
//!   full, the next returns drop items locally instead of retrying the lock.
//!
//! Capacity limits bound caching only. A lease never fails.

use crate::Mutex;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use thread_local::ThreadLocal;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Per-thread tier: free items plus the lock-avoidance budgets.
struct LocalTier<T> {
    queue: VecDeque<T>,
    /// Leases allowed to fabricate without consulting the shared queue.
    create_budget: usize,
    /// Returns allowed to dispose without consulting the shared queue.
    dispose_budget: usize,
}

impl<T> LocalTier<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            create_budget: 0,
            dispose_budget: 0,
        }
    }
}

/// A pool of reusable items with a lock-free thread-local fast path.
///
/// Disposing an item means dropping it; items that own native resources
/// release them in their `Drop` impl.
pub struct ObjectPool<T: Send> {
    factory: Factory<T>,
    shared: Mutex<VecDeque<T>>,
    shared_capacity: usize,
    local: ThreadLocal<RefCell<LocalTier<T>>>,
    thread_local_capacity: usize,
    rent_limit: usize,
    disposed: AtomicBool,
}

impl<T: Send> ObjectPool<T> {
    /// Creates a pool that fabricates items with `factory`.
    ///
    /// - `shared_capacity`: maximum number of items cached in the shared tier.
    /// - `thread_local_capacity`: maximum number of items cached per thread.
    ///   Half of it is the batch size moved between tiers in one lock
    ///   acquisition.
    pub fn new<F>(factory: F, shared_capacity: usize, thread_local_capacity: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            shared: Mutex::new(VecDeque::with_capacity(shared_capacity)),
            shared_capacity,
            local: ThreadLocal::new(),
            thread_local_capacity,
            rent_limit: thread_local_capacity / 2,
            disposed: AtomicBool::new(false),
        }
    }

    fn local_tier(&self) -> &RefCell<LocalTier<T>> {
        self.local
            .get_or(|| RefCell::new(LocalTier::with_capacity(self.thread_local_capacity)))
    }

    fn check_not_disposed(&self) {
        assert!(
            !self.disposed.load(Ordering::Acquire),
            "object pool used after dispose"
        );
    }

    /// Takes an item from the pool, fabricating one if nothing is cached.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been disposed.
    pub fn lease(&self) -> T {
        self.check_not_disposed();

        let mut local = self.local_tier().borrow_mut();
        if let Some(item) = local.queue.pop_front() {
            return item;
        }
        if local.create_budget > 0 {
            local.create_budget -= 1;
            drop(local);
            return (self.factory)();
        }

        let mut moved = 0;
        let leased = {
            let mut shared = self.shared.lock();
            let leased = shared.pop_front();
            while moved < self.rent_limit {
                let Some(item) = shared.pop_front() else {
                    break;
                };
                local.queue.push_back(item);
                moved += 1;
            }
            leased
        };

        // The shared queue could not fill the local tier. Fabricate the
        // shortfall on later leases instead of coming back to the lock.
        local.create_budget += self.rent_limit - moved;
        drop(local);

        leased.unwrap_or_else(|| (self.factory)())
    }

    /// Gives an item back to the pool, disposing it if every tier is full.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been disposed.
    pub fn put_back(&self, item: T) {
        if self.try_put_back(item).is_some() {
            panic!("object pool used after dispose");
        }
    }

    /// Like [`ObjectPool::put_back`], but disposes the item instead of
    /// panicking when the pool has already been disposed, including by a
    /// concurrent [`ObjectPool::dispose`].
    pub fn put_back_or_dispose(&self, item: T) {
        drop(self.try_put_back(item));
    }

    /// Hands the item back unless the pool is disposed, in which case the
    /// item is returned to the caller untouched.
    fn try_put_back(&self, item: T) -> Option<T> {
        if self.is_disposed() {
            return Some(item);
        }

        let mut local = self.local_tier().borrow_mut();
        if local.queue.len() < self.thread_local_capacity {
            local.queue.push_back(item);
            return None;
        }
        if local.dispose_budget > 0 {
            local.dispose_budget -= 1;
            drop(local);
            drop(item);
            return None;
        }

        let return_limit = self.rent_limit + 1;
        let mut returned = 0;
        let mut rejected = Some(item);
        {
            let mut shared = self.shared.lock();
            // `dispose` flips the flag before draining under this lock, so a
            // disposed pool never receives items after the drain.
            if self.is_disposed() {
                drop(shared);
                drop(local);
                drop(rejected);
                return None;
            }
            if shared.len() < self.shared_capacity {
                if let Some(item) = rejected.take() {
                    shared.push_back(item);
                    returned += 1;
                }
            }
            while shared.len() < self.shared_capacity && returned < return_limit {
                let Some(surplus) = local.queue.pop_front() else {
                    break;
                };
                shared.push_back(surplus);
                returned += 1;
            }
        }

        // The shared queue could not absorb a full batch. Dispose the
        // shortfall on later returns instead of coming back to the lock.
        local.dispose_budget += return_limit - returned;

        if let Some(item) = rejected {
            local.dispose_budget -= 1;
            drop(local);
            drop(item);
        }
        None
    }

    /// Disposes every item cached in the shared tier and marks the pool as
    /// disposed. Returns the number of items disposed.
    ///
    /// Thread-local tiers are left to their owning threads (see
    /// [`ObjectPool::release_thread_cache`]); whatever they still hold is
    /// released when the pool itself is dropped. Calling this twice is a
    /// no-op.
    pub fn dispose(&self) -> usize {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let drained: Vec<T> = self.shared.lock().drain(..).collect();
        let count = drained.len();
        drop(drained);

        #[cfg(feature = "tracing")]
        tracing::debug!("Disposed {count} pooled item(s) from the shared tier");

        count
    }

    /// Disposes the items cached by the calling thread. Returns the number
    /// of items disposed.
    pub fn release_thread_cache(&self) -> usize {
        let Some(tier) = self.local.get() else {
            return 0;
        };
        let drained: Vec<T> = {
            let mut tier = tier.borrow_mut();
            tier.create_budget = 0;
            tier.dispose_budget = 0;
            tier.queue.drain(..).collect()
        };
        drained.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Items currently cached in the shared tier.
    pub fn shared_len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Items currently cached by the calling thread.
    pub fn local_len(&self) -> usize {
        self.local
            .get()
            .map_or(0, |tier| tier.borrow().queue.len())
    }

    /// `(create_budget, dispose_budget)` of the calling thread.
    #[cfg(test)]
    pub(crate) fn local_budgets(&self) -> (usize, usize) {
        self.local.get().map_or((0, 0), |tier| {
            let tier = tier.borrow();
            (tier.create_budget, tier.dispose_budget)
        })
    }

    pub const fn shared_capacity(&self) -> usize {
        self.shared_capacity
    }

    pub const fn thread_local_capacity(&self) -> usize {
        self.thread_local_capacity
    }

    /// Items moved from the shared tier into a local tier per lock
    /// acquisition.
    pub const fn rent_limit(&self) -> usize {
        self.rent_limit
    }
}

impl<T: Send> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("shared_len", &self.shared_len())
            .field("shared_capacity", &self.shared_capacity)
            .field("thread_local_capacity", &self.thread_local_capacity)
            .field("rent_limit", &self.rent_limit)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
