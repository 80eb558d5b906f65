use core::time::Duration;
pub use parking_lot::{Condvar, Mutex};

/// A one-shot signal that any number of threads can block on.
///
/// Once [`ShutdownLatch::signal`] has been called the latch stays open: every
/// current and future waiter returns immediately.
#[derive(Debug, Default)]
pub struct ShutdownLatch {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownLatch {
    pub const fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Opens the latch. Returns `false` if it was already open.
    pub fn signal(&self) -> bool {
        let mut signaled = self.signaled.lock();
        if *signaled {
            return false;
        }
        *signaled = true;
        self.cond.notify_all();
        true
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the latch opens.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Blocks until the latch opens or `timeout` elapses. Returns whether the
    /// latch is open.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            let _ = self
                .cond
                .wait_while_for(&mut signaled, |signaled| !*signaled, timeout);
        }
        *signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn signal_is_one_shot() {
        let latch = ShutdownLatch::new();
        assert!(!latch.is_signaled());
        assert!(latch.signal());
        assert!(!latch.signal());
        assert!(latch.is_signaled());
    }

    #[test]
    fn wait_for_times_out_when_closed() {
        let latch = ShutdownLatch::new();
        assert!(!latch.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn waiter_released_by_other_thread() {
        let latch = Arc::new(ShutdownLatch::new());
        let signaller = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                latch.signal();
            })
        };

        latch.wait();
        assert!(latch.is_signaled());
        signaller.join().unwrap();
    }
}
