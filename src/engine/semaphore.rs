//! Counting semaphore with deadline waits.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Permits {
    count: usize,
    closed: bool,
}

/// Counts frames available to `poll`. Closing it wakes every waiter and makes
/// all later waits fail.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<Permits>,
    available: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self) {
        let mut permits = self.permits.lock();
        if permits.closed {
            return;
        }
        permits.count += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Take one permit without blocking.
    pub fn try_wait(&self) -> bool {
        let mut permits = self.permits.lock();
        if permits.closed || permits.count == 0 {
            return false;
        }
        permits.count -= 1;
        true
    }

    /// Take one permit, blocking for at most `timeout`. Returns `false` on
    /// timeout or once the semaphore is closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => self.wait(),
        }
    }

    /// Like [`wait_timeout`](Self::wait_timeout) with an absolute deadline.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut permits = self.permits.lock();
        loop {
            if permits.closed {
                return false;
            }
            if permits.count > 0 {
                permits.count -= 1;
                return true;
            }
            if self.available.wait_until(&mut permits, deadline).timed_out() {
                // A post may have raced the timeout.
                if permits.count > 0 && !permits.closed {
                    permits.count -= 1;
                    return true;
                }
                return false;
            }
        }
    }

    fn wait(&self) -> bool {
        let mut permits = self.permits.lock();
        while permits.count == 0 && !permits.closed {
            self.available.wait(&mut permits);
        }
        if permits.closed {
            return false;
        }
        permits.count -= 1;
        true
    }

    pub fn value(&self) -> usize {
        self.permits.lock().count
    }

    pub fn close(&self) {
        self.permits.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.lock().closed
    }
}
