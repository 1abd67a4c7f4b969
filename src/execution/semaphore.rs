use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Blocking counting semaphore bounding how many chunks run at once.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

/// A held permit; dropping it hands the permit back.
pub(crate) struct Permit<'a> {
    sem: &'a Semaphore,
    /// Time spent blocked before the permit was granted.
    pub waited: Duration,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut g = self.sem.lock();
        *g += 1;
        self.sem.cv.notify_one();
    }
}

impl Semaphore {
    /// `permits` is clamped to at least one.
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            cv: Condvar::new(),
        }
    }

    // The counter stays consistent even if a chunk task panicked while another thread held the
    // lock, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available.
    pub(crate) fn acquire(&self) -> Permit<'_> {
        let start = Instant::now();
        let mut blocked = false;
        let mut g = self.lock();
        while *g == 0 {
            blocked = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        Permit {
            sem: self,
            waited: if blocked { start.elapsed() } else { Duration::ZERO },
        }
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::Semaphore;
    use std::time::Duration;

    #[test]
    fn permit_is_returned_on_drop() {
        let sem = Semaphore::new(2);
        let a = sem.acquire();
        let b = sem.acquire();
        assert_eq!(sem.available(), 0);
        assert_eq!(a.waited, Duration::ZERO);
        drop(a);
        assert_eq!(sem.available(), 1);
        drop(b);
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn zero_permits_is_clamped() {
        let sem = Semaphore::new(0);
        let _p = sem.acquire();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn blocked_acquire_reports_wait() {
        let sem = Semaphore::new(1);
        std::thread::scope(|s| {
            let held = sem.acquire();
            let waiter = s.spawn(|| sem.acquire().waited);
            std::thread::sleep(Duration::from_millis(50));
            drop(held);
            assert!(waiter.join().unwrap() > Duration::ZERO);
        });
    }
}
