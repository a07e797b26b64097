//! Power-of-two-choices load balancer
//!
//! Each pick samples two distinct members uniformly at random and routes to
//! the one with fewer requests in flight. No central queue, no coordination
//! beyond one atomic counter per member.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

use voluspa_common::{ScrapeError, ScrapeResult};

pub struct P2cBalancer {
    loads: Vec<AtomicUsize>,
}

impl P2cBalancer {
    pub fn new(size: usize) -> ScrapeResult<Self> {
        if size == 0 {
            return Err(ScrapeError::Config(
                "load balancer needs at least one member".into(),
            ));
        }
        Ok(Self {
            loads: (0..size).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.loads.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }

    /// Requests currently in flight on `index`.
    #[inline]
    #[must_use]
    pub fn load(&self, index: usize) -> usize {
        self.loads[index].load(Ordering::Relaxed)
    }

    /// Choose a member without reserving it.
    #[must_use]
    pub fn pick(&self) -> usize {
        self.pick_with(&mut rand::thread_rng())
    }

    /// Choose a member using the supplied RNG. Ties go to the first sample.
    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let n = self.loads.len();
        if n == 1 {
            return 0;
        }

        let first = rng.gen_range(0..n);
        let mut second = rng.gen_range(0..n - 1);
        if second >= first {
            second += 1;
        }

        if self.load(second) < self.load(first) {
            second
        } else {
            first
        }
    }

    /// Pick a member and count the request against it until the guard drops.
    #[must_use]
    pub fn acquire(&self) -> LoadGuard<'_> {
        let index = self.pick();
        self.loads[index].fetch_add(1, Ordering::Relaxed);
        LoadGuard {
            balancer: self,
            index,
        }
    }
}

/// In-flight reservation on one pool member.
pub struct LoadGuard<'a> {
    balancer: &'a P2cBalancer,
    index: usize,
}

impl LoadGuard<'_> {
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.balancer.loads[self.index].fetch_sub(1, Ordering::Relaxed);
    }
}
