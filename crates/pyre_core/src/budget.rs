//! # Particle Budget
//!
//! One global bank of particle capacity shared by every live effect.
//!
//! ## Overflow Policies
//!
//! ```text
//! request ──► remaining >= request ──► grant request
//!         │
//!         └─► shortfall ──► Reject       ──► None
//!                       ├─► Clamp        ──► grant remaining (clamped += 1)
//!                       └─► EvictOldest  ──► evict smallest ids until it fits
//! ```
//!
//! All mutation happens under a single lock. Contention is spawn/despawn
//! rate, never per-frame simulation.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{VfxError, VfxResult};

/// Default global ceiling: 1M particles.
pub const DEFAULT_GLOBAL_BUDGET: u32 = 1 << 20;

/// What to do when a request does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Deny the request.
    Reject,
    /// Grant whatever remains.
    #[default]
    Clamp,
    /// Evict the oldest allocations until the request fits.
    EvictOldest,
}

/// A granted slice of the global budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BudgetAllocation {
    /// Allocation id, unique for the allocator's lifetime.
    pub allocation_id: u64,
    /// Particles granted (may be less than requested under `Clamp`).
    pub granted_particles: u32,
}

/// Snapshot of the allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetStats {
    /// Global ceiling.
    pub total_budget: u32,
    /// Particles currently granted.
    pub used_budget: u32,
    /// Particles still available.
    pub remaining_budget: u32,
    /// Live allocations.
    pub active_allocations: u32,
    /// Requests denied since the last counter reset.
    pub rejected: u32,
    /// Requests granted with reduced capacity since the last counter reset.
    pub clamped: u32,
    /// Allocations evicted since the last counter reset.
    pub evicted: u32,
}

#[derive(Debug)]
struct BudgetInner {
    used: u32,
    /// 64-bit so it never wraps; wrapping would break age order and reuse live ids.
    next_id: u64,
    /// allocation id -> granted; ids only grow, so key order is age order.
    active: BTreeMap<u64, u32>,
    rejected: u32,
    clamped: u32,
    evicted: u32,
}

impl BudgetInner {
    fn release(&mut self, allocation_id: u64) -> bool {
        match self.active.remove(&allocation_id) {
            Some(granted) => {
                self.used -= granted;
                true
            }
            None => false,
        }
    }
}

/// Global particle budget allocator.
#[derive(Debug)]
pub struct BudgetAllocator {
    total: u32,
    policy: BudgetPolicy,
    inner: Mutex<BudgetInner>,
}

impl BudgetAllocator {
    /// Creates an allocator.
    ///
    /// # Errors
    ///
    /// Returns [`VfxError::InvalidArgument`] if `total_budget` is zero.
    pub fn new(total_budget: u32, policy: BudgetPolicy) -> VfxResult<Self> {
        if total_budget == 0 {
            return Err(VfxError::invalid_argument(
                "total_budget",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            total: total_budget,
            policy,
            inner: Mutex::new(BudgetInner {
                used: 0,
                next_id: 1,
                active: BTreeMap::new(),
                rejected: 0,
                clamped: 0,
                evicted: 0,
            }),
        })
    }

    /// Overflow policy.
    #[inline]
    #[must_use]
    pub const fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// Global ceiling.
    #[inline]
    #[must_use]
    pub const fn total_budget(&self) -> u32 {
        self.total
    }

    /// Requests `requested` particles.
    ///
    /// Under [`BudgetPolicy::EvictOldest`], `on_evict` is called with each
    /// evicted allocation id, oldest first, and must synchronously tear
    /// down the owner. The allocator releases the evicted allocation itself
    /// once the callback returns. The lock is held during the callback, so
    /// it must not call back into this allocator.
    pub fn allocate<F>(&self, requested: u32, mut on_evict: F) -> Option<BudgetAllocation>
    where
        F: FnMut(u64),
    {
        let mut inner = self.inner.lock();

        if requested == 0 {
            inner.rejected += 1;
            return None;
        }

        let granted = match self.policy {
            BudgetPolicy::Reject => {
                if requested <= self.total - inner.used {
                    requested
                } else {
                    0
                }
            }
            BudgetPolicy::Clamp => requested.min(self.total - inner.used),
            BudgetPolicy::EvictOldest => {
                while self.total - inner.used < requested {
                    let Some((&oldest, _)) = inner.active.iter().next() else {
                        break;
                    };
                    inner.evicted += 1;
                    tracing::debug!("Budget evicting allocation {} for request {}", oldest, requested);
                    on_evict(oldest);
                    inner.release(oldest);
                }
                if self.total - inner.used >= requested {
                    requested
                } else {
                    0
                }
            }
        };

        if granted == 0 {
            inner.rejected += 1;
            return None;
        }
        if granted < requested {
            inner.clamped += 1;
        }

        let allocation_id = inner.next_id;
        inner.next_id += 1;
        inner.active.insert(allocation_id, granted);
        inner.used += granted;

        Some(BudgetAllocation {
            allocation_id,
            granted_particles: granted,
        })
    }

    /// Returns an allocation to the bank. Unknown ids are ignored.
    pub fn release(&self, allocation_id: u64) {
        self.inner.lock().release(allocation_id);
    }

    /// Locked snapshot.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn stats(&self) -> BudgetStats {
        let inner = self.inner.lock();
        BudgetStats {
            total_budget: self.total,
            used_budget: inner.used,
            remaining_budget: self.total - inner.used,
            active_allocations: inner.active.len() as u32,
            rejected: inner.rejected,
            clamped: inner.clamped,
            evicted: inner.evicted,
        }
    }

    /// Zeroes the rejected/clamped/evicted counters. Cadence is up to the caller.
    pub fn reset_counters(&self) {
        let mut inner = self.inner.lock();
        inner.rejected = 0;
        inner.clamped = 0;
        inner.evicted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_evict(_: u64) {}

    #[test]
    fn test_zero_budget_is_rejected() {
        assert!(BudgetAllocator::new(0, BudgetPolicy::Clamp).is_err());
    }

    #[test]
    fn test_ids_start_at_one() {
        let b = BudgetAllocator::new(100, BudgetPolicy::Reject).expect("budget");
        let a = b.allocate(10, no_evict).expect("granted");
        assert_eq!(a.allocation_id, 1);
        assert_eq!(b.allocate(10, no_evict).map(|a| a.allocation_id), Some(2));
    }

    #[test]
    fn test_zero_request_counts_as_rejected() {
        let b = BudgetAllocator::new(100, BudgetPolicy::Clamp).expect("budget");
        assert!(b.allocate(0, no_evict).is_none());
        assert_eq!(b.stats().rejected, 1);
    }

    #[test]
    fn test_reject_never_overgrants() {
        let b = BudgetAllocator::new(100, BudgetPolicy::Reject).expect("budget");
        assert_eq!(b.allocate(100, no_evict).map(|a| a.granted_particles), Some(100));
        assert!(b.allocate(1, no_evict).is_none());

        let stats = b.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.remaining_budget, 0);
        assert_eq!(stats.clamped, 0);
    }

    #[test]
    fn test_clamp_grants_remaining() {
        let b = BudgetAllocator::new(100, BudgetPolicy::Clamp).expect("budget");
        assert_eq!(b.allocate(60, no_evict).map(|a| a.granted_particles), Some(60));
        assert_eq!(b.allocate(60, no_evict).map(|a| a.granted_particles), Some(40));

        let stats = b.stats();
        assert_eq!(stats.clamped, 1);
        assert_eq!(stats.remaining_budget, 0);

        // Exhausted: clamp rejects rather than granting zero.
        assert!(b.allocate(1, no_evict).is_none());
        assert_eq!(b.stats().rejected, 1);
    }

    #[test]
    fn test_evict_oldest_first() {
        let b = BudgetAllocator::new(200, BudgetPolicy::EvictOldest).expect("budget");
        let first = b.allocate(100, no_evict).expect("first");
        let second = b.allocate(100, no_evict).expect("second");

        let mut evicted = Vec::new();
        let third = b.allocate(100, |id| evicted.push(id)).expect("third");

        assert_eq!(evicted, vec![first.allocation_id]);
        assert_eq!(third.granted_particles, 100);
        let stats = b.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.active_allocations, 2);
        assert_eq!(stats.used_budget, 200);

        // The survivor is the next eviction victim.
        let mut next = Vec::new();
        b.allocate(50, |id| next.push(id)).expect("fourth");
        assert_eq!(next, vec![second.allocation_id]);
    }

    #[test]
    fn test_evict_partial_shortfall_evicts_until_fit() {
        let b = BudgetAllocator::new(100, BudgetPolicy::EvictOldest).expect("budget");
        for _ in 0..4 {
            b.allocate(20, no_evict).expect("granted");
        }
        // 20 remaining; need 50 -> evict ids 1 and 2.
        let mut evicted = Vec::new();
        b.allocate(50, |id| evicted.push(id)).expect("granted");
        assert_eq!(evicted, vec![1, 2]);
    }

    #[test]
    fn test_evict_fails_when_request_exceeds_total() {
        let b = BudgetAllocator::new(100, BudgetPolicy::EvictOldest).expect("budget");
        b.allocate(30, no_evict).expect("granted");
        let mut evicted = Vec::new();
        assert!(b.allocate(150, |id| evicted.push(id)).is_none());
        assert_eq!(evicted, vec![1]);
        assert_eq!(b.stats().used_budget, 0);
        assert_eq!(b.stats().rejected, 1);
    }

    #[test]
    fn test_ids_past_u32_range_keep_age_order() {
        let b = BudgetAllocator::new(100, BudgetPolicy::EvictOldest).expect("budget");
        b.inner.lock().next_id = u64::from(u32::MAX) - 1;

        let ids: Vec<u64> = (0..4)
            .map(|_| b.allocate(25, no_evict).expect("granted").allocation_id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(b.stats().active_allocations, 4);

        let mut evicted = Vec::new();
        b.allocate(25, |id| evicted.push(id)).expect("granted");
        assert_eq!(evicted, vec![ids[0]]);
        assert_eq!(b.stats().used_budget, 100);
    }

    #[test]
    fn test_release_is_idempotent() {
        let b = BudgetAllocator::new(100, BudgetPolicy::Reject).expect("budget");
        let a = b.allocate(40, no_evict).expect("granted");
        b.release(a.allocation_id);
        b.release(a.allocation_id);
        b.release(999);
        assert_eq!(b.stats().used_budget, 0);
        assert_eq!(b.stats().active_allocations, 0);
    }

    #[test]
    fn test_counters_reset_only_on_request() {
        let b = BudgetAllocator::new(10, BudgetPolicy::Reject).expect("budget");
        assert!(b.allocate(11, no_evict).is_none());
        assert!(b.allocate(11, no_evict).is_none());
        assert_eq!(b.stats().rejected, 2);
        b.reset_counters();
        assert_eq!(b.stats().rejected, 0);
    }
}
