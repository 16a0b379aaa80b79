//! Read member selection
//!
//! - `fixed-primary`: the configured primary while it is healthy, else the
//!   lowest-index healthy member. Deterministic for a given member state.
//! - `round-robin`: rotates across the healthy members.
//! - `verify-all`: reads every healthy member; the selector only supplies
//!   the member whose bytes are returned once they all agree.

use mirrorio_common::{MemberId, ReadPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct ReadSelector {
    policy: ReadPolicy,
    primary: MemberId,
    next: AtomicUsize,
}

impl ReadSelector {
    pub const fn new(policy: ReadPolicy, primary: MemberId) -> Self {
        Self {
            policy,
            primary,
            next: AtomicUsize::new(0),
        }
    }

    pub const fn policy(&self) -> ReadPolicy {
        self.policy
    }

    pub const fn primary(&self) -> MemberId {
        self.primary
    }

    /// Pick the member to serve a read from `healthy` (slot order)
    pub fn select(&self, healthy: &[MemberId]) -> Option<MemberId> {
        if healthy.is_empty() {
            return None;
        }
        match self.policy {
            ReadPolicy::RoundRobin => {
                let idx = self.next.fetch_add(1, Ordering::Relaxed) % healthy.len();
                Some(healthy[idx])
            }
            ReadPolicy::FixedPrimary | ReadPolicy::VerifyAll => {
                if healthy.contains(&self.primary) {
                    Some(self.primary)
                } else {
                    healthy.first().copied()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[usize]) -> Vec<MemberId> {
        v.iter().copied().map(MemberId::new).collect()
    }

    #[test]
    fn test_fixed_primary() {
        let selector = ReadSelector::new(ReadPolicy::FixedPrimary, MemberId::new(1));
        for _ in 0..4 {
            assert_eq!(selector.select(&ids(&[0, 1])), Some(MemberId::new(1)));
        }
        // primary degraded: lowest healthy, consistently
        for _ in 0..4 {
            assert_eq!(selector.select(&ids(&[0, 2])), Some(MemberId::new(0)));
        }
    }

    #[test]
    fn test_round_robin_skips_degraded() {
        let selector = ReadSelector::new(ReadPolicy::RoundRobin, MemberId::new(0));
        let picks: Vec<_> = (0..4).map(|_| selector.select(&ids(&[0, 1])).unwrap()).collect();
        assert_eq!(picks, ids(&[0, 1, 0, 1]));

        for _ in 0..3 {
            assert_eq!(selector.select(&ids(&[1])), Some(MemberId::new(1)));
        }
    }

    #[test]
    fn test_no_healthy_member() {
        let selector = ReadSelector::new(ReadPolicy::RoundRobin, MemberId::new(0));
        assert_eq!(selector.select(&[]), None);
    }
}
