//! Selection policy: given the eligible users for one opportunity, choose
//! who actually receives it on this tick.
//!
//! Three phases:
//!   1. per-tier quotas proportional to the tier multipliers, consumed
//!      round-robin from each tier's cursor;
//!   2. an activity-boost pass that re-admits recently-active users into
//!      any capacity the quotas left unused;
//!   3. a final fill pass so capacity is never wasted while eligible users
//!      remain.

use std::collections::HashSet;

use uuid::Uuid;

use crate::state::DistributionState;
use crate::types::{TierClass, TierMultipliers};

/// Eligible users of one tier class, in a stable order.
#[derive(Debug, Clone, Default)]
pub struct TierBucket {
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct EligibleSet {
    pub free: TierBucket,
    pub premium: TierBucket,
    pub auto: TierBucket,
    pub enterprise: TierBucket,
}

impl EligibleSet {
    pub fn bucket(&self, class: TierClass) -> &TierBucket {
        match class {
            TierClass::Free => &self.free,
            TierClass::Premium => &self.premium,
            TierClass::Auto => &self.auto,
            TierClass::Enterprise => &self.enterprise,
        }
    }

    pub fn bucket_mut(&mut self, class: TierClass) -> &mut TierBucket {
        match class {
            TierClass::Free => &mut self.free,
            TierClass::Premium => &mut self.premium,
            TierClass::Auto => &mut self.auto,
            TierClass::Enterprise => &mut self.enterprise,
        }
    }

    pub fn push(&mut self, class: TierClass, user: Uuid) {
        self.bucket_mut(class).users.push(user);
    }

    pub fn len(&self) -> usize {
        TierClass::ALL.iter().map(|c| self.bucket(*c).users.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Take up to `take` users from `bucket` starting at the tier's cursor,
/// skipping anyone already selected, and advance the cursor.
fn take_round_robin(
    bucket: &TierBucket,
    class: TierClass,
    take: usize,
    state: &mut DistributionState,
    selected: &mut Vec<Uuid>,
    seen: &mut HashSet<Uuid>,
) {
    let n = bucket.users.len();
    if n == 0 || take == 0 {
        return;
    }

    let mut idx = state.cursor(class) % n;
    let mut taken = 0;

    for _ in 0..n {
        if taken >= take {
            break;
        }
        let user = bucket.users[idx];
        idx = (idx + 1) % n;

        if seen.insert(user) {
            selected.push(user);
            taken += 1;
        }
    }

    state.set_cursor(class, idx);
}

/// Select up to `capacity` recipients.
pub fn select_recipients(
    eligible: &EligibleSet,
    capacity: usize,
    multipliers: &TierMultipliers,
    boosted: &HashSet<Uuid>,
    state: &mut DistributionState,
) -> Vec<Uuid> {
    let mut selected = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    if capacity == 0 || eligible.is_empty() {
        return selected;
    }

    // Phase 1: proportional quotas, highest tier first.
    let total_weight: f64 = TierClass::ALL
        .iter()
        .filter(|c| !eligible.bucket(**c).users.is_empty())
        .map(|c| multipliers.for_class(*c))
        .sum();

    if total_weight > 0.0 {
        for class in TierClass::ALL {
            let bucket = eligible.bucket(class);
            if bucket.users.is_empty() {
                continue;
            }
            let share = multipliers.for_class(class) / total_weight;
            let quota = ((capacity as f64 * share).floor() as usize).max(1);
            let room = capacity.saturating_sub(selected.len());

            take_round_robin(bucket, class, quota.min(room), state, &mut selected, &mut seen);
            if selected.len() >= capacity {
                return selected;
            }
        }
    }

    // Phase 2: re-admit recently-active users into leftover capacity.
    for class in TierClass::ALL {
        let bucket = eligible.bucket(class);
        for &user in &bucket.users {
            if selected.len() >= capacity {
                return selected;
            }
            if boosted.contains(&user) && seen.insert(user) {
                selected.push(user);
            }
        }
    }

    // Phase 3: plain fill so capacity is not wasted.
    for class in TierClass::ALL {
        let bucket = eligible.bucket(class);
        for &user in &bucket.users {
            if selected.len() >= capacity {
                return selected;
            }
            if seen.insert(user) {
                selected.push(user);
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn capacity_is_a_hard_cap() {
        let mut set = EligibleSet::default();
        for u in users(10) {
            set.push(TierClass::Free, u);
        }

        let mut state = DistributionState::new();
        let out = select_recipients(
            &set,
            3,
            &TierMultipliers::default(),
            &HashSet::new(),
            &mut state,
        );
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn no_user_is_selected_twice() {
        let mut set = EligibleSet::default();
        let ids = users(4);
        for &u in &ids {
            set.push(TierClass::Premium, u);
        }

        let mut state = DistributionState::new();
        let out = select_recipients(
            &set,
            10,
            &TierMultipliers::default(),
            &HashSet::new(),
            &mut state,
        );

        assert_eq!(out.len(), 4);
        let unique: HashSet<_> = out.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn round_robin_rotates_across_ticks() {
        let mut set = EligibleSet::default();
        let ids = users(3);
        for &u in &ids {
            set.push(TierClass::Free, u);
        }

        let mut state = DistributionState::new();
        let multipliers = TierMultipliers::default();

        let first = select_recipients(&set, 1, &multipliers, &HashSet::new(), &mut state);
        let second = select_recipients(&set, 1, &multipliers, &HashSet::new(), &mut state);
        let third = select_recipients(&set, 1, &multipliers, &HashSet::new(), &mut state);

        assert_eq!(first[0], ids[0]);
        assert_eq!(second[0], ids[1]);
        assert_eq!(third[0], ids[2]);
    }

    #[test]
    fn higher_tiers_get_larger_shares() {
        let mut set = EligibleSet::default();
        let free = users(10);
        let enterprise = users(10);
        for &u in &free {
            set.push(TierClass::Free, u);
        }
        for &u in &enterprise {
            set.push(TierClass::Enterprise, u);
        }

        let mut state = DistributionState::new();
        let out = select_recipients(
            &set,
            8,
            &TierMultipliers::default(),
            &HashSet::new(),
            &mut state,
        );

        let enterprise_set: HashSet<_> = enterprise.iter().collect();
        let enterprise_count = out.iter().filter(|u| enterprise_set.contains(u)).count();
        let free_count = out.len() - enterprise_count;

        assert_eq!(out.len(), 8);
        assert!(
            enterprise_count > free_count,
            "enterprise {enterprise_count} should exceed free {free_count}"
        );
    }

    #[test]
    fn boost_pass_fills_leftover_capacity_with_active_users() {
        let mut set = EligibleSet::default();
        let enterprise = users(1);
        let free = users(4);
        set.push(TierClass::Enterprise, enterprise[0]);
        for &u in &free {
            set.push(TierClass::Free, u);
        }

        // Quotas: enterprise takes its one user, free's minimum quota takes
        // one more; a slot is left over and the boosted user must win it
        // ahead of the plain fill.
        let boosted: HashSet<Uuid> = [free[3]].into_iter().collect();

        let mut state = DistributionState::new();
        let out = select_recipients(&set, 3, &TierMultipliers::default(), &boosted, &mut state);

        assert_eq!(out.len(), 3);
        assert!(out.contains(&enterprise[0]));
        assert!(out.contains(&free[0]), "free cursor starts at the head");
        assert!(out.contains(&free[3]), "boosted user re-admitted: {out:?}");
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let mut state = DistributionState::new();
        let out = select_recipients(
            &EligibleSet::default(),
            5,
            &TierMultipliers::default(),
            &HashSet::new(),
            &mut state,
        );
        assert!(out.is_empty());
    }
}
