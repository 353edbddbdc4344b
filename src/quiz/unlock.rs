use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::RejectReason;
use super::{Tier, PERFECT_PERCENTAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierState {
    Locked,
    Unlocked,
    /// Best attempt reached 100%. Accessible but cannot be retaken.
    Perfected,
}

impl TierState {
    pub fn is_accessible(self) -> bool {
        !matches!(self, TierState::Locked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockStates(BTreeMap<Tier, TierState>);

impl UnlockStates {
    pub fn get(&self, tier: Tier) -> TierState {
        self.0.get(&tier).copied().unwrap_or(TierState::Locked)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, TierState)> + '_ {
        self.0.iter().map(|(t, s)| (*t, *s))
    }

    pub fn all_perfected(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|s| *s == TierState::Perfected)
    }

    pub fn check_startable(&self, tier: Tier) -> Result<(), RejectReason> {
        match self.get(tier) {
            TierState::Unlocked => Ok(()),
            TierState::Perfected => Err(RejectReason::AlreadyPerfected { tier }),
            TierState::Locked => {
                let previous = self.predecessor(tier).unwrap_or(tier);
                Err(RejectReason::LockedNeedPreviousPerfect { tier, previous })
            }
        }
    }

    fn predecessor(&self, tier: Tier) -> Option<Tier> {
        self.0.range(..tier).next_back().map(|(t, _)| *t)
    }

    pub fn into_map(self) -> BTreeMap<Tier, TierState> {
        self.0
    }
}

/// `tiers` is read in ascending order whatever order it is given in; a tier
/// missing from `best` has no attempts.
pub fn derive_unlock_states(tiers: &[Tier], best: &BTreeMap<Tier, f64>) -> UnlockStates {
    let mut ordered = tiers.to_vec();
    ordered.sort();
    ordered.dedup();

    let is_perfect = |tier: &Tier| best.get(tier).is_some_and(|p| *p >= PERFECT_PERCENTAGE);

    let mut states = BTreeMap::new();
    let mut previous_perfect = true;
    for tier in ordered {
        let own_perfect = is_perfect(&tier);
        let state = if own_perfect {
            TierState::Perfected
        } else if previous_perfect {
            TierState::Unlocked
        } else {
            TierState::Locked
        };
        states.insert(tier, state);
        previous_perfect = own_perfect;
    }
    UnlockStates(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn best(entries: &[(Tier, f64)]) -> BTreeMap<Tier, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn first_tier_is_always_open() {
        let states = derive_unlock_states(&Tier::ALL, &BTreeMap::new());
        assert_eq!(states.get(Tier::Easy), TierState::Unlocked);
        assert_eq!(states.get(Tier::Medium), TierState::Locked);
        assert_eq!(states.get(Tier::Pro), TierState::Locked);
    }

    #[test]
    fn perfect_easy_opens_medium() {
        let states = derive_unlock_states(&Tier::ALL, &best(&[(Tier::Easy, 100.0)]));
        assert_eq!(states.get(Tier::Easy), TierState::Perfected);
        assert_eq!(states.get(Tier::Medium), TierState::Unlocked);
        assert_eq!(states.get(Tier::Difficult), TierState::Locked);
    }

    #[test]
    fn imperfect_medium_keeps_difficult_locked() {
        let states = derive_unlock_states(
            &Tier::ALL,
            &best(&[(Tier::Easy, 100.0), (Tier::Medium, 80.0)]),
        );
        assert_eq!(states.get(Tier::Medium), TierState::Unlocked);
        assert_eq!(
            states.check_startable(Tier::Difficult),
            Err(RejectReason::LockedNeedPreviousPerfect {
                tier: Tier::Difficult,
                previous: Tier::Medium
            })
        );
    }

    #[test]
    fn perfected_tier_rejects_retake() {
        let states = derive_unlock_states(&Tier::ALL, &best(&[(Tier::Easy, 100.0)]));
        assert_eq!(
            states.check_startable(Tier::Easy),
            Err(RejectReason::AlreadyPerfected { tier: Tier::Easy })
        );
    }

    #[test]
    fn perfected_survives_a_cleared_predecessor() {
        // Easy attempts were wiped by a content change while Medium stays perfect.
        let states = derive_unlock_states(&Tier::ALL, &best(&[(Tier::Medium, 100.0)]));
        assert_eq!(states.get(Tier::Easy), TierState::Unlocked);
        assert_eq!(states.get(Tier::Medium), TierState::Perfected);
        assert_eq!(states.get(Tier::Difficult), TierState::Unlocked);
    }

    #[test]
    fn all_perfected_needs_every_tier() {
        let all: Vec<(Tier, f64)> = Tier::ALL.iter().map(|t| (*t, 100.0)).collect();
        assert!(derive_unlock_states(&Tier::ALL, &best(&all)).all_perfected());
        assert!(!derive_unlock_states(&Tier::ALL, &best(&all[..3])).all_perfected());
    }

    fn percentages() -> impl Strategy<Value = Vec<Option<f64>>> {
        proptest::collection::vec(
            proptest::option::of(prop_oneof![Just(100.0), 0.0..100.0f64]),
            Tier::ALL.len(),
        )
    }

    fn to_best(values: &[Option<f64>]) -> BTreeMap<Tier, f64> {
        Tier::ALL
            .iter()
            .zip(values)
            .filter_map(|(t, p)| p.map(|p| (*t, p)))
            .collect()
    }

    proptest! {
        #[test]
        fn locked_whenever_previous_is_imperfect(values in percentages()) {
            let states = derive_unlock_states(&Tier::ALL, &to_best(&values));
            for (i, tier) in Tier::ALL.iter().enumerate().skip(1) {
                let previous_perfect = values[i - 1].is_some_and(|p| p >= 100.0);
                let own_perfect = values[i].is_some_and(|p| p >= 100.0);
                if !previous_perfect && !own_perfect {
                    prop_assert_eq!(states.get(*tier), TierState::Locked);
                }
            }
        }

        #[test]
        fn perfecting_a_tier_never_relocks_another(values in percentages(), idx in 0..Tier::ALL.len()) {
            let before = derive_unlock_states(&Tier::ALL, &to_best(&values));
            let mut raised = values.clone();
            raised[idx] = Some(100.0);
            let after = derive_unlock_states(&Tier::ALL, &to_best(&raised));
            for tier in Tier::ALL {
                if before.get(tier).is_accessible() {
                    prop_assert!(after.get(tier).is_accessible());
                }
            }
        }
    }
}
