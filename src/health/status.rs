// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of a single check or of the whole system.
///
/// Variants are declared in criticality order, so the derived `Ord` gives
/// `Up < Unknown < Down`. An unresolved check therefore poisons the aggregate
/// the same way a failing one does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Up,
    #[default]
    Unknown,
    Down,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::Up => "up",
            AvailabilityStatus::Unknown => "unknown",
            AvailabilityStatus::Down => "down",
        }
    }

    pub fn is_up(self) -> bool {
        self == AvailabilityStatus::Up
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most critical verdict across `statuses`. An empty set aggregates to `Up`.
pub fn aggregate<I>(statuses: I) -> AvailabilityStatus
where
    I: IntoIterator<Item = AvailabilityStatus>,
{
    statuses
        .into_iter()
        .max()
        .unwrap_or(AvailabilityStatus::Up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use AvailabilityStatus::*;

    fn status_strategy() -> impl Strategy<Value = AvailabilityStatus> {
        prop_oneof![Just(Up), Just(Unknown), Just(Down)]
    }

    #[test]
    fn test_ordering_follows_criticality() {
        assert!(Down > Unknown);
        assert!(Unknown > Up);
    }

    #[test]
    fn test_unknown_wins_over_up() {
        assert_eq!(aggregate([Up, Unknown, Up]), Unknown);
    }

    #[test]
    fn test_down_wins_over_unknown() {
        assert_eq!(aggregate([Unknown, Down, Up]), Down);
    }

    #[test]
    fn test_empty_aggregates_to_up() {
        assert_eq!(aggregate(std::iter::empty()), Up);
    }

    #[test]
    fn test_aggregate_is_monotonic() {
        let all = [Up, Unknown, Down];
        for a in all {
            for b in all {
                for replacement in all.iter().copied().filter(|r| *r > a) {
                    assert!(aggregate([replacement, b]) >= aggregate([a, b]));
                }
            }
        }
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Down).unwrap(), "\"down\"");
        assert_eq!(Unknown.to_string(), "unknown");
    }

    proptest! {
        #[test]
        fn aggregate_is_most_critical_member(statuses in prop::collection::vec(status_strategy(), 1..32)) {
            let expected = statuses.iter().copied().max().unwrap();
            prop_assert_eq!(aggregate(statuses), expected);
        }

        /// Making any one verdict more critical never lowers the aggregate.
        #[test]
        fn aggregate_is_monotonic_under_escalation(
            statuses in prop::collection::vec(status_strategy(), 1..32),
            index in any::<prop::sample::Index>(),
            replacement in status_strategy(),
        ) {
            let i = index.index(statuses.len());
            prop_assume!(replacement > statuses[i]);

            let mut escalated = statuses.clone();
            escalated[i] = replacement;
            prop_assert!(aggregate(escalated) >= aggregate(statuses));
        }
    }
}
