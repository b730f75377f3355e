//! Hostname lookup and next-free-priority solver
//!
//! Both functions are pure: they only look at a [`Snapshot`] that has already
//! been read, so the same snapshot always produces the same answer.
//!
//! ## Next free priority
//!
//! The answer is the smallest positive integer missing from the occupied set:
//!
//! ```text
//! {}                  -> 1
//! {101, 102}          -> 1   (1 is always preferred first)
//! {1}                 -> 2
//! {1, 2, 3, 101}      -> 4   (first gap)
//! {1, 2, 3}           -> 4   (max + 1 when there is no gap)
//! ```

use std::collections::BTreeSet;

use crate::types::Snapshot;

/// Priority bound to `hostname`, if any rule routes it
///
/// A rule belongs to a hostname when the first value of its first condition
/// equals the hostname exactly (case-sensitive). Rules without conditions or
/// without a numeric priority never match.
pub fn find(snapshot: &Snapshot, hostname: &str) -> Option<u32> {
    snapshot
        .rules()
        .iter()
        .filter(|rule| rule.routing_hostname() == Some(hostname))
        .find_map(|rule| rule.priority.as_number())
}

/// Lowest positive priority not used by any numeric rule in `snapshot`
pub fn solve(snapshot: &Snapshot) -> u32 {
    next_free(&snapshot.occupied())
}

/// Smallest positive integer absent from `occupied`
///
/// Walks the ascending set once. Saturates at `u32::MAX`, which is far above
/// any listener's maximum, so the bound check rejects it.
pub fn next_free(occupied: &BTreeSet<u32>) -> u32 {
    let mut candidate: u32 = 1;
    for &priority in occupied.range(1u32..) {
        if priority != candidate {
            break;
        }
        match candidate.checked_add(1) {
            Some(next) => candidate = next,
            None => return u32::MAX,
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rule, RuleCondition, RulePriority};

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    fn snapshot_of(priorities: &[u32]) -> Snapshot {
        let rules = priorities
            .iter()
            .map(|p| Rule::for_host(*p, format!("svc-{}.example.com", p)))
            .collect();
        Snapshot::new("listener-a", rules)
    }

    #[test]
    fn test_empty_set_yields_one() {
        assert_eq!(next_free(&set(&[])), 1);
        assert_eq!(solve(&snapshot_of(&[])), 1);
    }

    #[test]
    fn test_missing_one_yields_one() {
        assert_eq!(next_free(&set(&[101, 102])), 1);
        assert_eq!(next_free(&set(&[2])), 1);
        assert_eq!(next_free(&set(&[5, 9, 50_000])), 1);
    }

    #[test]
    fn test_single_rule_at_one_yields_two() {
        assert_eq!(next_free(&set(&[1])), 2);
    }

    #[test]
    fn test_first_gap_is_used() {
        let occupied = set(&[
            1, 2, 3, 4, 5, 6, 7, 101, 102, 203, 206, 207, 208, 209, 210, 212, 301, 302,
        ]);
        assert_eq!(next_free(&occupied), 8);
        assert_eq!(next_free(&set(&[1, 3])), 2);
    }

    #[test]
    fn test_consecutive_run_yields_max_plus_one() {
        assert_eq!(next_free(&set(&[1, 2, 3, 4])), 5);
        let full: BTreeSet<u32> = (1..=50_000).collect();
        assert_eq!(next_free(&full), 50_001);
    }

    #[test]
    fn test_zero_is_ignored() {
        assert_eq!(next_free(&set(&[0])), 1);
        assert_eq!(next_free(&set(&[0, 1, 2])), 3);
    }

    #[test]
    fn test_high_priorities_do_not_hide_low_gaps() {
        let top = set(&[1, u32::MAX]);
        assert_eq!(next_free(&top), 2);
    }

    #[test]
    fn test_result_is_never_occupied() {
        let cases: [&[u32]; 5] = [&[], &[1], &[2, 3], &[1, 2, 4, 5], &[1, 2, 3, 7, 8]];
        for case in cases {
            let occupied = set(case);
            assert!(!occupied.contains(&next_free(&occupied)), "case {:?}", case);
        }
    }

    #[test]
    fn test_solve_skips_default_rule() {
        let snapshot = Snapshot::new(
            "listener-a",
            vec![Rule::default_rule(), Rule::for_host(1, "a.example.com")],
        );
        assert_eq!(solve(&snapshot), 2);
    }

    #[test]
    fn test_find_exact_match() {
        let snapshot = snapshot_of(&[1, 2, 3]);
        assert_eq!(find(&snapshot, "svc-2.example.com"), Some(2));
        assert_eq!(find(&snapshot, "svc-9.example.com"), None);
    }

    #[test]
    fn test_find_is_case_sensitive() {
        let snapshot = Snapshot::new("listener-a", vec![Rule::for_host(4, "Api.example.com")]);
        assert_eq!(find(&snapshot, "api.example.com"), None);
        assert_eq!(find(&snapshot, "Api.example.com"), Some(4));
    }

    #[test]
    fn test_find_only_inspects_leading_value() {
        let snapshot = Snapshot::new(
            "listener-a",
            vec![
                Rule::new(
                    RulePriority::Numeric(10),
                    vec![RuleCondition::new(
                        Some("host-header".to_string()),
                        vec!["primary.example.com".to_string(), "alias.example.com".to_string()],
                    )],
                ),
                Rule::new(
                    RulePriority::Numeric(11),
                    vec![
                        RuleCondition::new(
                            Some("path-pattern".to_string()),
                            vec!["/static/*".to_string()],
                        ),
                        RuleCondition::host_header("other.example.com"),
                    ],
                ),
            ],
        );
        assert_eq!(find(&snapshot, "primary.example.com"), Some(10));
        assert_eq!(find(&snapshot, "alias.example.com"), None);
        assert_eq!(find(&snapshot, "other.example.com"), None);
    }

    #[test]
    fn test_find_returns_first_match() {
        let snapshot = Snapshot::new(
            "listener-a",
            vec![
                Rule::default_rule(),
                Rule::for_host(12, "dup.example.com"),
                Rule::for_host(5, "dup.example.com"),
            ],
        );
        assert_eq!(find(&snapshot, "dup.example.com"), Some(12));
    }
}
