//! Stabilization loop
//!
//! A single solve only sees a stale snapshot: another caller may be about to
//! create a rule at the same "next free" priority. The loop re-reads the
//! listener after a quiet interval and only returns once two consecutive
//! reads solve to the same value.
//!
//! ```text
//! a = solve(read)
//! loop:
//!     sleep(interval)        <- only suspension point, never blocks the runtime
//!     b = solve(read)
//!     if a == b: return a
//!     a = b
//! ```
//!
//! This narrows the race window, it does not close it. Two callers that both
//! converge before either creates its rule still get the same priority; the
//! rule store rejects the second create.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::solver::solve;
use crate::traits::RuleStore;

/// Default quiet interval between the two reads (seconds)
pub const DEFAULT_STABILIZATION_INTERVAL_SECS: u64 = 5;

/// Read, solve and re-read `listener_id` until two consecutive reads agree
///
/// There is no retry bound: a listener under constant allocation pressure can
/// keep this looping. Wrap the call in a timeout when a deadline is needed.
pub async fn stabilize<S>(store: &S, listener_id: &str, interval: Duration) -> Result<u32>
where
    S: RuleStore + ?Sized,
{
    let start = Instant::now();
    let snapshot = store.read(listener_id).await?;
    let mut preliminary = solve(&snapshot);
    let mut rounds: u32 = 1;

    debug!(
        listener = %listener_id,
        priority = preliminary,
        rules = snapshot.len(),
        observed_at = %snapshot.observed_at(),
        "Preliminary next free priority"
    );

    loop {
        tokio::time::sleep(interval).await;

        let snapshot = store.read(listener_id).await?;
        let confirmed = solve(&snapshot);

        if confirmed == preliminary {
            info!(
                listener = %listener_id,
                priority = confirmed,
                rounds,
                observed_at = %snapshot.observed_at(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "Next free priority is stable"
            );
            return Ok(confirmed);
        }

        warn!(
            listener = %listener_id,
            previous = preliminary,
            current = confirmed,
            rounds,
            observed_at = %snapshot.observed_at(),
            "Next free priority moved between reads, re-checking"
        );

        preliminary = confirmed;
        rounds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocationError;
    use crate::memory::{ScriptedRuleStore, StaticRuleStore};
    use crate::types::Rule;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_secs(5);

    fn hosts(priorities: &[u32]) -> Vec<Rule> {
        priorities
            .iter()
            .map(|p| Rule::for_host(*p, format!("svc-{}.example.com", p)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_listener_stabilizes_after_one_interval() {
        let store = ScriptedRuleStore::from_listings(vec![hosts(&[1, 2, 4])]);
        let start = Instant::now();

        let priority = stabilize(&store, "listener-a", INTERVAL).await.unwrap();

        assert_eq!(priority, 3);
        assert_eq!(store.reads(), 2);
        assert!(start.elapsed() >= INTERVAL && start.elapsed() < INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moving_listener_is_re_read_until_two_reads_agree() {
        // Another caller takes 3, then 4, then the listener goes quiet
        let store = ScriptedRuleStore::from_listings(vec![
            hosts(&[1, 2]),
            hosts(&[1, 2, 3]),
            hosts(&[1, 2, 3, 4]),
            hosts(&[1, 2, 3, 4]),
        ]);

        let priority = stabilize(&store, "listener-a", INTERVAL).await.unwrap();

        assert_eq!(priority, 5);
        assert_eq!(store.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_created_during_wait_is_not_returned() {
        let store = Arc::new(StaticRuleStore::new().with_rules("listener-a", hosts(&[1])));

        let competitor = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                store.insert("listener-a", Rule::for_host(2, "rival.example.com")).await;
            })
        };

        let priority = stabilize(store.as_ref(), "listener-a", INTERVAL).await.unwrap();
        competitor.await.unwrap();

        assert_eq!(priority, 3);
        assert_eq!(store.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_deleted_during_wait_lowers_priority() {
        let store = Arc::new(StaticRuleStore::new().with_rules("listener-a", hosts(&[1, 2, 3])));

        let cleanup = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                store.remove_priority("listener-a", 2).await
            })
        };

        let priority = stabilize(store.as_ref(), "listener-a", INTERVAL).await.unwrap();

        assert_eq!(cleanup.await.unwrap(), 1);
        assert_eq!(priority, 2);
        assert_eq!(store.reads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_stabilize_concurrently() {
        let store = StaticRuleStore::new()
            .with_rules("listener-a", hosts(&[1]))
            .with_rules("listener-b", hosts(&[2]));
        let start = Instant::now();

        let (a, b) = tokio::join!(
            stabilize(&store, "listener-a", INTERVAL),
            stabilize(&store, "listener-b", INTERVAL),
        );

        assert_eq!(a.unwrap(), 2);
        assert_eq!(b.unwrap(), 1);
        // Both waits overlap instead of running back to back
        assert!(start.elapsed() < INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_propagates() {
        let store = ScriptedRuleStore::new(vec![
            Ok(hosts(&[1])),
            Err(AllocationError::upstream("connection reset")),
        ]);

        let err = stabilize(&store, "listener-a", INTERVAL).await.unwrap_err();

        assert_eq!(err, AllocationError::upstream("connection reset"));
    }
}
