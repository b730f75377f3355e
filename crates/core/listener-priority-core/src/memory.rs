//! In-memory rule stores
//!
//! [`StaticRuleStore`] holds mutable per-listener rule lists, which lets a test
//! (or a dry run) play the part of a concurrent actor creating rules while an
//! allocation is stabilizing. [`ScriptedRuleStore`] replays a fixed sequence of
//! listings, one per read.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::error::{AllocationError, Result};
use crate::traits::RuleStore;
use crate::types::{Rule, Snapshot};

/// Rule store backed by a map of listener id to rules
#[derive(Debug, Default)]
pub struct StaticRuleStore {
    listeners: RwLock<HashMap<String, Vec<Rule>>>,
    reads: AtomicUsize,
}

impl StaticRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener with an initial rule list
    pub fn with_rules(mut self, listener_id: impl Into<String>, rules: Vec<Rule>) -> Self {
        self.listeners.get_mut().insert(listener_id.into(), rules);
        self
    }

    /// Add a rule, as another caller creating its rule would
    pub async fn insert(&self, listener_id: &str, rule: Rule) {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(listener_id.to_string())
            .or_default()
            .push(rule);
    }

    /// Remove every rule at `priority`, returning how many were removed
    pub async fn remove_priority(&self, listener_id: &str, priority: u32) -> usize {
        let mut listeners = self.listeners.write().await;
        match listeners.get_mut(listener_id) {
            Some(rules) => {
                let before = rules.len();
                rules.retain(|rule| rule.priority.as_number() != Some(priority));
                before - rules.len()
            }
            None => 0,
        }
    }

    /// Number of snapshots served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for StaticRuleStore {
    async fn read(&self, listener_id: &str) -> Result<Snapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let listeners = self.listeners.read().await;
        let rules = listeners.get(listener_id).ok_or_else(|| {
            AllocationError::upstream(format!("Listener {} not found", listener_id))
        })?;
        Ok(Snapshot::new(listener_id, rules.clone()))
    }
}

/// Rule store that answers each read with the next scripted listing
///
/// The final entry is repeated once the script runs out, so a store scripted
/// with a single listing behaves like a quiet listener.
#[derive(Debug)]
pub struct ScriptedRuleStore {
    script: Mutex<VecDeque<Result<Vec<Rule>>>>,
    reads: AtomicUsize,
}

impl ScriptedRuleStore {
    pub fn new(script: Vec<Result<Vec<Rule>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            reads: AtomicUsize::new(0),
        }
    }

    /// Script of successful listings only
    pub fn from_listings(listings: Vec<Vec<Rule>>) -> Self {
        Self::new(listings.into_iter().map(Ok).collect())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for ScriptedRuleStore {
    async fn read(&self, listener_id: &str) -> Result<Snapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().await;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        let rules = next.ok_or_else(|| {
            AllocationError::upstream(format!("No listing scripted for {}", listener_id))
        })??;
        Ok(Snapshot::new(listener_id, rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_store_reads_and_counts() {
        let store = StaticRuleStore::new().with_rules("listener-a", vec![Rule::for_host(1, "a")]);

        let snapshot = store.read("listener-a").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.listener_id(), "listener-a");

        store.insert("listener-a", Rule::for_host(2, "b")).await;
        assert_eq!(store.read("listener-a").await.unwrap().len(), 2);
        assert_eq!(store.remove_priority("listener-a", 1).await, 1);
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_static_store_unknown_listener() {
        let store = StaticRuleStore::new();
        let err = store.read("missing").await.unwrap_err();
        assert!(matches!(err, AllocationError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_scripted_store_repeats_last_listing() {
        let store = ScriptedRuleStore::from_listings(vec![
            vec![],
            vec![Rule::for_host(1, "a")],
        ]);

        assert!(store.read("l").await.unwrap().is_empty());
        assert_eq!(store.read("l").await.unwrap().len(), 1);
        assert_eq!(store.read("l").await.unwrap().len(), 1);
        assert_eq!(store.reads(), 3);
    }

    #[tokio::test]
    async fn test_scripted_store_replays_errors() {
        let store = ScriptedRuleStore::new(vec![
            Err(AllocationError::upstream("throttled")),
            Ok(vec![]),
        ]);

        tokio_test::assert_err!(store.read("l").await);
        tokio_test::assert_ok!(store.read("l").await);
    }
}
