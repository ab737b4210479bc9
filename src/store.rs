//! In-process store.
//!
//! [`MemoryStore`] keeps quota tables and throttle counters behind one mutex and runs the
//! whole admission sequence while holding it, which gives the same all-or-nothing
//! behavior a server-side script gives a shared store. State is local to the process:
//! use it for tests, single-instance deployments, or as a reference implementation.
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance past a
//! throttle window.

use crate::admin::AdminStore;
use crate::engine::{apply_admission, AdmissionCall, AdmissionStore, AdmissionTxn, StoreReply};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Counter {
    hits: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    // table key -> token -> raw quota
    tables: HashMap<String, HashMap<String, i64>>,
    counters: HashMap<String, Counter>,
}

impl State {
    fn purge_expired(&mut self, now: Instant) {
        self.counters.retain(|_, c| c.is_live(now));
    }
}

/// Shared-nothing-across-processes store; cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    /// Current value of a live throttle counter.
    pub fn throttle_hits(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let guard = self.lock().ok()?;
        guard.counters.get(key).filter(|c| c.is_live(now)).map(|c| c.hits)
    }

    /// Time left before a throttle counter expires.
    pub fn throttle_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let guard = self.lock().ok()?;
        guard
            .counters
            .get(key)
            .filter(|c| c.is_live(now))
            .and_then(|c| c.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether a key (non-empty quota table or live counter) exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let Ok(mut guard) = self.lock() else {
            return Vec::new();
        };
        guard.purge_expired(now);
        let mut keys: Vec<String> = guard
            .tables
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(k, _)| k.clone())
            .chain(guard.counters.keys().cloned())
            .collect();
        keys.sort();
        keys
    }
}

struct Txn<'a> {
    state: &'a mut State,
    now: Instant,
}

impl AdmissionTxn for Txn<'_> {
    fn quota(&mut self, table: &str, token: &str) -> Option<i64> {
        self.state.tables.get(table).and_then(|t| t.get(token)).copied()
    }

    fn set_quota(&mut self, table: &str, token: &str, value: i64) {
        self.state.tables.entry(table.to_string()).or_default().insert(token.to_string(), value);
    }

    fn incr(&mut self, key: &str) -> u64 {
        let now = self.now;
        let counter = self
            .state
            .counters
            .entry(key.to_string())
            .and_modify(|c| {
                if !c.is_live(now) {
                    *c = Counter { hits: 0, expires_at: None };
                }
            })
            .or_insert(Counter { hits: 0, expires_at: None });
        counter.hits += 1;
        counter.hits
    }

    fn expire(&mut self, key: &str, secs: u64) {
        if let Some(counter) = self.state.counters.get_mut(key) {
            counter.expires_at = Some(self.now + Duration::from_secs(secs));
        }
    }
}

#[async_trait]
impl AdmissionStore for MemoryStore {
    async fn read_and_commit(&self, call: &AdmissionCall) -> Result<StoreReply, StoreError> {
        let mut guard = self.lock()?;
        let mut txn = Txn { state: &mut *guard, now: Instant::now() };
        Ok(apply_admission(&mut txn, call))
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn set_limits(&self, table: &str, limits: &[(String, i64)]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let entries = guard.tables.entry(table.to_string()).or_default();
        for (token, raw) in limits {
            entries.insert(token.clone(), *raw);
        }
        Ok(())
    }

    async fn remove_limits(&self, table: &str, tokens: &[String]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if let Some(entries) = guard.tables.get_mut(table) {
            for token in tokens {
                entries.remove(token);
            }
        }
        Ok(())
    }

    async fn get_limit(&self, table: &str, token: &str) -> Result<Option<i64>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.tables.get(table).and_then(|t| t.get(token)).copied())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        guard.purge_expired(now);
        let before = guard.tables.values().filter(|t| !t.is_empty()).count() + guard.counters.len();
        guard.tables.retain(|k, t| !k.starts_with(prefix) && !t.is_empty());
        guard.counters.retain(|k, _| !k.starts_with(prefix));
        let after = guard.tables.len() + guard.counters.len();
        Ok(u64::try_from(before.saturating_sub(after)).unwrap_or(u64::MAX))
    }
}
