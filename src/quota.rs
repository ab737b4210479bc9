//! Quota records, admin-side limits and the key namespace they live under.
//!
//! Stores hold quotas as signed integers (`-1` meaning unlimited) and signal a missing
//! record by absence. [`Quota`] turns that encoding into an explicit tagged value so
//! "unlimited" and "no record" can never be confused.

use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;

/// Raw stored value for a quota that is never decremented.
pub const UNLIMITED: i64 = -1;

/// Identity used for requests without a token when anonymous access is allowed.
pub const ANONYMOUS: &str = "anonymous";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "_tollbooth";

/// Decoded state of a token's quota record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// No record: the token is unauthorized.
    Missing,
    /// Never decremented, never exhausted.
    Unlimited,
    /// Zero (or a negative value other than [`UNLIMITED`]) requests left.
    Exhausted,
    /// Requests left, always positive.
    Remaining(u64),
}

impl Quota {
    /// Decode the raw stored value.
    pub fn from_raw(raw: Option<i64>) -> Self {
        match raw {
            None => Quota::Missing,
            Some(UNLIMITED) => Quota::Unlimited,
            Some(n) if n <= 0 => Quota::Exhausted,
            Some(n) => Quota::Remaining(n.unsigned_abs()),
        }
    }

    /// Whether a request for this quota could be admitted (throttling aside).
    pub fn admits(self) -> bool {
        matches!(self, Quota::Unlimited | Quota::Remaining(_))
    }
}

/// Admin-side value for a token's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum Limit {
    Unlimited,
    Requests(u64),
}

impl Limit {
    /// Encoding written to the store.
    pub fn to_raw(self) -> i64 {
        match self {
            Limit::Unlimited => UNLIMITED,
            Limit::Requests(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

impl From<i64> for Limit {
    /// Negative values other than [`UNLIMITED`] clamp to zero requests.
    fn from(raw: i64) -> Self {
        match raw {
            UNLIMITED => Limit::Unlimited,
            n => Limit::Requests(u64::try_from(n).unwrap_or(0)),
        }
    }
}

impl From<u64> for Limit {
    fn from(n: u64) -> Self {
        Limit::Requests(n)
    }
}

/// A `(token, limit)` pair for bulk quota updates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenLimit {
    pub token: String,
    pub limit: Limit,
}

impl TokenLimit {
    pub fn new(token: impl Into<String>, limit: impl Into<Limit>) -> Self {
        Self { token: token.into(), limit: limit.into() }
    }

    pub fn unlimited(token: impl Into<String>) -> Self {
        Self::new(token, Limit::Unlimited)
    }
}

/// Reserved key prefix owned by one engine instance.
///
/// Derived keys:
/// - quota table: `<ns>:limit`
/// - throttle counters: `<ns>:throttle:<token>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Normalizes surrounding whitespace.
    ///
    /// # Errors
    /// Returns `Err` if the namespace is empty, contains control characters or ends with `:`.
    pub fn new(namespace: impl Into<String>) -> Result<Self, ConfigError> {
        let ns = namespace.into().trim().to_string();
        let invalid = |reason| ConfigError::InvalidNamespace { namespace: ns.clone(), reason };
        if ns.is_empty() {
            return Err(invalid("namespace cannot be empty"));
        }
        if ns.chars().any(|c| c.is_control()) {
            return Err(invalid("namespace cannot contain control characters"));
        }
        if ns.ends_with(':') {
            return Err(invalid("namespace cannot end with ':'"));
        }
        Ok(Self(ns))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash holding every token's quota.
    pub fn limit_table(&self) -> String {
        format!("{}:limit", self.0)
    }

    /// Prefix shared by all throttle counters.
    pub fn throttle_prefix(&self) -> String {
        format!("{}:throttle", self.0)
    }

    /// Throttle counter key for one identity.
    pub fn throttle_key(&self, token: &str) -> String {
        format!("{}:throttle:{}", self.0, token)
    }

    /// Prefix matched by namespace eviction; covers every derived key.
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
