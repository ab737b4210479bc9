//! Out-of-band quota management.
//!
//! Stores implement the [`AdminStore`] primitives; [`QuotaAdmin`] binds them to a
//! [`Namespace`] so callers deal in tokens and [`Limit`]s rather than raw keys.
//!
//! ```rust
//! use tollbooth::admin::QuotaAdmin;
//! use tollbooth::{MemoryStore, Namespace, Quota, TokenLimit};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let admin = QuotaAdmin::new(MemoryStore::new(), Namespace::default());
//! admin.set_limits(&[TokenLimit::new("t1", 11u64), TokenLimit::unlimited("t2")]).await.unwrap();
//! assert_eq!(admin.get_limit("t1").await.unwrap(), Quota::Remaining(11));
//! assert_eq!(admin.get_limit("t2").await.unwrap(), Quota::Unlimited);
//! assert_eq!(admin.get_limit("t3").await.unwrap(), Quota::Missing);
//! # });
//! ```

use crate::error::StoreError;
use crate::quota::{Namespace, Quota, TokenLimit};
use async_trait::async_trait;
use std::sync::Arc;

/// Key-level operations needed to manage quotas.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Write raw quotas into the hash at `table`, overwriting existing entries.
    async fn set_limits(&self, table: &str, limits: &[(String, i64)]) -> Result<(), StoreError>;

    /// Remove entries from the hash at `table`.
    async fn remove_limits(&self, table: &str, tokens: &[String]) -> Result<(), StoreError>;

    /// Raw quota for `token`, `None` when absent.
    async fn get_limit(&self, table: &str, token: &str) -> Result<Option<i64>, StoreError>;

    /// Delete every key starting with `prefix`; returns how many keys were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> AdminStore for Arc<S>
where
    S: AdminStore + ?Sized,
{
    async fn set_limits(&self, table: &str, limits: &[(String, i64)]) -> Result<(), StoreError> {
        (**self).set_limits(table, limits).await
    }

    async fn remove_limits(&self, table: &str, tokens: &[String]) -> Result<(), StoreError> {
        (**self).remove_limits(table, tokens).await
    }

    async fn get_limit(&self, table: &str, token: &str) -> Result<Option<i64>, StoreError> {
        (**self).get_limit(table, token).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        (**self).delete_prefix(prefix).await
    }
}

/// Quota management bound to one namespace.
#[derive(Debug, Clone)]
pub struct QuotaAdmin<S> {
    store: S,
    namespace: Namespace,
}

impl<S> QuotaAdmin<S>
where
    S: AdminStore,
{
    pub fn new(store: S, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Create or overwrite quotas in bulk. An empty slice is a no-op.
    pub async fn set_limits(&self, limits: &[TokenLimit]) -> Result<(), StoreError> {
        if limits.is_empty() {
            return Ok(());
        }
        let raw: Vec<(String, i64)> =
            limits.iter().map(|l| (l.token.clone(), l.limit.to_raw())).collect();
        self.store.set_limits(&self.namespace.limit_table(), &raw).await?;
        tracing::debug!(target: "tollbooth::admin", namespace = %self.namespace, count = raw.len(), "limits set");
        Ok(())
    }

    /// Revoke quotas in bulk. Revoked tokens become unauthorized. An empty slice is a no-op.
    pub async fn remove_limits<T>(&self, tokens: &[T]) -> Result<(), StoreError>
    where
        T: AsRef<str> + Sync,
    {
        if tokens.is_empty() {
            return Ok(());
        }
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        self.store.remove_limits(&self.namespace.limit_table(), &tokens).await?;
        tracing::debug!(target: "tollbooth::admin", namespace = %self.namespace, count = tokens.len(), "limits removed");
        Ok(())
    }

    /// Current quota of `token`; a token without a record reads as [`Quota::Missing`].
    pub async fn get_limit(&self, token: &str) -> Result<Quota, StoreError> {
        let raw = self.store.get_limit(&self.namespace.limit_table(), token).await?;
        Ok(Quota::from_raw(raw))
    }

    /// Delete every key under the namespace (quota table and throttle counters).
    /// Keys outside the namespace are left alone.
    pub async fn evict(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_prefix(&self.namespace.key_prefix()).await?;
        tracing::info!(target: "tollbooth::admin", namespace = %self.namespace, removed, "namespace evicted");
        Ok(removed)
    }
}
