//! The atomic admission protocol.
//!
//! One admission check is a single indivisible step executed by the shared store:
//!
//! 1. read the token's quota record;
//! 2. no record: `Unauthorized`;
//! 3. exhausted (`<= 0`, other than unlimited): `LimitReached`, nothing mutated;
//! 4. throttling enabled: increment `<ns>:throttle:<token>`, open the window (set the
//!    expiry) on the first hit, and answer `TooManyRequests` once the count exceeds the
//!    limit, without touching the quota;
//! 5. unlimited quotas are left as they are; otherwise the quota is decremented, except
//!    for the anonymous identity, whose quota is never decremented;
//! 6. `Ok` with the new quota.
//!
//! Quota exhaustion is answered before throttling is evaluated, and throttling before the
//! decrement is committed, so a rejected request never costs quota and an exhausted token
//! never pays throttle budget.
//!
//! Stores implement [`AdmissionStore`]. Backends with server-side scripting run the
//! sequence remotely (see `tollbooth-redis`); stores that serialize access locally can
//! implement [`AdmissionTxn`] and reuse [`apply_admission`].

use crate::code::TollboothCode;
use crate::error::StoreError;
use crate::quota::{Namespace, Quota, ANONYMOUS};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Text reply meaning "admitted, quota is unlimited".
pub const UNLIMITED_REPLY: &str = "unlimited";

/// Enabled throttle window: at most `limit` hits per `interval_secs` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleWindow {
    pub interval_secs: u64,
    pub limit: u64,
}

impl ThrottleWindow {
    /// `None` (throttling disabled) unless both values are positive.
    pub fn new(interval_secs: u64, limit: u64) -> Option<Self> {
        (interval_secs > 0 && limit > 0).then_some(Self { interval_secs, limit })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Everything a store needs to run one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionCall {
    pub limit_table: String,
    pub throttle_key: String,
    pub token: String,
    pub throttle: Option<ThrottleWindow>,
}

impl AdmissionCall {
    /// Quota decrement applied on admission.
    pub fn step(&self) -> u64 {
        if self.token == ANONYMOUS {
            0
        } else {
            1
        }
    }
}

/// Raw reply from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
    Integer(i64),
    Text(String),
    Nil,
}

impl StoreReply {
    /// Sentinel reply for a rejection code.
    pub fn code(code: TollboothCode) -> Self {
        StoreReply::Integer(i64::from(code.as_i8()))
    }
}

/// Decoded outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted. `remaining` is the quota after this request, `None` for unlimited tokens.
    Ok { remaining: Option<u64> },
    Unauthorized,
    LimitReached,
    TooManyRequests,
}

impl Admission {
    pub fn code(&self) -> TollboothCode {
        match self {
            Admission::Ok { .. } => TollboothCode::Ok,
            Admission::Unauthorized => TollboothCode::Unauthorized,
            Admission::LimitReached => TollboothCode::LimitReached,
            Admission::TooManyRequests => TollboothCode::TooManyRequests,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Admission::Ok { .. })
    }

    /// Decode a store reply. Anything that is not a rejection sentinel, a non-negative
    /// integer or the unlimited marker is a store error, never an admission.
    pub fn from_reply(reply: StoreReply) -> Result<Self, StoreError> {
        match reply {
            StoreReply::Integer(n) => Self::from_integer(n),
            StoreReply::Text(text) if text == UNLIMITED_REPLY => Ok(Admission::Ok { remaining: None }),
            StoreReply::Text(text) => match text.trim().parse::<i64>() {
                Ok(n) => Self::from_integer(n),
                Err(_) => Err(StoreError::InvalidReply(format!("unexpected text {text:?}"))),
            },
            StoreReply::Nil => Err(StoreError::InvalidReply("nil".into())),
        }
    }

    fn from_integer(n: i64) -> Result<Self, StoreError> {
        if n >= 0 {
            return Ok(Admission::Ok { remaining: Some(n.unsigned_abs()) });
        }
        match TollboothCode::from_i64(n) {
            Some(TollboothCode::TooManyRequests) => Ok(Admission::TooManyRequests),
            Some(TollboothCode::Unauthorized) => Ok(Admission::Unauthorized),
            Some(TollboothCode::LimitReached) => Ok(Admission::LimitReached),
            _ => Err(StoreError::InvalidReply(format!("unexpected integer {n}"))),
        }
    }
}

/// A shared store able to run the admission sequence atomically.
///
/// Implementations must either apply the whole sequence or none of it.
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    async fn read_and_commit(&self, call: &AdmissionCall) -> Result<StoreReply, StoreError>;
}

#[async_trait]
impl<S> AdmissionStore for Arc<S>
where
    S: AdmissionStore + ?Sized,
{
    async fn read_and_commit(&self, call: &AdmissionCall) -> Result<StoreReply, StoreError> {
        (**self).read_and_commit(call).await
    }
}

/// Primitive operations of a store whose access is already serialized by the caller
/// (a held lock, an open transaction).
pub trait AdmissionTxn {
    /// Raw quota for `token`, `None` when absent.
    fn quota(&mut self, table: &str, token: &str) -> Option<i64>;
    fn set_quota(&mut self, table: &str, token: &str, value: i64);
    /// Increment the counter at `key` (creating it at 0) and return the new value.
    fn incr(&mut self, key: &str) -> u64;
    /// Expire `key` after `secs` seconds.
    fn expire(&mut self, key: &str, secs: u64);
}

/// Run the admission sequence against an exclusively held transaction.
pub fn apply_admission<T>(txn: &mut T, call: &AdmissionCall) -> StoreReply
where
    T: AdmissionTxn + ?Sized,
{
    let current = match Quota::from_raw(txn.quota(&call.limit_table, &call.token)) {
        Quota::Missing => return StoreReply::code(TollboothCode::Unauthorized),
        Quota::Exhausted => return StoreReply::code(TollboothCode::LimitReached),
        Quota::Unlimited => None,
        Quota::Remaining(n) => Some(n),
    };

    if let Some(window) = call.throttle {
        let hits = txn.incr(&call.throttle_key);
        if hits == 1 {
            txn.expire(&call.throttle_key, window.interval_secs);
        }
        if hits > window.limit {
            return StoreReply::code(TollboothCode::TooManyRequests);
        }
    }

    match current {
        None => StoreReply::Text(UNLIMITED_REPLY.to_string()),
        Some(n) => {
            let new_quota = i64::try_from(n - call.step()).unwrap_or(i64::MAX);
            txn.set_quota(&call.limit_table, &call.token, new_quota);
            StoreReply::Integer(new_quota)
        }
    }
}

/// Runs admission checks for one namespace against one store.
#[derive(Debug, Clone)]
pub struct DecisionEngine<S> {
    store: S,
    namespace: Namespace,
    timeout: Option<Duration>,
}

impl<S> DecisionEngine<S> {
    pub fn new(store: S, namespace: Namespace) -> Self {
        Self { store, namespace, timeout: None }
    }

    /// Fail with [`StoreError::Timeout`] when the store takes longer than `timeout`.
    /// The store may still commit the check after the caller has given up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<S> DecisionEngine<S>
where
    S: AdmissionStore,
{
    /// Build the call for `token` (already resolved to the anonymous identity if needed).
    pub fn call_for(&self, token: &str, throttle: Option<ThrottleWindow>) -> AdmissionCall {
        AdmissionCall {
            limit_table: self.namespace.limit_table(),
            throttle_key: self.namespace.throttle_key(token),
            token: token.to_string(),
            throttle,
        }
    }

    /// Execute one admission check. Never retried.
    pub async fn decide(
        &self,
        token: &str,
        throttle: Option<ThrottleWindow>,
    ) -> Result<Admission, StoreError> {
        let call = self.call_for(token, throttle);
        let reply = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.store.read_and_commit(&call))
                .await
                .map_err(|_| StoreError::Timeout { timeout })??,
            None => self.store.read_and_commit(&call).await?,
        };
        Admission::from_reply(reply)
    }
}
