//! Redis store for `tollbooth` (companion crate).
//!
//! The admission sequence runs as one Lua script, which Redis executes atomically: no
//! other command touches the quota table or the throttle counter between the read and
//! the commit. Bring your own `ConnectionManager`, or let [`RedisStore::open`] build one.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script, Value};
use std::fmt;
use std::sync::Arc;
use tollbooth::{
    AdminStore, AdmissionCall, AdmissionStore, StoreError, StoreReply, ThrottleWindow,
    TollboothCode, UNLIMITED_REPLY, UNLIMITED,
};

/// Keys fetched per `SCAN` round during eviction.
const SCAN_COUNT: usize = 500;

/// Longest throttle interval handed to `EXPIRE`. Lua holds numbers as doubles and
/// Redis rejects expiry times that overflow its millisecond clock.
const MAX_INTERVAL_SECS: i64 = u32::MAX as i64;

fn admission_source() -> String {
    // KEYS[1] quota table, KEYS[2] throttle counter
    // ARGV[1] token, ARGV[2] interval secs, ARGV[3] limit (both -1 when disabled), ARGV[4] step
    format!(
        r#"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if raw == false then
  return {unauthorized}
end

local quota = tonumber(raw)
if quota == nil then
  return redis.error_reply('quota for token is not a number')
end
if quota ~= {unlimited} and quota <= 0 then
  return {limit_reached}
end

local interval = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
if interval > 0 and limit > 0 then
  local hits = redis.call('INCR', KEYS[2])
  if hits == 1 then
    redis.call('EXPIRE', KEYS[2], interval)
  end
  if hits > limit then
    return {too_many_requests}
  end
end

if quota == {unlimited} then
  return '{unlimited_reply}'
end

local remaining = quota - tonumber(ARGV[4])
redis.call('HSET', KEYS[1], ARGV[1], remaining)
return remaining
"#,
        unauthorized = TollboothCode::Unauthorized.as_i8(),
        limit_reached = TollboothCode::LimitReached.as_i8(),
        too_many_requests = TollboothCode::TooManyRequests.as_i8(),
        unlimited = UNLIMITED,
        unlimited_reply = UNLIMITED_REPLY,
    )
}

fn admission_script() -> Script {
    Script::new(&admission_source())
}

/// `(interval, limit)` script arguments; `(-1, -1)` disables the throttle step.
fn window_args(window: Option<ThrottleWindow>) -> (i64, i64) {
    match window {
        Some(w) => (
            i64::try_from(w.interval_secs).map_or(MAX_INTERVAL_SECS, |s| s.min(MAX_INTERVAL_SECS)),
            i64::try_from(w.limit).unwrap_or(i64::MAX),
        ),
        None => (-1, -1),
    }
}

/// Store backed by a Redis server (or anything speaking its protocol with Lua support).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    script: Arc<Script>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("conn", &"<redis::aio::ConnectionManager>")
            .field("script", &self.script.get_hash())
            .finish()
    }
}

impl RedisStore {
    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, script: Arc::new(admission_script()) }
    }

    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    /// Returns `Err` if the URL is invalid or the first connection fails.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::backend)?;
        let conn = ConnectionManager::new(client).await.map_err(StoreError::backend)?;
        tracing::debug!(target: "tollbooth::redis", "connected");
        Ok(Self::new(conn))
    }

    /// SHA1 of the admission script, as used by `EVALSHA`.
    pub fn script_hash(&self) -> &str {
        self.script.get_hash()
    }
}

/// Map a raw script reply onto the store-neutral reply shape.
fn to_store_reply(value: Value) -> Result<StoreReply, StoreError> {
    match value {
        Value::Nil => Ok(StoreReply::Nil),
        Value::Int(n) => Ok(StoreReply::Integer(n)),
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map(StoreReply::Text)
            .map_err(|e| StoreError::InvalidReply(format!("non-utf8 reply: {e}"))),
        Value::SimpleString(text) => Ok(StoreReply::Text(text)),
        other => Err(StoreError::InvalidReply(format!("unexpected reply {other:?}"))),
    }
}

/// Escape glob metacharacters so a namespace is matched literally by `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

#[async_trait]
impl AdmissionStore for RedisStore {
    async fn read_and_commit(&self, call: &AdmissionCall) -> Result<StoreReply, StoreError> {
        let (interval, limit) = window_args(call.throttle);
        let mut conn = self.conn.clone();
        let value: Value = self
            .script
            .key(&call.limit_table)
            .key(&call.throttle_key)
            .arg(&call.token)
            .arg(interval)
            .arg(limit)
            .arg(call.step())
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        to_store_reply(value)
    }
}

#[async_trait]
impl AdminStore for RedisStore {
    async fn set_limits(&self, table: &str, limits: &[(String, i64)]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(table, limits).await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn remove_limits(&self, table: &str, tokens: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(table, tokens).await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_limit(&self, table: &str, token: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(table, token).await.map_err(StoreError::backend)?;
        raw.map(|s| {
            s.parse::<i64>()
                .map_err(|_| StoreError::InvalidReply(format!("quota {s:?} is not an integer")))
        })
        .transpose()
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = escape_glob(prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::backend)?;
            if !keys.is_empty() {
                let n: u64 = conn.del(&keys).await.map_err(StoreError::backend)?;
                removed += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tracing::debug!(target: "tollbooth::redis", %prefix, removed, "evicted keys");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollbooth::Admission;

    #[test]
    fn script_hash_is_sha1_hex() {
        let script = admission_script();
        assert_eq!(script.get_hash().len(), 40);
        assert!(script.get_hash().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn script_checks_quota_before_counting_hits() {
        let src = admission_source();
        let pos = |needle: &str| {
            src.find(needle).unwrap_or_else(|| panic!("{needle:?} missing from script"))
        };
        let unauthorized = pos(&format!("return {}", TollboothCode::Unauthorized.as_i8()));
        let exhausted = pos(&format!("return {}", TollboothCode::LimitReached.as_i8()));
        let incr = pos("'INCR'");
        let throttled = pos(&format!("return {}", TollboothCode::TooManyRequests.as_i8()));
        let decrement = pos("'HSET'");

        assert!(unauthorized < exhausted);
        assert!(exhausted < incr, "exhausted quota must reject before the throttle counts");
        assert!(incr < throttled);
        assert!(throttled < decrement, "throttled requests must not be charged");
        assert!(pos(&format!("return '{UNLIMITED_REPLY}'")) < decrement);
    }

    #[test]
    fn window_args_never_wrap_negative() {
        assert_eq!(window_args(None), (-1, -1));
        assert_eq!(window_args(ThrottleWindow::new(1, 10)), (1, 10));
        let (interval, limit) = window_args(ThrottleWindow::new(u64::MAX, u64::MAX));
        assert_eq!(interval, MAX_INTERVAL_SECS);
        assert_eq!(limit, i64::MAX);
        let (interval, _) = window_args(ThrottleWindow::new(1 << 40, 1));
        assert_eq!(interval, MAX_INTERVAL_SECS);
    }

    #[test]
    fn integer_replies_pass_through() {
        assert_eq!(to_store_reply(Value::Int(4)).unwrap(), StoreReply::Integer(4));
        assert_eq!(to_store_reply(Value::Int(-3)).unwrap(), StoreReply::Integer(-3));
    }

    #[test]
    fn unlimited_bulk_reply_decodes_to_ok() {
        let reply = to_store_reply(Value::BulkString(b"unlimited".to_vec())).unwrap();
        assert_eq!(Admission::from_reply(reply).unwrap(), Admission::Ok { remaining: None });
    }

    #[test]
    fn nil_and_arrays_are_not_admissions() {
        let nil = to_store_reply(Value::Nil).unwrap();
        assert!(Admission::from_reply(nil).is_err());
        assert!(to_store_reply(Value::Array(vec![Value::Int(1)])).is_err());
        assert!(to_store_reply(Value::BulkString(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn glob_is_escaped() {
        assert_eq!(escape_glob("_tollbooth:"), "_tollbooth:*");
        assert_eq!(escape_glob("a*b?[c]:"), r"a\*b\?\[c\]:*");
    }
}
