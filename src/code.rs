//! Decision codes and the responses handed back to framework adapters.
//!
//! The mapping from [`TollboothCode`] to label and status code is total and pure:
//!
//! | code              | wire | status |
//! |-------------------|------|--------|
//! | `TooManyRequests` | -3   | 429    |
//! | `Unauthorized`    | -2   | 401    |
//! | `LimitReached`    | -1   | 429    |
//! | `Ok`              | 0    | 200    |
//! | `StoreError`      | 1    | 500    |

use serde::{Serialize, Serializer};
use std::fmt;

/// Closed outcome set of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum TollboothCode {
    /// Throttle window exceeded; retry once the window expires.
    TooManyRequests = -3,
    /// No quota record for the token, or no token while anonymous access is off.
    Unauthorized = -2,
    /// Quota exhausted.
    LimitReached = -1,
    /// Request admitted.
    Ok = 0,
    /// The store could not be consulted.
    StoreError = 1,
}

impl TollboothCode {
    /// All codes, in wire order.
    pub const ALL: [TollboothCode; 5] = [
        TollboothCode::TooManyRequests,
        TollboothCode::Unauthorized,
        TollboothCode::LimitReached,
        TollboothCode::Ok,
        TollboothCode::StoreError,
    ];

    /// Integer value used on the wire and in serialized responses.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Symbolic name, used as the response message.
    pub fn as_str(self) -> &'static str {
        match self {
            TollboothCode::TooManyRequests => "TooManyRequests",
            TollboothCode::Unauthorized => "Unauthorized",
            TollboothCode::LimitReached => "LimitReached",
            TollboothCode::Ok => "Ok",
            TollboothCode::StoreError => "StoreError",
        }
    }

    /// Transport status code.
    pub fn status_code(self) -> u16 {
        match self {
            TollboothCode::TooManyRequests => 429,
            TollboothCode::Unauthorized => 401,
            TollboothCode::LimitReached => 429,
            TollboothCode::Ok => 200,
            TollboothCode::StoreError => 500,
        }
    }

    /// Reverse of [`as_i8`](Self::as_i8). Unknown values yield `None`.
    pub fn from_i64(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|code| i64::from(code.as_i8()) == value)
    }

    /// Shorthand for `self == TollboothCode::Ok`.
    pub fn is_ok(self) -> bool {
        self == TollboothCode::Ok
    }
}

impl fmt::Display for TollboothCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TollboothCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

/// Result of [`Tollbooth::protect`](crate::Tollbooth::protect).
///
/// Serializes as `{code, message, statusCode, info?}`; `info` is omitted unless the
/// store failed and the fail-closed policy is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectResponse {
    pub code: TollboothCode,
    pub message: &'static str,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl ProtectResponse {
    /// Classify a code into a response without diagnostic info.
    pub fn from_code(code: TollboothCode) -> Self {
        Self { code, message: code.as_str(), status_code: code.status_code(), info: None }
    }

    /// `StoreError` response carrying a diagnostic.
    pub fn store_error(info: impl Into<String>) -> Self {
        Self { info: Some(info.into()), ..Self::from_code(TollboothCode::StoreError) }
    }

    pub fn ok() -> Self {
        Self::from_code(TollboothCode::Ok)
    }

    /// Whether the caller may proceed.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl From<TollboothCode> for ProtectResponse {
    fn from(code: TollboothCode) -> Self {
        Self::from_code(code)
    }
}
