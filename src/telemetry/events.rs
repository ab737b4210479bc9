use crate::code::TollboothCode;
use serde::Serialize;
use std::fmt;

/// One protected admission decision.
///
/// Emitted once per request that hit a protected route, including requests rejected by
/// the token precheck. Unprotected requests emit nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionEvent {
    /// Token presented by the caller, `None` for anonymous requests.
    pub token: Option<String>,
    pub method: String,
    pub path: String,
    pub code: TollboothCode,
}

impl AdmissionEvent {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        self.code.is_ok()
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.path, self.code)
    }
}
