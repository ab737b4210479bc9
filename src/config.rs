//! Settings for a [`Tollbooth`](crate::Tollbooth), loadable from JSON.
//!
//! ```rust
//! use tollbooth::TollboothConfig;
//!
//! let cfg = TollboothConfig::from_json_str(r#"{
//!     "routes": [{ "path": "/foo", "method": "get" }],
//!     "throttle_limit": 20
//! }"#).unwrap();
//! assert_eq!(cfg.throttle_limit, 20);
//! assert!(cfg.fail_on_exceptions);
//! ```

use crate::engine::ThrottleWindow;
use crate::error::ConfigError;
use crate::quota::{Namespace, DEFAULT_NAMESPACE};
use crate::route::Route;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Header carrying the caller token in HTTP adapters.
pub const DEFAULT_TOKEN_HEADER: &str = "x-api-key";

const DEFAULT_THROTTLE_INTERVAL_SECS: u64 = 1;
const DEFAULT_THROTTLE_LIMIT: u64 = 10;

/// Throttle window settings; live-updatable on a running [`Tollbooth`](crate::Tollbooth).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub limit: u64,
}

impl ThrottleSettings {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Effective window, `None` when throttling is off or either value is zero.
    pub fn window(&self) -> Option<ThrottleWindow> {
        if !self.enabled {
            return None;
        }
        ThrottleWindow::new(self.interval_secs, self.limit)
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_THROTTLE_INTERVAL_SECS,
            limit: DEFAULT_THROTTLE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TollboothConfig {
    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(default)]
    pub allow_anonymous: bool,

    #[serde(default = "default_true")]
    pub throttle_enabled: bool,

    #[serde(default = "default_throttle_interval_secs")]
    pub throttle_interval_secs: u64,

    #[serde(default = "default_throttle_limit")]
    pub throttle_limit: u64,

    /// Surface store failures as `StoreError` (true) or admit the request (false).
    #[serde(default = "default_true")]
    pub fail_on_exceptions: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    #[serde(default = "default_token_header")]
    pub token_header: String,
}

impl Default for TollboothConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            allow_anonymous: false,
            throttle_enabled: true,
            throttle_interval_secs: default_throttle_interval_secs(),
            throttle_limit: default_throttle_limit(),
            fail_on_exceptions: true,
            debug: false,
            namespace: default_namespace(),
            store_timeout_ms: None,
            token_header: default_token_header(),
        }
    }
}

impl TollboothConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: TollboothConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.namespace()?;
        for route in &self.routes {
            route.validate()?;
        }
        Ok(())
    }

    pub fn namespace(&self) -> Result<Namespace, ConfigError> {
        Namespace::new(self.namespace.as_str())
    }

    pub fn throttle_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            enabled: self.throttle_enabled,
            interval_secs: self.throttle_interval_secs,
            limit: self.throttle_limit,
        }
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

fn default_true() -> bool {
    true
}
fn default_throttle_interval_secs() -> u64 {
    DEFAULT_THROTTLE_INTERVAL_SECS
}
fn default_throttle_limit() -> u64 {
    DEFAULT_THROTTLE_LIMIT
}
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.into()
}
fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Method;

    #[test]
    fn ok_minimal_config() {
        let cfg = TollboothConfig::from_json_str("{}").expect("must parse");
        assert!(cfg.routes.is_empty());
        assert!(!cfg.allow_anonymous);
        assert!(cfg.fail_on_exceptions);
        assert!(!cfg.debug);
        assert_eq!(cfg.throttle_settings(), ThrottleSettings::default());
        assert_eq!(cfg.namespace, "_tollbooth");
        assert_eq!(cfg.token_header, "x-api-key");
        assert_eq!(cfg.store_timeout(), None);
    }

    #[test]
    fn full_config() {
        let cfg = TollboothConfig::from_json_str(
            r#"{
                "routes": [{ "path": "*", "method": "get" }, { "path": "/foo", "method": "post" }],
                "allow_anonymous": true,
                "throttle_enabled": false,
                "throttle_interval_secs": 5,
                "throttle_limit": 3,
                "fail_on_exceptions": false,
                "debug": true,
                "namespace": "tenant_a",
                "store_timeout_ms": 250,
                "token_header": "authorization"
            }"#,
        )
        .expect("must parse");
        assert_eq!(cfg.routes[0], Route::wildcard(Method::Get));
        assert_eq!(cfg.throttle_settings().window(), None);
        assert_eq!(cfg.store_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.namespace().unwrap().limit_table(), "tenant_a:limit");
    }

    #[test]
    fn deny_unknown_fields() {
        let err = TollboothConfig::from_json_str(r#"{ "throttle_limt": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_method() {
        let err = TollboothConfig::from_json_str(r#"{ "routes": [{ "path": "/x", "method": "trace" }] }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_bad_namespace() {
        let err = TollboothConfig::from_json_str(r#"{ "namespace": "" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNamespace { .. }));
    }

    #[test]
    fn zero_values_disable_throttling() {
        let settings = ThrottleSettings { enabled: true, interval_secs: 0, limit: 10 };
        assert_eq!(settings.window(), None);
        assert_eq!(ThrottleSettings::disabled().window(), None);
        assert_eq!(
            ThrottleSettings::default().window(),
            Some(ThrottleWindow { interval_secs: 1, limit: 10 })
        );
    }
}
