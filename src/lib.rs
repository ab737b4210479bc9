#![forbid(unsafe_code)]

//! # Tollbooth
//!
//! Admission control for async Rust: decide per request whether a caller, identified by an
//! opaque token, may use a protected route.
//!
//! ## Features
//!
//! - **Per-token quotas** decremented on each admitted request, with an unlimited tier
//! - **Throttle windows** counting hits per token in a self-expiring window
//! - **One atomic check** per request: quota, throttle and decrement commit together or not at all
//! - **Route matching** on exact paths or a per-method wildcard
//! - **Fail-closed or fail-open** handling of store outages
//! - **Tower middleware** for `http::Request` services
//!
//! ## Quick Start
//!
//! ```rust
//! use tollbooth::{MemoryStore, Method, ProtectRequest, Route, TokenLimit, Tollbooth, TollboothCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tollbooth = Tollbooth::builder(MemoryStore::new())
//!         .route(Route::new("/search", Method::Get))
//!         .throttle_limit(100)
//!         .build()
//!         .unwrap();
//!
//!     tollbooth.admin().set_limits(&[TokenLimit::new("tok", 5u64)]).await.unwrap();
//!
//!     let res = tollbooth.protect(&ProtectRequest::new("get", "/search").with_token("tok")).await;
//!     assert_eq!(res.code, TollboothCode::Ok);
//!     assert_eq!(res.status_code, 200);
//! }
//! ```
//!
//! Shared deployments use a store that runs the check server-side, such as the
//! `tollbooth-redis` crate.

pub mod admin;
pub mod code;
pub mod config;
pub mod engine;
pub mod error;
pub mod live;
pub mod middleware;
pub mod protect;
pub mod quota;
pub mod route;
pub mod store;
pub mod telemetry;

// Re-exports
pub use admin::{AdminStore, QuotaAdmin};
pub use code::{ProtectResponse, TollboothCode};
pub use config::{ThrottleSettings, TollboothConfig, DEFAULT_TOKEN_HEADER};
pub use engine::{
    apply_admission, Admission, AdmissionCall, AdmissionStore, AdmissionTxn, DecisionEngine,
    StoreReply, ThrottleWindow, UNLIMITED_REPLY,
};
pub use error::{BoxError, ConfigError, StoreError};
pub use live::LiveThrottle;
pub use middleware::{ProtectError, ProtectLayer, ProtectService, ProtectTarget};
pub use protect::{ProtectRequest, Tollbooth, TollboothBuilder};
pub use quota::{Limit, Namespace, Quota, TokenLimit, ANONYMOUS, DEFAULT_NAMESPACE, UNLIMITED};
pub use route::{Method, Route, RouteIndex, UnknownMethod, WILDCARD_PATH};
pub use store::MemoryStore;
pub use telemetry::AdmissionEvent;
