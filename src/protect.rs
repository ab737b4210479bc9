//! The Protect Function: route lookup, token precheck, one admission check, classification.
//!
//! ```rust
//! use tollbooth::{MemoryStore, Method, ProtectRequest, Route, TokenLimit, Tollbooth, TollboothCode};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = MemoryStore::new();
//! let tollbooth = Tollbooth::builder(store.clone())
//!     .route(Route::new("/foo", Method::Get))
//!     .throttle_enabled(false)
//!     .build()
//!     .unwrap();
//! tollbooth.admin().set_limits(&[TokenLimit::new("tok", 1u64)]).await.unwrap();
//!
//! let req = ProtectRequest::new("get", "/foo").with_token("tok");
//! assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::Ok);
//! assert_eq!(tollbooth.protect(&req).await.code, TollboothCode::LimitReached);
//! # });
//! ```

use crate::admin::{AdminStore, QuotaAdmin};
use crate::code::{ProtectResponse, TollboothCode};
use crate::config::{ThrottleSettings, TollboothConfig, DEFAULT_TOKEN_HEADER};
use crate::engine::{AdmissionStore, DecisionEngine};
use crate::error::ConfigError;
use crate::live::LiveThrottle;
use crate::quota::{Namespace, ANONYMOUS};
use crate::route::{Route, RouteIndex};
use crate::telemetry::{self, AdmissionEvent, BoxedSink, TelemetrySink};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// What an adapter extracted from its transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProtectRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl ProtectRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self { method: method.into(), path: path.into(), token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The presented token; an empty string counts as absent.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Admission control for a set of protected routes, backed by one store.
///
/// Cheap to share behind an `Arc`; holds no mutable state besides the live
/// throttle settings.
pub struct Tollbooth<S> {
    routes: RouteIndex,
    engine: DecisionEngine<S>,
    allow_anonymous: bool,
    throttle: LiveThrottle,
    fail_on_exceptions: bool,
    debug: bool,
    token_header: String,
    sink: Option<BoxedSink>,
}

impl<S> fmt::Debug for Tollbooth<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tollbooth")
            .field("routes", &self.routes)
            .field("namespace", self.engine.namespace())
            .field("allow_anonymous", &self.allow_anonymous)
            .field("throttle", &self.throttle.get())
            .field("fail_on_exceptions", &self.fail_on_exceptions)
            .field("debug", &self.debug)
            .field("token_header", &self.token_header)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl<S> Tollbooth<S>
where
    S: AdmissionStore,
{
    pub fn builder(store: S) -> TollboothBuilder<S> {
        TollboothBuilder::new(store)
    }

    pub fn from_config(store: S, config: &TollboothConfig) -> Result<Self, ConfigError> {
        Self::builder(store).config(config).build()
    }

    /// Decide whether `req` may proceed. Never fails: store trouble becomes a
    /// `StoreError` response, or `Ok` when `fail_on_exceptions` is off.
    pub async fn protect(&self, req: &ProtectRequest) -> ProtectResponse {
        let token = req.token();

        if !self.routes.is_protected_str(&req.path, &req.method) {
            self.trace(req, "unprotected route");
            return ProtectResponse::ok();
        }

        let response = match token {
            None if !self.allow_anonymous => {
                self.trace(req, "missing token");
                ProtectResponse::from_code(TollboothCode::Unauthorized)
            }
            _ => self.decide(req, token.unwrap_or(ANONYMOUS)).await,
        };

        self.trace(req, response.message);
        self.emit(req, response.code).await;
        response
    }

    async fn decide(&self, req: &ProtectRequest, identity: &str) -> ProtectResponse {
        self.trace(req, "deciding");
        let window = self.throttle.window();
        match self.engine.decide(identity, window).await {
            Ok(admission) => ProtectResponse::from_code(admission.code()),
            Err(err) => {
                tracing::warn!(
                    target: "tollbooth",
                    method = %req.method,
                    path = %req.path,
                    error = %err,
                    fail_on_exceptions = self.fail_on_exceptions,
                    "admission store failed"
                );
                if self.fail_on_exceptions {
                    ProtectResponse::store_error(err.to_string())
                } else {
                    ProtectResponse::ok()
                }
            }
        }
    }

    fn trace(&self, req: &ProtectRequest, message: &str) {
        if self.debug {
            tracing::debug!(
                target: "tollbooth",
                token = req.token().unwrap_or_default(),
                method = %req.method,
                path = %req.path,
                "{}",
                message
            );
        }
    }

    async fn emit(&self, req: &ProtectRequest, code: TollboothCode) {
        if let Some(sink) = &self.sink {
            sink(AdmissionEvent {
                token: req.token().map(str::to_string),
                method: req.method.clone(),
                path: req.path.clone(),
                code,
            })
            .await;
        }
    }

    /// Live throttle settings; changes apply to the next decision.
    pub fn throttle(&self) -> &LiveThrottle {
        &self.throttle
    }

    pub fn routes(&self) -> &RouteIndex {
        &self.routes
    }

    pub fn engine(&self) -> &DecisionEngine<S> {
        &self.engine
    }

    pub fn namespace(&self) -> &Namespace {
        self.engine.namespace()
    }

    /// Header HTTP adapters read the token from.
    pub fn token_header(&self) -> &str {
        &self.token_header
    }

    pub fn allows_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    pub fn fails_on_exceptions(&self) -> bool {
        self.fail_on_exceptions
    }
}

impl<S> Tollbooth<S>
where
    S: AdmissionStore + AdminStore + Clone,
{
    /// Quota administration over the same store and namespace.
    pub fn admin(&self) -> QuotaAdmin<S> {
        QuotaAdmin::new(self.engine.store().clone(), self.engine.namespace().clone())
    }
}

/// Builder for [`Tollbooth`].
pub struct TollboothBuilder<S> {
    store: S,
    routes: Vec<Route>,
    allow_anonymous: bool,
    throttle: ThrottleSettings,
    fail_on_exceptions: bool,
    debug: bool,
    namespace: String,
    store_timeout: Option<Duration>,
    token_header: String,
    sink: Option<BoxedSink>,
}

impl<S> TollboothBuilder<S>
where
    S: AdmissionStore,
{
    pub fn new(store: S) -> Self {
        let defaults = TollboothConfig::default();
        Self {
            store,
            routes: Vec::new(),
            allow_anonymous: defaults.allow_anonymous,
            throttle: defaults.throttle_settings(),
            fail_on_exceptions: defaults.fail_on_exceptions,
            debug: defaults.debug,
            namespace: defaults.namespace,
            store_timeout: None,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            sink: None,
        }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn throttle_enabled(mut self, enabled: bool) -> Self {
        self.throttle.enabled = enabled;
        self
    }

    pub fn throttle_interval_secs(mut self, secs: u64) -> Self {
        self.throttle.interval_secs = secs;
        self
    }

    pub fn throttle_limit(mut self, limit: u64) -> Self {
        self.throttle.limit = limit;
        self
    }

    pub fn fail_on_exceptions(mut self, fail: bool) -> Self {
        self.fail_on_exceptions = fail;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn token_header(mut self, header: impl Into<String>) -> Self {
        self.token_header = header.into();
        self
    }

    pub fn sink<T>(mut self, sink: T) -> Self
    where
        T: TelemetrySink + Sync,
        T::Future: Send + 'static,
    {
        self.sink = Some(telemetry::boxed(sink));
        self
    }

    /// Apply every setting from `config`, replacing previously added routes.
    pub fn config(mut self, config: &TollboothConfig) -> Self {
        self.routes = config.routes.clone();
        self.allow_anonymous = config.allow_anonymous;
        self.throttle = config.throttle_settings();
        self.fail_on_exceptions = config.fail_on_exceptions;
        self.debug = config.debug;
        self.namespace = config.namespace.clone();
        self.store_timeout = config.store_timeout();
        self.token_header = config.token_header.clone();
        self
    }

    pub fn build(self) -> Result<Tollbooth<S>, ConfigError> {
        for route in &self.routes {
            route.validate()?;
        }
        let namespace = Namespace::new(self.namespace)?;
        let mut engine = DecisionEngine::new(self.store, namespace);
        if let Some(timeout) = self.store_timeout {
            engine = engine.with_timeout(timeout);
        }
        Ok(Tollbooth {
            routes: RouteIndex::build(&self.routes),
            engine,
            allow_anonymous: self.allow_anonymous,
            throttle: LiveThrottle::new(self.throttle),
            fail_on_exceptions: self.fail_on_exceptions,
            debug: self.debug,
            token_header: self.token_header.to_ascii_lowercase(),
            sink: self.sink,
        })
    }
}
