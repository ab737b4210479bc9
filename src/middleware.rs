//! Tower middleware guarding an inner service with a [`Tollbooth`].
//!
//! ```rust
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tollbooth::{MemoryStore, Method, ProtectLayer, ProtectRequest, Route, Tollbooth};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tollbooth = Tollbooth::builder(MemoryStore::new())
//!     .route(Route::new("/foo", Method::Get))
//!     .build()
//!     .unwrap();
//! let svc = ProtectLayer::new(Arc::new(tollbooth))
//!     .layer(service_fn(|_req: ProtectRequest| async { Ok::<_, Infallible>("hello") }));
//!
//! let err = svc.oneshot(ProtectRequest::new("get", "/foo")).await.unwrap_err();
//! assert_eq!(err.status_code(), 401);
//! # });
//! ```

use crate::code::ProtectResponse;
use crate::engine::AdmissionStore;
use crate::protect::{ProtectRequest, Tollbooth};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Extracts `{method, path, token}` from a transport request.
pub trait ProtectTarget {
    fn protect_request(&self, token_header: &str) -> ProtectRequest;
}

impl ProtectTarget for ProtectRequest {
    fn protect_request(&self, _token_header: &str) -> ProtectRequest {
        self.clone()
    }
}

impl<B> ProtectTarget for http::Request<B> {
    fn protect_request(&self, token_header: &str) -> ProtectRequest {
        ProtectRequest {
            method: self.method().as_str().to_ascii_lowercase(),
            path: self.uri().path().to_string(),
            token: self
                .headers()
                .get(token_header)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Error returned by [`ProtectService`].
#[derive(Debug)]
pub enum ProtectError<E> {
    /// The request was not admitted.
    Rejected(ProtectResponse),
    /// The inner service failed.
    Inner(E),
}

impl<E> ProtectError<E> {
    pub fn status_code(&self) -> u16 {
        match self {
            ProtectError::Rejected(res) => res.status_code,
            ProtectError::Inner(_) => 500,
        }
    }

    pub fn rejection(&self) -> Option<&ProtectResponse> {
        match self {
            ProtectError::Rejected(res) => Some(res),
            ProtectError::Inner(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ProtectError::Rejected(_))
    }

    /// `{"data": null, "errors": [{"message": ...}]}`; rejections carry the code name.
    pub fn error_body(&self) -> serde_json::Value
    where
        E: fmt::Display,
    {
        let message = match self {
            ProtectError::Rejected(res) => res.message.to_string(),
            ProtectError::Inner(err) => err.to_string(),
        };
        serde_json::json!({ "data": null, "errors": [{ "message": message }] })
    }
}

impl<E: fmt::Display> fmt::Display for ProtectError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectError::Rejected(res) => match &res.info {
                Some(info) => write!(f, "request rejected: {} ({info})", res.message),
                None => write!(f, "request rejected: {}", res.message),
            },
            ProtectError::Inner(err) => write!(f, "inner service error: {err}"),
        }
    }
}

impl<E> std::error::Error for ProtectError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtectError::Rejected(_) => None,
            ProtectError::Inner(err) => Some(err),
        }
    }
}

/// A layer that admits requests through a shared [`Tollbooth`].
pub struct ProtectLayer<St> {
    tollbooth: Arc<Tollbooth<St>>,
}

impl<St> ProtectLayer<St> {
    pub fn new(tollbooth: Arc<Tollbooth<St>>) -> Self {
        Self { tollbooth }
    }
}

impl<St> Clone for ProtectLayer<St> {
    fn clone(&self) -> Self {
        Self { tollbooth: self.tollbooth.clone() }
    }
}

impl<St> fmt::Debug for ProtectLayer<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectLayer").field("tollbooth", &self.tollbooth).finish()
    }
}

impl<S, St> Layer<S> for ProtectLayer<St> {
    type Service = ProtectService<S, St>;

    fn layer(&self, service: S) -> Self::Service {
        ProtectService { inner: service, tollbooth: self.tollbooth.clone() }
    }
}

/// Middleware service produced by [`ProtectLayer`].
pub struct ProtectService<S, St> {
    inner: S,
    tollbooth: Arc<Tollbooth<St>>,
}

impl<S: Clone, St> Clone for ProtectService<S, St> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), tollbooth: self.tollbooth.clone() }
    }
}

impl<S: fmt::Debug, St> fmt::Debug for ProtectService<S, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectService")
            .field("inner", &self.inner)
            .field("tollbooth", &self.tollbooth)
            .finish()
    }
}

impl<S, St, Req> Service<Req> for ProtectService<S, St>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    St: AdmissionStore + 'static,
    Req: ProtectTarget + Send + 'static,
{
    type Response = S::Response;
    type Error = ProtectError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ProtectError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let tollbooth = self.tollbooth.clone();
        // The handle driven by `poll_ready` is the one that must serve the request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let target = req.protect_request(tollbooth.token_header());
            let response = tollbooth.protect(&target).await;
            if !response.is_ok() {
                return Err(ProtectError::Rejected(response));
            }
            inner.call(req).await.map_err(ProtectError::Inner)
        })
    }
}
