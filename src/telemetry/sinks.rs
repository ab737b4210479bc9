use super::events::AdmissionEvent;
use crate::code::TollboothCode;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes admission events.
pub trait TelemetrySink:
    tower::Service<AdmissionEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// A sink that is not ready or fails simply loses the event; the decision is unaffected.
pub async fn emit_best_effort<S>(sink: S, event: AdmissionEvent)
where
    S: tower::Service<AdmissionEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Type-erased sink held by a `Tollbooth`.
pub(crate) type BoxedSink = Arc<dyn Fn(AdmissionEvent) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) fn boxed<S>(sink: S) -> BoxedSink
where
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    Arc::new(move |event| Box::pin(emit_best_effort(sink.clone(), event)))
}

type Done = std::future::Ready<Result<(), Infallible>>;

/// Logs each decision through `tracing`; the token itself is never logged.
///
/// Admitted requests log at `debug`, rejections at `info`, store failures at `warn`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<AdmissionEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Done;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        let anonymous = event.token.is_none();
        match event.code {
            TollboothCode::Ok => tracing::debug!(
                target: "tollbooth::telemetry",
                method = %event.method,
                path = %event.path,
                anonymous,
                "admitted"
            ),
            TollboothCode::StoreError => tracing::warn!(
                target: "tollbooth::telemetry",
                method = %event.method,
                path = %event.path,
                anonymous,
                "admission store failed"
            ),
            code => tracing::info!(
                target: "tollbooth::telemetry",
                method = %event.method,
                path = %event.path,
                anonymous,
                %code,
                status = code.status_code(),
                "rejected"
            ),
        }
        std::future::ready(Ok(()))
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// Keeps the most recent decisions in memory. Past `capacity` the oldest is dropped
/// and counted in [`MemorySink::evicted`].
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<AdmissionEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Retained decisions, oldest first. A poisoned lock reads as empty.
    pub fn events(&self) -> Vec<AdmissionEvent> {
        self.with_events(|events| events.iter().cloned().collect()).unwrap_or_default()
    }

    /// Retained decisions that ended with `code`.
    pub fn count(&self, code: TollboothCode) -> usize {
        self.with_events(|events| events.iter().filter(|e| e.code == code).count())
            .unwrap_or(0)
    }

    /// Retained decisions that admitted the request.
    pub fn admitted(&self) -> usize {
        self.count(TollboothCode::Ok)
    }

    /// Retained decisions for `token`; `None` selects anonymous requests.
    pub fn for_token(&self, token: Option<&str>) -> Vec<AdmissionEvent> {
        self.with_events(|events| {
            events.iter().filter(|e| e.token.as_deref() == token).cloned().collect()
        })
        .unwrap_or_default()
    }

    pub fn clear(&self) {
        let _ = self.with_events(VecDeque::clear);
    }

    pub fn len(&self) -> usize {
        self.with_events(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn with_events<R>(&self, f: impl FnOnce(&mut VecDeque<AdmissionEvent>) -> R) -> Option<R> {
        self.events.lock().ok().map(|mut guard| f(&mut guard))
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<AdmissionEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Done;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        let capacity = self.capacity;
        let evicted = self.with_events(|events| {
            let dropped = events.len() >= capacity && events.pop_front().is_some();
            events.push_back(event);
            dropped
        });
        if evicted == Some(true) {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        std::future::ready(Ok(()))
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
