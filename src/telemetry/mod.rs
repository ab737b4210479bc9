//! Telemetry for admission decisions.
//!
//! Each protected decision produces an [`AdmissionEvent`]. Events flow through
//! [`TelemetrySink`] implementations, which are plain `tower::Service<AdmissionEvent>`s,
//! so they compose with standard tower combinators. Emission is best-effort: a slow or
//! failing sink never changes a decision.
//!
//! ```rust
//! use tollbooth::telemetry::MemorySink;
//! use tollbooth::{MemoryStore, Method, ProtectRequest, Route, Tollbooth};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sink = MemorySink::new();
//! let tollbooth = Tollbooth::builder(MemoryStore::new())
//!     .route(Route::new("/foo", Method::Get))
//!     .sink(sink.clone())
//!     .build()
//!     .unwrap();
//!
//! tollbooth.protect(&ProtectRequest::new("get", "/foo")).await;
//! assert_eq!(sink.events().len(), 1);
//! # });
//! ```

pub mod events;
pub mod sinks;

pub use events::AdmissionEvent;
pub use sinks::{emit_best_effort, LogSink, MemorySink, TelemetrySink};
pub(crate) use sinks::{boxed, BoxedSink};
