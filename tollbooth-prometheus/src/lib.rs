//! Prometheus metrics sink for `tollbooth`.
//! Bring your own `prometheus::Registry`; one counter is registered and incremented per decision.

use prometheus::{IntCounterVec, Registry};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tollbooth::telemetry::{AdmissionEvent, TelemetrySink};
use tollbooth::TollboothCode;

/// Counter name registered by [`PrometheusSink::new`].
pub const DECISIONS_TOTAL: &str = "tollbooth_decisions_total";

#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    counter: IntCounterVec,
}

impl PrometheusSink {
    /// Create a sink and register the decision counter into the provided registry.
    ///
    /// Every code label starts at zero so dashboards see the full series up front.
    ///
    /// # Errors
    /// Returns an error if the metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let counter = IntCounterVec::new(
            prometheus::Opts::new(DECISIONS_TOTAL, "Admission decisions on protected routes"),
            &["code"],
        )?;
        registry.register(Box::new(counter.clone()))?;
        for code in TollboothCode::ALL {
            counter.with_label_values(&[code.as_str()]);
        }
        Ok(Self { registry, counter })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current count for `code`.
    pub fn count(&self, code: TollboothCode) -> u64 {
        self.counter.with_label_values(&[code.as_str()]).get()
    }
}

impl tower_service::Service<AdmissionEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        self.counter.with_label_values(&[event.code.as_str()]).inc();
        tracing::trace!(target: "tollbooth::prometheus", code = %event.code, "counted decision");
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}
