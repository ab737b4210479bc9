//! Throttle settings that can change while a [`Tollbooth`](crate::Tollbooth) is serving.
//!
//! Each decision loads one snapshot through `ArcSwap`, so a decision never sees a
//! half-applied change and readers never wait on a writer. Routes are not live: the
//! route index is fixed when the tollbooth is built.

use crate::config::ThrottleSettings;
use crate::engine::ThrottleWindow;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared handle to the throttle settings of one tollbooth; clones observe each other.
#[derive(Debug, Clone)]
pub struct LiveThrottle {
    inner: Arc<ArcSwap<ThrottleSettings>>,
}

impl LiveThrottle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(settings)) }
    }

    pub fn get(&self) -> ThrottleSettings {
        **self.inner.load()
    }

    /// Window the next decision will use, `None` when throttling is off.
    pub fn window(&self) -> Option<ThrottleWindow> {
        self.inner.load().window()
    }

    pub fn set(&self, settings: ThrottleSettings) {
        self.inner.store(Arc::new(settings));
        tracing::info!(
            target: "tollbooth",
            enabled = settings.enabled,
            interval_secs = settings.interval_secs,
            limit = settings.limit,
            "throttle settings updated"
        );
    }

    /// Apply `f` to the current settings. Concurrent updates may overwrite each other.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(ThrottleSettings) -> ThrottleSettings,
    {
        self.set(f(self.get()));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|s| ThrottleSettings { enabled, ..s });
    }

    pub fn set_limit(&self, limit: u64) {
        self.update(|s| ThrottleSettings { limit, ..s });
    }

    pub fn set_interval_secs(&self, interval_secs: u64) {
        self.update(|s| ThrottleSettings { interval_secs, ..s });
    }
}
