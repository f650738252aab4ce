//! API application state shared across handlers and middleware.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use pushgate_telemetry::Metrics;
use tracing::warn;

use crate::config::AdmissionConfig;
use crate::dispatch::SharedDispatcher;
use crate::http::rate_limit::{FixedWindow, RateLimitExceeded, RateSnapshot};
use crate::store::SharedStore;

pub(crate) struct ApiState {
    pub(crate) store: SharedStore,
    pub(crate) dispatcher: SharedDispatcher,
    pub(crate) config: AdmissionConfig,
    pub(crate) metrics: Metrics,
    rate_windows: Mutex<HashMap<String, FixedWindow>>,
    rate_sweep_at: Mutex<Instant>,
}

impl ApiState {
    pub(crate) fn new(
        store: SharedStore,
        dispatcher: SharedDispatcher,
        config: AdmissionConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
            metrics,
            rate_windows: Mutex::new(HashMap::new()),
            rate_sweep_at: Mutex::new(Instant::now()),
        }
    }

    /// Count a hit against the fixed window for `key`.
    ///
    /// Stale windows are garbage-collected at most once per window period.
    pub(crate) fn check_rate_limit(
        &self,
        key: &str,
        now: Instant,
    ) -> Result<RateSnapshot, RateLimitExceeded> {
        let window = self.config.rate_limit_window;
        let limit = self.config.rate_limit_max;

        let mut windows = Self::lock_guard(&self.rate_windows, "rate_windows");
        {
            let mut sweep_at = Self::lock_guard(&self.rate_sweep_at, "rate_sweep_at");
            if now.saturating_duration_since(*sweep_at) >= window {
                windows.retain(|_, entry| entry.reset_at > now);
                *sweep_at = now;
            }
        }

        let entry = windows
            .entry(key.to_string())
            .or_insert_with(|| FixedWindow::starting_at(now + window));
        if now >= entry.reset_at {
            entry.reset(now + window);
        }
        if entry.count >= limit {
            return Err(RateLimitExceeded {
                limit,
                retry_after: entry.reset_at.saturating_duration_since(now),
            });
        }
        entry.count += 1;
        Ok(RateSnapshot {
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_after: entry.reset_at.saturating_duration_since(now),
        })
    }

    fn lock_guard<'a, T>(mutex: &'a Mutex<T>, label: &'static str) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| {
            warn!(lock = label, "recovering poisoned mutex");
            poisoned.into_inner()
        })
    }
}
