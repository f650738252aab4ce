//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes a minimal set of counters/gauges relevant to the gateway.

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    notifications_total: IntCounterVec,
    invalid_tokens_total: IntCounterVec,
    rate_limit_throttled_total: IntCounter,
    nonce_replays_total: IntCounter,
    admissions_rejected_total: IntCounterVec,
    apns_inflight_streams: IntGaugeVec,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Per-token delivery attempts by platform and outcome",
            ),
            &["platform", "outcome"],
        )?;
        let invalid_tokens_total = IntCounterVec::new(
            Opts::new(
                "invalid_tokens_total",
                "Device tokens classified as permanently undeliverable",
            ),
            &["platform"],
        )?;
        let rate_limit_throttled_total = IntCounter::with_opts(Opts::new(
            "rate_limit_throttled_total",
            "Requests rejected due to rate limiting",
        ))?;
        let nonce_replays_total = IntCounter::with_opts(Opts::new(
            "nonce_replays_total",
            "Signed requests rejected because their nonce was already consumed",
        ))?;
        let admissions_rejected_total = IntCounterVec::new(
            Opts::new(
                "admissions_rejected_total",
                "Requests rejected by the admission pipeline, by stage",
            ),
            &["stage"],
        )?;
        let apns_inflight_streams = IntGaugeVec::new(
            Opts::new(
                "apns_inflight_streams",
                "Concurrent APNs HTTP/2 streams per tenant",
            ),
            &["app_id"],
        )?;

        registry
            .register(Box::new(notifications_total.clone()))
            .context("failed to register notifications_total")?;
        registry
            .register(Box::new(invalid_tokens_total.clone()))
            .context("failed to register invalid_tokens_total")?;
        registry
            .register(Box::new(rate_limit_throttled_total.clone()))
            .context("failed to register rate_limit_throttled_total")?;
        registry
            .register(Box::new(nonce_replays_total.clone()))
            .context("failed to register nonce_replays_total")?;
        registry
            .register(Box::new(admissions_rejected_total.clone()))
            .context("failed to register admissions_rejected_total")?;
        registry
            .register(Box::new(apns_inflight_streams.clone()))
            .context("failed to register apns_inflight_streams")?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                notifications_total,
                invalid_tokens_total,
                rate_limit_throttled_total,
                nonce_replays_total,
                admissions_rejected_total,
                apns_inflight_streams,
            }),
        })
    }

    /// Record the aggregate outcome of a provider batch.
    pub fn record_send_outcome(&self, platform: &str, sent: u64, failed: u64, invalid: u64) {
        self.inner
            .notifications_total
            .with_label_values(&[platform, "sent"])
            .inc_by(sent);
        self.inner
            .notifications_total
            .with_label_values(&[platform, "failed"])
            .inc_by(failed);
        self.inner
            .invalid_tokens_total
            .with_label_values(&[platform])
            .inc_by(invalid);
    }

    /// Record a request rejected by the rate limiter.
    pub fn inc_rate_limit_throttled(&self) {
        self.inner.rate_limit_throttled_total.inc();
    }

    /// Record a signed request rejected for nonce reuse.
    pub fn inc_nonce_replay(&self) {
        self.inner.nonce_replays_total.inc();
    }

    /// Record an admission rejection attributed to a pipeline stage.
    pub fn inc_admission_rejected(&self, stage: &str) {
        self.inner
            .admissions_rejected_total
            .with_label_values(&[stage])
            .inc();
    }

    /// Sample the number of in-flight APNs streams for a tenant.
    pub fn set_apns_inflight(&self, app_id: &str, streams: i64) {
        self.inner
            .apns_inflight_streams
            .with_label_values(&[app_id])
            .set(streams);
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.inner.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid utf-8")
    }
}
