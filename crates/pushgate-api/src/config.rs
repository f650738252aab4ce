//! Admission tunables wired through application state.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

/// Toggles and bounds for the request-admission pipeline.
///
/// TLS is expected to terminate ahead of the gateway; HTTPS enforcement
/// therefore relies on `trust_proxy` and the `X-Forwarded-Proto` header.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Reject requests that did not arrive over HTTPS.
    pub require_https: bool,
    /// Honour `X-Forwarded-*` headers for client IP and scheme.
    pub trust_proxy: bool,
    /// Exact-match client allowlist; `None` disables the check.
    pub ip_allowlist: Option<HashSet<IpAddr>>,
    /// Enforce the API-key check.
    pub require_auth: bool,
    /// Enforce HMAC request signing with nonce consumption.
    pub require_hmac: bool,
    /// Freshness window around server time for signed timestamps.
    pub hmac_window: Duration,
    /// Fixed-window rate-limit period.
    pub rate_limit_window: Duration,
    /// Maximum requests per key per window.
    pub rate_limit_max: u32,
    /// Request body cap in bytes.
    pub body_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            require_https: false,
            trust_proxy: false,
            ip_allowlist: None,
            require_auth: false,
            require_hmac: true,
            hmac_window: Duration::from_millis(300_000),
            rate_limit_window: Duration::from_millis(60_000),
            rate_limit_max: 120,
            body_limit: 200 * 1024,
        }
    }
}

/// Full configuration for constructing the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Admission pipeline tunables.
    pub admission: AdmissionConfig,
    /// Mount path for the admin JSON surface, `/`-prefixed.
    pub admin_base_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AdmissionConfig::default();
        assert!(config.require_hmac);
        assert!(!config.require_auth);
        assert_eq!(config.hmac_window, Duration::from_secs(300));
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.rate_limit_max, 120);
        assert_eq!(config.body_limit, 204_800);
    }
}
