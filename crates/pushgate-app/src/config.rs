//! Environment configuration for the gateway process.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use pushgate_api::AdmissionConfig;

use crate::error::{AppError, AppResult};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_APNS_MAX_LISTENERS: usize = 75;

/// Parsed process configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen port.
    pub port: u16,
    /// Durable store connection string; required.
    pub database_url: String,
    /// Admission pipeline tunables.
    pub admission: AdmissionConfig,
    /// Desired admin mount path, generated when absent.
    pub admin_base_path: Option<String>,
    /// Desired admin session secret, generated when absent.
    pub admin_session_secret: Option<String>,
    /// Bootstrap admin username.
    pub admin_bootstrap_user: String,
    /// Bootstrap admin password, generated when absent.
    pub admin_bootstrap_password: Option<String>,
    /// Per-provider cap on concurrent APNs HTTP/2 streams.
    pub apns_max_listeners: usize,
}

impl GatewayConfig {
    /// Parse configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is absent or any recognized
    /// variable carries an unparseable value.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL").ok_or(AppError::MissingEnv {
            name: "DATABASE_URL",
        })?;
        let port = parse_number::<u16>(lookup("PORT"), "PORT")?.unwrap_or(DEFAULT_PORT);

        let require_hmac = flag_or(lookup("REQUIRE_HMAC"), true);
        let require_auth = flag_or(lookup("REQUIRE_AUTH"), !require_hmac);
        let require_https = flag_or(lookup("REQUIRE_HTTPS"), false);
        let trust_proxy = flag_or(lookup("TRUST_PROXY"), false);

        let allowed_ips = parse_allowed_ips(lookup("ALLOWED_IPS"))?;
        let allowlist_enabled =
            flag_or(lookup("IP_ALLOWLIST_ENABLED"), !allowed_ips.is_empty());
        let ip_allowlist = allowlist_enabled.then_some(allowed_ips);

        let hmac_window_ms =
            parse_number::<u64>(lookup("HMAC_WINDOW_MS"), "HMAC_WINDOW_MS")?.unwrap_or(300_000);
        let rate_limit_window_ms =
            parse_number::<u64>(lookup("RATE_LIMIT_WINDOW_MS"), "RATE_LIMIT_WINDOW_MS")?
                .unwrap_or(60_000);
        let rate_limit_max =
            parse_number::<u32>(lookup("RATE_LIMIT_MAX"), "RATE_LIMIT_MAX")?.unwrap_or(120);
        let body_limit = parse_body_limit(lookup("BODY_LIMIT"))?;
        let apns_max_listeners =
            parse_number::<usize>(lookup("APNS_MAX_LISTENERS"), "APNS_MAX_LISTENERS")?
                .unwrap_or(DEFAULT_APNS_MAX_LISTENERS);

        Ok(Self {
            port,
            database_url,
            admission: AdmissionConfig {
                require_https,
                trust_proxy,
                ip_allowlist,
                require_auth,
                require_hmac,
                hmac_window: Duration::from_millis(hmac_window_ms),
                rate_limit_window: Duration::from_millis(rate_limit_window_ms),
                rate_limit_max,
                body_limit,
            },
            admin_base_path: non_empty(lookup("ADMIN_BASE_PATH")),
            admin_session_secret: non_empty(lookup("ADMIN_SESSION_SECRET")),
            admin_bootstrap_user: non_empty(lookup("ADMIN_BOOTSTRAP_USER"))
                .unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string()),
            admin_bootstrap_password: non_empty(lookup("ADMIN_BOOTSTRAP_PASSWORD")),
            apns_max_listeners,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn flag_or(value: Option<String>, default: bool) -> bool {
    value.map_or(default, |value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_number<T: std::str::FromStr>(
    value: Option<String>,
    field: &'static str,
) -> AppResult<Option<T>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::InvalidConfig {
                field,
                reason: "not a valid number",
                value: Some(raw),
            }),
    }
}

fn parse_allowed_ips(value: Option<String>) -> AppResult<HashSet<IpAddr>> {
    let Some(raw) = non_empty(value) else {
        return Ok(HashSet::new());
    };
    let mut addresses = HashSet::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let address = entry
            .parse::<IpAddr>()
            .map_err(|_| AppError::InvalidConfig {
                field: "ALLOWED_IPS",
                reason: "not a valid IP address",
                value: Some(entry.to_string()),
            })?;
        addresses.insert(address);
    }
    Ok(addresses)
}

/// Accepts a plain byte count or a `kb`/`mb` suffixed value.
fn parse_body_limit(value: Option<String>) -> AppResult<usize> {
    let Some(raw) = non_empty(value) else {
        return Ok(200 * 1024);
    };
    let lowered = raw.to_ascii_lowercase();
    let (digits, scale) = if let Some(prefix) = lowered.strip_suffix("mb") {
        (prefix, 1024 * 1024)
    } else if let Some(prefix) = lowered.strip_suffix("kb") {
        (prefix, 1024)
    } else if let Some(prefix) = lowered.strip_suffix('b') {
        (prefix, 1)
    } else {
        (lowered.as_str(), 1)
    };
    digits
        .trim()
        .parse::<usize>()
        .map(|count| count * scale)
        .map_err(|_| AppError::InvalidConfig {
            field: "BODY_LIMIT",
            reason: "not a valid size",
            value: Some(raw),
        })
}
