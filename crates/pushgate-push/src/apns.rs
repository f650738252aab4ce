//! Per-tenant APNs HTTP/2 provider with batched sends and failure
//! classification.
//!
//! # Design
//! - One long-lived provider per tenant; the JWT provider token is minted
//!   lazily and reused until its refresh deadline.
//! - Concurrent streams per provider are bounded by a semaphore, replacing
//!   the per-connection listener cap of event-driven HTTP/2 stacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::error::{PushError, Result};
use crate::message::{SendOutcome, SubmitRequest, TokenOutcome};

const PRODUCTION_HOST: &str = "https://api.push.apple.com";
const SANDBOX_HOST: &str = "https://api.sandbox.push.apple.com";
const APNS_BATCH_SIZE: usize = 1000;
const DEFAULT_TTL_SECS: u64 = 3600;
const BEARER_LIFETIME: Duration = Duration::from_secs(40 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const INVALID_REASONS: [&str; 3] = ["BadDeviceToken", "Unregistered", "DeviceTokenNotForTopic"];

/// Inputs for constructing a tenant provider.
#[derive(Debug, Clone)]
pub struct ApnsCredentials {
    /// Bundle id; equals the tenant app id and the default push topic.
    pub bundle_id: String,
    /// Apple developer team identifier.
    pub team_id: String,
    /// APNs auth key identifier.
    pub key_id: String,
    /// Inline PEM private key (EC or PKCS#8).
    pub private_key_pem: String,
    /// Selects the production endpoint over the sandbox.
    pub production: bool,
}

#[derive(Serialize)]
struct ProviderClaims {
    iss: String,
    iat: i64,
}

struct CachedBearer {
    token: String,
    minted_at: Instant,
}

#[derive(Deserialize)]
struct ApnsErrorBody {
    reason: Option<String>,
}

struct RequestContext {
    topic: String,
    push_type: String,
    priority: u32,
    expiration: i64,
    collapse_id: Option<String>,
}

impl RequestContext {
    fn derive(request: &SubmitRequest, bundle_id: &str, now_secs: i64) -> Self {
        let alert = request.has_alert();
        let push_type = request.apns.push_type.clone().unwrap_or_else(|| {
            if request.apns.content_available && !alert {
                "background".to_string()
            } else {
                "alert".to_string()
            }
        });
        let priority = if push_type == "background" { 5 } else { 10 };
        let ttl = request.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS);
        let expiration = now_secs.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX));
        Self {
            topic: request
                .apns
                .topic
                .clone()
                .unwrap_or_else(|| bundle_id.to_string()),
            push_type,
            priority,
            expiration,
            collapse_id: request.apns.collapse_id.clone(),
        }
    }
}

/// Long-lived APNs provider for a single tenant.
pub struct ApnsProvider {
    client: reqwest::Client,
    host: &'static str,
    bundle_id: String,
    team_id: String,
    key_id: String,
    signing_key: EncodingKey,
    bearer: Mutex<Option<CachedBearer>>,
    streams: Arc<Semaphore>,
    max_streams: usize,
    inflight: AtomicI64,
}

impl ApnsProvider {
    /// Construct a provider from inline credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM key cannot be loaded or the HTTP client
    /// cannot be built.
    pub fn new(credentials: &ApnsCredentials, max_streams: usize) -> Result<Self> {
        let signing_key =
            EncodingKey::from_ec_pem(credentials.private_key_pem.as_bytes()).map_err(|err| {
                PushError::InvalidKey {
                    reason: err.to_string(),
                }
            })?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| PushError::BuildClient { source })?;
        Ok(Self {
            client,
            host: if credentials.production {
                PRODUCTION_HOST
            } else {
                SANDBOX_HOST
            },
            bundle_id: credentials.bundle_id.clone(),
            team_id: credentials.team_id.clone(),
            key_id: credentials.key_id.clone(),
            signing_key,
            bearer: Mutex::new(None),
            streams: Arc::new(Semaphore::new(max_streams)),
            max_streams,
            inflight: AtomicI64::new(0),
        })
    }

    /// Deliver a normalized request to every token, in batches.
    ///
    /// Per-token rejections are folded into the outcome rather than raised;
    /// only cross-cutting failures (token minting) surface as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider token cannot be minted.
    pub async fn send(&self, request: &SubmitRequest) -> Result<SendOutcome> {
        let bearer = self.bearer().await?;
        let context = RequestContext::derive(request, &self.bundle_id, Utc::now().timestamp());
        let body = build_payload(request).to_string();

        let mut outcome = SendOutcome {
            requested: request.tokens.len(),
            ..SendOutcome::default()
        };
        for chunk in request.tokens.chunks(APNS_BATCH_SIZE) {
            let verdicts = futures_util::future::join_all(
                chunk
                    .iter()
                    .map(|token| self.send_one(token, &body, &context, &bearer)),
            )
            .await;
            for (token, verdict) in chunk.iter().zip(verdicts) {
                outcome.record(token, verdict);
            }
        }
        debug!(
            topic = %context.topic,
            requested = outcome.requested,
            sent = outcome.sent,
            failed = outcome.failed,
            "completed APNs batch"
        );
        Ok(outcome)
    }

    async fn send_one(
        &self,
        token: &str,
        body: &str,
        context: &RequestContext,
        bearer: &str,
    ) -> TokenOutcome {
        let Ok(_permit) = self.streams.acquire().await else {
            return TokenOutcome::Failed;
        };
        self.inflight.fetch_add(1, Ordering::Relaxed);
        let verdict = self.exchange(token, body, context, bearer).await;
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        verdict
    }

    async fn exchange(
        &self,
        token: &str,
        body: &str,
        context: &RequestContext,
        bearer: &str,
    ) -> TokenOutcome {
        let mut request = self
            .client
            .post(format!("{}/3/device/{token}", self.host))
            .bearer_auth(bearer)
            .header("apns-topic", &context.topic)
            .header("apns-push-type", &context.push_type)
            .header("apns-priority", context.priority)
            .header("apns-expiration", context.expiration)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(collapse_id) = &context.collapse_id {
            request = request.header("apns-collapse-id", collapse_id);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => TokenOutcome::Sent,
            Ok(response) => {
                let status = response.status().as_u16();
                let reason = response
                    .json::<ApnsErrorBody>()
                    .await
                    .ok()
                    .and_then(|error| error.reason);
                if is_invalid_rejection(status, reason.as_deref()) {
                    TokenOutcome::Invalid
                } else {
                    warn!(status, reason = reason.as_deref(), "APNs rejected notification");
                    TokenOutcome::Failed
                }
            }
            Err(err) => {
                warn!(error = %err, "APNs exchange failed");
                TokenOutcome::Failed
            }
        }
    }

    async fn bearer(&self) -> Result<String> {
        let mut guard = self.bearer.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.minted_at.elapsed() < BEARER_LIFETIME
        {
            return Ok(cached.token.clone());
        }
        let claims = ProviderClaims {
            iss: self.team_id.clone(),
            iat: Utc::now().timestamp(),
        };
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let token =
            jsonwebtoken::encode(&header, &claims, &self.signing_key).map_err(|err| {
                PushError::Sign {
                    reason: err.to_string(),
                }
            })?;
        *guard = Some(CachedBearer {
            token: token.clone(),
            minted_at: Instant::now(),
        });
        Ok(token)
    }

    /// Current number of in-flight HTTP/2 streams.
    #[must_use]
    pub fn inflight(&self) -> i64 {
        self.inflight.load(Ordering::Relaxed)
    }

    /// Wait for in-flight streams to complete.
    pub async fn drain(&self) {
        let total = u32::try_from(self.max_streams).unwrap_or(u32::MAX);
        if let Ok(permits) = self.streams.acquire_many(total).await {
            drop(permits);
        }
    }
}

fn is_invalid_rejection(status: u16, reason: Option<&str>) -> bool {
    status == 410 || reason.is_some_and(|reason| INVALID_REASONS.contains(&reason))
}

fn build_payload(request: &SubmitRequest) -> Value {
    let mut aps = Map::new();
    if let Some(notification) = request
        .notification
        .as_ref()
        .filter(|notification| notification.has_alert())
    {
        let mut alert = Map::new();
        if let Some(title) = &notification.title {
            alert.insert("title".to_string(), json!(title));
        }
        if let Some(body) = &notification.body {
            alert.insert("body".to_string(), json!(body));
        }
        aps.insert("alert".to_string(), Value::Object(alert));
    }
    match &request.apns.sound {
        Some(sound) => {
            aps.insert("sound".to_string(), json!(sound));
        }
        None if request.has_alert() => {
            aps.insert("sound".to_string(), json!("default"));
        }
        None => {}
    }
    if let Some(badge) = request.apns.badge {
        aps.insert("badge".to_string(), json!(badge));
    }
    if let Some(category) = &request.apns.category {
        aps.insert("category".to_string(), json!(category));
    }
    if let Some(thread_id) = &request.apns.thread_id {
        aps.insert("thread-id".to_string(), json!(thread_id));
    }
    if request.apns.mutable_content {
        aps.insert("mutable-content".to_string(), json!(1));
    }
    if request.apns.content_available {
        aps.insert("content-available".to_string(), json!(1));
    }

    let mut root = Map::new();
    root.insert("aps".to_string(), Value::Object(aps));
    for (key, value) in &request.data {
        root.insert(key.clone(), json!(value));
    }
    Value::Object(root)
}
