//! Per-tenant FCM HTTP v1 client with OAuth token caching and batched
//! multicast sends.

use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{PushError, Result};
use crate::message::{SendOutcome, SubmitRequest, TokenOutcome};

const FCM_BATCH_SIZE: usize = 500;
const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Inline service-account material for a tenant.
#[derive(Debug, Clone)]
pub struct FcmCredentials {
    /// Raw service-account JSON document.
    pub service_account_json: String,
}

#[derive(Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    project_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct GrantClaims {
    iss: String,
    scope: &'static str,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct FcmErrorBody {
    error: FcmErrorDetail,
}

#[derive(Deserialize)]
struct FcmErrorDetail {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<FcmErrorInfo>,
}

#[derive(Deserialize)]
struct FcmErrorInfo {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

struct CachedAccess {
    token: String,
    minted_at: Instant,
}

/// Long-lived FCM messaging client for a single tenant.
pub struct FcmClient {
    http: reqwest::Client,
    project_id: String,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    access: Mutex<Option<CachedAccess>>,
}

impl FcmClient {
    /// Construct a client from inline service-account JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is missing required fields, the
    /// private key cannot be loaded, or the HTTP client cannot be built.
    pub fn new(credentials: &FcmCredentials) -> Result<Self> {
        let account: ServiceAccount = serde_json::from_str(&credentials.service_account_json)
            .map_err(|_| PushError::InvalidServiceAccount {
                reason: "document does not parse",
            })?;
        let project_id = account
            .project_id
            .ok_or(PushError::InvalidServiceAccount {
                reason: "missing project_id",
            })?;
        let signing_key =
            EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|err| {
                PushError::InvalidKey {
                    reason: err.to_string(),
                }
            })?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| PushError::BuildClient { source })?;
        Ok(Self {
            http,
            project_id,
            client_email: account.client_email,
            token_uri: account
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            signing_key,
            access: Mutex::new(None),
        })
    }

    /// Deliver a normalized request to every token, in multicast batches.
    ///
    /// # Errors
    ///
    /// Returns an error if an OAuth access token cannot be obtained.
    pub async fn send(&self, request: &SubmitRequest) -> Result<SendOutcome> {
        let access = self.access_token().await?;
        let endpoint = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );

        let mut outcome = SendOutcome {
            requested: request.tokens.len(),
            ..SendOutcome::default()
        };
        for chunk in request.tokens.chunks(FCM_BATCH_SIZE) {
            let verdicts = futures_util::future::join_all(
                chunk
                    .iter()
                    .map(|token| self.send_one(&endpoint, &access, token, request)),
            )
            .await;
            for (token, verdict) in chunk.iter().zip(verdicts) {
                outcome.record(token, verdict);
            }
        }
        debug!(
            project_id = %self.project_id,
            requested = outcome.requested,
            sent = outcome.sent,
            failed = outcome.failed,
            "completed FCM batch"
        );
        Ok(outcome)
    }

    async fn send_one(
        &self,
        endpoint: &str,
        access: &str,
        token: &str,
        request: &SubmitRequest,
    ) -> TokenOutcome {
        let message = build_message(request, token);
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(access)
            .json(&message)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => TokenOutcome::Sent,
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.json::<FcmErrorBody>().await.ok();
                let (code, message) = body.map_or((None, None), |body| {
                    let code = body
                        .error
                        .details
                        .into_iter()
                        .find_map(|detail| detail.error_code)
                        .or(body.error.status);
                    (code, body.error.message)
                });
                if is_invalid_rejection(code.as_deref(), message.as_deref()) {
                    TokenOutcome::Invalid
                } else {
                    warn!(status, code = code.as_deref(), "FCM rejected message");
                    TokenOutcome::Failed
                }
            }
            Err(err) => {
                warn!(error = %err, "FCM exchange failed");
                TokenOutcome::Failed
            }
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.access.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.minted_at.elapsed() < ACCESS_TOKEN_LIFETIME
        {
            return Ok(cached.token.clone());
        }

        let now = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: self.client_email.clone(),
            scope: MESSAGING_SCOPE,
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
                .map_err(|err| PushError::Sign {
                    reason: err.to_string(),
                })?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|source| PushError::Http {
                operation: "fcm.token_exchange",
                source,
            })?;
        if !response.status().is_success() {
            return Err(PushError::TokenExchange {
                status: response.status().as_u16(),
            });
        }
        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|source| PushError::Http {
                    operation: "fcm.token_decode",
                    source,
                })?;
        *guard = Some(CachedAccess {
            token: token.access_token.clone(),
            minted_at: Instant::now(),
        });
        Ok(token.access_token)
    }
}

fn is_invalid_rejection(code: Option<&str>, message: Option<&str>) -> bool {
    match code {
        Some("UNREGISTERED" | "NOT_FOUND") => true,
        Some("INVALID_ARGUMENT") => message.is_some_and(|message| message.contains("token")),
        _ => false,
    }
}

fn build_message(request: &SubmitRequest, token: &str) -> Value {
    let mut message = Map::new();
    message.insert("token".to_string(), json!(token));

    if let Some(notification) = request
        .notification
        .as_ref()
        .filter(|notification| notification.has_alert())
    {
        let mut body = Map::new();
        if let Some(title) = &notification.title {
            body.insert("title".to_string(), json!(title));
        }
        if let Some(text) = &notification.body {
            body.insert("body".to_string(), json!(text));
        }
        message.insert("notification".to_string(), Value::Object(body));
    }

    if !request.data.is_empty() {
        message.insert("data".to_string(), json!(request.data));
    }

    let mut android = Map::new();
    if let Some(ttl) = request.fcm.ttl_seconds.or(request.ttl_seconds) {
        android.insert("ttl".to_string(), json!(format!("{ttl}s")));
    }
    if let Some(priority) = request.fcm.priority {
        android.insert("priority".to_string(), json!(priority.as_str()));
    }
    if let Some(collapse_key) = &request.fcm.collapse_key {
        android.insert("collapse_key".to_string(), json!(collapse_key));
    }
    if !android.is_empty() {
        message.insert("android".to_string(), Value::Object(android));
    }

    json!({ "message": Value::Object(message) })
}
