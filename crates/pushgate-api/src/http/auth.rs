//! Authentication stages of the admission pipeline: body capture, API-key
//! auth, HMAC verification with nonce consumption, and admin Basic auth.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::error;

use crate::http::constants::{
    HEADER_API_KEY, HEADER_APP_ID, HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP, MAX_NONCE_LEN,
};
use crate::http::errors::ApiError;
use crate::signing::verify_signature;
use crate::state::ApiState;

/// Admission result stashed on the request for the dispatch handler.
#[derive(Clone)]
pub(crate) struct AdmissionContext {
    /// Parsed request body; the raw bytes were already consumed for HMAC.
    pub(crate) payload: Arc<Value>,
    /// App id verified by the API-key stage, when that stage ran.
    pub(crate) auth_app_id: Option<String>,
}

/// Body capture, API-key, and HMAC stages in pipeline order.
///
/// The raw body bytes are retained verbatim between parsing and signature
/// verification; the parsed value is stashed for the handler so no
/// re-serialization can perturb the signed bytes.
pub(crate) async fn admit(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    let bytes = axum::body::to_bytes(body, state.config.body_limit)
        .await
        .map_err(|_| {
            state.metrics.inc_admission_rejected("body");
            ApiError::bad_request("Request body too large")
        })?;
    let payload: Value = serde_json::from_slice(&bytes).map_err(|_| {
        state.metrics.inc_admission_rejected("body");
        ApiError::bad_request("Invalid JSON")
    })?;

    let mut auth_app_id = None;
    let mut known_secret: Option<(String, String)> = None;

    if state.config.require_auth {
        let app_id = resolve_app_id(&parts, &payload)
            .ok_or_else(|| ApiError::bad_request("Missing app id"))?;
        let presented = extract_api_key(&parts)
            .ok_or_else(|| ApiError::unauthorized("Missing API key"))?;
        let secret = lookup_secret(&state, &app_id).await?;
        let Some(secret) = secret else {
            state.metrics.inc_admission_rejected("api_key");
            return Err(ApiError::unauthorized("Invalid API key"));
        };
        if !bool::from(secret.as_bytes().ct_eq(presented.as_bytes())) {
            state.metrics.inc_admission_rejected("api_key");
            return Err(ApiError::unauthorized("Invalid API key"));
        }
        known_secret = Some((app_id.clone(), secret));
        auth_app_id = Some(app_id);
    }

    if state.config.require_hmac {
        let app_id = resolve_app_id(&parts, &payload)
            .ok_or_else(|| ApiError::bad_request("Missing app id"))?;
        let (timestamp, nonce, signature) = signature_headers(&parts)?;

        let now = Utc::now();
        let window_ms = i64::try_from(state.config.hmac_window.as_millis()).unwrap_or(i64::MAX);
        if (now.timestamp_millis() - timestamp).abs() > window_ms {
            state.metrics.inc_admission_rejected("hmac");
            return Err(ApiError::unauthorized("Timestamp outside allowed window"));
        }

        let secret = match &known_secret {
            Some((known_app, secret)) if *known_app == app_id => Some(secret.clone()),
            _ => lookup_secret(&state, &app_id).await?,
        };
        let Some(secret) = secret else {
            state.metrics.inc_admission_rejected("hmac");
            return Err(ApiError::unauthorized("Unknown app"));
        };

        if !verify_signature(
            &secret,
            parts.method.as_str(),
            parts.uri.path(),
            timestamp,
            &nonce,
            &bytes,
            &signature,
        ) {
            state.metrics.inc_admission_rejected("hmac");
            return Err(ApiError::unauthorized("Invalid signature"));
        }

        let expires_at = DateTime::<Utc>::from_timestamp_millis(timestamp.saturating_add(window_ms))
            .unwrap_or_else(|| now + state.config.hmac_window);
        let consumed = state
            .store
            .consume_nonce(&app_id, nonce.trim(), now, expires_at)
            .await
            .map_err(|err| {
                error!(error = %err, "nonce consume failed");
                ApiError::internal("Internal server error")
            })?;
        if !consumed {
            state.metrics.inc_nonce_replay();
            state.metrics.inc_admission_rejected("nonce");
            return Err(ApiError::unauthorized("Nonce already used"));
        }

        if auth_app_id.is_none() {
            auth_app_id = Some(app_id);
        }
    }

    parts.extensions.insert(AdmissionContext {
        payload: Arc::new(payload),
        auth_app_id,
    });
    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

/// HTTP Basic authentication against the admin principal store.
pub(crate) async fn require_admin(
    State(state): State<Arc<ApiState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some((username, password)) = basic_credentials(&req) else {
        return Err(ApiError::unauthorized("Authentication required"));
    };
    let admin = state
        .store
        .get_admin_by_username(&username)
        .await
        .map_err(|err| {
            error!(error = %err, "admin lookup failed");
            ApiError::internal("Internal server error")
        })?;
    let Some(admin) = admin else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    let verified = pushgate_data::secrets::verify_password(&admin.password_hash, &password)
        .map_err(|err| {
            error!(error = %err, "password verification failed");
            ApiError::internal("Internal server error")
        })?;
    if !verified {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    Ok(next.run(req).await)
}

fn basic_credentials(req: &Request<Body>) -> Option<(String, String)> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn resolve_app_id(parts: &axum::http::request::Parts, payload: &Value) -> Option<String> {
    if let Some(app_id) = payload.get("appId").and_then(Value::as_str)
        && !app_id.trim().is_empty()
    {
        return Some(app_id.trim().to_string());
    }
    parts
        .headers
        .get(HEADER_APP_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn extract_api_key(parts: &axum::http::request::Parts) -> Option<String> {
    if let Some(bearer) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return Some(bearer.to_string());
    }
    parts
        .headers
        .get(HEADER_API_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn signature_headers(
    parts: &axum::http::request::Parts,
) -> Result<(i64, String, String), ApiError> {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };
    let invalid = || ApiError::unauthorized("Missing or invalid signature headers");

    let timestamp = header(HEADER_TIMESTAMP)
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    let nonce = header(HEADER_NONCE).ok_or_else(invalid)?;
    if nonce.len() > MAX_NONCE_LEN {
        return Err(invalid());
    }
    let signature = header(HEADER_SIGNATURE).ok_or_else(invalid)?;
    Ok((timestamp, nonce, signature))
}

async fn lookup_secret(state: &ApiState, app_id: &str) -> Result<Option<String>, ApiError> {
    state.store.get_api_secret(app_id).await.map_err(|err| {
        error!(error = %err, "API secret lookup failed");
        ApiError::internal("Internal server error")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionConfig;
    use crate::http::testing::{MockDispatcher, MockStore};
    use crate::signing::sign_request;
    use anyhow::Result;
    use axum::{
        Router,
        body::to_bytes,
        http::{Method, StatusCode},
        middleware,
        routing::post,
    };
    use pushgate_telemetry::Metrics;
    use serde_json::json;
    use tower::ServiceExt;

    const SECRET: &str = "2f1e4d5c6b7a8990a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718";

    fn admitted_router(config: AdmissionConfig, store: MockStore) -> Result<Router> {
        let state = Arc::new(ApiState::new(
            Arc::new(store),
            Arc::new(MockDispatcher::default()),
            config,
            Metrics::new()?,
        ));
        Ok(Router::new()
            .route("/v1/notify", post(|| async { "admitted" }))
            .route_layer(middleware::from_fn_with_state(state.clone(), admit))
            .with_state(state))
    }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "appId": "com.acme.app",
            "platform": "ios",
            "tokens": ["t1", "t2"],
            "notification": {"title": "Hi", "body": "there"}
        }))
        .expect("body serializes")
    }

    fn signed_request(body: &[u8], timestamp: i64, nonce: &str) -> Result<Request<Body>> {
        let signature = sign_request(SECRET, "POST", "/v1/notify", timestamp, nonce, body);
        Ok(Request::builder()
            .method(Method::POST)
            .uri("/v1/notify")
            .header("content-type", "application/json")
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header(HEADER_NONCE, nonce)
            .header(HEADER_SIGNATURE, signature)
            .body(Body::from(body.to_vec()))?)
    }

    fn hmac_config() -> AdmissionConfig {
        AdmissionConfig {
            require_hmac: true,
            require_auth: false,
            ..AdmissionConfig::default()
        }
    }

    #[tokio::test]
    async fn valid_signature_is_admitted_and_replay_is_rejected() -> Result<()> {
        let app = admitted_router(hmac_config(), MockStore::with_secret("com.acme.app", SECRET))?;
        let body = body();
        let timestamp = Utc::now().timestamp_millis();

        let first = app
            .clone()
            .oneshot(signed_request(&body, timestamp, "nonce-1")?)
            .await?;
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(signed_request(&body, timestamp, "nonce-1")?)
            .await?;
        assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(second.into_body(), usize::MAX).await?;
        let envelope: Value = serde_json::from_slice(&body)?;
        assert_eq!(envelope["ok"], json!(false));
        assert_eq!(envelope["error"]["message"], json!("Nonce already used"));
        Ok(())
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected_even_with_valid_signature() -> Result<()> {
        let app = admitted_router(hmac_config(), MockStore::with_secret("com.acme.app", SECRET))?;
        let body = body();
        let timestamp = Utc::now().timestamp_millis() - 310_000;

        let response = app.oneshot(signed_request(&body, timestamp, "nonce-2")?).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let envelope: Value = serde_json::from_slice(&body)?;
        assert!(
            envelope["error"]["message"]
                .as_str()
                .is_some_and(|message| message.contains("outside allowed window"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn tampered_body_fails_verification() -> Result<()> {
        let app = admitted_router(hmac_config(), MockStore::with_secret("com.acme.app", SECRET))?;
        let timestamp = Utc::now().timestamp_millis();
        let signature = sign_request(SECRET, "POST", "/v1/notify", timestamp, "nonce-3", &body());
        let tampered = serde_json::to_vec(&json!({
            "appId": "com.acme.app",
            "platform": "ios",
            "tokens": ["t1", "evil"],
            "notification": {"title": "Hi", "body": "there"}
        }))?;

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .header(HEADER_TIMESTAMP, timestamp.to_string())
                    .header(HEADER_NONCE, "nonce-3")
                    .header(HEADER_SIGNATURE, signature)
                    .body(Body::from(tampered))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_app_is_indistinguishable_from_missing() -> Result<()> {
        // A disabled app yields no secret, so the HMAC stage rejects with 401.
        let app = admitted_router(hmac_config(), MockStore::default())?;
        let response = app
            .oneshot(signed_request(&body(), Utc::now().timestamp_millis(), "nonce-4")?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn api_key_stage_accepts_bearer_and_rejects_mismatch() -> Result<()> {
        let config = AdmissionConfig {
            require_hmac: false,
            require_auth: true,
            ..AdmissionConfig::default()
        };
        let app = admitted_router(config, MockStore::with_secret("com.acme.app", SECRET))?;

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .header(AUTHORIZATION, format!("Bearer {SECRET}"))
                    .body(Body::from(body()))?,
            )
            .await?;
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .body(Body::from(body()))?,
            )
            .await?;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .header(HEADER_API_KEY, "not-the-secret")
                    .body(Body::from(body()))?,
            )
            .await?;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_json_is_rejected_before_auth() -> Result<()> {
        let app = admitted_router(hmac_config(), MockStore::with_secret("com.acme.app", SECRET))?;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .body(Body::from("{not json"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let envelope: Value = serde_json::from_slice(&body)?;
        assert_eq!(envelope["error"]["message"], json!("Invalid JSON"));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() -> Result<()> {
        let config = AdmissionConfig {
            body_limit: 64,
            ..hmac_config()
        };
        let app = admitted_router(config, MockStore::with_secret("com.acme.app", SECRET))?;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/notify")
                    .body(Body::from(vec![b'x'; 128]))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[test]
    fn nonce_length_is_bounded() {
        let parts = Request::builder()
            .method(Method::POST)
            .uri("/v1/notify")
            .header(HEADER_TIMESTAMP, "1700000000000")
            .header(HEADER_NONCE, "n".repeat(MAX_NONCE_LEN + 1))
            .header(HEADER_SIGNATURE, "00ff")
            .body(Body::empty())
            .expect("request builds")
            .into_parts()
            .0;
        assert!(signature_headers(&parts).is_err());
    }
}
