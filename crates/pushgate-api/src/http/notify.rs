//! Dispatch handler for `POST /v1/notify`.

use std::sync::Arc;

use axum::{Extension, Json, extract::State};
use pushgate_push::{Platform, SendOutcome};
use serde::Serialize;
use tracing::error;

use crate::http::auth::AdmissionContext;
use crate::http::errors::ApiError;
use crate::http::validate::validate_submit;
use crate::state::ApiState;

#[derive(Serialize)]
pub(crate) struct NotifyResponse {
    ok: bool,
    #[serde(rename = "appId")]
    app_id: String,
    results: PlatformResults,
}

#[derive(Serialize, Default)]
pub(crate) struct PlatformResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    ios: Option<SendOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android: Option<SendOutcome>,
}

/// Validate, resolve the tenant, dispatch to the declared platform, and
/// shape the response.
pub(crate) async fn submit_notification(
    State(state): State<Arc<ApiState>>,
    Extension(context): Extension<AdmissionContext>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let request = validate_submit(&context.payload)?;

    if let Some(auth_app_id) = &context.auth_app_id
        && *auth_app_id != request.app_id
    {
        return Err(ApiError::bad_request(
            "appId does not match the authenticated app",
        ));
    }

    let tenant = state
        .store
        .get_app_config(&request.app_id)
        .await
        .map_err(|err| {
            error!(error = %err, "tenant lookup failed");
            ApiError::internal("Internal server error")
        })?
        .ok_or_else(|| ApiError::not_found("Unknown app"))?;

    let outcome = match request.platform {
        Platform::Ios => {
            let credential = tenant
                .ios
                .as_ref()
                .ok_or_else(|| ApiError::bad_request("iOS is not configured for this app"))?;
            state
                .dispatcher
                .send_ios(credential, &request)
                .await
                .map_err(|err| {
                    error!(error = %err, app_id = %request.app_id, "APNs dispatch failed");
                    ApiError::internal("Failed to deliver notifications")
                })?
        }
        Platform::Android => {
            let credential = tenant
                .android
                .as_ref()
                .ok_or_else(|| ApiError::bad_request("Android is not configured for this app"))?;
            state
                .dispatcher
                .send_android(credential, &request)
                .await
                .map_err(|err| {
                    error!(error = %err, app_id = %request.app_id, "FCM dispatch failed");
                    ApiError::internal("Failed to deliver notifications")
                })?
        }
    };

    state.metrics.record_send_outcome(
        request.platform.as_str(),
        u64::try_from(outcome.sent).unwrap_or(u64::MAX),
        u64::try_from(outcome.failed).unwrap_or(u64::MAX),
        u64::try_from(outcome.invalid_tokens.len()).unwrap_or(u64::MAX),
    );

    let results = match request.platform {
        Platform::Ios => PlatformResults {
            ios: Some(outcome),
            ..PlatformResults::default()
        },
        Platform::Android => PlatformResults {
            android: Some(outcome),
            ..PlatformResults::default()
        },
    };
    Ok(Json(NotifyResponse {
        ok: true,
        app_id: request.app_id,
        results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdmissionConfig, ApiConfig};
    use crate::http::constants::{HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP};
    use crate::http::router::ApiServer;
    use crate::http::testing::{MockDispatcher, MockStore, tenant_with_android, tenant_with_ios};
    use crate::signing::sign_request;
    use anyhow::Result;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use chrono::Utc;
    use pushgate_telemetry::Metrics;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "9e8d7c6b5a40392817161514131211100f0e0d0c0b0a09080706050403020100";

    fn server(store: MockStore, dispatcher: MockDispatcher) -> Result<ApiServer> {
        let config = ApiConfig {
            admission: AdmissionConfig {
                require_hmac: true,
                require_auth: false,
                ..AdmissionConfig::default()
            },
            admin_base_path: "/ops-console-f3d1c9a0".to_string(),
        };
        Ok(ApiServer::new(
            Arc::new(store),
            Arc::new(dispatcher),
            config,
            Metrics::new()?,
        ))
    }

    fn signed(body: &[u8], nonce: &str) -> Result<Request<Body>> {
        let timestamp = Utc::now().timestamp_millis();
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

    fn ios_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "appId": "com.acme.app",
            "platform": "ios",
            "tokens": ["t1", "t2"],
            "notification": {"title": "Hi", "body": "there"}
        }))
        .expect("body serializes")
    }

    async fn json_body(response: axum::response::Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn happy_ios_send_reports_full_success() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        store.insert_tenant(tenant_with_ios("com.acme.app"));
        let server = server(store, MockDispatcher::default())?;

        // Callers derive the nonce from a UUID; any opaque string works.
        let nonce = uuid::Uuid::new_v4().to_string();
        let response = server
            .router()
            .clone()
            .oneshot(signed(&ios_body(), &nonce)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["appId"], json!("com.acme.app"));
        assert_eq!(
            body["results"]["ios"],
            json!({"requested": 2, "sent": 2, "failed": 0, "invalidTokens": []})
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_surfaced_in_invalid_tokens() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        store.insert_tenant(tenant_with_ios("com.acme.app"));
        let dispatcher = MockDispatcher::with_ios_outcome(SendOutcome {
            requested: 2,
            sent: 1,
            failed: 1,
            invalid_tokens: vec!["t2".to_string()],
        });
        let server = server(store, dispatcher)?;

        let response = server
            .router()
            .clone()
            .oneshot(signed(&ios_body(), "nonce-b")?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["results"]["ios"]["sent"], json!(1));
        assert_eq!(body["results"]["ios"]["failed"], json!(1));
        assert_eq!(body["results"]["ios"]["invalidTokens"], json!(["t2"]));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_app_is_not_found() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        let server = server(store, MockDispatcher::default())?;

        let response = server
            .router()
            .clone()
            .oneshot(signed(&ios_body(), "nonce-c")?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await?;
        assert_eq!(body["error"]["message"], json!("Unknown app"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_platform_credential_is_a_client_error() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        store.insert_tenant(tenant_with_android("com.acme.app"));
        let server = server(store, MockDispatcher::default())?;

        let response = server
            .router()
            .clone()
            .oneshot(signed(&ios_body(), "nonce-d")?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert_eq!(
            body["error"]["message"],
            json!("iOS is not configured for this app")
        );
        Ok(())
    }

    #[tokio::test]
    async fn android_send_uses_android_results_key() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        store.insert_tenant(tenant_with_android("com.acme.app"));
        let dispatcher = Arc::new(MockDispatcher::default());
        let config = ApiConfig {
            admission: AdmissionConfig {
                require_hmac: true,
                require_auth: false,
                ..AdmissionConfig::default()
            },
            admin_base_path: "/ops-console-f3d1c9a0".to_string(),
        };
        let server = ApiServer::new(
            Arc::new(store),
            dispatcher.clone(),
            config,
            Metrics::new()?,
        );

        let body = serde_json::to_vec(&json!({
            "appId": "com.acme.app",
            "platform": "android",
            "tokens": ["t1", "t1", "t2"],
            "data": {"k": "v"}
        }))?;
        let response = server
            .router()
            .clone()
            .oneshot(signed(&body, "nonce-e")?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["results"]["android"]["sent"], json!(2));
        assert!(body["results"].get("ios").is_none());

        // The dispatcher receives the normalized request, tokens deduplicated.
        let sent = dispatcher.sent_requests.lock().expect("sent lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tokens, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(sent[0].data.get("k").map(String::as_str), Some("v"));
        Ok(())
    }

    #[tokio::test]
    async fn over_limit_tokens_are_rejected_with_the_documented_message() -> Result<()> {
        let store = MockStore::with_secret("com.acme.app", SECRET);
        store.insert_tenant(tenant_with_ios("com.acme.app"));
        let server = server(store, MockDispatcher::default())?;

        let body = serde_json::to_vec(&json!({
            "appId": "com.acme.app",
            "platform": "ios",
            "tokens": (0..501).map(|index| format!("t{index}")).collect::<Vec<_>>(),
            "notification": {"title": "Hi"}
        }))?;
        let response = server
            .router()
            .clone()
            .oneshot(signed(&body, "nonce-f")?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert_eq!(body["error"]["message"], json!("tokens cannot exceed 500"));
        Ok(())
    }

    #[tokio::test]
    async fn health_bypasses_admission() -> Result<()> {
        let server = server(MockStore::default(), MockDispatcher::default())?;
        let response = server
            .router()
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body, json!({"ok": true}));
        Ok(())
    }
}
