//! Submit-payload validation and normalization.

use std::collections::{BTreeMap, HashSet};

use pushgate_push::{ApnsOverrides, FcmOverrides, Notification, Platform, SubmitRequest};
use serde_json::Value;

use crate::http::errors::ApiError;

const MAX_TOKENS: usize = 500;
const MAX_TOKEN_LEN: usize = 4096;
const MAX_TITLE_LEN: usize = 256;
const MAX_BODY_LEN: usize = 2048;

/// Normalize the posted JSON into a typed request.
///
/// Tokens are deduplicated preserving first occurrence, title and body are
/// trimmed and dropped when empty, and data values are coerced to strings.
pub(crate) fn validate_submit(payload: &Value) -> Result<SubmitRequest, ApiError> {
    let object = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Request body must be a JSON object"))?;

    let app_id = object
        .get("appId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("appId is required"))?
        .to_string();

    if object.get("broadcast").is_some_and(truthy) {
        return Err(ApiError::bad_request("broadcast is not supported"));
    }

    let platform = object
        .get("platform")
        .and_then(Value::as_str)
        .and_then(Platform::parse)
        .ok_or_else(|| ApiError::bad_request("platform must be ios or android"))?;

    let tokens = validate_tokens(object.get("tokens"))?;
    let notification = validate_notification(object.get("notification"))?;
    let data = validate_data(object.get("data"))?;

    let ttl_seconds = match object.get("ttlSeconds") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .ok_or_else(|| ApiError::bad_request("ttlSeconds must be a non-negative integer"))?,
        ),
    };

    let apns: ApnsOverrides = match object.get("apns") {
        None | Some(Value::Null) => ApnsOverrides::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|_| ApiError::bad_request("apns overrides are malformed"))?,
    };
    let fcm: FcmOverrides = match object.get("fcm") {
        None | Some(Value::Null) => FcmOverrides::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|_| ApiError::bad_request("fcm overrides are malformed"))?,
    };

    let has_alert = notification
        .as_ref()
        .is_some_and(Notification::has_alert);
    if !has_alert && data.is_empty() {
        return Err(ApiError::bad_request("notification or data is required"));
    }

    Ok(SubmitRequest {
        app_id,
        platform,
        tokens,
        notification,
        data,
        ttl_seconds,
        apns,
        fcm,
    })
}

fn validate_tokens(value: Option<&Value>) -> Result<Vec<String>, ApiError> {
    let entries = value
        .ok_or_else(|| ApiError::bad_request("tokens is required"))?
        .as_array()
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| ApiError::bad_request("tokens must be a non-empty array"))?;

    let mut seen = HashSet::new();
    let mut tokens = Vec::with_capacity(entries.len());
    for entry in entries {
        let token = entry
            .as_str()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::bad_request("tokens must contain only non-empty strings"))?;
        if token.chars().count() > MAX_TOKEN_LEN {
            return Err(ApiError::bad_request(
                "tokens cannot contain entries longer than 4096 characters",
            ));
        }
        if seen.insert(token.to_string()) {
            tokens.push(token.to_string());
        }
    }
    if tokens.len() > MAX_TOKENS {
        return Err(ApiError::bad_request("tokens cannot exceed 500")
            .with_details(serde_json::json!({"limit": MAX_TOKENS, "received": tokens.len()})));
    }
    Ok(tokens)
}

fn validate_notification(value: Option<&Value>) -> Result<Option<Notification>, ApiError> {
    let object = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value
            .as_object()
            .ok_or_else(|| ApiError::bad_request("notification must be an object"))?,
    };

    let title = bounded_text(object.get("title"), "notification.title", MAX_TITLE_LEN)?;
    let body = bounded_text(object.get("body"), "notification.body", MAX_BODY_LEN)?;
    Ok(Some(Notification { title, body }))
}

fn bounded_text(
    value: Option<&Value>,
    field: &str,
    max_len: usize,
) -> Result<Option<String>, ApiError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ApiError::bad_request(format!("{field} must be a string")))?,
    };
    if text.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{field} cannot exceed {max_len} characters"
        )));
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

fn validate_data(value: Option<&Value>) -> Result<BTreeMap<String, String>, ApiError> {
    let object = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(value) => value
            .as_object()
            .ok_or_else(|| ApiError::bad_request("data must be a flat object"))?,
    };

    let mut data = BTreeMap::new();
    for (key, value) in object {
        let coerced = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(ApiError::bad_request("data values must be scalar"));
            }
        };
        data.insert(key.clone(), coerced);
    }
    Ok(data)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty() && text != "false" && text != "0",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "appId": "com.acme.app",
            "platform": "ios",
            "tokens": ["t1", "t2"],
            "notification": {"title": "Hi", "body": "there"}
        })
    }

    #[test]
    fn valid_payload_normalizes() {
        let request = validate_submit(&base()).expect("payload validates");
        assert_eq!(request.app_id, "com.acme.app");
        assert_eq!(request.platform, Platform::Ios);
        assert_eq!(request.tokens, vec!["t1", "t2"]);
        assert!(request.has_alert());
    }

    #[test]
    fn rejects_non_objects_and_missing_app_id() {
        assert!(validate_submit(&json!([1, 2])).is_err());
        assert!(validate_submit(&json!("body")).is_err());
        let mut payload = base();
        payload["appId"] = json!("   ");
        assert!(validate_submit(&payload).is_err());
    }

    #[test]
    fn rejects_broadcast_and_unknown_platforms() {
        let mut payload = base();
        payload["broadcast"] = json!(true);
        assert!(validate_submit(&payload).is_err());

        let mut payload = base();
        payload["platform"] = json!("web");
        let error = validate_submit(&payload).unwrap_err();
        assert_eq!(error.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn token_count_boundary_is_exact() {
        let mut payload = base();
        payload["tokens"] = json!((0..500).map(|index| format!("t{index}")).collect::<Vec<_>>());
        assert_eq!(validate_submit(&payload).expect("500 tokens pass").tokens.len(), 500);

        payload["tokens"] = json!((0..501).map(|index| format!("t{index}")).collect::<Vec<_>>());
        assert!(validate_submit(&payload).is_err());
    }

    #[test]
    fn token_length_boundary_is_exact() {
        let mut payload = base();
        payload["tokens"] = json!(["a".repeat(4096)]);
        assert!(validate_submit(&payload).is_ok());

        payload["tokens"] = json!(["a".repeat(4097)]);
        assert!(validate_submit(&payload).is_err());
    }

    #[test]
    fn duplicate_tokens_collapse_preserving_first_occurrence() {
        let mut payload = base();
        payload["tokens"] = json!(["t2", "t1", "t2", "t3", "t1"]);
        let request = validate_submit(&payload).expect("payload validates");
        assert_eq!(request.tokens, vec!["t2", "t1", "t3"]);
    }

    #[test]
    fn dedup_applies_before_the_count_bound() {
        let mut payload = base();
        let mut tokens: Vec<String> = (0..500).map(|index| format!("t{index}")).collect();
        tokens.extend((0..500).map(|index| format!("t{index}")));
        payload["tokens"] = json!(tokens);
        assert_eq!(validate_submit(&payload).expect("dedup passes").tokens.len(), 500);
    }

    #[test]
    fn title_and_body_bounds_and_trimming() {
        let mut payload = base();
        payload["notification"] = json!({"title": "a".repeat(257)});
        assert!(validate_submit(&payload).is_err());

        payload["notification"] = json!({"body": "a".repeat(2049)});
        assert!(validate_submit(&payload).is_err());

        payload["notification"] = json!({"title": "  Hi  ", "body": "   "});
        let request = validate_submit(&payload).expect("payload validates");
        let notification = request.notification.expect("notification kept");
        assert_eq!(notification.title.as_deref(), Some("Hi"));
        assert_eq!(notification.body, None);
    }

    #[test]
    fn data_values_are_coerced_to_strings() {
        let mut payload = base();
        payload["data"] = json!({"count": 3, "flag": true, "text": "x"});
        let request = validate_submit(&payload).expect("payload validates");
        assert_eq!(request.data.get("count").map(String::as_str), Some("3"));
        assert_eq!(request.data.get("flag").map(String::as_str), Some("true"));
        assert_eq!(request.data.get("text").map(String::as_str), Some("x"));
    }

    #[test]
    fn nested_and_null_data_values_are_rejected() {
        let mut payload = base();
        payload["data"] = json!({"nested": {"a": 1}});
        assert!(validate_submit(&payload).is_err());

        payload["data"] = json!({"null": null});
        assert!(validate_submit(&payload).is_err());
    }

    #[test]
    fn empty_notification_and_data_is_rejected() {
        let mut payload = base();
        payload["notification"] = json!({"title": "   "});
        assert!(validate_submit(&payload).is_err());

        let payload = json!({
            "appId": "com.acme.app",
            "platform": "android",
            "tokens": ["t1"],
            "data": {"k": "v"}
        });
        assert!(validate_submit(&payload).is_ok());
    }

    #[test]
    fn ttl_must_be_a_non_negative_integer() {
        let mut payload = base();
        payload["ttlSeconds"] = json!(-5);
        assert!(validate_submit(&payload).is_err());

        payload["ttlSeconds"] = json!(0);
        assert_eq!(validate_submit(&payload).expect("zero ttl passes").ttl_seconds, Some(0));
    }

    #[test]
    fn provider_overrides_parse() {
        let mut payload = base();
        payload["apns"] = json!({"pushType": "background", "contentAvailable": true});
        payload["fcm"] = json!({"priority": "high", "collapseKey": "c"});
        let request = validate_submit(&payload).expect("payload validates");
        assert_eq!(request.apns.push_type.as_deref(), Some("background"));
        assert!(request.apns.content_available);
        assert_eq!(request.fcm.collapse_key.as_deref(), Some("c"));
    }
}
