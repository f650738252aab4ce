//! Normalized submit requests and per-batch delivery outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Delivery platform declared by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Apple Push Notification service.
    Ios,
    /// Firebase Cloud Messaging.
    Android,
}

impl Platform {
    /// Parse the wire value, accepting only `ios` and `android`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            _ => None,
        }
    }

    /// Wire and metrics label for the platform.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }
}

/// Optional alert content.
#[derive(Debug, Clone, Default)]
pub struct Notification {
    /// Alert title, trimmed; absent when empty.
    pub title: Option<String>,
    /// Alert body, trimmed; absent when empty.
    pub body: Option<String>,
}

impl Notification {
    /// Whether the notification carries visible alert content.
    #[must_use]
    pub const fn has_alert(&self) -> bool {
        self.title.is_some() || self.body.is_some()
    }
}

/// APNs-specific overrides accepted in the submit payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApnsOverrides {
    /// Push topic; defaults to the tenant bundle id.
    pub topic: Option<String>,
    /// Explicit `apns-push-type`, overriding the derived one.
    pub push_type: Option<String>,
    /// Explicit sound name.
    pub sound: Option<String>,
    /// Badge count.
    pub badge: Option<u32>,
    /// Notification category.
    pub category: Option<String>,
    /// Thread id for notification grouping.
    pub thread_id: Option<String>,
    /// Collapse id header value.
    pub collapse_id: Option<String>,
    /// Sets `mutable-content: 1` when true.
    pub mutable_content: bool,
    /// Sets `content-available: 1` when true.
    pub content_available: bool,
}

/// FCM delivery priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FcmPriority {
    /// Wake the device immediately.
    High,
    /// Deliver opportunistically.
    Normal,
}

impl FcmPriority {
    /// Wire value for the `android.priority` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
        }
    }
}

/// FCM-specific overrides accepted in the submit payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FcmOverrides {
    /// Android TTL override in seconds; falls back to the global TTL.
    pub ttl_seconds: Option<u64>,
    /// Delivery priority.
    pub priority: Option<FcmPriority>,
    /// Collapse key.
    pub collapse_key: Option<String>,
}

/// Fully validated and normalized submit request.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Target tenant.
    pub app_id: String,
    /// Declared platform.
    pub platform: Platform,
    /// Deduplicated device tokens, first occurrence preserved.
    pub tokens: Vec<String>,
    /// Alert content, when present.
    pub notification: Option<Notification>,
    /// Flat string-valued custom payload.
    pub data: BTreeMap<String, String>,
    /// Global TTL in seconds.
    pub ttl_seconds: Option<u64>,
    /// APNs overrides.
    pub apns: ApnsOverrides,
    /// FCM overrides.
    pub fcm: FcmOverrides,
}

impl SubmitRequest {
    /// Whether the notification, after normalization, carries an alert.
    #[must_use]
    pub fn has_alert(&self) -> bool {
        self.notification
            .as_ref()
            .is_some_and(Notification::has_alert)
    }
}

/// Per-token delivery verdict inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenOutcome {
    Sent,
    Failed,
    Invalid,
}

/// Aggregate outcome of one dispatch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    /// Tokens submitted to the provider.
    pub requested: usize,
    /// Tokens accepted by the provider.
    pub sent: usize,
    /// Tokens rejected for any reason.
    pub failed: usize,
    /// Subset of failures classified as permanently undeliverable.
    pub invalid_tokens: Vec<String>,
}

impl SendOutcome {
    pub(crate) fn record(&mut self, token: &str, outcome: TokenOutcome) {
        match outcome {
            TokenOutcome::Sent => self.sent += 1,
            TokenOutcome::Failed => self.failed += 1,
            TokenOutcome::Invalid => {
                self.failed += 1;
                self.invalid_tokens.push(token.to_string());
            }
        }
    }
}
