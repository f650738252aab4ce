//! Header names used by the admission pipeline.

pub(crate) const HEADER_API_KEY: &str = "x-api-key";
pub(crate) const HEADER_APP_ID: &str = "x-app-id";
pub(crate) const HEADER_TIMESTAMP: &str = "x-timestamp";
pub(crate) const HEADER_NONCE: &str = "x-nonce";
pub(crate) const HEADER_SIGNATURE: &str = "x-signature";
pub(crate) const HEADER_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub(crate) const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub(crate) const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub(crate) const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

pub(crate) const MAX_NONCE_LEN: usize = 128;
