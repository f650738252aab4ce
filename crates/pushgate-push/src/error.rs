//! Error types for provider operations.

use thiserror::Error;

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, PushError>;

/// Errors raised while constructing or driving push providers.
#[derive(Debug, Error)]
pub enum PushError {
    /// The inline PEM key could not be loaded as a signing key.
    #[error("invalid signing key")]
    InvalidKey {
        /// Underlying parse failure, stringified.
        reason: String,
    },
    /// The inline service-account document is unusable for sending.
    #[error("invalid service account")]
    InvalidServiceAccount {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Minting a provider or OAuth token failed.
    #[error("token signing failed")]
    Sign {
        /// Underlying signing failure, stringified.
        reason: String,
    },
    /// Building the outbound HTTP client failed.
    #[error("http client construction failed")]
    BuildClient {
        /// Source reqwest error.
        source: reqwest::Error,
    },
    /// The OAuth token endpoint rejected the exchange.
    #[error("token exchange failed")]
    TokenExchange {
        /// HTTP status returned by the token endpoint.
        status: u16,
    },
    /// An outbound HTTP exchange failed before yielding per-token results.
    #[error("provider request failed")]
    Http {
        /// Operation identifier.
        operation: &'static str,
        /// Source reqwest error.
        source: reqwest::Error,
    },
}
