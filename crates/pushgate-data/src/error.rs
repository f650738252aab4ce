//! Error types for persistence operations.

use thiserror::Error;

/// Result alias for persistence operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Primary error type for persistence operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Attempted to create an app whose id is already registered.
    #[error("app already exists")]
    AppExists {
        /// Identifier that collided.
        app_id: String,
    },
    /// Referenced an app that is not registered.
    #[error("app not found")]
    AppMissing {
        /// Identifier that failed to resolve.
        app_id: String,
    },
    /// App identifier did not match the required bundle-id shape.
    #[error("invalid app id")]
    InvalidAppId {
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Credential material failed validation on write.
    #[error("invalid credential material")]
    InvalidCredential {
        /// Credential field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Admin base path failed normalization.
    #[error("invalid admin base path")]
    InvalidAdminPath {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Password hashing or verification failed structurally.
    #[error("password hash operation failed")]
    PasswordHash {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Underlying database operation failed.
    #[error("database operation failed")]
    Database {
        /// Source sqlx error.
        #[from]
        source: sqlx::Error,
    },
    /// Applying pending migrations failed.
    #[error("database migration failed")]
    Migrate {
        /// Source migration error.
        #[from]
        source: sqlx::migrate::MigrateError,
    },
}
