//! Typed rows and aggregates exposed by the persistence layer.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Registered tenant application.
#[derive(Debug, Clone, FromRow)]
pub struct App {
    /// Developer-supplied bundle-shaped identifier; immutable after creation.
    pub app_id: String,
    /// Display name shown on the admin surface.
    pub name: String,
    /// Opaque 64-hex API secret used by the admission pipeline.
    pub api_secret: String,
    /// Disabled apps are invisible to the data plane.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation, including secret rotation.
    pub updated_at: DateTime<Utc>,
}

/// APNs signing credential bound one-to-one to an app.
#[derive(Debug, Clone, FromRow)]
pub struct IosCredential {
    /// Owning app id; doubles as the push topic bundle id.
    pub app_id: String,
    /// Apple developer team identifier.
    pub team_id: String,
    /// APNs auth key identifier.
    pub key_id: String,
    /// Inline PEM private key (EC or PKCS#8).
    pub private_key: String,
    /// Selects the production APNs endpoint over the sandbox.
    pub production: bool,
}

/// FCM service-account credential bound one-to-one to an app.
#[derive(Debug, Clone, FromRow)]
pub struct AndroidCredential {
    /// Owning app id.
    pub app_id: String,
    /// Inline service-account JSON document.
    pub service_account: String,
}

/// Credential bundle for an enabled tenant, as seen by the data plane.
///
/// Entries whose key material is not inline are omitted so the send path
/// never dereferences a filesystem path.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    /// Tenant app id.
    pub app_id: String,
    /// Display name.
    pub name: String,
    /// APNs credential, when configured with inline material.
    pub ios: Option<IosCredential>,
    /// FCM credential, when configured with inline material.
    pub android: Option<AndroidCredential>,
}

/// Admin principal row.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    /// Surrogate id.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// `scrypt:<salt_hex>:<dk_hex>` password hash.
    pub password_hash: String,
}

/// Result of [`crate::CredentialStore::ensure_admin_settings`].
#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// Normalized admin mount path, always `/`-prefixed.
    pub base_path: String,
    /// Admin session secret.
    pub session_secret: String,
    /// Whether the base path was generated rather than supplied.
    pub generated_path: bool,
    /// Whether the session secret was generated rather than supplied.
    pub generated_secret: bool,
    /// Whether the base path is guessable (short or containing a stock word).
    pub weak_path: bool,
}

/// Result of [`crate::CredentialStore::ensure_admin_user`].
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    /// Whether a row was inserted by this call.
    pub created: bool,
    /// Username of the bootstrap principal.
    pub username: String,
    /// Generated password, reported exactly once when none was supplied.
    pub generated_password: Option<String>,
}

/// Partial update applied to an app row.
#[derive(Debug, Clone, Default)]
pub struct AppPatch {
    /// Replacement display name.
    pub name: Option<String>,
    /// Replacement enabled flag.
    pub enabled: Option<bool>,
}

/// Write payload for an APNs credential upsert.
#[derive(Debug, Clone)]
pub struct NewIosCredential {
    /// Owning app id.
    pub app_id: String,
    /// Apple developer team identifier.
    pub team_id: String,
    /// APNs auth key identifier.
    pub key_id: String,
    /// PEM private key, inline or a legacy file path to rehydrate.
    pub private_key: String,
    /// Selects the production APNs endpoint over the sandbox.
    pub production: bool,
}
