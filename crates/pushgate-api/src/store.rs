//! Storage facade abstraction for the HTTP layer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushgate_data::{
    AdminUser, App, AppPatch, CredentialStore, DataResult, NewIosCredential, NonceStore,
    TenantConfig,
};

/// Trait defining the storage backend used by the HTTP layer.
///
/// Mirrors the credential-store and nonce-store operations the data plane
/// and admin surface need, so handlers can be exercised against mocks.
#[async_trait]
pub trait CredentialFacade: Send + Sync {
    /// Resolve the API secret for an enabled app.
    async fn get_api_secret(&self, app_id: &str) -> DataResult<Option<String>>;
    /// Load the credential bundle for an enabled tenant.
    async fn get_app_config(&self, app_id: &str) -> DataResult<Option<TenantConfig>>;
    /// Atomically record a nonce, returning whether this caller won.
    async fn consume_nonce(
        &self,
        app_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DataResult<bool>;
    /// Fetch an admin principal by username.
    async fn get_admin_by_username(&self, username: &str) -> DataResult<Option<AdminUser>>;
    /// Replace an admin password.
    async fn update_admin_password(&self, username: &str, password: &str) -> DataResult<bool>;
    /// List all registered apps.
    async fn list_apps(&self) -> DataResult<Vec<App>>;
    /// Register a new app.
    async fn create_app(&self, app_id: &str, name: &str) -> DataResult<App>;
    /// Apply a partial update to an app.
    async fn update_app(&self, app_id: &str, patch: AppPatch) -> DataResult<Option<App>>;
    /// Remove an app and its credentials.
    async fn delete_app(&self, app_id: &str) -> DataResult<bool>;
    /// Replace the API secret, returning the new value.
    async fn rotate_secret(&self, app_id: &str) -> DataResult<Option<String>>;
    /// Insert or update the APNs credential.
    async fn upsert_ios_config(&self, credential: NewIosCredential) -> DataResult<()>;
    /// Remove the APNs credential.
    async fn delete_ios_config(&self, app_id: &str) -> DataResult<bool>;
    /// Insert or update the FCM service account.
    async fn upsert_android_config(&self, app_id: &str, service_account: &str) -> DataResult<()>;
    /// Remove the FCM credential.
    async fn delete_android_config(&self, app_id: &str) -> DataResult<bool>;
}

/// Shared reference to the storage backend.
pub type SharedStore = Arc<dyn CredentialFacade>;

/// Postgres-backed facade combining the credential and nonce stores.
#[derive(Clone)]
pub struct PgStore {
    credentials: CredentialStore,
    nonces: NonceStore,
}

impl PgStore {
    /// Wrap the concrete stores behind the facade.
    #[must_use]
    pub const fn new(credentials: CredentialStore, nonces: NonceStore) -> Self {
        Self {
            credentials,
            nonces,
        }
    }
}

#[async_trait]
impl CredentialFacade for PgStore {
    async fn get_api_secret(&self, app_id: &str) -> DataResult<Option<String>> {
        self.credentials.get_api_secret(app_id).await
    }

    async fn get_app_config(&self, app_id: &str) -> DataResult<Option<TenantConfig>> {
        self.credentials.get_app_config(app_id).await
    }

    async fn consume_nonce(
        &self,
        app_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DataResult<bool> {
        self.nonces.consume(app_id, nonce, now, expires_at).await
    }

    async fn get_admin_by_username(&self, username: &str) -> DataResult<Option<AdminUser>> {
        self.credentials.get_admin_by_username(username).await
    }

    async fn update_admin_password(&self, username: &str, password: &str) -> DataResult<bool> {
        self.credentials.update_admin_password(username, password).await
    }

    async fn list_apps(&self) -> DataResult<Vec<App>> {
        self.credentials.list_apps().await
    }

    async fn create_app(&self, app_id: &str, name: &str) -> DataResult<App> {
        self.credentials.create_app(app_id, name).await
    }

    async fn update_app(&self, app_id: &str, patch: AppPatch) -> DataResult<Option<App>> {
        self.credentials.update_app(app_id, patch).await
    }

    async fn delete_app(&self, app_id: &str) -> DataResult<bool> {
        self.credentials.delete_app(app_id).await
    }

    async fn rotate_secret(&self, app_id: &str) -> DataResult<Option<String>> {
        self.credentials.rotate_secret(app_id).await
    }

    async fn upsert_ios_config(&self, credential: NewIosCredential) -> DataResult<()> {
        self.credentials.upsert_ios_config(credential).await
    }

    async fn delete_ios_config(&self, app_id: &str) -> DataResult<bool> {
        self.credentials.delete_ios_config(app_id).await
    }

    async fn upsert_android_config(&self, app_id: &str, service_account: &str) -> DataResult<()> {
        self.credentials
            .upsert_android_config(app_id, service_account)
            .await
    }

    async fn delete_android_config(&self, app_id: &str) -> DataResult<bool> {
        self.credentials.delete_android_config(app_id).await
    }
}
