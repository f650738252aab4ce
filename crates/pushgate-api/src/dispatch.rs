//! Dispatcher facade abstraction over the provider multiplexer.

use std::sync::Arc;

use async_trait::async_trait;
use pushgate_data::{AndroidCredential, IosCredential};
use pushgate_push::{
    ApnsCredentials, FcmCredentials, ProviderMux, PushResult, SendOutcome, SubmitRequest,
};

/// Trait defining the delivery backend used by the dispatch handler.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver to APNs using the tenant's stored credential.
    async fn send_ios(
        &self,
        credential: &IosCredential,
        request: &SubmitRequest,
    ) -> PushResult<SendOutcome>;
    /// Deliver to FCM using the tenant's stored credential.
    async fn send_android(
        &self,
        credential: &AndroidCredential,
        request: &SubmitRequest,
    ) -> PushResult<SendOutcome>;
    /// Evict the cached APNs provider after a credential write.
    fn invalidate_ios(&self, app_id: &str);
    /// Evict the cached FCM client after a credential write.
    fn invalidate_android(&self, app_id: &str);
}

/// Shared reference to the delivery backend.
pub type SharedDispatcher = Arc<dyn Dispatcher>;

#[async_trait]
impl Dispatcher for ProviderMux {
    async fn send_ios(
        &self,
        credential: &IosCredential,
        request: &SubmitRequest,
    ) -> PushResult<SendOutcome> {
        let credentials = ApnsCredentials {
            bundle_id: credential.app_id.clone(),
            team_id: credential.team_id.clone(),
            key_id: credential.key_id.clone(),
            private_key_pem: credential.private_key.clone(),
            production: credential.production,
        };
        self.send_apns(&credentials, request).await
    }

    async fn send_android(
        &self,
        credential: &AndroidCredential,
        request: &SubmitRequest,
    ) -> PushResult<SendOutcome> {
        let credentials = FcmCredentials {
            service_account_json: credential.service_account.clone(),
        };
        self.send_fcm(&credential.app_id, &credentials, request).await
    }

    fn invalidate_ios(&self, app_id: &str) {
        Self::invalidate_ios(self, app_id);
    }

    fn invalidate_android(&self, app_id: &str) {
        Self::invalidate_android(self, app_id);
    }
}
