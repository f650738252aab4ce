//! Process-local cache of long-lived providers keyed by tenant.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::apns::{ApnsCredentials, ApnsProvider};
use crate::error::Result;
use crate::fcm::{FcmClient, FcmCredentials};
use crate::message::{SendOutcome, SubmitRequest};

/// Tunables for the provider caches.
#[derive(Debug, Clone, Copy)]
pub struct MuxConfig {
    /// Cap on concurrent HTTP/2 streams per APNs provider.
    pub apns_max_streams: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            apns_max_streams: 75,
        }
    }
}

/// Per-tenant provider cache for both platforms.
///
/// The entry API guarantees that two concurrent first-uses of the same
/// tenant construct exactly one provider. Invalidation evicts the cache
/// entry; sends already holding the provider complete on the evicted
/// instance.
pub struct ProviderMux {
    config: MuxConfig,
    apns: DashMap<String, Arc<ApnsProvider>>,
    fcm: DashMap<String, Arc<FcmClient>>,
}

impl ProviderMux {
    /// Construct an empty cache.
    #[must_use]
    pub fn new(config: MuxConfig) -> Self {
        Self {
            config,
            apns: DashMap::new(),
            fcm: DashMap::new(),
        }
    }

    /// Dispatch to APNs for a tenant, constructing the provider on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if provider construction or token minting fails.
    pub async fn send_apns(
        &self,
        credentials: &ApnsCredentials,
        request: &SubmitRequest,
    ) -> Result<SendOutcome> {
        let provider = self.apns_provider(credentials)?;
        provider.send(request).await
    }

    /// Dispatch to FCM for a tenant, constructing the client on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if client construction or the OAuth exchange fails.
    pub async fn send_fcm(
        &self,
        app_id: &str,
        credentials: &FcmCredentials,
        request: &SubmitRequest,
    ) -> Result<SendOutcome> {
        let client = self.fcm_client(app_id, credentials)?;
        client.send(request).await
    }

    /// Evict the cached APNs provider after a credential write.
    pub fn invalidate_ios(&self, app_id: &str) {
        if self.apns.remove(app_id).is_some() {
            info!(app_id, "evicted APNs provider after credential change");
        }
    }

    /// Evict the cached FCM client after a credential write.
    pub fn invalidate_android(&self, app_id: &str) {
        if self.fcm.remove(app_id).is_some() {
            info!(app_id, "evicted FCM client after credential change");
        }
    }

    /// Sample in-flight APNs stream counts per tenant.
    #[must_use]
    pub fn apns_inflight(&self) -> Vec<(String, i64)> {
        self.apns
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().inflight()))
            .collect()
    }

    /// Drain every cached APNs provider and drop all cache entries.
    pub async fn shutdown(&self) {
        let providers: Vec<Arc<ApnsProvider>> = self
            .apns
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for provider in providers {
            provider.drain().await;
        }
        self.apns.clear();
        self.fcm.clear();
    }

    fn apns_provider(&self, credentials: &ApnsCredentials) -> Result<Arc<ApnsProvider>> {
        match self.apns.entry(credentials.bundle_id.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(slot) => {
                let provider = Arc::new(ApnsProvider::new(
                    credentials,
                    self.config.apns_max_streams,
                )?);
                slot.insert(Arc::clone(&provider));
                info!(app_id = %credentials.bundle_id, "constructed APNs provider");
                Ok(provider)
            }
        }
    }

    fn fcm_client(&self, app_id: &str, credentials: &FcmCredentials) -> Result<Arc<FcmClient>> {
        match self.fcm.entry(app_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(slot) => {
                let client = Arc::new(FcmClient::new(credentials)?);
                slot.insert(Arc::clone(&client));
                info!(app_id, "constructed FCM client");
                Ok(client)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_on_empty_cache_is_a_no_op() {
        let mux = ProviderMux::new(MuxConfig::default());
        mux.invalidate_ios("com.acme.app");
        mux.invalidate_android("com.acme.app");
        assert!(mux.apns_inflight().is_empty());
    }

    #[test]
    fn default_stream_cap_matches_listener_default() {
        assert_eq!(MuxConfig::default().apns_max_streams, 75);
    }
}
