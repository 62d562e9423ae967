//! Provider-fee negotiation
//!
//! Obtains signed fee quotes for a (document, service, consumer) scope.
//! With SSI enabled the policy-server handshake gates every request: a
//! failed handshake fails the negotiation and the provider is never
//! contacted.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::{QuoteCache, QuoteKey};
use crate::config::MarketConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::metadata::Service;
use crate::metrics::SettlementMetrics;
use crate::provider::client::ProviderClient;
use crate::provider::ssi::SsiVerifier;
use crate::provider::types::{
    ComputeInitializeRequest, PolicyServer, ProviderComputeInitializeResults, ProviderInitialize,
};

pub struct ProviderFeeNegotiator {
    client: Arc<dyn ProviderClient>,
    ssi: Option<Arc<dyn SsiVerifier>>,
    config: Arc<MarketConfig>,
    cache: Mutex<QuoteCache>,
    metrics: Option<Arc<SettlementMetrics>>,
}

impl ProviderFeeNegotiator {
    pub fn new(client: Arc<dyn ProviderClient>, config: Arc<MarketConfig>) -> Self {
        let cache = Mutex::new(QuoteCache::new(config.quote_cache_ttl()));
        Self {
            client,
            ssi: None,
            config,
            cache,
            metrics: None,
        }
    }

    pub fn with_ssi(mut self, verifier: Arc<dyn SsiVerifier>) -> Self {
        self.ssi = Some(verifier);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SettlementMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.client
    }

    /// Fee quote and initialization payload for dataset access.
    pub async fn negotiate(
        &self,
        did: &str,
        service: &Service,
        consumer: &str,
    ) -> SettlementResult<ProviderInitialize> {
        let key = QuoteKey::new(did, &service.id, consumer);
        if let Some(cached) = self.cache.lock().await.get(&key) {
            tracing::debug!("Reusing cached provider fee for {} / {}", did, service.id);
            if let Some(metrics) = &self.metrics {
                metrics.quote_cache_hits_total.inc();
            }
            return Ok(cached);
        }

        let policy_server = self.policy_session(consumer, did).await?;
        let provider_url = self.config.provider_url(&service.service_endpoint);

        if let Some(metrics) = &self.metrics {
            metrics.provider_fee_requests_total.inc();
        }
        tracing::info!("Requesting provider fee for {} / {} from {}", did, service.id, provider_url);

        let initialize = self
            .client
            .initialize(provider_url, did, &service.id, 0, consumer, policy_server.as_ref())
            .await?;

        self.cache.lock().await.set(key, initialize.clone());
        Ok(initialize)
    }

    /// Fee quotes and prior-order lookups for a compute job.
    pub async fn negotiate_compute(
        &self,
        provider_url: &str,
        mut request: ComputeInitializeRequest,
    ) -> SettlementResult<ProviderComputeInitializeResults> {
        let policy_server = self
            .policy_session(&request.consumer_address, &request.algorithm.document_id)
            .await?;
        request.policy_server = policy_server;

        if let Some(metrics) = &self.metrics {
            metrics.provider_fee_requests_total.inc();
        }
        let provider_url = self.config.provider_url(provider_url);
        tracing::info!(
            "Initializing compute on {} for {} dataset(s)",
            provider_url,
            request.datasets.len()
        );

        self.client.initialize_compute(provider_url, &request).await
    }

    /// Forget a cached quote, e.g. after it was spent on an order.
    pub async fn invalidate(&self, did: &str, service_id: &str, consumer: &str) {
        self.cache
            .lock()
            .await
            .invalidate(&QuoteKey::new(did, service_id, consumer));
    }

    async fn policy_session(&self, consumer: &str, did: &str) -> SettlementResult<Option<PolicyServer>> {
        if !self.config.ssi_enabled {
            return Ok(None);
        }
        let verifier = self.ssi.as_ref().ok_or_else(|| {
            SettlementError::config("SSI is enabled but no verifier is configured")
        })?;
        verifier.init_session(consumer, did).await.map(Some)
    }
}
