//! Provider HTTP client
//!
//! Every call takes the provider base URL explicitly: each service names
//! its own provider, and the market may override it.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{SettlementError, SettlementResult};
use crate::provider::types::{
    ComputeEnvironment, ComputeInitializeRequest, ComputeJob, PolicyServer,
    ProviderComputeInitializeResults, ProviderInitialize,
};

/// Trait over the provider endpoints the order flow depends on.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn initialize(
        &self,
        provider_url: &str,
        did: &str,
        service_id: &str,
        file_index: u32,
        consumer: &str,
        policy_server: Option<&PolicyServer>,
    ) -> SettlementResult<ProviderInitialize>;

    async fn initialize_compute(
        &self,
        provider_url: &str,
        request: &ComputeInitializeRequest,
    ) -> SettlementResult<ProviderComputeInitializeResults>;

    async fn compute_environments(
        &self,
        provider_url: &str,
        chain_id: u64,
    ) -> SettlementResult<Vec<ComputeEnvironment>>;

    async fn compute_status(
        &self,
        provider_url: &str,
        consumer: &str,
        job_id: Option<&str>,
    ) -> SettlementResult<Vec<ComputeJob>>;
}

#[derive(Clone, Default)]
pub struct HttpProviderClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvironmentsResponse {
    List(Vec<ComputeEnvironment>),
    ByChain(HashMap<String, Vec<ComputeEnvironment>>),
}

impl HttpProviderClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    fn endpoint(provider_url: &str, path: &str) -> String {
        format!("{}/api/services/{}", provider_url.trim_end_matches('/'), path)
    }

    /// Decode a success body, or turn an error body into a classified error.
    async fn read<T: DeserializeOwned>(response: Response, call: &str) -> SettlementResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| SettlementError::parse(format!("{} response: {}", call, err)));
        }

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody { error: Some(value), .. }) | Ok(ErrorBody { errors: Some(value), .. }) => {
                match value {
                    serde_json::Value::String(message) => message,
                    other => other.to_string(),
                }
            }
            _ if text.is_empty() => format!("{} returned HTTP {}", call, status),
            _ => text,
        };

        tracing::debug!("Provider {} failed with HTTP {}: {}", call, status, message);
        Err(SettlementError::from_provider_message(message))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn initialize(
        &self,
        provider_url: &str,
        did: &str,
        service_id: &str,
        file_index: u32,
        consumer: &str,
        policy_server: Option<&PolicyServer>,
    ) -> SettlementResult<ProviderInitialize> {
        let mut query = vec![
            ("documentId", did.to_string()),
            ("serviceId", service_id.to_string()),
            ("consumerAddress", consumer.to_string()),
            ("fileIndex", file_index.to_string()),
        ];
        if let Some(policy_server) = policy_server {
            let encoded = serde_json::to_string(policy_server)
                .map_err(|err| SettlementError::parse(err.to_string()))?;
            query.push(("policyServer", encoded));
        }

        let response = self
            .http
            .get(Self::endpoint(provider_url, "initialize"))
            .query(&query)
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read(response, "initialize").await
    }

    async fn initialize_compute(
        &self,
        provider_url: &str,
        request: &ComputeInitializeRequest,
    ) -> SettlementResult<ProviderComputeInitializeResults> {
        let response = self
            .http
            .post(Self::endpoint(provider_url, "initializeCompute"))
            .json(request)
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read(response, "initializeCompute").await
    }

    async fn compute_environments(
        &self,
        provider_url: &str,
        chain_id: u64,
    ) -> SettlementResult<Vec<ComputeEnvironment>> {
        let response = self
            .http
            .get(Self::endpoint(provider_url, "computeEnvironments"))
            .query(&[("chainId", chain_id.to_string())])
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        let environments = match Self::read::<EnvironmentsResponse>(response, "computeEnvironments").await? {
            EnvironmentsResponse::List(list) => list,
            EnvironmentsResponse::ByChain(mut by_chain) => {
                by_chain.remove(&chain_id.to_string()).unwrap_or_default()
            }
        };
        Ok(environments)
    }

    async fn compute_status(
        &self,
        provider_url: &str,
        consumer: &str,
        job_id: Option<&str>,
    ) -> SettlementResult<Vec<ComputeJob>> {
        let mut query = vec![("consumerAddress", consumer.to_string())];
        if let Some(job_id) = job_id {
            query.push(("jobId", job_id.to_string()));
        }

        let response = self
            .http
            .get(Self::endpoint(provider_url, "compute"))
            .query(&query)
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read(response, "compute").await
    }
}
