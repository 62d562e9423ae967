//! Compute jobs of a consumer, joined with asset names.

use std::collections::{BTreeSet, HashMap};

use futures::future::join_all;
use serde::Serialize;

use crate::error::SettlementResult;
use crate::metadata::MetadataCache;
use crate::provider::{ComputeJob, ProviderClient};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeJobMetaData {
    #[serde(flatten)]
    pub job: ComputeJob,
    pub asset_name: String,
    pub asset_dt_symbol: String,
    pub network_id: u64,
}

/// Jobs `consumer` started on `provider_url`, newest first.
///
/// Jobs whose dataset the metadata cache no longer knows keep an empty
/// name and symbol.
pub async fn compute_jobs(
    provider: &dyn ProviderClient,
    metadata: &dyn MetadataCache,
    provider_url: &str,
    consumer: &str,
    chain_id: u64,
) -> SettlementResult<Vec<ComputeJobMetaData>> {
    let jobs = provider.compute_status(provider_url, consumer, None).await?;
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let dids: Vec<String> = jobs
        .iter()
        .filter_map(|job| job.input_did.first().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let names = metadata.asset_names(&dids).await?;
    let symbols = datatoken_symbols(metadata, &dids).await;
    tracing::debug!("{} job(s) over {} dataset(s) for {}", jobs.len(), dids.len(), consumer);

    let mut joined: Vec<ComputeJobMetaData> = jobs
        .into_iter()
        .map(|job| {
            let did = job.input_did.first().cloned().unwrap_or_default();
            ComputeJobMetaData {
                asset_name: names.get(&did).cloned().unwrap_or_default(),
                asset_dt_symbol: symbols.get(&did).cloned().unwrap_or_default(),
                network_id: chain_id,
                job,
            }
        })
        .collect();

    joined.sort_by(|a, b| b.job.created_at().total_cmp(&a.job.created_at()));
    Ok(joined)
}

async fn datatoken_symbols(metadata: &dyn MetadataCache, dids: &[String]) -> HashMap<String, String> {
    let lookups = dids.iter().map(|did| async move {
        match metadata.get_asset(did).await {
            Ok(asset) => asset
                .indexed_metadata
                .stats
                .first()
                .map(|stats| (did.clone(), stats.symbol.clone())),
            Err(err) => {
                tracing::warn!("No datatoken symbol for {}: {}", did, err);
                None
            }
        }
    });

    join_all(lookups).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::SettlementError;
    use crate::metadata::Asset;
    use crate::provider::{
        ComputeEnvironment, ComputeInitializeRequest, PolicyServer, ProviderComputeInitializeResults,
        ProviderInitialize,
    };

    struct JobsProvider(Vec<ComputeJob>);

    #[async_trait]
    impl ProviderClient for JobsProvider {
        async fn initialize(
            &self,
            _provider_url: &str,
            _did: &str,
            _service_id: &str,
            _file_index: u32,
            _consumer: &str,
            _policy_server: Option<&PolicyServer>,
        ) -> SettlementResult<ProviderInitialize> {
            Err(SettlementError::provider("not used"))
        }

        async fn initialize_compute(
            &self,
            _provider_url: &str,
            _request: &ComputeInitializeRequest,
        ) -> SettlementResult<ProviderComputeInitializeResults> {
            Err(SettlementError::provider("not used"))
        }

        async fn compute_environments(
            &self,
            _provider_url: &str,
            _chain_id: u64,
        ) -> SettlementResult<Vec<ComputeEnvironment>> {
            Ok(Vec::new())
        }

        async fn compute_status(
            &self,
            _provider_url: &str,
            _consumer: &str,
            _job_id: Option<&str>,
        ) -> SettlementResult<Vec<ComputeJob>> {
            Ok(self.0.clone())
        }
    }

    struct Names;

    #[async_trait]
    impl MetadataCache for Names {
        async fn get_asset(&self, did: &str) -> SettlementResult<Asset> {
            if did != "did:op:a" {
                return Err(SettlementError::not_found(did));
            }
            let asset = json!({
                "id": did,
                "chainId": 32456,
                "indexedMetadata": { "stats": [{
                    "datatokenAddress": "0xdt",
                    "symbol": "DT-A",
                    "serviceId": "svc",
                    "prices": []
                }]}
            });
            serde_json::from_value(asset).map_err(|err| SettlementError::parse(err.to_string()))
        }

        async fn query(&self, _body: &Value) -> SettlementResult<Value> {
            Ok(Value::Null)
        }

        async fn asset_names(&self, dids: &[String]) -> SettlementResult<HashMap<String, String>> {
            Ok(dids
                .iter()
                .filter(|did| did.as_str() == "did:op:a")
                .map(|did| (did.clone(), "Weather data".to_string()))
                .collect())
        }
    }

    fn job(id: &str, did: &str, created: &str) -> ComputeJob {
        serde_json::from_value(json!({
            "jobId": id,
            "inputDID": [did],
            "dateCreated": created
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn joins_names_and_sorts_newest_first() {
        let provider = JobsProvider(vec![
            job("old", "did:op:a", "1700000000.5"),
            job("new", "did:op:b", "1700000100"),
        ]);

        let jobs = compute_jobs(&provider, &Names, "https://provider", "0xme", 32456)
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job.job_id, "new");
        assert_eq!(jobs[0].asset_name, "");
        assert_eq!(jobs[1].asset_name, "Weather data");
        assert_eq!(jobs[1].asset_dt_symbol, "DT-A");
        assert!(jobs.iter().all(|job| job.network_id == 32456));
    }

    #[tokio::test]
    async fn no_jobs_skips_metadata_lookups() {
        let provider = JobsProvider(Vec::new());
        let jobs = compute_jobs(&provider, &Names, "https://provider", "0xme", 1)
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }
}
