use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::error::{SettlementError, SettlementResult};
use crate::metadata::types::Asset;

/// Read access to the metadata cache (asset documents and search).
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get_asset(&self, did: &str) -> SettlementResult<Asset>;

    /// Raw search query; the body and response belong to the cache.
    async fn query(&self, body: &Value) -> SettlementResult<Value>;

    /// Display names keyed by DID.
    async fn asset_names(&self, dids: &[String]) -> SettlementResult<HashMap<String, String>>;
}

#[derive(Clone)]
pub struct HttpMetadataCache {
    base_url: String,
    http: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NamesRequest<'a> {
    did_list: &'a [String],
}

impl HttpMetadataCache {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> SettlementResult<T> {
        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|err| SettlementError::parse(format!("{}: {}", what, err))),
            StatusCode::NOT_FOUND => Err(SettlementError::not_found(what)),
            status => Err(SettlementError::network(format!(
                "Metadata cache returned HTTP {} for {}",
                status, what
            ))),
        }
    }
}

#[async_trait]
impl MetadataCache for HttpMetadataCache {
    async fn get_asset(&self, did: &str) -> SettlementResult<Asset> {
        let url = format!("{}/api/aquarius/assets/ddo/{}", self.base_url, did);
        tracing::debug!("Fetching asset {}", did);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read_json(response, &format!("asset {}", did)).await
    }

    async fn query(&self, body: &Value) -> SettlementResult<Value> {
        let url = format!("{}/api/aquarius/assets/metadata/query", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read_json(response, "metadata query").await
    }

    async fn asset_names(&self, dids: &[String]) -> SettlementResult<HashMap<String, String>> {
        if dids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/api/aquarius/assets/names", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&NamesRequest { did_list: dids })
            .send()
            .await
            .map_err(|err| SettlementError::network(err.to_string()))?;

        Self::read_json(response, "asset names").await
    }
}
