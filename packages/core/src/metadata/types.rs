//! DDO subset read by the settlement flow

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access::TokenInfo;

/// An asset document as returned by the metadata cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub chain_id: u64,
    #[serde(default)]
    pub nft_address: String,
    #[serde(default)]
    pub metadata: AssetMetadata,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub indexed_metadata: IndexedMetadata,
}

impl Asset {
    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == service_id)
    }

    pub fn stats_for(&self, service_id: &str) -> Option<&ServiceStats> {
        self.indexed_metadata
            .stats
            .iter()
            .find(|stats| stats.service_id == service_id)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    #[serde(default)]
    pub name: String,
    /// `dataset` or `algorithm`
    #[serde(rename = "type", default)]
    pub asset_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    /// `access` or `compute`
    #[serde(rename = "type")]
    pub service_type: String,
    pub datatoken_address: String,
    pub service_endpoint: String,
    #[serde(default)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedMetadata {
    #[serde(default)]
    pub stats: Vec<ServiceStats>,
}

/// Pricing statistics the indexer keeps per service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub datatoken_address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    pub service_id: String,
    #[serde(default)]
    pub orders: u64,
    #[serde(default)]
    pub prices: Vec<PriceStat>,
    #[serde(default)]
    pub template_id: Option<u8>,
}

/// One price entry: a fixed-rate exchange or a dispenser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceStat {
    #[serde(rename = "type")]
    pub price_type: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub token: Option<TokenInfo>,
    #[serde(default)]
    pub exchange_id: Option<String>,
}
