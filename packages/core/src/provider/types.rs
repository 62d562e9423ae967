//! Provider wire types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};

/// Signed fee quote issued by a provider.
///
/// `provider_fee_amount` is in base units of `provider_fee_token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFee {
    pub provider_fee_address: String,
    pub provider_fee_token: String,
    pub provider_fee_amount: String,
    #[serde(default)]
    pub provider_data: String,
    #[serde(default)]
    pub v: u8,
    #[serde(default)]
    pub r: String,
    #[serde(default)]
    pub s: String,
    /// Unix timestamp in seconds.
    pub valid_until: i64,
}

impl ProviderFee {
    /// Fee amount in base units.
    pub fn amount_units(&self) -> SettlementResult<u128> {
        let raw = self.provider_fee_amount.trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse::<u128>().map_err(|_| {
            SettlementError::invalid_amount(format!("provider fee amount '{}'", self.provider_fee_amount))
        })
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.amount_units(), Ok(0))
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.valid_until, 0).single()
    }

    /// A quote with no usable deadline counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.valid_until() {
            Some(deadline) => deadline <= now,
            None => true,
        }
    }
}

/// Response of `initialize` for dataset access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInitialize {
    #[serde(default)]
    pub datatoken: String,
    #[serde(default)]
    pub nonce: String,
    pub provider_fee: ProviderFee,
    #[serde(default)]
    pub valid_order: Option<String>,
}

/// Per-asset part of an `initializeCompute` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInitializeEntry {
    #[serde(default)]
    pub valid_order: Option<String>,
    #[serde(default)]
    pub provider_fee: Option<ProviderFee>,
}

impl ComputeInitializeEntry {
    /// Prior order the provider still accepts, ignoring empty strings.
    pub fn valid_order(&self) -> Option<&str> {
        self.valid_order.as_deref().filter(|tx| !tx.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderComputeInitializeResults {
    #[serde(default)]
    pub datasets: Vec<ComputeInitializeEntry>,
    #[serde(default)]
    pub algorithm: Option<ComputeInitializeEntry>,
}

/// One asset/service pair in an `initializeCompute` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeAsset {
    pub document_id: String,
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_tx_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvRequest {
    pub env: String,
    pub valid_until: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeInitializeRequest {
    pub datasets: Vec<ComputeAsset>,
    pub algorithm: ComputeAsset,
    pub compute: ComputeEnvRequest,
    pub consumer_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_server: Option<PolicyServer>,
}

/// SSI session forwarded to the provider's policy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyServer {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironment {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub consumer_address: String,
    #[serde(default)]
    pub fee_token: String,
    #[serde(default)]
    pub price_min: f64,
    #[serde(default)]
    pub max_job_duration: u64,
    #[serde(default)]
    pub free: bool,
}

/// Status record of a compute job as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeJob {
    pub job_id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "inputDID", default)]
    pub input_did: Vec<String>,
    #[serde(rename = "algoDID", default)]
    pub algo_did: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub status_text: String,
    /// Unix timestamp in seconds, sent as a string by most providers.
    #[serde(default)]
    pub date_created: String,
    #[serde(default)]
    pub date_finished: Option<String>,
}

impl ComputeJob {
    pub fn created_at(&self) -> f64 {
        self.date_created.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fee(amount: &str, valid_until: i64) -> ProviderFee {
        ProviderFee {
            provider_fee_address: "0xprovider".to_string(),
            provider_fee_token: "0xocean".to_string(),
            provider_fee_amount: amount.to_string(),
            provider_data: String::new(),
            v: 27,
            r: "0x0".to_string(),
            s: "0x0".to_string(),
            valid_until,
        }
    }

    #[test]
    fn quote_expires_at_deadline() {
        let now = Utc::now();
        let quote = fee("1", now.timestamp());
        assert!(quote.is_expired_at(now + Duration::seconds(1)));

        let fresh = fee("1", (now + Duration::minutes(5)).timestamp());
        assert!(!fresh.is_expired_at(now));
    }

    #[test]
    fn amount_parses_base_units() {
        assert_eq!(fee("200000000000000000", 0).amount_units().unwrap(), 200_000_000_000_000_000);
        assert!(fee("0", 0).is_zero());
        assert!(fee("", 0).is_zero());
        assert!(fee("0.2", 0).amount_units().is_err());
    }

    #[test]
    fn compute_entry_decodes_without_fee() {
        let entry: ComputeInitializeEntry =
            serde_json::from_str(r#"{"validOrder":"0xabc"}"#).unwrap();
        assert_eq!(entry.valid_order(), Some("0xabc"));
        assert!(entry.provider_fee.is_none());

        let empty: ComputeInitializeEntry = serde_json::from_str(r#"{"validOrder":""}"#).unwrap();
        assert_eq!(empty.valid_order(), None);
    }
}
