//! Access details for one service of an asset

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, SettlementResult};

/// Pricing scheme of a service, as the order flow sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingType {
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "fixed")]
    Fixed,
    #[serde(rename = "NOT_SUPPORTED")]
    NotSupported,
}

/// Datatoken template; selects the on-chain code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TemplateId {
    V1,
    V2,
}

impl TryFrom<u8> for TemplateId {
    type Error = SettlementError;

    fn try_from(value: u8) -> SettlementResult<Self> {
        match value {
            1 => Ok(TemplateId::V1),
            2 => Ok(TemplateId::V2),
            other => Err(SettlementError::not_supported(format!(
                "datatoken template {}",
                other
            ))),
        }
    }
}

impl From<TemplateId> for u8 {
    fn from(value: TemplateId) -> Self {
        match value {
            TemplateId::V1 => 1,
            TemplateId::V2 => 2,
        }
    }
}

/// ERC-20 token descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

/// Normalised pricing view of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDetails {
    #[serde(rename = "type")]
    pub pricing_type: PricingType,
    pub price: Decimal,
    pub template_id: TemplateId,
    /// Exchange id for fixed pricing, dispenser contract for free pricing.
    pub address_or_id: String,
    pub base_token: Option<TokenInfo>,
    pub datatoken: TokenInfo,
    pub valid_order_tx: Option<String>,
    pub is_purchasable: bool,
    pub is_owned: bool,
}

impl AccessDetails {
    pub fn base_token_decimals(&self) -> u8 {
        self.base_token
            .as_ref()
            .map(|token| token.decimals)
            .unwrap_or_else(default_decimals)
    }
}
