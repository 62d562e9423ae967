//! Contract call parameters and results

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::provider::types::ProviderFee;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Fee the consuming market takes on each order, in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeMarketFee {
    pub consume_market_fee_address: String,
    pub consume_market_fee_token: String,
    pub consume_market_fee_amount: u128,
}

/// Arguments of `startOrder` and of the combined buy-and-order calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderParams {
    pub consumer: String,
    pub service_index: u32,
    pub provider_fee: ProviderFee,
    pub consume_market_fee: ConsumeMarketFee,
}

/// Fixed-rate exchange leg of `buyFromFreAndOrder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreOrderParams {
    pub exchange_contract: String,
    pub exchange_id: String,
    pub max_base_token_amount: u128,
    pub base_token_address: String,
    pub base_token_decimals: u8,
    pub swap_market_fee: Decimal,
    pub market_fee_address: String,
}

/// Live price of one datatoken on a fixed-rate exchange, in base-token
/// units (human readable, not wei).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedRateQuote {
    pub base_token_amount: Decimal,
    pub opc_fee_amount: Decimal,
    pub market_fee_amount: Decimal,
    pub consume_market_fee_amount: Decimal,
}
