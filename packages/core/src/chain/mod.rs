//! On-chain contract access
//!
//! `ChainClient` is the seam between the order flow and whatever signs
//! and submits transactions. Amounts passed to ERC-20 calls are base
//! units; the fixed-rate quote is human readable.

pub mod mock;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::SettlementResult;
use crate::provider::types::ProviderFee;

pub use types::{ConsumeMarketFee, FixedRateQuote, FreOrderParams, OrderParams, TxReceipt};

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn allowance(&self, token: &str, owner: &str, spender: &str) -> SettlementResult<u128>;

    async fn approve(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> SettlementResult<TxReceipt>;

    async fn balance_of(&self, token: &str, account: &str) -> SettlementResult<u128>;

    async fn fixed_rate_buy_price(
        &self,
        exchange_contract: &str,
        exchange_id: &str,
        datatoken_amount: Decimal,
        consume_market_swap_fee: Decimal,
    ) -> SettlementResult<FixedRateQuote>;

    async fn buy_datatokens(
        &self,
        exchange_contract: &str,
        exchange_id: &str,
        buyer: &str,
        datatoken_amount: u128,
        max_base_token_amount: u128,
        consume_market_fee_address: &str,
        consume_market_swap_fee: Decimal,
    ) -> SettlementResult<TxReceipt>;

    async fn dispense(
        &self,
        dispenser: &str,
        datatoken: &str,
        amount: u128,
        destination: &str,
    ) -> SettlementResult<TxReceipt>;

    async fn start_order(
        &self,
        datatoken: &str,
        payer: &str,
        params: &OrderParams,
    ) -> SettlementResult<TxReceipt>;

    async fn buy_from_fre_and_order(
        &self,
        datatoken: &str,
        payer: &str,
        params: &OrderParams,
        fre: &FreOrderParams,
    ) -> SettlementResult<TxReceipt>;

    async fn buy_from_dispenser_and_order(
        &self,
        datatoken: &str,
        payer: &str,
        params: &OrderParams,
        dispenser: &str,
    ) -> SettlementResult<TxReceipt>;

    async fn reuse_order(
        &self,
        datatoken: &str,
        payer: &str,
        order_tx_id: &str,
        provider_fee: &ProviderFee,
    ) -> SettlementResult<TxReceipt>;

    async fn escrow_funds(&self, escrow: &str, account: &str, token: &str) -> SettlementResult<u128>;

    async fn escrow_withdraw(
        &self,
        escrow: &str,
        account: &str,
        tokens: &[String],
        amounts: &[u128],
    ) -> SettlementResult<TxReceipt>;
}
