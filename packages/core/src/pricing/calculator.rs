//! Order-price calculator
//!
//! Combines the base price with the market order fees. Provider fees and
//! fixed-rate swap fees are carried alongside but never summed into
//! `price`: `price` is what the exchange is paid, the rest goes to the
//! provider and the markets.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access::PricingType;
use crate::chain::{ChainClient, FixedRateQuote};
use crate::config::MarketConfig;
use crate::error::{DenialReason, SettlementError, SettlementResult};
use crate::metrics::SettlementMetrics;
use crate::networks::{NetworkTable, ZERO_ADDRESS};
use crate::notify::Notifier;
use crate::order::OrderTarget;
use crate::provider::{
    ComputeInitializeRequest, ProviderComputeInitializeResults, ProviderFee, ProviderFeeNegotiator,
    ProviderInitialize,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPriceAndFees {
    pub price: Decimal,
    pub publisher_market_order_fee: Decimal,
    pub publisher_market_fixed_swap_fee: Decimal,
    pub consume_market_order_fee: Decimal,
    pub consume_market_fixed_swap_fee: Decimal,
    pub provider_fee: ProviderFee,
    pub opc_fee: Decimal,
}

/// `base + consume_market_order_fee + publisher_market_order_fee`.
pub fn total_price(
    base: Decimal,
    consume_market_order_fee: Decimal,
    publisher_market_order_fee: Decimal,
) -> SettlementResult<Decimal> {
    base.checked_add(consume_market_order_fee)
        .and_then(|sum| sum.checked_add(publisher_market_order_fee))
        .ok_or_else(|| SettlementError::invalid_amount("order price overflows"))
}

pub struct OrderPriceCalculator {
    negotiator: Arc<ProviderFeeNegotiator>,
    chain: Arc<dyn ChainClient>,
    networks: Arc<NetworkTable>,
    config: Arc<MarketConfig>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<SettlementMetrics>>,
}

impl OrderPriceAndFees {
    /// Fees of an order that is not bought again: only the provider fee
    /// is paid.
    pub fn provider_fee_only(provider_fee: ProviderFee) -> Self {
        Self {
            price: Decimal::ZERO,
            publisher_market_order_fee: Decimal::ZERO,
            publisher_market_fixed_swap_fee: Decimal::ZERO,
            consume_market_order_fee: Decimal::ZERO,
            consume_market_fixed_swap_fee: Decimal::ZERO,
            provider_fee,
            opc_fee: Decimal::ZERO,
        }
    }
}

impl OrderPriceCalculator {
    pub fn new(
        negotiator: Arc<ProviderFeeNegotiator>,
        chain: Arc<dyn ChainClient>,
        networks: Arc<NetworkTable>,
        config: Arc<MarketConfig>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            negotiator,
            chain,
            networks,
            config,
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SettlementMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Provider initialization for dataset access by `consumer`.
    ///
    /// A provider refusal (allow/deny list) is reported to the user once
    /// and returned as `PolicyDenied`.
    pub async fn initialize(
        &self,
        target: &OrderTarget,
        consumer: &str,
    ) -> SettlementResult<ProviderInitialize> {
        self.negotiator
            .negotiate(&target.did, &target.service, consumer)
            .await
            .map_err(|err| self.report_negotiation_failure(err, &target.did, consumer))
    }

    /// Provider initialization for a compute job on `target`'s provider.
    pub async fn initialize_compute(
        &self,
        target: &OrderTarget,
        request: ComputeInitializeRequest,
    ) -> SettlementResult<ProviderComputeInitializeResults> {
        let consumer = request.consumer_address.clone();
        self.negotiator
            .negotiate_compute(&target.service.service_endpoint, request)
            .await
            .map_err(|err| self.report_negotiation_failure(err, &target.did, &consumer))
    }

    /// Price and fees for one order of `target` by `consumer`.
    ///
    /// Every failure is reported to the user before it is returned; a
    /// policy denial happens before any chain call.
    pub async fn order_price_and_fees(
        &self,
        target: &OrderTarget,
        consumer: &str,
        provider_fee: Option<ProviderFee>,
    ) -> SettlementResult<OrderPriceAndFees> {
        let provider_fee = match provider_fee {
            Some(fee) => fee,
            None => self.initialize(target, consumer).await?.provider_fee,
        };

        let mut fees = OrderPriceAndFees {
            price: target.access.price,
            publisher_market_order_fee: self.config.publisher_market_order_fee,
            publisher_market_fixed_swap_fee: Decimal::ZERO,
            consume_market_order_fee: self.config.consume_market_order_fee,
            consume_market_fixed_swap_fee: Decimal::ZERO,
            provider_fee,
            opc_fee: Decimal::ZERO,
        };

        if target.access.pricing_type == PricingType::Fixed {
            let quote = self
                .fixed_rate_quote(target)
                .await
                .map_err(|err| self.notify_failure(err, "[fixed rate price]"))?;
            fees.price = quote.base_token_amount;
            fees.opc_fee = quote.opc_fee_amount;
            fees.publisher_market_fixed_swap_fee = quote.market_fee_amount;
            fees.consume_market_fixed_swap_fee = quote.consume_market_fee_amount;
        }

        fees.price = total_price(
            fees.price,
            fees.consume_market_order_fee,
            fees.publisher_market_order_fee,
        )
        .map_err(|err| self.notify_failure(err, "[order price]"))?;
        Ok(fees)
    }

    fn notify_failure(&self, err: SettlementError, context: &str) -> SettlementError {
        err.log(context);
        self.notifier.error(&err.to_string());
        err
    }

    async fn fixed_rate_quote(&self, target: &OrderTarget) -> SettlementResult<FixedRateQuote> {
        let network = self.networks.get(target.chain_id)?;
        let quote = self
            .chain
            .fixed_rate_buy_price(
                &network.fixed_rate_exchange,
                &target.access.address_or_id,
                Decimal::ONE,
                self.config.consume_market_fixed_swap_fee,
            )
            .await?;
        tracing::debug!(
            "Live price for exchange {}: {} (opc fee {})",
            target.access.address_or_id,
            quote.base_token_amount,
            quote.opc_fee_amount
        );
        Ok(quote)
    }

    fn report_negotiation_failure(
        &self,
        err: SettlementError,
        did: &str,
        consumer: &str,
    ) -> SettlementError {
        err.log("[initialize provider]");
        if err.is_policy_denial() {
            if let Some(metrics) = &self.metrics {
                metrics.policy_denials_total.inc();
            }
        }

        match &err {
            SettlementError::PolicyDenied { .. } if consumer.eq_ignore_ascii_case(ZERO_ADDRESS) => {}
            SettlementError::PolicyDenied { reason: DenialReason::NotInAllowList, .. } => {
                self.notifier.error(&format!(
                    "Consumer address not found in allow list for service {}. Access has been denied.",
                    did
                ));
            }
            SettlementError::PolicyDenied { reason: DenialReason::InDenyList, .. } => {
                self.notifier.error(&format!(
                    "Consumer address found in deny list for service {}. Access has been denied.",
                    did
                ));
            }
            other => self.notifier.error(&other.to_string()),
        }
        err
    }
}
