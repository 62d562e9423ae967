//! Order executor for datatoken templates 1 and 2.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::access::{PricingType, TemplateId, TokenInfo};
use crate::allowance::{ensure_allowance, AllowancePoller};
use crate::chain::{ChainClient, ConsumeMarketFee, FreOrderParams, OrderParams, TxReceipt};
use crate::config::MarketConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::metrics::SettlementMetrics;
use crate::networks::{NetworkAddresses, NetworkTable, ZERO_ADDRESS};
use crate::order::{OrderOutcome, OrderState, OrderTarget};
use crate::pricing::{from_base_units, to_base_units, OrderPriceAndFees};
use crate::provider::ProviderFee;

/// Everything needed to place one order.
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest<'a> {
    pub target: &'a OrderTarget,
    pub price: &'a OrderPriceAndFees,
    pub account: &'a str,
    /// The account already holds a datatoken (template 1 skips the swap).
    pub has_datatoken: bool,
    /// Overrides the quote carried in `price`.
    pub provider_fee: Option<&'a ProviderFee>,
    /// Compute environment consumer, when ordering for a compute job.
    pub compute_consumer: Option<&'a str>,
}

impl<'a> OrderRequest<'a> {
    pub fn new(target: &'a OrderTarget, price: &'a OrderPriceAndFees, account: &'a str) -> Self {
        Self {
            target,
            price,
            account,
            has_datatoken: false,
            provider_fee: None,
            compute_consumer: None,
        }
    }

    fn provider_fee(&self) -> &'a ProviderFee {
        self.provider_fee.unwrap_or(&self.price.provider_fee)
    }
}

pub struct OrderExecutor {
    chain: Arc<dyn ChainClient>,
    networks: Arc<NetworkTable>,
    config: Arc<MarketConfig>,
    poller: AllowancePoller,
    metrics: Option<Arc<SettlementMetrics>>,
}

/// Tracks state transitions of a single order.
struct Progress {
    did: String,
    transitions: Vec<OrderState>,
}

impl Progress {
    fn new(did: &str) -> Self {
        Self {
            did: did.to_string(),
            transitions: vec![OrderState::NotOrdered],
        }
    }

    fn advance(&mut self, state: OrderState, receipt: &TxReceipt) {
        tracing::info!(did = %self.did, tx = %receipt.transaction_hash, "Order state -> {:?}", state);
        self.transitions.push(state);
    }

    fn finish(mut self, receipt: TxReceipt) -> OrderOutcome {
        self.advance(OrderState::Ordered, &receipt);
        OrderOutcome {
            receipt,
            transitions: self.transitions,
        }
    }
}

/// One whole datatoken in base units.
const ONE_DATATOKEN: u128 = 1_000_000_000_000_000_000;

impl OrderExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        networks: Arc<NetworkTable>,
        config: Arc<MarketConfig>,
    ) -> Self {
        let poller = config.allowance_poller();
        Self {
            chain,
            networks,
            config,
            poller,
            metrics: None,
        }
    }

    pub fn with_poller(mut self, poller: AllowancePoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SettlementMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn poller(&self) -> &AllowancePoller {
        &self.poller
    }

    pub fn networks(&self) -> &NetworkTable {
        &self.networks
    }

    /// Template-2 approval for a fixed-price order:
    /// `price + opc_fee + provider_fee`, each counted once.
    pub fn fixed_approval_amount(
        price: &OrderPriceAndFees,
        provider_fee_human: Decimal,
    ) -> SettlementResult<Decimal> {
        price
            .price
            .checked_add(price.opc_fee)
            .and_then(|sum| sum.checked_add(provider_fee_human))
            .ok_or_else(|| SettlementError::invalid_amount("approval amount overflows"))
    }

    pub async fn execute(
        &self,
        request: OrderRequest<'_>,
        cancel: &CancellationToken,
    ) -> SettlementResult<OrderOutcome> {
        let target = request.target;
        let network = self.networks.get(target.chain_id)?;
        let params = self.order_params(&request)?;

        tracing::info!(
            did = %target.did,
            service = %target.service.id,
            "Ordering ({:?}, template {:?})",
            target.access.pricing_type,
            target.access.template_id
        );

        match (target.access.pricing_type, target.access.template_id) {
            (PricingType::Fixed, TemplateId::V1) => {
                self.fixed_v1(&request, network, &params).await
            }
            (PricingType::Fixed, TemplateId::V2) => {
                self.fixed_v2(&request, network, &params, cancel).await
            }
            (PricingType::Free, TemplateId::V1) => self.free_v1(&request, network, &params).await,
            (PricingType::Free, TemplateId::V2) => {
                self.free_v2(&request, network, &params, cancel).await
            }
            (PricingType::NotSupported, _) => Err(SettlementError::not_supported(format!(
                "service {} of {} cannot be ordered",
                target.service.id, target.did
            ))),
        }
    }

    fn order_params(&self, request: &OrderRequest<'_>) -> SettlementResult<OrderParams> {
        let access = &request.target.access;
        let fee_token = access
            .base_token
            .as_ref()
            .map(|token| token.address.clone())
            .unwrap_or_else(|| ZERO_ADDRESS.to_string());

        Ok(OrderParams {
            consumer: request.compute_consumer.unwrap_or(request.account).to_string(),
            service_index: request.target.service_index,
            provider_fee: request.provider_fee().clone(),
            consume_market_fee: ConsumeMarketFee {
                consume_market_fee_address: self.config.market_fee_address.clone(),
                consume_market_fee_token: fee_token,
                consume_market_fee_amount: to_base_units(
                    request.price.consume_market_order_fee,
                    access.base_token_decimals(),
                )?,
            },
        })
    }

    fn base_token<'t>(target: &'t OrderTarget) -> SettlementResult<&'t TokenInfo> {
        target.access.base_token.as_ref().ok_or_else(|| {
            SettlementError::not_supported(format!("fixed price for {} has no base token", target.did))
        })
    }

    async fn fixed_v1(
        &self,
        request: &OrderRequest<'_>,
        network: &NetworkAddresses,
        params: &OrderParams,
    ) -> SettlementResult<OrderOutcome> {
        let target = request.target;
        let mut progress = Progress::new(&target.did);

        if !request.has_datatoken {
            let base_token = Self::base_token(target)?;
            let price_units = to_base_units(request.price.price, base_token.decimals)?;

            ensure_allowance(
                self.chain.as_ref(),
                &base_token.address,
                request.account,
                &network.fixed_rate_exchange,
                price_units,
            )
            .await?;
            progress.transitions.push(OrderState::Approved);

            let swap = self
                .chain
                .buy_datatokens(
                    &network.fixed_rate_exchange,
                    &target.access.address_or_id,
                    request.account,
                    ONE_DATATOKEN,
                    price_units,
                    &self.config.market_fee_address,
                    self.config.consume_market_fixed_swap_fee,
                )
                .await?;
            progress.advance(OrderState::Swapped, &swap);
        }

        let receipt = self
            .chain
            .start_order(target.datatoken(), request.account, params)
            .await?;
        Ok(progress.finish(receipt))
    }

    async fn fixed_v2(
        &self,
        request: &OrderRequest<'_>,
        network: &NetworkAddresses,
        params: &OrderParams,
        cancel: &CancellationToken,
    ) -> SettlementResult<OrderOutcome> {
        let target = request.target;
        let base_token = Self::base_token(target)?;
        let mut progress = Progress::new(&target.did);

        let fee = request.provider_fee();
        let fee_units = fee.amount_units()?;
        // a fee in another token is approved on its own, in its own units
        let fee_in_base_token =
            fee_units == 0 || fee.provider_fee_token.eq_ignore_ascii_case(&base_token.address);
        let provider_fee_human = if fee_in_base_token {
            from_base_units(fee_units, base_token.decimals)?
        } else {
            Decimal::ZERO
        };
        let approve_amount = Self::fixed_approval_amount(request.price, provider_fee_human)?;
        let approve_units = to_base_units(approve_amount, base_token.decimals)?;

        tracing::debug!(
            "Approving {} {} (price {} + opc {} + provider {})",
            approve_amount,
            base_token.symbol,
            request.price.price,
            request.price.opc_fee,
            provider_fee_human
        );

        self.approve_and_wait(&base_token.address, request, approve_units, cancel)
            .await?;
        if !fee_in_base_token {
            tracing::debug!("Approving provider fee of {} in {}", fee_units, fee.provider_fee_token);
            self.approve_and_wait(&fee.provider_fee_token, request, fee_units, cancel)
                .await?;
        }
        progress.transitions.push(OrderState::Approved);

        let max_base_token_amount = request
            .price
            .price
            .checked_add(request.price.opc_fee)
            .ok_or_else(|| SettlementError::invalid_amount("max base token amount overflows"))?;

        let fre = FreOrderParams {
            exchange_contract: network.fixed_rate_exchange.clone(),
            exchange_id: target.access.address_or_id.clone(),
            max_base_token_amount: to_base_units(max_base_token_amount, base_token.decimals)?,
            base_token_address: base_token.address.clone(),
            base_token_decimals: base_token.decimals,
            swap_market_fee: self.config.consume_market_fixed_swap_fee,
            market_fee_address: self.config.market_fee_address.clone(),
        };

        let receipt = self
            .chain
            .buy_from_fre_and_order(target.datatoken(), request.account, params, &fre)
            .await?;
        Ok(progress.finish(receipt))
    }

    async fn free_v1(
        &self,
        request: &OrderRequest<'_>,
        network: &NetworkAddresses,
        params: &OrderParams,
    ) -> SettlementResult<OrderOutcome> {
        let target = request.target;
        let mut progress = Progress::new(&target.did);

        if !request.has_datatoken {
            let dispensed = self
                .chain
                .dispense(&network.dispenser, target.datatoken(), ONE_DATATOKEN, request.account)
                .await?;
            progress.advance(OrderState::Dispensed, &dispensed);
        }

        let receipt = self
            .chain
            .start_order(target.datatoken(), request.account, params)
            .await?;
        Ok(progress.finish(receipt))
    }

    async fn free_v2(
        &self,
        request: &OrderRequest<'_>,
        network: &NetworkAddresses,
        params: &OrderParams,
        cancel: &CancellationToken,
    ) -> SettlementResult<OrderOutcome> {
        let target = request.target;
        let mut progress = Progress::new(&target.did);
        let fee_units = request.provider_fee().amount_units()?;

        self.approve_and_wait(&network.fee_token, request, fee_units, cancel)
            .await?;
        progress.transitions.push(OrderState::Approved);

        let receipt = self
            .chain
            .buy_from_dispenser_and_order(target.datatoken(), request.account, params, &network.dispenser)
            .await?;
        Ok(progress.finish(receipt))
    }

    /// Let the datatoken spend `units` of `token` and wait until the
    /// allowance is visible.
    async fn approve_and_wait(
        &self,
        token: &str,
        request: &OrderRequest<'_>,
        units: u128,
        cancel: &CancellationToken,
    ) -> SettlementResult<()> {
        let spender = request.target.datatoken();
        ensure_allowance(self.chain.as_ref(), token, request.account, spender, units).await?;
        self.poller
            .wait_for_allowance(
                self.chain.as_ref(),
                token,
                request.account,
                spender,
                units,
                cancel,
                self.metrics.as_deref(),
            )
            .await?;
        Ok(())
    }
}
