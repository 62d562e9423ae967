//! End-to-end order and compute settlement
//!
//! `SettlementService` wires the resolver, calculator, executor and
//! reuse handler together:
//!
//! 1. fetch the asset and resolve its access details;
//! 2. initialize with the provider (fee quote, prior valid order);
//! 3. price the order;
//! 4. reuse the prior order or place a new one.
//!
//! Every failure is reported to the user exactly once, by the stage that
//! produced it, and returned as a tagged `SettlementError`.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::access::{resolve_asset_access, AccessDetails};
use crate::chain::ChainClient;
use crate::compute::ComputeOrderHandler;
use crate::config::MarketConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::metadata::MetadataCache;
use crate::metrics::SettlementMetrics;
use crate::networks::NetworkTable;
use crate::notify::Notifier;
use crate::order::{OrderExecutor, OrderRequest, OrderTarget};
use crate::pricing::{to_base_units, OrderPriceAndFees, OrderPriceCalculator};
use crate::provider::{
    ComputeAsset, ComputeEnvRequest, ComputeEnvironment, ComputeInitializeEntry,
    ComputeInitializeRequest, ProviderFee, ProviderFeeNegotiator,
};

/// A service of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub did: String,
    pub service_id: String,
}

impl AssetRef {
    pub fn new(did: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            service_id: service_id.into(),
        }
    }
}

/// Order transactions to start a compute job with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOrders {
    pub dataset_tx: String,
    pub algorithm_tx: String,
}

pub struct SettlementService {
    metadata: Arc<dyn MetadataCache>,
    negotiator: Arc<ProviderFeeNegotiator>,
    chain: Arc<dyn ChainClient>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<SettlementMetrics>,
    calculator: OrderPriceCalculator,
    handler: ComputeOrderHandler,
}

impl SettlementService {
    pub fn new(
        metadata: Arc<dyn MetadataCache>,
        negotiator: Arc<ProviderFeeNegotiator>,
        chain: Arc<dyn ChainClient>,
        networks: Arc<NetworkTable>,
        config: Arc<MarketConfig>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<SettlementMetrics>,
    ) -> Self {
        let calculator = OrderPriceCalculator::new(
            negotiator.clone(),
            chain.clone(),
            networks.clone(),
            config.clone(),
            notifier.clone(),
        )
        .with_metrics(metrics.clone());

        let executor = OrderExecutor::new(chain.clone(), networks, config).with_metrics(metrics.clone());
        let handler = ComputeOrderHandler::new(chain.clone(), Arc::new(executor), notifier.clone())
            .with_metrics(metrics.clone());

        Self {
            metadata,
            negotiator,
            chain,
            notifier,
            metrics,
            calculator,
            handler,
        }
    }

    /// Replace the executor, e.g. to change the allowance wait.
    pub fn with_executor(mut self, executor: OrderExecutor) -> Self {
        let executor = executor.with_metrics(self.metrics.clone());
        self.handler = ComputeOrderHandler::new(self.chain.clone(), Arc::new(executor), self.notifier.clone())
            .with_metrics(self.metrics.clone());
        self
    }

    pub fn metrics(&self) -> &SettlementMetrics {
        &self.metrics
    }

    /// Access details of a service; `is_owned` reports whether `account`
    /// already holds a datatoken.
    pub async fn access_details(
        &self,
        did: &str,
        service_id: &str,
        account: &str,
    ) -> SettlementResult<AccessDetails> {
        let mut target = self.resolve_target(did, service_id).await?;
        target.access.is_owned = self.holds_datatoken(&target, account).await?;
        Ok(target.access)
    }

    /// Price and fees `consumer` would pay for one order.
    pub async fn quote(
        &self,
        did: &str,
        service_id: &str,
        consumer: &str,
    ) -> SettlementResult<OrderPriceAndFees> {
        let target = self
            .resolve_target(did, service_id)
            .await
            .map_err(|err| self.notify_failure(err, "[quote]"))?;
        self.calculator
            .order_price_and_fees(&target, consumer, None)
            .await
    }

    /// Order a service for download and return the transaction that
    /// proves the order.
    pub async fn order_dataset(
        &self,
        did: &str,
        service_id: &str,
        account: &str,
        cancel: &CancellationToken,
    ) -> SettlementResult<String> {
        let target = self
            .resolve_target(did, service_id)
            .await
            .and_then(Self::require_purchasable)
            .map_err(|err| self.report(err, "[order dataset]"))?;

        let init = self
            .calculator
            .initialize(&target, account)
            .await
            .map_err(|err| self.count_failure(err))?;

        // a zero fee on a still-valid order leaves nothing to pay
        let entry = ComputeInitializeEntry {
            valid_order: init.valid_order.clone(),
            provider_fee: (!init.provider_fee.is_zero()).then(|| init.provider_fee.clone()),
        };

        let price = match entry.valid_order() {
            Some(_) => OrderPriceAndFees::provider_fee_only(init.provider_fee.clone()),
            None => self
                .calculator
                .order_price_and_fees(&target, account, Some(init.provider_fee.clone()))
                .await
                .map_err(|err| self.count_failure(err))?,
        };

        let has_datatoken = match entry.valid_order() {
            Some(_) => false,
            None => self
                .holds_datatoken(&target, account)
                .await
                .map_err(|err| self.report(err, "[order dataset]"))?,
        };

        let mut request = OrderRequest::new(&target, &price, account);
        request.has_datatoken = has_datatoken;

        let tx = self.handler.handle(request, &entry, cancel).await?;
        self.negotiator.invalidate(did, service_id, account).await;
        self.notifier.success(&format!("Ordered {}", target.did));
        Ok(tx)
    }

    /// Order the dataset and algorithm of a compute job on `environment`.
    ///
    /// The algorithm is settled first; both orders name the environment's
    /// consumer address.
    pub async fn order_compute(
        &self,
        dataset: &AssetRef,
        algorithm: &AssetRef,
        environment: &ComputeEnvironment,
        valid_until: i64,
        account: &str,
        cancel: &CancellationToken,
    ) -> SettlementResult<ComputeOrders> {
        let (dataset_target, algorithm_target) = tokio::try_join!(
            self.resolve_target(&dataset.did, &dataset.service_id),
            self.resolve_target(&algorithm.did, &algorithm.service_id),
        )
        .and_then(|(data, algo)| {
            Ok((Self::require_purchasable(data)?, Self::require_purchasable(algo)?))
        })
        .map_err(|err| self.report(err, "[order compute]"))?;

        let request = ComputeInitializeRequest {
            datasets: vec![ComputeAsset {
                document_id: dataset.did.clone(),
                service_id: dataset.service_id.clone(),
                transfer_tx_id: None,
            }],
            algorithm: ComputeAsset {
                document_id: algorithm.did.clone(),
                service_id: algorithm.service_id.clone(),
                transfer_tx_id: None,
            },
            compute: ComputeEnvRequest {
                env: environment.id.clone(),
                valid_until,
            },
            consumer_address: account.to_string(),
            policy_server: None,
        };

        let init = self
            .calculator
            .initialize_compute(&dataset_target, request)
            .await
            .map_err(|err| self.count_failure(err))?;

        let dataset_entry = init.datasets.into_iter().next().ok_or_else(|| {
            self.report(
                SettlementError::provider("initializeCompute returned no dataset entry"),
                "[order compute]",
            )
        })?;
        let algorithm_entry = init.algorithm.unwrap_or_default();

        let compute_consumer =
            (!environment.consumer_address.is_empty()).then_some(environment.consumer_address.as_str());

        let algorithm_tx = self
            .settle_compute_input(&algorithm_target, &algorithm_entry, account, compute_consumer, cancel)
            .await?;
        let dataset_tx = self
            .settle_compute_input(&dataset_target, &dataset_entry, account, compute_consumer, cancel)
            .await?;

        self.notifier.success(&format!("Compute orders placed for {}", dataset.did));
        Ok(ComputeOrders {
            dataset_tx,
            algorithm_tx,
        })
    }

    async fn settle_compute_input(
        &self,
        target: &OrderTarget,
        entry: &ComputeInitializeEntry,
        account: &str,
        compute_consumer: Option<&str>,
        cancel: &CancellationToken,
    ) -> SettlementResult<String> {
        // without a quote from initializeCompute, a fresh order negotiates one
        let price = match (entry.valid_order(), &entry.provider_fee) {
            (Some(_), Some(fee)) => OrderPriceAndFees::provider_fee_only(fee.clone()),
            (Some(_), None) => OrderPriceAndFees::provider_fee_only(ProviderFee::default()),
            (None, fee) => self
                .calculator
                .order_price_and_fees(target, account, fee.clone())
                .await
                .map_err(|err| self.count_failure(err))?,
        };

        let has_datatoken = match entry.valid_order() {
            Some(_) => false,
            None => self
                .holds_datatoken(target, account)
                .await
                .map_err(|err| self.report(err, "[order compute]"))?,
        };

        let mut request = OrderRequest::new(target, &price, account);
        request.has_datatoken = has_datatoken;
        request.compute_consumer = compute_consumer;

        self.handler.handle(request, entry, cancel).await
    }

    async fn resolve_target(&self, did: &str, service_id: &str) -> SettlementResult<OrderTarget> {
        let asset = self.metadata.get_asset(did).await?;
        let access = resolve_asset_access(&asset, service_id, None, false);
        tracing::info!(
            did = %did,
            service = %service_id,
            "Resolved {:?} pricing (template {:?})",
            access.pricing_type,
            access.template_id
        );
        OrderTarget::from_asset(&asset, service_id, access)
    }

    /// Whether `account` holds at least one whole datatoken of `target`.
    async fn holds_datatoken(&self, target: &OrderTarget, account: &str) -> SettlementResult<bool> {
        let one = to_base_units(Decimal::ONE, target.access.datatoken.decimals)?;
        let balance = self.chain.balance_of(target.datatoken(), account).await?;
        Ok(balance >= one)
    }

    fn require_purchasable(target: OrderTarget) -> SettlementResult<OrderTarget> {
        if target.access.is_purchasable {
            return Ok(target);
        }
        Err(SettlementError::not_supported(format!(
            "service {} of {} cannot be ordered",
            target.service.id, target.did
        )))
    }

    /// Log and notify an error no stage has reported yet.
    fn notify_failure(&self, err: SettlementError, context: &str) -> SettlementError {
        err.log(context);
        self.notifier.error(&err.to_string());
        err
    }

    fn report(&self, err: SettlementError, context: &str) -> SettlementError {
        let err = self.notify_failure(err, context);
        self.count_failure(err)
    }

    fn count_failure(&self, err: SettlementError) -> SettlementError {
        self.metrics.order_failures_total.inc();
        err
    }
}
