//! Compute order reuse
//!
//! Decides, per compute input, between returning a still-valid order,
//! paying a fresh provider fee on top of it, or placing a new order.
//!
//! | valid order | provider fee | action                                   |
//! |-------------|--------------|------------------------------------------|
//! | yes         | no           | return the order tx, no chain call       |
//! | yes         | yes          | approve the fee, then `reuse_order` once |
//! | no          | any          | approve the fee, then a full order       |

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::allowance::ensure_allowance;
use crate::chain::ChainClient;
use crate::error::SettlementResult;
use crate::metrics::{SettlementMetrics, PATH_EXISTING, PATH_FRESH, PATH_REUSE};
use crate::notify::Notifier;
use crate::order::{OrderExecutor, OrderRequest, OrderTarget};
use crate::provider::{ComputeInitializeEntry, ProviderFee};

pub struct ComputeOrderHandler {
    chain: Arc<dyn ChainClient>,
    executor: Arc<OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<SettlementMetrics>>,
}

impl ComputeOrderHandler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        executor: Arc<OrderExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            chain,
            executor,
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SettlementMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Settle one compute input and return the order transaction to hand
    /// to the provider.
    ///
    /// Failures are reported to the user here, once, and returned.
    pub async fn handle<'a>(
        &self,
        request: OrderRequest<'a>,
        init: &'a ComputeInitializeEntry,
        cancel: &CancellationToken,
    ) -> SettlementResult<String> {
        match self.settle(request, init, cancel).await {
            Ok((path, tx)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_order(path);
                }
                Ok(tx)
            }
            Err(err) => {
                err.log("[compute order]");
                self.notifier.error(&err.to_string());
                if let Some(metrics) = &self.metrics {
                    metrics.order_failures_total.inc();
                }
                Err(err)
            }
        }
    }

    async fn settle<'a>(
        &self,
        mut request: OrderRequest<'a>,
        init: &'a ComputeInitializeEntry,
        cancel: &CancellationToken,
    ) -> SettlementResult<(&'static str, String)> {
        let target = request.target;

        match (init.valid_order(), init.provider_fee.as_ref()) {
            (Some(tx), None) => {
                tracing::info!(did = %target.did, tx = %tx, "Reusing valid order");
                Ok((PATH_EXISTING, tx.to_string()))
            }
            (Some(tx), Some(fee)) => {
                self.approve_provider_fee(&request, fee, cancel).await?;
                let receipt = self
                    .chain
                    .reuse_order(target.datatoken(), request.account, tx, fee)
                    .await?;
                tracing::info!(
                    did = %target.did,
                    tx = %receipt.transaction_hash,
                    "Reused order {} with a new provider fee",
                    tx
                );
                Ok((PATH_REUSE, receipt.transaction_hash))
            }
            (None, fee) => {
                if let Some(fee) = fee {
                    self.approve_provider_fee(&request, fee, cancel).await?;
                    request.provider_fee = Some(fee);
                }
                let outcome = self.executor.execute(request, cancel).await?;
                Ok((PATH_FRESH, outcome.receipt.transaction_hash))
            }
        }
    }

    /// Approve the datatoken to collect `fee`, waiting until the
    /// allowance is visible. Zero fees need no approval.
    async fn approve_provider_fee(
        &self,
        request: &OrderRequest<'_>,
        fee: &ProviderFee,
        cancel: &CancellationToken,
    ) -> SettlementResult<()> {
        let amount = fee.amount_units()?;
        if amount == 0 {
            return Ok(());
        }

        let target = request.target;
        let token = self.fee_token(target)?;
        ensure_allowance(
            self.chain.as_ref(),
            &token,
            request.account,
            target.datatoken(),
            amount,
        )
        .await?;
        self.executor
            .poller()
            .wait_for_allowance(
                self.chain.as_ref(),
                &token,
                request.account,
                target.datatoken(),
                amount,
                cancel,
                self.metrics.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Base token for priced assets, the network fee token for free ones.
    fn fee_token(&self, target: &OrderTarget) -> SettlementResult<String> {
        match &target.access.base_token {
            Some(token) => Ok(token.address.clone()),
            None => Ok(self
                .executor
                .networks()
                .get(target.chain_id)?
                .fee_token
                .clone()),
        }
    }
}
