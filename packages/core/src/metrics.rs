//! Prometheus metrics registry for the settlement flow.
//!
//! [`SettlementMetrics`] owns all registered metrics and the [`Registry`]
//! they belong to. Construct it once, wrap in `Arc`, and hand it to the
//! negotiator and the settlement service.

use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Order path label values.
pub const PATH_EXISTING: &str = "existing";
pub const PATH_REUSE: &str = "reuse";
pub const PATH_FRESH: &str = "fresh";

pub struct SettlementMetrics {
    /// Completed orders, labelled by how they were settled.
    pub orders_total: CounterVec,
    /// Order attempts that ended in an error.
    pub order_failures_total: Counter,
    /// Provider refusals due to allow/deny lists.
    pub policy_denials_total: Counter,
    /// Fee quotes requested from providers.
    pub provider_fee_requests_total: Counter,
    /// Fee quotes served from the quote cache.
    pub quote_cache_hits_total: Counter,
    /// Allowance reads performed while waiting for an approval.
    pub allowance_polls_total: Counter,
    pub registry: Registry,
}

impl SettlementMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_total = CounterVec::new(
            Opts::new("market_settlement_orders_total", "Completed orders by settlement path"),
            &["path"],
        )?;

        let order_failures_total = Counter::with_opts(Opts::new(
            "market_settlement_order_failures_total",
            "Order attempts that failed",
        ))?;

        let policy_denials_total = Counter::with_opts(Opts::new(
            "market_settlement_policy_denials_total",
            "Provider access denials (allow/deny lists)",
        ))?;

        let provider_fee_requests_total = Counter::with_opts(Opts::new(
            "market_settlement_provider_fee_requests_total",
            "Provider fee quotes requested",
        ))?;

        let quote_cache_hits_total = Counter::with_opts(Opts::new(
            "market_settlement_quote_cache_hits_total",
            "Provider fee quotes served from cache",
        ))?;

        let allowance_polls_total = Counter::with_opts(Opts::new(
            "market_settlement_allowance_polls_total",
            "Allowance reads while waiting for approvals",
        ))?;

        registry.register(Box::new(orders_total.clone()))?;
        registry.register(Box::new(order_failures_total.clone()))?;
        registry.register(Box::new(policy_denials_total.clone()))?;
        registry.register(Box::new(provider_fee_requests_total.clone()))?;
        registry.register(Box::new(quote_cache_hits_total.clone()))?;
        registry.register(Box::new(allowance_polls_total.clone()))?;

        Ok(Self {
            orders_total,
            order_failures_total,
            policy_denials_total,
            provider_fee_requests_total,
            quote_cache_hits_total,
            allowance_polls_total,
            registry,
        })
    }

    pub fn record_order(&self, path: &str) {
        self.orders_total.with_label_values(&[path]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}
