//! End-to-end settlement tests.
//!
//! Each test wires a `SettlementService` from:
//! - an in-memory metadata cache holding the asset documents
//! - a wiremocked provider behind the real `HttpProviderClient`
//! - `MockChain`, which records every contract call
//! - `RecordingNotifier`, which keeps every user notification

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use market_settlement::{
    allowance::AllowancePoller,
    chain::mock::{ChainCall, MockChain},
    chain::FixedRateQuote,
    config::MarketConfig,
    error::{DenialReason, SettlementError, SettlementResult},
    metadata::{Asset, MetadataCache},
    metrics::{SettlementMetrics, PATH_EXISTING, PATH_FRESH, PATH_REUSE},
    networks::{NetworkTable, ZERO_ADDRESS},
    notify::RecordingNotifier,
    order::OrderExecutor,
    provider::{ComputeEnvironment, HttpProviderClient, ProviderFeeNegotiator},
    AssetRef, SettlementService,
};

const CHAIN_ID: u64 = 32456;
const CONSUMER: &str = "0x1111111111111111111111111111111111111111";
const FIXED_DID: &str = "did:op:fixed";
const FREE_DID: &str = "did:op:free";
const ALGO_DID: &str = "did:op:algo";
const UNPRICED_DID: &str = "did:op:unpriced";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct StaticMetadata {
    assets: HashMap<String, Asset>,
}

#[async_trait]
impl MetadataCache for StaticMetadata {
    async fn get_asset(&self, did: &str) -> SettlementResult<Asset> {
        self.assets
            .get(did)
            .cloned()
            .ok_or_else(|| SettlementError::not_found(did))
    }

    async fn query(&self, _body: &Value) -> SettlementResult<Value> {
        Ok(Value::Null)
    }

    async fn asset_names(&self, dids: &[String]) -> SettlementResult<HashMap<String, String>> {
        Ok(dids
            .iter()
            .filter_map(|did| self.assets.get(did).map(|a| (did.clone(), a.name().to_string())))
            .collect())
    }
}

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn asset(did: &str, datatoken: &str, provider_url: &str, price: Value) -> Asset {
    let prices = if price.is_null() { json!([]) } else { json!([price]) };
    serde_json::from_value(json!({
        "id": did,
        "chainId": CHAIN_ID,
        "metadata": { "name": format!("Asset {did}"), "type": "dataset" },
        "services": [{
            "id": "svc",
            "type": "compute",
            "datatokenAddress": datatoken,
            "serviceEndpoint": provider_url
        }],
        "indexedMetadata": { "stats": [{
            "datatokenAddress": datatoken,
            "name": "Datatoken",
            "symbol": "DT",
            "serviceId": "svc",
            "prices": prices,
            "templateId": 2
        }]}
    }))
    .unwrap()
}

fn fixed_price() -> Value {
    json!({
        "type": "fixedrate",
        "price": "10",
        "contract": "0xfre",
        "exchangeId": "0xexchange",
        "token": { "address": "0xocean", "name": "Ocean", "symbol": "OCEAN", "decimals": 18 }
    })
}

fn metadata(provider_url: &str) -> StaticMetadata {
    let assets = [
        asset(FIXED_DID, "0xdtfixed", provider_url, fixed_price()),
        asset(ALGO_DID, "0xdtalgo", provider_url, fixed_price()),
        asset(
            FREE_DID,
            "0xdtfree",
            provider_url,
            json!({ "type": "dispenser", "contract": "0xdispenser" }),
        ),
        asset(UNPRICED_DID, "0xdtnone", provider_url, Value::Null),
    ];
    StaticMetadata {
        assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(),
    }
}

fn provider_fee(amount: &str) -> Value {
    json!({
        "providerFeeAddress": "0xprovider",
        "providerFeeToken": "0xocean",
        "providerFeeAmount": amount,
        "providerData": "0x",
        "v": 27,
        "r": "0x01",
        "s": "0x02",
        "validUntil": 0
    })
}

fn quote() -> FixedRateQuote {
    FixedRateQuote {
        base_token_amount: dec("10"),
        opc_fee_amount: dec("0.5"),
        market_fee_amount: Decimal::ZERO,
        consume_market_fee_amount: Decimal::ZERO,
    }
}

struct Flow {
    chain: Arc<MockChain>,
    notifier: Arc<RecordingNotifier>,
    metrics: Arc<SettlementMetrics>,
    service: SettlementService,
}

fn build_flow(server: &MockServer, chain: MockChain, config: MarketConfig, poller: AllowancePoller) -> Flow {
    let chain = Arc::new(chain);
    let notifier = Arc::new(RecordingNotifier::new());
    let metrics = Arc::new(SettlementMetrics::new().unwrap());
    let networks = Arc::new(NetworkTable::builtin());
    let config = Arc::new(config);

    let negotiator = Arc::new(
        ProviderFeeNegotiator::new(Arc::new(HttpProviderClient::new()), config.clone())
            .with_metrics(metrics.clone()),
    );
    let executor = OrderExecutor::new(chain.clone(), networks.clone(), config.clone()).with_poller(poller);

    let service = SettlementService::new(
        Arc::new(metadata(&server.uri())),
        negotiator,
        chain.clone(),
        networks,
        config,
        notifier.clone(),
        metrics.clone(),
    )
    .with_executor(executor);

    Flow {
        chain,
        notifier,
        metrics,
        service,
    }
}

fn fast_poller(max_attempts: u32) -> AllowancePoller {
    AllowancePoller {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts,
        jitter: Duration::ZERO,
    }
}

fn flow(server: &MockServer, chain: MockChain) -> Flow {
    build_flow(server, chain, MarketConfig::default(), fast_poller(5))
}

async fn mount_initialize(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/services/initialize"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_initialize_compute(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/services/initializeCompute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn environment() -> ComputeEnvironment {
    serde_json::from_value(json!({ "id": "env-1", "consumerAddress": "0xcompute" })).unwrap()
}

// ---------------------------------------------------------------------------
// Policy denials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deny_list_quote_notifies_once_and_touches_no_chain() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        400,
        json!({ "error": "Error: ConsumableCodes.CREDENTIAL_IN_DENY_LIST" }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let err = f.service.quote(FIXED_DID, "svc", CONSUMER).await.unwrap_err();

    assert!(matches!(
        err,
        SettlementError::PolicyDenied { reason: DenialReason::InDenyList, .. }
    ));
    assert_eq!(
        f.notifier.errors(),
        vec![format!(
            "Consumer address found in deny list for service {FIXED_DID}. Access has been denied."
        )]
    );
    assert!(f.chain.calls().is_empty());
    assert_eq!(f.metrics.policy_denials_total.get(), 1.0);
}

#[tokio::test]
async fn allow_list_denial_stops_order_before_any_chain_call() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        400,
        json!({ "error": "ConsumableCodes.CREDENTIAL_NOT_IN_ALLOW_LIST" }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let err = f
        .service
        .order_dataset(FIXED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_policy_denial());
    assert_eq!(f.notifier.errors().len(), 1);
    assert!(f.notifier.errors()[0].contains("not found in allow list"));
    assert!(f.chain.calls().is_empty());
    assert_eq!(f.metrics.order_failures_total.get(), 1.0);
}

#[tokio::test]
async fn zero_address_denial_is_not_notified() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        400,
        json!({ "error": "ConsumableCodes.CREDENTIAL_IN_DENY_LIST" }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let err = f.service.quote(FIXED_DID, "svc", ZERO_ADDRESS).await.unwrap_err();

    assert!(err.is_policy_denial());
    assert!(f.notifier.notifications().is_empty());
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fixed_quote_adds_market_fees_and_keeps_provider_fee_apart() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        200,
        json!({ "datatoken": "0xdtfixed", "nonce": "1", "providerFee": provider_fee("200000000000000000") }),
    )
    .await;
    let config = MarketConfig {
        consume_market_order_fee: dec("0.1"),
        publisher_market_order_fee: dec("0.2"),
        ..MarketConfig::default()
    };
    let f = build_flow(&server, MockChain::new().with_quote(quote()), config, fast_poller(5));

    let fees = f.service.quote(FIXED_DID, "svc", CONSUMER).await.unwrap();

    assert_eq!(fees.price, dec("10.3"));
    assert_eq!(fees.opc_fee, dec("0.5"));
    assert_eq!(fees.provider_fee.provider_fee_amount, "200000000000000000");
    assert!(f.chain.write_calls().is_empty());
}

#[tokio::test]
async fn free_quote_is_zero_priced() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        200,
        json!({ "datatoken": "0xdtfree", "nonce": "1", "providerFee": provider_fee("0") }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let fees = f.service.quote(FREE_DID, "svc", CONSUMER).await.unwrap();

    assert_eq!(fees.price, Decimal::ZERO);
    assert_eq!(f.chain.count("calcBaseInGivenDatatokensOut"), 0);
}

// ---------------------------------------------------------------------------
// Dataset orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fixed_template_two_order_approves_price_opc_and_provider_fee() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        200,
        json!({ "datatoken": "0xdtfixed", "nonce": "1", "providerFee": provider_fee("200000000000000000") }),
    )
    .await;
    let f = flow(&server, MockChain::new().with_quote(quote()));

    let tx = f
        .service
        .order_dataset(FIXED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap();

    let approvals: Vec<ChainCall> = f
        .chain
        .write_calls()
        .into_iter()
        .filter(|call| call.method() == "approve")
        .collect();
    // handler approves the provider fee, the executor then raises it to the full amount
    assert_eq!(
        approvals.last(),
        Some(&ChainCall::Approve {
            token: "0xocean".to_string(),
            spender: "0xdtfixed".to_string(),
            amount: 10_700_000_000_000_000_000,
        })
    );
    assert_eq!(f.chain.count("buyFromFreAndOrder"), 1);
    assert_eq!(f.chain.count("reuseOrder"), 0);
    assert!(tx.starts_with("0xtx"));
    assert_eq!(f.metrics.orders_total.with_label_values(&[PATH_FRESH]).get(), 1.0);
    assert!(f.notifier.errors().is_empty());
}

#[tokio::test]
async fn valid_order_with_zero_fee_is_reused_without_transactions() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        200,
        json!({
            "datatoken": "0xdtfixed",
            "nonce": "1",
            "providerFee": provider_fee("0"),
            "validOrder": "0xprior"
        }),
    )
    .await;
    let f = flow(&server, MockChain::new().with_quote(quote()));

    let tx = f
        .service
        .order_dataset(FIXED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tx, "0xprior");
    assert!(f.chain.calls().is_empty());
    assert_eq!(f.metrics.orders_total.with_label_values(&[PATH_EXISTING]).get(), 1.0);
}

#[tokio::test]
async fn provider_failure_on_quote_is_reported_once() {
    let server = MockServer::start().await;
    mount_initialize(&server, 500, json!({ "error": "internal provider failure" })).await;
    let f = flow(&server, MockChain::new().with_quote(quote()));

    let err = f.service.quote(FIXED_DID, "svc", CONSUMER).await.unwrap_err();

    assert!(matches!(err, SettlementError::Provider { .. }));
    assert_eq!(f.notifier.errors().len(), 1);
    assert!(f.chain.calls().is_empty());
}

#[tokio::test]
async fn provider_failure_on_order_is_reported_once() {
    let server = MockServer::start().await;
    mount_initialize(&server, 500, json!({ "error": "internal provider failure" })).await;
    let f = flow(&server, MockChain::new().with_quote(quote()));

    let err = f
        .service
        .order_dataset(FIXED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::Provider { .. }));
    assert_eq!(f.notifier.errors().len(), 1);
    assert!(f.chain.calls().is_empty());
    assert_eq!(f.metrics.order_failures_total.get(), 1.0);
}

#[tokio::test]
async fn unpriced_service_is_rejected_with_one_notification() {
    let server = MockServer::start().await;
    let f = flow(&server, MockChain::new());

    let err = f
        .service
        .order_dataset(UNPRICED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::NotSupported { .. }));
    assert_eq!(f.notifier.errors().len(), 1);
    assert!(f.chain.calls().is_empty());
}

#[tokio::test]
async fn allowance_that_never_lands_times_out() {
    let server = MockServer::start().await;
    mount_initialize(
        &server,
        200,
        json!({ "datatoken": "0xdtfixed", "nonce": "1", "providerFee": provider_fee("0") }),
    )
    .await;
    let f = build_flow(
        &server,
        MockChain::new().with_quote(quote()).with_allowance_lag(1_000),
        MarketConfig::default(),
        fast_poller(3),
    );

    let err = f
        .service
        .order_dataset(FIXED_DID, "svc", CONSUMER, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::AllowanceTimeout { attempts: 3, .. }));
    assert_eq!(f.chain.count("buyFromFreAndOrder"), 0);
    assert_eq!(f.notifier.errors().len(), 1);
    assert_eq!(f.metrics.order_failures_total.get(), 1.0);
}

// ---------------------------------------------------------------------------
// Compute orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compute_reuses_dataset_order_and_buys_algorithm() {
    let server = MockServer::start().await;
    mount_initialize_compute(
        &server,
        json!({
            "datasets": [{ "validOrder": "0xdataset-order" }],
            "algorithm": { "providerFee": provider_fee("0") }
        }),
    )
    .await;
    let f = flow(&server, MockChain::new().with_quote(quote()));

    let orders = f
        .service
        .order_compute(
            &AssetRef::new(FREE_DID, "svc"),
            &AssetRef::new(ALGO_DID, "svc"),
            &environment(),
            1_700_000_000,
            CONSUMER,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(orders.dataset_tx, "0xdataset-order");
    assert!(orders.algorithm_tx.starts_with("0xtx"));
    assert_eq!(f.chain.count("reuseOrder"), 0);
    match f.chain.write_calls().last() {
        Some(ChainCall::BuyFromFreAndOrder { datatoken, params, .. }) => {
            assert_eq!(datatoken, "0xdtalgo");
            assert_eq!(params.consumer, "0xcompute");
        }
        other => panic!("unexpected call {other:?}"),
    }
}

#[tokio::test]
async fn compute_with_new_fee_pays_it_through_reuse_order() {
    let server = MockServer::start().await;
    mount_initialize_compute(
        &server,
        json!({
            "datasets": [{ "validOrder": "0xdataset-order", "providerFee": provider_fee("1000") }],
            "algorithm": { "validOrder": "0xalgo-order" }
        }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let orders = f
        .service
        .order_compute(
            &AssetRef::new(FREE_DID, "svc"),
            &AssetRef::new(ALGO_DID, "svc"),
            &environment(),
            1_700_000_000,
            CONSUMER,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(orders.algorithm_tx, "0xalgo-order");
    assert_ne!(orders.dataset_tx, "0xdataset-order");
    assert_eq!(f.chain.count("reuseOrder"), 1);
    assert_eq!(f.chain.count("buyFromDispenserAndOrder"), 0);
    assert_eq!(f.chain.count("buyFromFreAndOrder"), 0);
    assert_eq!(f.metrics.orders_total.with_label_values(&[PATH_REUSE]).get(), 1.0);
    assert_eq!(f.metrics.orders_total.with_label_values(&[PATH_EXISTING]).get(), 1.0);
}

#[tokio::test]
async fn compute_input_without_fee_negotiates_one_before_ordering() {
    let server = MockServer::start().await;
    mount_initialize_compute(
        &server,
        json!({
            "datasets": [{}],
            "algorithm": { "validOrder": "0xalgo-order" }
        }),
    )
    .await;
    mount_initialize(
        &server,
        200,
        json!({ "datatoken": "0xdtfree", "nonce": "1", "providerFee": provider_fee("0") }),
    )
    .await;
    let f = flow(&server, MockChain::new());

    let orders = f
        .service
        .order_compute(
            &AssetRef::new(FREE_DID, "svc"),
            &AssetRef::new(ALGO_DID, "svc"),
            &environment(),
            1_700_000_000,
            CONSUMER,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(orders.algorithm_tx, "0xalgo-order");
    match f.chain.write_calls().last() {
        Some(ChainCall::BuyFromDispenserAndOrder { datatoken, params, .. }) => {
            assert_eq!(datatoken, "0xdtfree");
            assert_eq!(params.provider_fee.provider_fee_address, "0xprovider");
            assert_eq!(params.provider_fee.s, "0x02");
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(f.metrics.provider_fee_requests_total.get(), 2.0);
}

#[tokio::test]
async fn compute_input_without_any_quote_places_no_order() {
    let server = MockServer::start().await;
    mount_initialize_compute(
        &server,
        json!({
            "datasets": [{}],
            "algorithm": { "validOrder": "0xalgo-order" }
        }),
    )
    .await;
    mount_initialize(&server, 503, json!({ "error": "provider unavailable" })).await;
    let f = flow(&server, MockChain::new());

    let err = f
        .service
        .order_compute(
            &AssetRef::new(FREE_DID, "svc"),
            &AssetRef::new(ALGO_DID, "svc"),
            &environment(),
            1_700_000_000,
            CONSUMER,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::Provider { .. }));
    assert!(f.chain.write_calls().is_empty());
    assert_eq!(f.notifier.errors().len(), 1);
}
