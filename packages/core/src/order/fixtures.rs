//! Shared order fixtures for unit tests.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::access::{AccessDetails, PricingType, TemplateId, TokenInfo};
use crate::allowance::AllowancePoller;
use crate::metadata::Service;
use crate::networks::{NetworkAddresses, NetworkTable};
use crate::order::OrderTarget;
use crate::pricing::OrderPriceAndFees;
use crate::provider::ProviderFee;

pub const ACCOUNT: &str = "0xbuyer";

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub fn network() -> NetworkTable {
    let mut table = NetworkTable::new();
    table.insert(NetworkAddresses {
        chain_id: 1,
        name: "test".to_string(),
        fixed_rate_exchange: "0xfre".to_string(),
        dispenser: "0xdispenser".to_string(),
        fee_token: "0xfeetoken".to_string(),
        fee_token_decimals: 18,
        escrow: Some("0xescrow".to_string()),
    });
    table
}

pub fn fast_poller() -> AllowancePoller {
    AllowancePoller {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_attempts: 5,
        jitter: Duration::ZERO,
    }
}

pub fn target(pricing_type: PricingType, template_id: TemplateId) -> OrderTarget {
    let base_token = (pricing_type == PricingType::Fixed).then(|| TokenInfo {
        address: "0xocean".to_string(),
        name: "Ocean".to_string(),
        symbol: "OCEAN".to_string(),
        decimals: 18,
    });
    OrderTarget {
        did: "did:op:1".to_string(),
        chain_id: 1,
        service: Service {
            id: "svc".to_string(),
            service_type: "compute".to_string(),
            datatoken_address: "0xdt".to_string(),
            service_endpoint: "https://provider".to_string(),
            timeout: 0,
        },
        service_index: 0,
        access: AccessDetails {
            pricing_type,
            price: dec("10"),
            template_id,
            address_or_id: "0xexchange".to_string(),
            base_token,
            datatoken: TokenInfo {
                address: "0xdt".to_string(),
                name: "DT".to_string(),
                symbol: "DT".to_string(),
                decimals: 18,
            },
            valid_order_tx: None,
            is_purchasable: pricing_type != PricingType::NotSupported,
            is_owned: false,
        },
    }
}

pub fn provider_fee(amount: &str) -> ProviderFee {
    ProviderFee {
        provider_fee_address: "0xprovider".to_string(),
        provider_fee_token: "0xocean".to_string(),
        provider_fee_amount: amount.to_string(),
        provider_data: String::new(),
        v: 0,
        r: String::new(),
        s: String::new(),
        valid_until: 0,
    }
}

/// Price 10, opc fee 0.5, no market fees.
pub fn price(provider_fee_units: &str) -> OrderPriceAndFees {
    OrderPriceAndFees {
        price: dec("10"),
        publisher_market_order_fee: Decimal::ZERO,
        publisher_market_fixed_swap_fee: Decimal::ZERO,
        consume_market_order_fee: Decimal::ZERO,
        consume_market_fixed_swap_fee: Decimal::ZERO,
        provider_fee: provider_fee(provider_fee_units),
        opc_fee: dec("0.5"),
    }
}
