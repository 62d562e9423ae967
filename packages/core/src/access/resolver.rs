//! Access-details resolver
//!
//! Turns the indexer's pricing statistics into `AccessDetails`. Unknown
//! pricing schemes degrade to `NotSupported` instead of failing, so a
//! new scheme appearing in the metadata cache never breaks a caller.
//!
//! Only the first price entry of a service is honoured. Services that
//! carry more than one concurrent pricing strategy are resolved against
//! `prices[0]` and the rest is reported at `warn`.

use futures::future::join_all;
use rust_decimal::Decimal;

use crate::access::types::{AccessDetails, PricingType, TemplateId, TokenInfo};
use crate::error::{SettlementError, SettlementResult};
use crate::metadata::{Asset, MetadataCache, ServiceStats};

pub const PRICE_TYPE_DISPENSER: &str = "dispenser";
pub const PRICE_TYPE_FIXED_RATE: &str = "fixedrate";

/// Resolve one service's statistics record.
pub fn resolve_access_details(
    stats: &ServiceStats,
    valid_order_tx: Option<String>,
    is_owned: bool,
) -> AccessDetails {
    let datatoken = TokenInfo {
        address: stats.datatoken_address.clone(),
        name: stats.name.clone(),
        symbol: stats.symbol.clone(),
        decimals: 18,
    };

    let template_id = match stats.template_id.map(TemplateId::try_from) {
        None => TemplateId::V2,
        Some(Ok(template_id)) => template_id,
        Some(Err(err)) => {
            tracing::warn!("Service {}: {}", stats.service_id, err);
            return not_supported(datatoken, TemplateId::V2, valid_order_tx, is_owned);
        }
    };

    if stats.prices.len() > 1 {
        tracing::warn!(
            "Service {} has {} price entries, only the first is used",
            stats.service_id,
            stats.prices.len()
        );
    }

    let Some(price) = stats.prices.first() else {
        return not_supported(datatoken, template_id, valid_order_tx, is_owned);
    };

    match price.price_type.as_str() {
        PRICE_TYPE_DISPENSER => AccessDetails {
            pricing_type: PricingType::Free,
            price: Decimal::ZERO,
            template_id,
            address_or_id: price.contract.clone(),
            base_token: None,
            datatoken,
            valid_order_tx,
            is_purchasable: true,
            is_owned,
        },
        PRICE_TYPE_FIXED_RATE => AccessDetails {
            pricing_type: PricingType::Fixed,
            price: price.price,
            template_id,
            address_or_id: price.exchange_id.clone().unwrap_or_default(),
            base_token: price.token.clone(),
            datatoken,
            valid_order_tx,
            is_purchasable: true,
            is_owned,
        },
        other => {
            tracing::debug!("Service {}: unsupported price type {}", stats.service_id, other);
            not_supported(datatoken, template_id, valid_order_tx, is_owned)
        }
    }
}

fn not_supported(
    datatoken: TokenInfo,
    template_id: TemplateId,
    valid_order_tx: Option<String>,
    is_owned: bool,
) -> AccessDetails {
    AccessDetails {
        pricing_type: PricingType::NotSupported,
        price: Decimal::ZERO,
        template_id,
        address_or_id: String::new(),
        base_token: None,
        datatoken,
        valid_order_tx,
        is_purchasable: false,
        is_owned,
    }
}

/// Resolve a service of an asset document. A service without statistics
/// resolves to `NotSupported`.
pub fn resolve_asset_access(
    asset: &Asset,
    service_id: &str,
    valid_order_tx: Option<String>,
    is_owned: bool,
) -> AccessDetails {
    match asset.stats_for(service_id) {
        Some(stats) => resolve_access_details(stats, valid_order_tx, is_owned),
        None => {
            let datatoken_address = asset
                .service(service_id)
                .map(|service| service.datatoken_address.clone())
                .unwrap_or_default();
            tracing::warn!("Asset {} has no pricing stats for service {}", asset.id, service_id);
            not_supported(
                TokenInfo {
                    address: datatoken_address,
                    name: String::new(),
                    symbol: String::new(),
                    decimals: 18,
                },
                TemplateId::V2,
                valid_order_tx,
                is_owned,
            )
        }
    }
}

/// Fetch and resolve several services concurrently. Results keep the
/// order of `requests`; one failed fetch does not affect the others.
pub async fn resolve_many(
    metadata: &dyn MetadataCache,
    requests: &[(String, String)],
) -> Vec<SettlementResult<AccessDetails>> {
    let lookups = requests.iter().map(|(did, service_id)| async move {
        let asset = metadata.get_asset(did).await?;
        Ok::<_, SettlementError>(resolve_asset_access(&asset, service_id, None, false))
    });
    join_all(lookups).await
}
