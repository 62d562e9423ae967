use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::allowance::AllowancePoller;
use crate::networks::ZERO_ADDRESS;

/// Marketplace settings every settlement component receives explicitly.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub market_fee_address: String,
    pub consume_market_order_fee: Decimal,
    pub publisher_market_order_fee: Decimal,
    pub consume_market_fixed_swap_fee: Decimal,
    pub custom_provider_url: Option<String>,
    pub ssi_enabled: bool,
    pub ssi_wallet_api: Option<String>,
    pub metadata_cache_url: String,
    pub allowance_max_attempts: u32,
    pub allowance_initial_delay_ms: u64,
    pub quote_cache_ttl_seconds: u64,
    pub networks_file: Option<PathBuf>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            market_fee_address: ZERO_ADDRESS.to_string(),
            consume_market_order_fee: Decimal::ZERO,
            publisher_market_order_fee: Decimal::ZERO,
            consume_market_fixed_swap_fee: Decimal::ZERO,
            custom_provider_url: None,
            ssi_enabled: false,
            ssi_wallet_api: None,
            metadata_cache_url: "https://aquarius.pontus-x.eu".to_string(),
            allowance_max_attempts: 10,
            allowance_initial_delay_ms: 1000,
            quote_cache_ttl_seconds: 60,
            networks_file: None,
        }
    }
}

impl MarketConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let decimal = |key: &str, fallback: Decimal| -> Result<Decimal, String> {
            match get(key) {
                Some(raw) => Decimal::from_str(raw.trim())
                    .map_err(|_| format!("{} must be a decimal number", key)),
                None => Ok(fallback),
            }
        };

        let market_fee_address = get("MARKET_FEE_ADDRESS").unwrap_or(defaults.market_fee_address);
        let consume_market_order_fee =
            decimal("CONSUME_MARKET_ORDER_FEE", defaults.consume_market_order_fee)?;
        let publisher_market_order_fee =
            decimal("PUBLISHER_MARKET_ORDER_FEE", defaults.publisher_market_order_fee)?;
        let consume_market_fixed_swap_fee =
            decimal("CONSUME_MARKET_FIXED_SWAP_FEE", defaults.consume_market_fixed_swap_fee)?;

        let ssi_enabled = match get("SSI_ENABLED").as_deref() {
            None => false,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => return Err(format!("Invalid SSI_ENABLED: {}", other)),
        };
        let ssi_wallet_api = get("SSI_WALLET_API");
        if ssi_enabled && ssi_wallet_api.is_none() {
            return Err("SSI_WALLET_API is required when SSI_ENABLED is set".to_string());
        }

        let allowance_max_attempts = match get("ALLOWANCE_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or("ALLOWANCE_MAX_ATTEMPTS must be a positive number")?,
            None => defaults.allowance_max_attempts,
        };

        let allowance_initial_delay_ms = match get("ALLOWANCE_INITIAL_DELAY_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| "ALLOWANCE_INITIAL_DELAY_MS must be a valid number")?,
            None => defaults.allowance_initial_delay_ms,
        };

        let quote_cache_ttl_seconds = match get("QUOTE_CACHE_TTL_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| "QUOTE_CACHE_TTL_SECONDS must be a valid number")?,
            None => defaults.quote_cache_ttl_seconds,
        };

        Ok(Self {
            market_fee_address,
            consume_market_order_fee,
            publisher_market_order_fee,
            consume_market_fixed_swap_fee,
            custom_provider_url: get("CUSTOM_PROVIDER_URL"),
            ssi_enabled,
            ssi_wallet_api,
            metadata_cache_url: get("METADATA_CACHE_URL").unwrap_or(defaults.metadata_cache_url),
            allowance_max_attempts,
            allowance_initial_delay_ms,
            quote_cache_ttl_seconds,
            networks_file: get("NETWORKS_FILE").map(PathBuf::from),
        })
    }

    /// Provider to call for a service: the operator override wins.
    pub fn provider_url<'a>(&'a self, service_endpoint: &'a str) -> &'a str {
        self.custom_provider_url.as_deref().unwrap_or(service_endpoint)
    }

    pub fn allowance_poller(&self) -> AllowancePoller {
        AllowancePoller {
            initial_delay: Duration::from_millis(self.allowance_initial_delay_ms),
            max_attempts: self.allowance_max_attempts,
            ..AllowancePoller::default()
        }
    }

    pub fn quote_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_cache_ttl_seconds)
    }
}
