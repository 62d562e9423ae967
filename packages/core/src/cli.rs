use clap::{Parser, Subcommand};

use crate::config::MarketConfig;
use crate::networks::ZERO_ADDRESS;

/// Market settlement CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "market-settlement",
    version,
    about = "Order and compute settlement for the Pontus-X data marketplace"
)]
pub struct Cli {
    /// Metadata cache base URL
    #[arg(long, global = true)]
    pub metadata_url: Option<String>,

    /// Provider URL used instead of every service endpoint
    #[arg(long, global = true)]
    pub provider_url: Option<String>,

    /// Chain id of the assets
    #[arg(long, global = true, default_value_t = 32456)]
    pub chain_id: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve the access details of a service
    Access { did: String, service_id: String },

    /// Request a provider fee quote for a consumer
    QuoteFee {
        did: String,
        service_id: String,
        #[arg(long, default_value = ZERO_ADDRESS)]
        consumer: String,
    },

    /// List the compute environments of a provider
    Environments { provider: String },

    /// List the compute jobs of a consumer, newest first
    Jobs { provider: String, consumer: String },
}

impl Cli {
    /// Flags win over values read from the environment.
    pub fn apply(&self, config: &mut MarketConfig) {
        if let Some(url) = &self.metadata_url {
            config.metadata_cache_url = url.clone();
        }
        if let Some(url) = &self.provider_url {
            config.custom_provider_url = Some(url.clone());
        }
    }
}
