use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use serde_json::Value;

use market_settlement::access::resolve_asset_access;
use market_settlement::cli::{Cli, Command};
use market_settlement::compute::compute_jobs;
use market_settlement::config::MarketConfig;
use market_settlement::error::AppError;
use market_settlement::logging::init_logging;
use market_settlement::metadata::{HttpMetadataCache, MetadataCache};
use market_settlement::networks::NetworkTable;
use market_settlement::provider::{
    HttpProviderClient, HttpSsiVerifier, ProviderClient, ProviderFeeNegotiator,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = MarketConfig::from_env().map_err(AppError::Config)?;
    cli.apply(&mut config);

    let networks = NetworkTable::for_config(&config)?;
    // none of the commands touch contracts, so an unknown chain is fine
    match networks.find(cli.chain_id) {
        Some(network) => tracing::info!("Using {} ({})", network.name, network.chain_id),
        None => tracing::warn!("No contracts configured for chain {}", cli.chain_id),
    }

    let config = Arc::new(config);
    let metadata = HttpMetadataCache::new(&config.metadata_cache_url);
    let provider: Arc<dyn ProviderClient> = Arc::new(HttpProviderClient::new());

    let output = match cli.command {
        Command::Access { did, service_id } => {
            let asset = metadata.get_asset(&did).await?;
            to_json(&resolve_asset_access(&asset, &service_id, None, false))?
        }
        Command::QuoteFee {
            did,
            service_id,
            consumer,
        } => {
            let asset = metadata.get_asset(&did).await?;
            let service = asset.service(&service_id).ok_or_else(|| {
                AppError::Config(format!("{} has no service {}", did, service_id))
            })?;

            let mut negotiator = ProviderFeeNegotiator::new(provider, config.clone());
            if config.ssi_enabled {
                let api = config.ssi_wallet_api.as_deref().ok_or_else(|| {
                    AppError::Config("SSI_WALLET_API is required when SSI is enabled".to_string())
                })?;
                negotiator = negotiator.with_ssi(Arc::new(HttpSsiVerifier::new(api)));
            }
            to_json(&negotiator.negotiate(&did, service, &consumer).await?)?
        }
        Command::Environments { provider: url } => {
            let url = config.provider_url(&url);
            to_json(&provider.compute_environments(url, cli.chain_id).await?)?
        }
        Command::Jobs {
            provider: url,
            consumer,
        } => {
            let url = config.provider_url(&url);
            to_json(&compute_jobs(provider.as_ref(), &metadata, url, &consumer, cli.chain_id).await?)?
        }
    };

    let rendered =
        serde_json::to_string_pretty(&output).map_err(|err| AppError::Output(err.to_string()))?;
    println!("{}", rendered);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::Output(err.to_string()))
}
