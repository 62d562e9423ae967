//! Per-chain contract addresses.
//!
//! Settlement code never hard-codes an address: the executor and the
//! escrow helpers look up the chain's entry in a `NetworkTable` that is
//! passed in alongside `MarketConfig`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::error::{SettlementError, SettlementResult};

/// Address used where the contracts expect "no address".
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Contracts and tokens deployed on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddresses {
    pub chain_id: u64,
    pub name: String,
    pub fixed_rate_exchange: String,
    pub dispenser: String,
    /// Token provider fees are paid in for free assets.
    pub fee_token: String,
    #[serde(default = "default_fee_token_decimals")]
    pub fee_token_decimals: u8,
    #[serde(default)]
    pub escrow: Option<String>,
}

fn default_fee_token_decimals() -> u8 {
    18
}

/// Lookup table from chain id to deployed addresses.
#[derive(Debug, Clone, Default)]
pub struct NetworkTable {
    networks: HashMap<u64, NetworkAddresses>,
}

impl NetworkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the Pontus-X devnet and testnet deployments.
    ///
    /// Both chains run the same deployment of the exchange and dispenser
    /// contracts; only the fee token differs. No escrow is built in, it
    /// has to come from `NETWORKS_FILE`, which also overrides any entry
    /// here.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.insert(NetworkAddresses {
            chain_id: 32456,
            name: "Pontus-X Devnet".to_string(),
            fixed_rate_exchange: "0xcE0F39abB6DA2aE4d072DA78FA0A711cBB62764E".to_string(),
            dispenser: "0x94cb8FC8719Ed09bE3D9c696d2037EA95ef68d3e".to_string(),
            fee_token: "0xdF171F74a8d3f4e2A789A566Dce9Fa4945196112".to_string(),
            fee_token_decimals: 18,
            escrow: None,
        });
        table.insert(NetworkAddresses {
            chain_id: 32457,
            name: "Pontus-X Testnet".to_string(),
            fixed_rate_exchange: "0xcE0F39abB6DA2aE4d072DA78FA0A711cBB62764E".to_string(),
            dispenser: "0x94cb8FC8719Ed09bE3D9c696d2037EA95ef68d3e".to_string(),
            fee_token: "0x5B190F9E2E721f8c811E4d584383E3d57b865C69".to_string(),
            fee_token_decimals: 18,
            escrow: None,
        });
        table
    }

    /// Built-in entries plus those from `config.networks_file`, if set.
    pub fn for_config(config: &MarketConfig) -> SettlementResult<Self> {
        let mut table = Self::builtin();
        if let Some(path) = &config.networks_file {
            table.extend_from_file(path)?;
        }
        Ok(table)
    }

    /// Merge entries from a JSON array file, replacing existing chain ids.
    pub fn extend_from_file(&mut self, path: impl AsRef<Path>) -> SettlementResult<()> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SettlementError::config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let entries: Vec<NetworkAddresses> = serde_json::from_str(&raw).map_err(|err| {
            SettlementError::config(format!("invalid networks file {}: {}", path.display(), err))
        })?;
        for entry in entries {
            self.insert(entry);
        }
        Ok(())
    }

    pub fn insert(&mut self, addresses: NetworkAddresses) {
        self.networks.insert(addresses.chain_id, addresses);
    }

    pub fn get(&self, chain_id: u64) -> SettlementResult<&NetworkAddresses> {
        self.networks
            .get(&chain_id)
            .ok_or_else(|| SettlementError::config(format!("no contracts configured for chain {}", chain_id)))
    }

    /// Entry for `chain_id`, if any; for callers that can run without
    /// contract addresses.
    pub fn find(&self, chain_id: u64) -> Option<&NetworkAddresses> {
        self.networks.get(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.networks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
