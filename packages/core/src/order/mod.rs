//! Order execution
//!
//! An order moves `NotOrdered → Approved → Swapped | Dispensed → Ordered`;
//! template 2 collapses the swap and the order into one transaction.

pub mod executor;
#[cfg(test)]
pub(crate) mod fixtures;

use serde::{Deserialize, Serialize};

use crate::access::AccessDetails;
use crate::chain::TxReceipt;
use crate::error::{SettlementError, SettlementResult};
use crate::metadata::{Asset, Service};

pub use executor::{OrderExecutor, OrderRequest};

/// One service of one asset, with its resolved access details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTarget {
    pub did: String,
    pub chain_id: u64,
    pub service: Service,
    pub service_index: u32,
    pub access: AccessDetails,
}

impl OrderTarget {
    pub fn from_asset(asset: &Asset, service_id: &str, access: AccessDetails) -> SettlementResult<Self> {
        let (index, service) = asset
            .services
            .iter()
            .enumerate()
            .find(|(_, service)| service.id == service_id)
            .ok_or_else(|| SettlementError::not_found(format!("service {} of {}", service_id, asset.id)))?;

        Ok(Self {
            did: asset.id.clone(),
            chain_id: asset.chain_id,
            service: service.clone(),
            service_index: index as u32,
            access,
        })
    }

    pub fn datatoken(&self) -> &str {
        &self.access.datatoken.address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    NotOrdered,
    Approved,
    Swapped,
    Dispensed,
    Ordered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOutcome {
    pub receipt: TxReceipt,
    pub transitions: Vec<OrderState>,
}

impl OrderOutcome {
    pub fn tx_hash(&self) -> &str {
        &self.receipt.transaction_hash
    }
}
