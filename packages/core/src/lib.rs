// Library root: the settlement flow used by the binary and by the
// integration tests in `tests/`.

pub mod access;
pub mod allowance;
pub mod cache;
pub mod chain;
pub mod compute;
pub mod config;
pub mod error;
pub mod escrow;
pub mod metadata;
pub mod metrics;
pub mod networks;
pub mod notify;
pub mod order;
pub mod pricing;
pub mod provider;
pub mod settlement;

// Binary-only plumbing.
pub mod cli;
pub mod logging;

pub use error::{SettlementError, SettlementResult};
pub use settlement::{AssetRef, ComputeOrders, SettlementService};
