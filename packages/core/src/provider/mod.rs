//! Provider access
//!
//! HTTP client for the provider service, the optional SSI gate and the
//! fee negotiator that combines them.

pub mod client;
pub mod negotiator;
pub mod ssi;
pub mod types;

pub use client::{HttpProviderClient, ProviderClient};
pub use negotiator::ProviderFeeNegotiator;
pub use ssi::{HttpSsiVerifier, SsiVerifier};
pub use types::*;
