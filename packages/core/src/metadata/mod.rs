//! Metadata cache access
//!
//! Asset documents (DDOs), free-form search and DID name lookups.

pub mod client;
pub mod types;

pub use client::{HttpMetadataCache, MetadataCache};
pub use types::{Asset, PriceStat, Service, ServiceStats};
