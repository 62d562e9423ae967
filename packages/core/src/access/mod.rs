//! Access-details resolution

pub mod resolver;
pub mod types;

pub use resolver::{resolve_access_details, resolve_asset_access, resolve_many};
pub use types::{AccessDetails, PricingType, TemplateId, TokenInfo};
