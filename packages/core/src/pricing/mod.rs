//! Order pricing

pub mod calculator;
pub mod units;

pub use calculator::{total_price, OrderPriceAndFees, OrderPriceCalculator};
pub use units::{from_base_units, to_base_units};
