//! Conversion between human token amounts and base units.

use rust_decimal::Decimal;

use crate::error::{SettlementError, SettlementResult};

fn scale(decimals: u8) -> SettlementResult<Decimal> {
    if decimals > 28 {
        return Err(SettlementError::invalid_amount(format!(
            "{} decimals exceed decimal precision",
            decimals
        )));
    }
    Ok(Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0))
}

/// `amount * 10^decimals`, truncated to whole base units.
pub fn to_base_units(amount: Decimal, decimals: u8) -> SettlementResult<u128> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SettlementError::invalid_amount(format!("negative amount {}", amount)));
    }
    let scaled = amount
        .checked_mul(scale(decimals)?)
        .ok_or_else(|| SettlementError::invalid_amount(format!("{} overflows at {} decimals", amount, decimals)))?;

    let units = scaled.trunc();
    let mantissa = units.mantissa();
    let factor = 10i128.pow(units.scale());
    u128::try_from(mantissa / factor)
        .map_err(|_| SettlementError::invalid_amount(format!("{} is out of range", amount)))
}

/// `units / 10^decimals`.
pub fn from_base_units(units: u128, decimals: u8) -> SettlementResult<Decimal> {
    let mantissa = i128::try_from(units)
        .map_err(|_| SettlementError::invalid_amount(format!("{} units out of range", units)))?;
    if decimals > 28 {
        return Err(SettlementError::invalid_amount(format!(
            "{} decimals exceed decimal precision",
            decimals
        )));
    }
    Decimal::try_from_i128_with_scale(mantissa, decimals as u32)
        .map(|amount| amount.normalize())
        .map_err(|err| SettlementError::invalid_amount(format!("{} units: {}", units, err)))
}
