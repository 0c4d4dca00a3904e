//! Fixed-point helpers on U256
//!
//! All share and fee math rounds down unless the caller asks for the
//! rounded-up variant explicitly.

use alloy_primitives::U256;

use crate::errors::{Result, VaultError};

/// Basis-point denominator (100%)
pub const PERCENT_DIVISOR: u32 = 10_000;

/// Seconds in a 365-day year, used to annualise interval returns
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// `a * b / d`, rounded down
pub fn mul_div(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(VaultError::MathOverflow);
    }
    let product = a.checked_mul(b).ok_or(VaultError::MathOverflow)?;
    Ok(product / d)
}

/// `a * b / d`, rounded up
pub fn mul_div_up(a: U256, b: U256, d: U256) -> Result<U256> {
    if d.is_zero() {
        return Err(VaultError::MathOverflow);
    }
    let product = a.checked_mul(b).ok_or(VaultError::MathOverflow)?;
    let quotient = product / d;
    if (product % d).is_zero() {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u64))
    }
}

/// `amount * bps / 10_000`, rounded down
pub fn bps_of(amount: U256, bps: u16) -> Result<U256> {
    mul_div(amount, U256::from(bps), U256::from(PERCENT_DIVISOR))
}

/// `amount * bps / 10_000`, rounded up
pub fn bps_of_up(amount: U256, bps: u16) -> Result<U256> {
    mul_div_up(amount, U256::from(bps), U256::from(PERCENT_DIVISOR))
}

/// One whole token at the given precision (10^decimals)
pub fn unit(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Parse a decimal string like "1.25" into base units at `decimals` precision
pub fn parse_units(value: &str, decimals: u8) -> Option<U256> {
    let value = value.trim();
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if frac.len() > decimals as usize {
        return None;
    }
    let whole = if whole.is_empty() { U256::ZERO } else { U256::from_str_radix(whole, 10).ok()? };
    let mut frac_padded = frac.to_string();
    while frac_padded.len() < decimals as usize {
        frac_padded.push('0');
    }
    let frac = if frac_padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac_padded, 10).ok()?
    };
    whole.checked_mul(unit(decimals))?.checked_add(frac)
}

/// Lossy conversion for display and ratio math
pub fn to_f64(amount: U256, decimals: u8) -> f64 {
    let raw: f64 = amount.to_string().parse().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}
