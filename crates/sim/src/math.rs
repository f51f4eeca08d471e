//! Fixed-point constants and integer helpers shared by the simulation modules.
//!
//! Every [`Decimal`] is a `U256` scaled by [`WAD`]. Interest compounding runs at
//! the wider [`PRECISE_SCALE`] so that raising a per-second rate to tens of
//! millions of seconds does not drift from the reference figures.

use alloy_primitives::U256;

use crate::decimal::Decimal;
use crate::error::SimError;

/// WAD scale (1e18)
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Internal precision used while compounding interest (1e36)
pub const PRECISE_SCALE: U256 = U256::from_limbs([0xB34B_9F10_0000_0000, 0x00C0_97CE_7BC9_0715, 0, 0]);

/// Seconds per 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Milliseconds per second
pub const MS_PER_SECOND: u64 = 1_000;

/// Computes `a * b / denominator`, rounding half up.
pub fn mul_div_half_up(a: U256, b: U256, denominator: U256) -> Result<U256, SimError> {
    if denominator.is_zero() {
        return Err(SimError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(SimError::DecimalOverflow)?;
    let rounded = product
        .checked_add(denominator / U256::from(2))
        .ok_or(SimError::DecimalOverflow)?;
    Ok(rounded / denominator)
}

/// Returns `10^exp`.
pub fn pow10(exp: u8) -> Result<U256, SimError> {
    let ten = U256::from(10u64);
    let mut result = U256::from(1u64);
    for _ in 0..exp {
        result = result.checked_mul(ten).ok_or(SimError::DecimalOverflow)?;
    }
    Ok(result)
}

/// Raises a `PRECISE_SCALE`-scaled base to an integer power by squaring.
fn precise_pow(base: U256, mut exp: u64) -> Result<U256, SimError> {
    let mut result = PRECISE_SCALE;
    let mut cur = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_div_half_up(result, cur, PRECISE_SCALE)?;
        }
        exp >>= 1;
        if exp > 0 {
            cur = mul_div_half_up(cur, cur, PRECISE_SCALE)?;
        }
    }
    Ok(result)
}

/// Per-second compounding factor `(1 + apr / 100 / SECONDS_PER_YEAR) ^ elapsed`.
///
/// `apr_percent` is a percentage (10% is `Decimal::from(10)`). The factor is
/// computed at 1e36 precision and rounded half up to WAD.
///
/// # Example
///
/// ```rust
/// use lending_rs_sim::{math::compound_factor, Decimal, SECONDS_PER_YEAR};
///
/// let factor = compound_factor(Decimal::from(10), SECONDS_PER_YEAR).unwrap();
/// assert!((factor.to_f64() - 1.105_170_918).abs() < 1e-9);
/// ```
pub fn compound_factor(apr_percent: Decimal, elapsed_seconds: u64) -> Result<Decimal, SimError> {
    let per_second = mul_div_half_up(
        apr_percent.raw(),
        WAD,
        U256::from(100 * SECONDS_PER_YEAR),
    )?;
    let base = PRECISE_SCALE
        .checked_add(per_second)
        .ok_or(SimError::DecimalOverflow)?;
    let factor = precise_pow(base, elapsed_seconds)?;
    Ok(Decimal::from_raw(mul_div_half_up(
        factor,
        U256::from(1u64),
        WAD,
    )?))
}
