//! WAD-scaled, non-negative fixed-point decimal.
//!
//! [`Decimal`] wraps a `U256` holding `value * 10^18`. Every operation is
//! checked: subtraction below zero returns [`SimError::DecimalUnderflow`],
//! overflowing the backing integer returns [`SimError::DecimalOverflow`].
//! Multiplication and division re-normalize by `10^18` rounding half up, which
//! is the only rounding mode the engine uses for arithmetic.
//!
//! # Example
//!
//! ```rust
//! use lending_rs_sim::{Decimal, TryAdd, TryDiv, TryMul, TrySub};
//!
//! let a: Decimal = "1.5".parse().unwrap();
//! let b = Decimal::from(2);
//!
//! assert_eq!(a.try_mul(b).unwrap(), Decimal::from(3));
//! assert_eq!(b.try_div(Decimal::from(4)).unwrap().to_string(), "0.5");
//! assert!(a.try_sub(b).is_err());
//! assert_eq!(a.try_add(b).unwrap().to_string(), "3.5");
//! ```

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::math::{mul_div_half_up, WAD};

/// Number of fractional digits carried by a [`Decimal`]
pub const DECIMAL_PLACES: usize = 18;

/// Checked addition
pub trait TryAdd<RHS = Self>: Sized {
    fn try_add(self, rhs: RHS) -> Result<Self, SimError>;
}

/// Checked subtraction
pub trait TrySub<RHS = Self>: Sized {
    fn try_sub(self, rhs: RHS) -> Result<Self, SimError>;
}

/// Checked multiplication
pub trait TryMul<RHS = Self>: Sized {
    fn try_mul(self, rhs: RHS) -> Result<Self, SimError>;
}

/// Checked division
pub trait TryDiv<RHS = Self>: Sized {
    fn try_div(self, rhs: RHS) -> Result<Self, SimError>;
}

/// Non-negative fixed-point number scaled by 1e18.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(U256);

impl Decimal {
    /// Zero
    pub const ZERO: Self = Self(U256::ZERO);

    /// One (`10^18` raw)
    pub const ONE: Self = Self(WAD);

    /// Wraps an already WAD-scaled integer
    pub const fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// The WAD-scaled backing integer
    pub const fn raw(self) -> U256 {
        self.0
    }

    /// `percent / 100`, e.g. `from_percent(80)` is `0.8`
    pub fn from_percent(percent: u64) -> Self {
        Self(U256::from(percent) * U256::from(10_000_000_000_000_000u64))
    }

    /// `bps / 10_000`, e.g. `from_bps(250)` is `0.025`
    pub fn from_bps(bps: u64) -> Self {
        Self(U256::from(bps) * U256::from(100_000_000_000_000u64))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Subtraction floored at zero
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Truncates to a whole number of units
    pub fn floor_to_u64(self) -> Result<u64, SimError> {
        to_u64(self.0 / WAD)
    }

    /// Lossy conversion for display and approximate comparisons
    pub fn to_f64(self) -> f64 {
        let integer = (self.0 / WAD).saturating_to::<u128>() as f64;
        let fraction = (self.0 % WAD).saturating_to::<u64>() as f64 / 1e18;
        integer + fraction
    }
}

fn to_u64(value: U256) -> Result<u64, SimError> {
    if value > U256::from(u64::MAX) {
        return Err(SimError::DecimalOverflow);
    }
    Ok(value.saturating_to::<u64>())
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self(U256::from(value) * WAD)
    }
}

impl TryAdd for Decimal {
    fn try_add(self, rhs: Self) -> Result<Self, SimError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(SimError::DecimalOverflow)
    }
}

impl TrySub for Decimal {
    fn try_sub(self, rhs: Self) -> Result<Self, SimError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(SimError::DecimalUnderflow)
    }
}

impl TryMul for Decimal {
    fn try_mul(self, rhs: Self) -> Result<Self, SimError> {
        mul_div_half_up(self.0, rhs.0, WAD).map(Self)
    }
}

impl TryMul<u64> for Decimal {
    fn try_mul(self, rhs: u64) -> Result<Self, SimError> {
        self.0
            .checked_mul(U256::from(rhs))
            .map(Self)
            .ok_or(SimError::DecimalOverflow)
    }
}

impl TryDiv for Decimal {
    fn try_div(self, rhs: Self) -> Result<Self, SimError> {
        mul_div_half_up(self.0, WAD, rhs.0).map(Self)
    }
}

impl TryDiv<u64> for Decimal {
    fn try_div(self, rhs: u64) -> Result<Self, SimError> {
        mul_div_half_up(self.0, U256::from(1u64), U256::from(rhs)).map(Self)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let integer = self.0 / WAD;
        let fraction = (self.0 % WAD).saturating_to::<u64>();
        if fraction == 0 {
            return write!(f, "{integer}");
        }
        let digits = format!("{fraction:018}");
        write!(f, "{integer}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}

impl FromStr for Decimal {
    type Err = SimError;

    /// Parses a plain decimal string, rounding half up past 18 fractional digits.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || SimError::InvalidNumber {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let (integer_part, fraction_part) = match trimmed.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (trimmed, ""),
        };
        if integer_part.is_empty() && fraction_part.is_empty() {
            return Err(invalid());
        }
        if !integer_part.bytes().all(|b| b.is_ascii_digit())
            || !fraction_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let ten = U256::from(10u64);
        let mut raw = U256::ZERO;
        for digit in integer_part.bytes() {
            raw = raw
                .checked_mul(ten)
                .and_then(|v| v.checked_add(U256::from(u64::from(digit - b'0'))))
                .ok_or(SimError::DecimalOverflow)?;
        }
        raw = raw.checked_mul(WAD).ok_or(SimError::DecimalOverflow)?;

        let mut fraction = U256::ZERO;
        let fraction_digits = fraction_part.as_bytes();
        for place in 0..DECIMAL_PLACES {
            let digit = fraction_digits.get(place).map_or(0, |b| b - b'0');
            fraction = fraction * ten + U256::from(u64::from(digit));
        }
        if fraction_digits
            .get(DECIMAL_PLACES)
            .is_some_and(|b| *b >= b'5')
        {
            fraction += U256::from(1u64);
        }

        raw.checked_add(fraction)
            .map(Self)
            .ok_or(SimError::DecimalOverflow)
    }
}
