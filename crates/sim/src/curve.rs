//! Piecewise-linear interest rate curve.
//!
//! A reserve's borrow APR is defined by two parallel tables: utilization
//! breakpoints in integer percent and APRs in basis points. Between two
//! breakpoints the APR is interpolated linearly:
//!
//! ```text
//! apr_bps = aprs[i-1] + (util - utils[i-1]) / (utils[i] - utils[i-1]) * (aprs[i] - aprs[i-1])
//! apr_pct = apr_bps / 100
//! ```
//!
//! # Example
//!
//! ```rust
//! use lending_rs_sim::{curve::interpolate_apr_percent, Decimal};
//!
//! let apr = interpolate_apr_percent(&[0, 50, 100], &[0, 800, 5000], Decimal::from(50)).unwrap();
//! assert_eq!(apr, Decimal::from(8));
//! ```

use tracing::warn;

use crate::decimal::{Decimal, TryAdd, TryDiv, TryMul, TrySub};
use crate::error::SimError;

/// Checks that a utilization/APR table is usable for interpolation.
pub fn validate_curve(utils: &[u8], aprs: &[u64]) -> Result<(), SimError> {
    if utils.len() != aprs.len() {
        return Err(SimError::InvalidInterestRateCurve {
            reason: format!(
                "{} utilization points but {} apr points",
                utils.len(),
                aprs.len()
            ),
        });
    }
    if utils.len() < 2 {
        return Err(SimError::InvalidInterestRateCurve {
            reason: "at least two breakpoints are required".to_string(),
        });
    }
    if let Some(pair) = utils.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(SimError::InvalidInterestRateCurve {
            reason: format!(
                "utilization points must be strictly increasing ({} >= {})",
                pair[0], pair[1]
            ),
        });
    }
    if utils.iter().any(|util| *util > 100) {
        return Err(SimError::InvalidInterestRateCurve {
            reason: "utilization points must be within 0..=100".to_string(),
        });
    }
    Ok(())
}

/// Interpolates the APR (in percent) at `current_util_percent`.
///
/// Returns zero when the utilization falls outside the table, matching the
/// on-chain lookup which only scans interior segments.
pub fn interpolate_apr_percent(
    utils: &[u8],
    aprs: &[u64],
    current_util_percent: Decimal,
) -> Result<Decimal, SimError> {
    for i in 1..utils.len().min(aprs.len()) {
        let left_util = Decimal::from(u64::from(utils[i - 1]));
        let right_util = Decimal::from(u64::from(utils[i]));
        if current_util_percent < left_util || current_util_percent > right_util {
            continue;
        }

        let left_apr = Decimal::from(aprs[i - 1]);
        let right_apr = Decimal::from(aprs[i]);
        let weight = current_util_percent
            .try_sub(left_util)?
            .try_div(right_util.try_sub(left_util)?)?;

        let apr_bps = if right_apr >= left_apr {
            left_apr.try_add(weight.try_mul(right_apr.try_sub(left_apr)?)?)?
        } else {
            left_apr.try_sub(weight.try_mul(left_apr.try_sub(right_apr)?)?)?
        };

        return apr_bps.try_div(100u64);
    }

    warn!(
        utilization_percent = %current_util_percent,
        "utilization outside interest rate curve, using zero apr"
    );
    Ok(Decimal::ZERO)
}
