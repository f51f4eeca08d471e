//! Sliding-window outflow rate limiter.
//!
//! The limiter keeps two counters: the quantity that flowed out during the
//! previous window and the quantity in the current window. The current
//! outflow estimate blends them, weighting the previous window by the
//! fraction of it still inside a trailing window ending now:
//!
//! ```text
//! prev_weight = (window_duration - (now - window_start + 1)) / window_duration
//! outflow     = prev_weight * prev_qty + cur_qty
//! remaining   = max(max_outflow - outflow, 0)
//! ```
//!
//! Windows roll forward lazily: every query first advances the window to
//! `now`, so `prev_weight` is never negative.
//!
//! # Example
//!
//! ```rust
//! use lending_rs_sim::{Decimal, RateLimiter, RateLimiterConfig};
//!
//! let limiter = RateLimiter {
//!     config: RateLimiterConfig { window_duration: 3600, max_outflow: 1000 },
//!     prev_qty: Decimal::ZERO,
//!     window_start: 0,
//!     cur_qty: Decimal::from(200),
//! };
//!
//! assert_eq!(limiter.remaining_outflow(1800).unwrap(), Decimal::from(800));
//! ```

use serde::{Deserialize, Serialize};

use crate::decimal::{Decimal, TryAdd, TryDiv, TryMul, TrySub};
use crate::error::SimError;

/// Rate limiter parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Window length in seconds
    pub window_duration: u64,
    /// Maximum blended outflow per window
    pub max_outflow: u64,
}

/// Rate limiter state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimiter {
    pub config: RateLimiterConfig,
    /// Outflow during the previous window
    pub prev_qty: Decimal,
    /// Start of the current window in seconds
    pub window_start: u64,
    /// Outflow during the current window
    pub cur_qty: Decimal,
}

impl RateLimiter {
    /// Creates an empty limiter whose first window starts at `now_s`
    pub fn new(config: RateLimiterConfig, now_s: u64) -> Self {
        Self {
            config,
            prev_qty: Decimal::ZERO,
            window_start: now_s,
            cur_qty: Decimal::ZERO,
        }
    }

    /// Rolls the window forward so that `now_s` falls inside the current window.
    ///
    /// - still inside the current window: unchanged
    /// - inside the next window: current counter becomes the previous one
    /// - any later: both counters reset and the window restarts at `now_s`
    ///
    /// # Errors
    ///
    /// - [`SimError::ZeroRateLimiterWindow`] if the window duration is zero
    /// - [`SimError::InvalidRateLimiterTime`] if `now_s` is before the window start
    pub fn advance_window(&self, now_s: u64) -> Result<RateLimiter, SimError> {
        let duration = self.config.window_duration;
        if duration == 0 {
            return Err(SimError::ZeroRateLimiterWindow);
        }
        if now_s < self.window_start {
            return Err(SimError::InvalidRateLimiterTime {
                timestamp: now_s,
                window_start: self.window_start,
            });
        }

        let elapsed = now_s - self.window_start;
        if elapsed < duration {
            return Ok(self.clone());
        }

        let mut limiter = self.clone();
        if elapsed < duration.saturating_mul(2) {
            limiter.prev_qty = self.cur_qty;
            limiter.window_start = self.window_start + duration;
        } else {
            limiter.prev_qty = Decimal::ZERO;
            limiter.window_start = now_s;
        }
        limiter.cur_qty = Decimal::ZERO;
        Ok(limiter)
    }

    /// Smoothed outflow over the trailing window ending at `now_s`
    pub fn current_outflow(&self, now_s: u64) -> Result<Decimal, SimError> {
        let limiter = self.advance_window(now_s)?;
        limiter.blended_outflow(now_s)
    }

    /// Headroom left under `max_outflow` at `now_s`, floored at zero
    pub fn remaining_outflow(&self, now_s: u64) -> Result<Decimal, SimError> {
        let outflow = self.current_outflow(now_s)?;
        Ok(Decimal::from(self.config.max_outflow).saturating_sub(outflow))
    }

    /// Records an outflow of `qty` at `now_s`.
    ///
    /// # Errors
    ///
    /// - [`SimError::RateLimitExceeded`] if the blended outflow would exceed `max_outflow`
    pub fn process_qty(&self, now_s: u64, qty: Decimal) -> Result<RateLimiter, SimError> {
        let mut limiter = self.advance_window(now_s)?;
        limiter.cur_qty = limiter.cur_qty.try_add(qty)?;

        let outflow = limiter.blended_outflow(now_s)?;
        if outflow > Decimal::from(self.config.max_outflow) {
            return Err(SimError::RateLimitExceeded {
                outflow,
                max_outflow: self.config.max_outflow,
            });
        }
        Ok(limiter)
    }

    /// Assumes the window has already been advanced to `now_s`
    fn blended_outflow(&self, now_s: u64) -> Result<Decimal, SimError> {
        let duration = Decimal::from(self.config.window_duration);
        let position = Decimal::from(now_s - self.window_start + 1);
        let prev_weight = duration.try_sub(position)?.try_div(duration)?;
        prev_weight.try_mul(self.prev_qty)?.try_add(self.cur_qty)
    }
}
