//! Error types for the simulation library.

use alloy_primitives::FixedBytes;
use thiserror::Error;

use crate::decimal::Decimal;

/// Type alias for a 32-byte on-chain object ID
pub type ObjectId = FixedBytes<32>;

/// Errors that can occur during simulation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A subtraction would have produced a negative value
    #[error("Decimal underflow: result would be negative")]
    DecimalUnderflow,

    /// A value no longer fits in the 256-bit backing integer
    #[error("Decimal overflow")]
    DecimalOverflow,

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// A string could not be parsed as a decimal number
    #[error("Invalid decimal number: {input:?}")]
    InvalidNumber { input: String },

    /// An obligation references a coin type missing from the supplied reserves
    #[error("Reserve not found for coin type {coin_type}")]
    ReserveNotFound { coin_type: String },

    /// The reserve's config cell is empty
    #[error("Reserve {reserve_id} has no config")]
    MissingConfig { reserve_id: ObjectId },

    /// The utilization/APR breakpoint table is malformed
    #[error("Invalid interest rate curve: {reason}")]
    InvalidInterestRateCurve { reason: String },

    /// Interest accrual was attempted with a timestamp before the last update
    #[error("Invalid interest accrual: timestamp {timestamp} is before last update {last_update}")]
    InvalidInterestAccrual { timestamp: u64, last_update: u64 },

    /// Reward accrual was attempted with a timestamp before the last update
    #[error("Invalid reward accrual: timestamp {timestamp_ms}ms is before last update {last_update_ms}ms")]
    InvalidRewardAccrual {
        timestamp_ms: u64,
        last_update_ms: u64,
    },

    /// A deposit or borrow points at a user reward manager that does not exist
    #[error("User reward manager {index} not found in obligation")]
    UserRewardManagerNotFound { index: u64 },

    /// Rate limiter queried before the start of its current window
    #[error("Invalid rate limiter time: timestamp {timestamp} is before window start {window_start}")]
    InvalidRateLimiterTime { timestamp: u64, window_start: u64 },

    /// Rate limiter configured with an empty window
    #[error("Rate limiter window duration is zero")]
    ZeroRateLimiterWindow,

    /// Outflow would exceed the configured maximum
    #[error("Rate limit exceeded: outflow {outflow} is above max outflow {max_outflow}")]
    RateLimitExceeded { outflow: Decimal, max_outflow: u64 },
}
