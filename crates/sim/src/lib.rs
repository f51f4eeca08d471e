//! Lending Protocol Simulation SDK
//!
//! This crate recomputes lending protocol state off-chain, between on-chain
//! refreshes, using the same fixed-point math as the protocol.
//!
//! # Overview
//!
//! The simulation SDK allows you to:
//! - Compound a reserve's borrow interest and spread fees to any timestamp
//! - Interpolate borrow APRs from a piecewise-linear utilization curve
//! - Unlock pool reward streams and sync users' earned rewards
//! - Value obligations with conservative (collateral low, debt high) prices
//! - Estimate remaining outflow under a sliding-window rate limiter
//! - Scan batches of obligations for liquidation candidates
//!
//! Every operation is a pure transform: inputs are borrowed, and updated
//! records are returned as new values.
//!
//! # Example
//!
//! ```rust,ignore
//! use lending_rs_sim::scan::{compound_reserves, liquidation_candidates, refresh_obligations};
//!
//! // Reserves and obligations decoded from chain state
//! let reserves = compound_reserves(&reserves, now_s)?;
//! let reports = refresh_obligations(&obligations, &reserves);
//!
//! for id in liquidation_candidates(&reports) {
//!     tracing::info!(%id, "liquidatable");
//! }
//! ```

pub mod curve;
pub mod decimal;
pub mod error;
pub mod math;
pub mod obligation;
pub mod rate_limiter;
pub mod reserve;
pub mod rewards;
pub mod scan;

// Re-export commonly used types
pub use error::{ObjectId, SimError};

// Decimal exports
pub use decimal::{Decimal, TryAdd, TryDiv, TryMul, TrySub};

// Math exports
pub use math::{MS_PER_SECOND, PRECISE_SCALE, SECONDS_PER_YEAR, WAD};

// Reserve exports
pub use curve::{interpolate_apr_percent, validate_curve};
pub use reserve::{Reserve, ReserveConfig};

// Reward exports
pub use rewards::{PoolReward, PoolRewardManager, UserReward, UserRewardManager};

// Obligation exports
pub use obligation::{Borrow, Deposit, Obligation};

// Rate limiter exports
pub use rate_limiter::{RateLimiter, RateLimiterConfig};

// Batch exports
pub use scan::{compound_reserves, liquidation_candidates, refresh_obligations, ObligationReport};
