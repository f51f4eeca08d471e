//! Reserve state, interest accrual and valuation helpers.
//!
//! A [`Reserve`] is one asset's lending pool: available liquidity, outstanding
//! borrows, an interest rate curve and oracle prices.
//!
//! # Interest Accrual
//!
//! [`Reserve::compound_interest`] advances the reserve to a new timestamp:
//!
//! 1. `utilization = borrowed / (available + borrowed - unclaimed_spread_fees)`
//! 2. `apr = curve(utilization * 100)` in percent
//! 3. `factor = (1 + apr / 100 / SECONDS_PER_YEAR) ^ elapsed_seconds`
//! 4. `net_new_debt = borrowed * (factor - 1)`, of which `spread_fee_bps`
//!    accrue to the protocol as unclaimed spread fees
//! 5. `cumulative_borrow_rate *= factor`
//!
//! Both reward managers are then advanced to the same instant.
//!
//! # Price Bounds
//!
//! Collateral is valued at `min(price, smoothed_price)` and debt at
//! `max(price, smoothed_price)` when computing borrow limits, so a price spike
//! in either direction can only make an obligation look riskier.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::curve::{interpolate_apr_percent, validate_curve};
use crate::decimal::{Decimal, TryAdd, TryDiv, TryMul, TrySub};
use crate::error::{ObjectId, SimError};
use crate::math::{compound_factor, pow10, MS_PER_SECOND, WAD};
use crate::rewards::PoolRewardManager;

/// Risk and fee parameters of a reserve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReserveConfig {
    pub open_ltv_pct: u8,
    pub close_ltv_pct: u8,
    pub max_close_ltv_pct: u8,
    pub borrow_weight_bps: u64,
    pub deposit_limit: u64,
    pub borrow_limit: u64,
    pub liquidation_bonus_bps: u64,
    pub max_liquidation_bonus_bps: u64,
    pub deposit_limit_usd: u64,
    pub borrow_limit_usd: u64,
    pub borrow_fee_bps: u64,
    pub spread_fee_bps: u64,
    pub protocol_liquidation_fee_bps: u64,
    /// Utilization breakpoints in percent, strictly increasing
    pub interest_rate_utils: Vec<u8>,
    /// APR at each breakpoint in basis points
    pub interest_rate_aprs: Vec<u64>,
    pub isolated: bool,
}

impl ReserveConfig {
    /// Validates the interest rate curve
    pub fn validate(&self) -> Result<(), SimError> {
        validate_curve(&self.interest_rate_utils, &self.interest_rate_aprs)
    }

    /// Borrow APR in percent at the given utilization (a fraction, 0.5 = 50%)
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidInterestRateCurve`] if the curve tables are malformed
    pub fn borrow_apr_percent(&self, utilization: Decimal) -> Result<Decimal, SimError> {
        self.validate()?;
        interpolate_apr_percent(
            &self.interest_rate_utils,
            &self.interest_rate_aprs,
            utilization.try_mul(100u64)?,
        )
    }
}

/// Lending pool state for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reserve {
    pub id: ObjectId,
    pub array_index: u64,
    pub coin_type: String,
    pub mint_decimals: u8,

    /// Spot oracle price in USD per whole token
    pub price: Decimal,
    /// Exponential moving average of the oracle price
    pub smoothed_price: Decimal,
    pub price_last_update_timestamp_s: u64,

    /// Liquidity held by the reserve (raw token units)
    pub available_amount: u64,
    /// Outstanding cTokens
    pub ctoken_supply: u64,
    /// Outstanding debt including accrued interest (raw token units)
    pub borrowed_amount: Decimal,
    /// Product of all compounding factors since the reserve was created
    pub cumulative_borrow_rate: Decimal,
    /// Protocol share of accrued interest not yet claimed
    pub unclaimed_spread_fees: Decimal,
    pub interest_last_update_timestamp_s: u64,

    /// Config cell; `None` when the decoded cell was empty
    pub config: Option<ReserveConfig>,

    pub deposits_pool_reward_manager: PoolRewardManager,
    pub borrows_pool_reward_manager: PoolRewardManager,
}

impl Reserve {
    /// Returns the reserve config
    ///
    /// # Errors
    ///
    /// - [`SimError::MissingConfig`] if the config cell is empty
    pub fn config(&self) -> Result<&ReserveConfig, SimError> {
        self.config
            .as_ref()
            .ok_or(SimError::MissingConfig { reserve_id: self.id })
    }

    /// Total liquidity owed to cToken holders: `available + borrowed - unclaimed_spread_fees`
    pub fn total_supply(&self) -> Result<Decimal, SimError> {
        Decimal::from(self.available_amount)
            .try_add(self.borrowed_amount)?
            .try_sub(self.unclaimed_spread_fees)
    }

    /// Utilization as a fraction (0.5 = 50%). Zero for an empty reserve.
    pub fn utilization(&self) -> Result<Decimal, SimError> {
        let total_supply = self.total_supply()?;
        if total_supply.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.borrowed_amount.try_div(total_supply)
    }

    /// Utilization in percent (50 = 50%)
    pub fn utilization_percent(&self) -> Result<Decimal, SimError> {
        self.utilization()?.try_mul(100u64)
    }

    /// Current borrow APR in percent
    pub fn borrow_apr_percent(&self) -> Result<Decimal, SimError> {
        self.config()?.borrow_apr_percent(self.utilization()?)
    }

    /// Current deposit APR in percent: `borrow_apr * utilization * (1 - spread_fee)`
    pub fn deposit_apr_percent(&self) -> Result<Decimal, SimError> {
        let config = self.config()?;
        let utilization = self.utilization()?;
        let spread_fee = Decimal::from_bps(config.spread_fee_bps);
        config
            .borrow_apr_percent(utilization)?
            .try_mul(utilization)?
            .try_mul(Decimal::ONE.try_sub(spread_fee)?)
    }

    /// Liquidity per cToken. One when no cTokens exist.
    pub fn ctoken_ratio(&self) -> Result<Decimal, SimError> {
        if self.ctoken_supply == 0 {
            return Ok(Decimal::ONE);
        }
        self.total_supply()?.try_div(self.ctoken_supply)
    }

    /// Underlying liquidity redeemable for `ctoken_amount`
    pub fn ctoken_to_liquidity(&self, ctoken_amount: u64) -> Result<Decimal, SimError> {
        Decimal::from(ctoken_amount).try_mul(self.ctoken_ratio()?)
    }

    /// `min(price, smoothed_price)`
    pub fn price_lower_bound(&self) -> Decimal {
        self.price.min(self.smoothed_price)
    }

    /// `max(price, smoothed_price)`
    pub fn price_upper_bound(&self) -> Decimal {
        self.price.max(self.smoothed_price)
    }

    /// Borrow weight as a multiplier (10_000 bps = 1.0)
    pub fn borrow_weight(&self) -> Result<Decimal, SimError> {
        Ok(Decimal::from_bps(self.config()?.borrow_weight_bps))
    }

    /// USD value of `liquidity_amount` raw token units at the spot price
    pub fn market_value(&self, liquidity_amount: Decimal) -> Result<Decimal, SimError> {
        self.value_at(self.price, liquidity_amount)
    }

    /// USD value of `liquidity_amount` at `min(price, smoothed_price)`
    pub fn market_value_lower_bound(&self, liquidity_amount: Decimal) -> Result<Decimal, SimError> {
        self.value_at(self.price_lower_bound(), liquidity_amount)
    }

    /// USD value of `liquidity_amount` at `max(price, smoothed_price)`
    pub fn market_value_upper_bound(&self, liquidity_amount: Decimal) -> Result<Decimal, SimError> {
        self.value_at(self.price_upper_bound(), liquidity_amount)
    }

    fn value_at(&self, price: Decimal, liquidity_amount: Decimal) -> Result<Decimal, SimError> {
        let scale = pow10(self.mint_decimals)?
            .checked_mul(WAD)
            .ok_or(SimError::DecimalOverflow)?;
        price
            .try_mul(liquidity_amount)?
            .try_div(Decimal::from_raw(scale))
    }

    /// Compounds borrow interest and spread fees up to `now_s`.
    ///
    /// Returns an identical copy when `now_s` equals the last update. Otherwise
    /// the reserve's deposit and borrow reward managers are also advanced to
    /// `now_s * 1000`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidInterestAccrual`] if `now_s` is before the last update
    /// - [`SimError::MissingConfig`] if the config cell is empty
    /// - [`SimError::InvalidInterestRateCurve`] if the config's curve is malformed
    /// - [`SimError::InvalidRewardAccrual`] if a reward manager is ahead of `now_s`
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let compounded = reserve.compound_interest(now_s)?;
    /// assert!(compounded.cumulative_borrow_rate >= reserve.cumulative_borrow_rate);
    /// ```
    pub fn compound_interest(&self, now_s: u64) -> Result<Reserve, SimError> {
        if now_s < self.interest_last_update_timestamp_s {
            return Err(SimError::InvalidInterestAccrual {
                timestamp: now_s,
                last_update: self.interest_last_update_timestamp_s,
            });
        }
        if now_s == self.interest_last_update_timestamp_s {
            return Ok(self.clone());
        }

        let elapsed = now_s - self.interest_last_update_timestamp_s;
        let config = self.config()?;
        let utilization = self.utilization()?;
        let apr_percent = config.borrow_apr_percent(utilization)?;
        let factor = compound_factor(apr_percent, elapsed)?;

        let net_new_debt = self.borrowed_amount.try_mul(factor.try_sub(Decimal::ONE)?)?;
        let spread_fee = net_new_debt.try_mul(Decimal::from_bps(config.spread_fee_bps))?;

        debug!(
            coin_type = %self.coin_type,
            elapsed,
            utilization = %utilization,
            apr_percent = %apr_percent,
            net_new_debt = %net_new_debt,
            "compounded reserve interest"
        );

        let now_ms = now_s
            .checked_mul(MS_PER_SECOND)
            .ok_or(SimError::DecimalOverflow)?;

        Ok(Reserve {
            borrowed_amount: self.borrowed_amount.try_add(net_new_debt)?,
            cumulative_borrow_rate: self.cumulative_borrow_rate.try_mul(factor)?,
            unclaimed_spread_fees: self.unclaimed_spread_fees.try_add(spread_fee)?,
            interest_last_update_timestamp_s: now_s,
            deposits_pool_reward_manager: self.deposits_pool_reward_manager.update(now_ms)?,
            borrows_pool_reward_manager: self.borrows_pool_reward_manager.update(now_ms)?,
            ..self.clone()
        })
    }
}
