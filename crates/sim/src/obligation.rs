//! Obligation valuation and health checks.
//!
//! An [`Obligation`] is one borrower's aggregated position across reserves.
//! [`Obligation::refresh`] recomputes its USD aggregates from a set of
//! compounded reserves:
//!
//! | Aggregate | Source |
//! |-----------|--------|
//! | `deposited_value_usd` | Σ deposit value at spot price |
//! | `allowed_borrow_value_usd` | Σ deposit value at `min(price, smoothed)` × open LTV |
//! | `unhealthy_borrow_value_usd` | Σ deposit value at spot price × close LTV |
//! | `unweighted_borrowed_value_usd` | Σ debt value at spot price |
//! | `weighted_borrowed_value_usd` | Σ debt value at spot price × borrow weight |
//! | `weighted_borrowed_value_upper_bound_usd` | Σ debt value at `max(price, smoothed)` × borrow weight |
//!
//! Collateral is valued low and debt high for borrow limits, so every health
//! figure errs toward overstating risk.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::{Decimal, TryAdd, TryDiv, TryMul};
use crate::error::{ObjectId, SimError};
use crate::reserve::Reserve;
use crate::rewards::{PoolRewardManager, UserRewardManager};

/// Collateral deposited into an obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub coin_type: String,
    pub reserve_array_index: u64,
    pub deposited_ctoken_amount: u64,
    pub market_value: Decimal,
    pub user_reward_manager_index: u64,
    pub attributed_borrow_value: Decimal,
}

/// Debt owed by an obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrow {
    pub coin_type: String,
    pub reserve_array_index: u64,
    /// Debt in raw token units, including interest up to the last snapshot
    pub borrowed_amount: Decimal,
    /// Reserve cumulative borrow rate at the last snapshot
    pub cumulative_borrow_rate: Decimal,
    pub market_value: Decimal,
    pub user_reward_manager_index: u64,
}

/// A borrower's position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: ObjectId,
    pub deposits: Vec<Deposit>,
    pub borrows: Vec<Borrow>,
    pub user_reward_managers: Vec<UserRewardManager>,

    pub deposited_value_usd: Decimal,
    pub allowed_borrow_value_usd: Decimal,
    pub unhealthy_borrow_value_usd: Decimal,
    pub super_unhealthy_borrow_value_usd: Decimal,
    pub unweighted_borrowed_value_usd: Decimal,
    pub weighted_borrowed_value_usd: Decimal,
    pub weighted_borrowed_value_upper_bound_usd: Decimal,

    pub borrowing_isolated_asset: bool,
    pub bad_debt_usd: Decimal,
    pub closable: bool,
}

/// Running totals accumulated during a refresh
#[derive(Debug, Default)]
struct Totals {
    deposited_value_usd: Decimal,
    allowed_borrow_value_usd: Decimal,
    unhealthy_borrow_value_usd: Decimal,
    unweighted_borrowed_value_usd: Decimal,
    weighted_borrowed_value_usd: Decimal,
    weighted_borrowed_value_upper_bound_usd: Decimal,
    borrowing_isolated_asset: bool,
}

impl Obligation {
    /// Recomputes deposit and borrow values against `reserves`.
    ///
    /// `reserves` is keyed by coin type and should already be compounded to
    /// the valuation time. Each position's user reward manager is synced
    /// against the matching pool reward manager at that manager's last update
    /// time. `bad_debt_usd`, `closable` and `super_unhealthy_borrow_value_usd`
    /// are carried over unchanged.
    ///
    /// # Errors
    ///
    /// - [`SimError::ReserveNotFound`] if a position's coin type is missing
    /// - [`SimError::UserRewardManagerNotFound`] if a reward manager index is out of range
    /// - [`SimError::MissingConfig`] if a referenced reserve has no config
    pub fn refresh(&self, reserves: &HashMap<String, Reserve>) -> Result<Obligation, SimError> {
        let mut obligation = self.clone();
        let mut totals = Totals::default();

        for deposit in &mut obligation.deposits {
            let reserve = find_reserve(reserves, &deposit.coin_type)?;
            let config = reserve.config()?;

            sync_user_rewards(
                &mut obligation.user_reward_managers,
                deposit.user_reward_manager_index,
                &reserve.deposits_pool_reward_manager,
            )?;

            let liquidity = reserve.ctoken_to_liquidity(deposit.deposited_ctoken_amount)?;
            let market_value = reserve.market_value(liquidity)?;
            let market_value_lower_bound = reserve.market_value_lower_bound(liquidity)?;

            totals.deposited_value_usd = totals.deposited_value_usd.try_add(market_value)?;
            totals.allowed_borrow_value_usd = totals.allowed_borrow_value_usd.try_add(
                market_value_lower_bound.try_mul(Decimal::from_percent(u64::from(config.open_ltv_pct)))?,
            )?;
            totals.unhealthy_borrow_value_usd = totals.unhealthy_borrow_value_usd.try_add(
                market_value.try_mul(Decimal::from_percent(u64::from(config.close_ltv_pct)))?,
            )?;

            deposit.market_value = market_value;
        }

        for borrow in &mut obligation.borrows {
            let reserve = find_reserve(reserves, &borrow.coin_type)?;
            let config = reserve.config()?;

            sync_user_rewards(
                &mut obligation.user_reward_managers,
                borrow.user_reward_manager_index,
                &reserve.borrows_pool_reward_manager,
            )?;

            let interest_index = reserve
                .cumulative_borrow_rate
                .try_div(borrow.cumulative_borrow_rate)?;
            borrow.borrowed_amount = borrow.borrowed_amount.try_mul(interest_index)?;
            borrow.cumulative_borrow_rate = reserve.cumulative_borrow_rate;

            let market_value = reserve.market_value(borrow.borrowed_amount)?;
            let market_value_upper_bound = reserve.market_value_upper_bound(borrow.borrowed_amount)?;
            let borrow_weight = reserve.borrow_weight()?;

            totals.unweighted_borrowed_value_usd =
                totals.unweighted_borrowed_value_usd.try_add(market_value)?;
            totals.weighted_borrowed_value_usd = totals
                .weighted_borrowed_value_usd
                .try_add(market_value.try_mul(borrow_weight)?)?;
            totals.weighted_borrowed_value_upper_bound_usd = totals
                .weighted_borrowed_value_upper_bound_usd
                .try_add(market_value_upper_bound.try_mul(borrow_weight)?)?;
            totals.borrowing_isolated_asset |= config.isolated;

            borrow.market_value = market_value;
        }

        debug!(
            obligation_id = %self.id,
            deposits = obligation.deposits.len(),
            borrows = obligation.borrows.len(),
            deposited_value_usd = %totals.deposited_value_usd,
            weighted_borrowed_value_usd = %totals.weighted_borrowed_value_usd,
            "refreshed obligation"
        );

        obligation.deposited_value_usd = totals.deposited_value_usd;
        obligation.allowed_borrow_value_usd = totals.allowed_borrow_value_usd;
        obligation.unhealthy_borrow_value_usd = totals.unhealthy_borrow_value_usd;
        obligation.unweighted_borrowed_value_usd = totals.unweighted_borrowed_value_usd;
        obligation.weighted_borrowed_value_usd = totals.weighted_borrowed_value_usd;
        obligation.weighted_borrowed_value_upper_bound_usd =
            totals.weighted_borrowed_value_upper_bound_usd;
        obligation.borrowing_isolated_asset = totals.borrowing_isolated_asset;

        Ok(obligation)
    }

    /// Debt (at the upper-bound price) is within the borrow limit
    pub fn is_healthy(&self) -> bool {
        self.weighted_borrowed_value_upper_bound_usd <= self.allowed_borrow_value_usd
    }

    /// Debt exceeds the liquidation threshold
    pub fn is_liquidatable(&self) -> bool {
        self.weighted_borrowed_value_usd > self.unhealthy_borrow_value_usd
    }

    /// Debt remains with no collateral left to seize
    pub fn is_forgivable(&self) -> bool {
        self.deposits.is_empty() && !self.borrows.is_empty()
    }

    /// Additional weighted USD value that may still be borrowed
    pub fn remaining_borrow_value_usd(&self) -> Decimal {
        self.allowed_borrow_value_usd
            .saturating_sub(self.weighted_borrowed_value_upper_bound_usd)
    }

    /// Fraction of the borrow limit in use. `None` when nothing may be borrowed.
    pub fn borrow_limit_usage(&self) -> Result<Option<Decimal>, SimError> {
        if self.allowed_borrow_value_usd.is_zero() {
            return Ok(None);
        }
        self.weighted_borrowed_value_upper_bound_usd
            .try_div(self.allowed_borrow_value_usd)
            .map(Some)
    }
}

fn find_reserve<'a>(
    reserves: &'a HashMap<String, Reserve>,
    coin_type: &str,
) -> Result<&'a Reserve, SimError> {
    reserves.get(coin_type).ok_or_else(|| SimError::ReserveNotFound {
        coin_type: coin_type.to_string(),
    })
}

fn sync_user_rewards(
    managers: &mut [UserRewardManager],
    index: u64,
    pool: &PoolRewardManager,
) -> Result<(), SimError> {
    let manager = usize::try_from(index)
        .ok()
        .and_then(|i| managers.get_mut(i))
        .ok_or(SimError::UserRewardManagerNotFound { index })?;
    *manager = manager.sync(pool, pool.last_update_time_ms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserve::tests::create_test_reserve;
    use crate::reserve::ReserveConfig;
    use crate::rewards::PoolReward;
    use alloy_primitives::FixedBytes;

    const SUI: &str = "0x2::sui::SUI";
    const USDC: &str = "0xdba3::usdc::USDC";

    /// SUI at $2 (9 decimals) as collateral, USDC at $1 (6 decimals) as debt
    fn create_test_reserves() -> HashMap<String, Reserve> {
        let sui = create_test_reserve();

        let mut usdc = create_test_reserve();
        usdc.id = FixedBytes::with_last_byte(8);
        usdc.array_index = 1;
        usdc.coin_type = USDC.to_string();
        usdc.mint_decimals = 6;
        usdc.price = Decimal::from(1);
        usdc.smoothed_price = Decimal::from(1);
        usdc.cumulative_borrow_rate = "1.1".parse().unwrap();
        usdc.config = Some(ReserveConfig {
            borrow_weight_bps: 15_000,
            ..crate::reserve::tests::create_test_config()
        });

        HashMap::from([(SUI.to_string(), sui), (USDC.to_string(), usdc)])
    }

    /// 100 SUI deposited, 50 USDC borrowed at cumulative rate 1.0
    fn create_test_obligation() -> Obligation {
        Obligation {
            id: FixedBytes::with_last_byte(42),
            deposits: vec![Deposit {
                coin_type: SUI.to_string(),
                reserve_array_index: 0,
                deposited_ctoken_amount: 100_000_000_000,
                market_value: Decimal::ZERO,
                user_reward_manager_index: 0,
                attributed_borrow_value: Decimal::ZERO,
            }],
            borrows: vec![Borrow {
                coin_type: USDC.to_string(),
                reserve_array_index: 1,
                borrowed_amount: Decimal::from(50_000_000),
                cumulative_borrow_rate: Decimal::ONE,
                market_value: Decimal::ZERO,
                user_reward_manager_index: 1,
            }],
            user_reward_managers: vec![UserRewardManager::default(), UserRewardManager::default()],
            ..Obligation::default()
        }
    }

    #[test]
    fn test_refresh_aggregates() {
        let reserves = create_test_reserves();
        let obligation = create_test_obligation().refresh(&reserves).unwrap();

        // 100 SUI * $2
        assert_eq!(obligation.deposited_value_usd, Decimal::from(200));
        assert_eq!(obligation.deposits[0].market_value, Decimal::from(200));
        // 50% open LTV, 80% close LTV
        assert_eq!(obligation.allowed_borrow_value_usd, Decimal::from(100));
        assert_eq!(obligation.unhealthy_borrow_value_usd, Decimal::from(160));

        // 50 USDC compounded by 1.1 -> 55 USDC
        assert_eq!(obligation.borrows[0].borrowed_amount, Decimal::from(55_000_000));
        assert_eq!(obligation.borrows[0].cumulative_borrow_rate, "1.1".parse().unwrap());
        assert_eq!(obligation.unweighted_borrowed_value_usd, Decimal::from(55));
        // 1.5x borrow weight
        assert_eq!(obligation.weighted_borrowed_value_usd, "82.5".parse().unwrap());
        assert_eq!(
            obligation.weighted_borrowed_value_upper_bound_usd,
            "82.5".parse().unwrap()
        );

        assert!(obligation.is_healthy());
        assert!(!obligation.is_liquidatable());
        assert_eq!(obligation.remaining_borrow_value_usd(), "17.5".parse().unwrap());
        assert_eq!(
            obligation.borrow_limit_usage().unwrap(),
            Some("0.825".parse().unwrap())
        );
    }

    #[test]
    fn test_refresh_passes_through_protocol_fields() {
        let reserves = create_test_reserves();
        let mut obligation = create_test_obligation();
        obligation.bad_debt_usd = Decimal::from(3);
        obligation.closable = true;
        obligation.super_unhealthy_borrow_value_usd = Decimal::from(9);

        let refreshed = obligation.refresh(&reserves).unwrap();
        assert_eq!(refreshed.bad_debt_usd, Decimal::from(3));
        assert!(refreshed.closable);
        assert_eq!(refreshed.super_unhealthy_borrow_value_usd, Decimal::from(9));
    }

    #[test]
    fn test_refresh_uses_conservative_prices() {
        let mut reserves = create_test_reserves();
        // SUI spot above EMA, USDC spot below EMA
        if let Some(sui) = reserves.get_mut(SUI) {
            sui.price = Decimal::from(3);
            sui.smoothed_price = Decimal::from(2);
        }
        if let Some(usdc) = reserves.get_mut(USDC) {
            usdc.price = Decimal::from(1);
            usdc.smoothed_price = Decimal::from(2);
        }

        let obligation = create_test_obligation().refresh(&reserves).unwrap();

        // spot value for deposits, EMA (lower) for the borrow limit
        assert_eq!(obligation.deposited_value_usd, Decimal::from(300));
        assert_eq!(obligation.allowed_borrow_value_usd, Decimal::from(100));
        assert_eq!(obligation.unhealthy_borrow_value_usd, Decimal::from(240));
        // spot value for debt, EMA (higher) for the upper bound
        assert_eq!(obligation.weighted_borrowed_value_usd, "82.5".parse().unwrap());
        assert_eq!(
            obligation.weighted_borrowed_value_upper_bound_usd,
            Decimal::from(165)
        );
        assert!(!obligation.is_healthy());
        assert!(!obligation.is_liquidatable());
        assert_eq!(obligation.remaining_borrow_value_usd(), Decimal::ZERO);
    }

    #[test]
    fn test_refresh_liquidatable_after_price_drop() {
        let mut reserves = create_test_reserves();
        if let Some(sui) = reserves.get_mut(SUI) {
            sui.price = "0.5".parse().unwrap();
            sui.smoothed_price = "0.5".parse().unwrap();
        }

        let obligation = create_test_obligation().refresh(&reserves).unwrap();
        // 100 SUI * $0.5 * 80% = 40 < 82.5
        assert_eq!(obligation.unhealthy_borrow_value_usd, Decimal::from(40));
        assert!(obligation.is_liquidatable());
        assert!(!obligation.is_healthy());
    }

    #[test]
    fn test_refresh_missing_reserve() {
        let mut reserves = create_test_reserves();
        reserves.remove(USDC);

        assert_eq!(
            create_test_obligation().refresh(&reserves),
            Err(SimError::ReserveNotFound {
                coin_type: USDC.to_string()
            })
        );
    }

    #[test]
    fn test_refresh_missing_config() {
        let mut reserves = create_test_reserves();
        if let Some(sui) = reserves.get_mut(SUI) {
            sui.config = None;
        }
        assert!(matches!(
            create_test_obligation().refresh(&reserves),
            Err(SimError::MissingConfig { .. })
        ));
    }

    #[test]
    fn test_refresh_missing_user_reward_manager() {
        let reserves = create_test_reserves();
        let mut obligation = create_test_obligation();
        obligation.user_reward_managers.truncate(1);

        assert_eq!(
            obligation.refresh(&reserves),
            Err(SimError::UserRewardManagerNotFound { index: 1 })
        );
    }

    #[test]
    fn test_refresh_flags_isolated_borrow() {
        let mut reserves = create_test_reserves();
        if let Some(usdc) = reserves.get_mut(USDC) {
            if let Some(config) = usdc.config.as_mut() {
                config.isolated = true;
            }
        }

        let obligation = create_test_obligation().refresh(&reserves).unwrap();
        assert!(obligation.borrowing_isolated_asset);
    }

    #[test]
    fn test_refresh_syncs_user_rewards() {
        let mut reserves = create_test_reserves();
        if let Some(sui) = reserves.get_mut(SUI) {
            sui.deposits_pool_reward_manager = PoolRewardManager {
                total_shares: 100,
                last_update_time_ms: 500,
                pool_rewards: vec![Some(PoolReward {
                    id: FixedBytes::with_last_byte(1),
                    coin_type: SUI.to_string(),
                    start_time_ms: 0,
                    end_time_ms: 1000,
                    total_rewards: 1000,
                    allocated_rewards: Decimal::from(500),
                    cumulative_rewards_per_share: Decimal::from(5),
                })],
            };
        }

        let mut obligation = create_test_obligation();
        obligation.user_reward_managers[0] = UserRewardManager {
            share: 10,
            last_update_time_ms: 0,
            rewards: vec![],
        };

        let refreshed = obligation.refresh(&reserves).unwrap();
        let manager = &refreshed.user_reward_managers[0];
        assert_eq!(manager.last_update_time_ms, 500);
        assert_eq!(manager.claimable_rewards(0).unwrap(), Some(50));
        // borrow-side manager has no streams
        assert!(refreshed.user_reward_managers[1].rewards.is_empty());
    }

    #[test]
    fn test_refresh_is_pure() {
        let reserves = create_test_reserves();
        let obligation = create_test_obligation();
        let first = obligation.refresh(&reserves).unwrap();
        let second = obligation.refresh(&reserves).unwrap();
        assert_eq!(first, second);
        assert_eq!(obligation.borrows[0].borrowed_amount, Decimal::from(50_000_000));
    }

    #[test]
    fn test_empty_obligation() {
        let obligation = Obligation::default()
            .refresh(&create_test_reserves())
            .unwrap();
        assert_eq!(obligation.deposited_value_usd, Decimal::ZERO);
        assert!(obligation.is_healthy());
        assert!(!obligation.is_liquidatable());
        assert!(!obligation.is_forgivable());
        assert_eq!(obligation.borrow_limit_usage().unwrap(), None);
    }

    #[test]
    fn test_forgivable() {
        let mut obligation = create_test_obligation();
        obligation.deposits.clear();
        assert!(obligation.is_forgivable());
    }

    #[test]
    fn test_obligation_json_fixture() {
        let obligation = create_test_obligation()
            .refresh(&create_test_reserves())
            .unwrap();
        let json = serde_json::to_string(&obligation).unwrap();
        let decoded: Obligation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, obligation);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn conservative_bounding(
                price in 1u64..100_000,
                smoothed in 1u64..100_000,
                ctokens in 1u64..1_000_000_000_000,
                debt in 1u64..1_000_000_000,
            ) {
                let mut reserves = create_test_reserves();
                for reserve in reserves.values_mut() {
                    reserve.price = Decimal::from(price);
                    reserve.smoothed_price = Decimal::from(smoothed);
                }
                let mut obligation = create_test_obligation();
                obligation.deposits[0].deposited_ctoken_amount = ctokens;
                obligation.borrows[0].borrowed_amount = Decimal::from(debt);

                let bounded = obligation.refresh(&reserves).unwrap();

                // same obligation valued with spot price alone
                for reserve in reserves.values_mut() {
                    reserve.smoothed_price = reserve.price;
                }
                let spot_only = obligation.refresh(&reserves).unwrap();

                prop_assert!(bounded.allowed_borrow_value_usd <= spot_only.allowed_borrow_value_usd);
                prop_assert!(
                    bounded.weighted_borrowed_value_upper_bound_usd >= bounded.weighted_borrowed_value_usd
                );
                prop_assert_eq!(bounded.deposited_value_usd, spot_only.deposited_value_usd);
            }
        }
    }
}
