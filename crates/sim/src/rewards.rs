//! Reward-per-share accounting for pool reward streams.
//!
//! Each reserve carries two [`PoolRewardManager`]s, one for the deposit side
//! and one for the borrow side. A manager holds a list of time-boxed reward
//! streams ([`PoolReward`]) that unlock linearly between `start_time_ms` and
//! `end_time_ms`, pro-rata to `total_shares`.
//!
//! # How Accrual Works
//!
//! ```text
//! time_passed  = min(now, end) - max(start, last_update)
//! unlocked     = total_rewards * time_passed / (end - start)
//! cumulative  += unlocked / total_shares
//! ```
//!
//! A user's [`UserRewardManager`] snapshots the pool's cumulative value per
//! stream; syncing it credits `(pool_cumulative - user_cumulative) * share`.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::decimal::{Decimal, TryAdd, TryDiv, TryMul, TrySub};
use crate::error::{ObjectId, SimError};

/// A time-boxed reward stream attached to one side of a reserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolReward {
    pub id: ObjectId,
    pub coin_type: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    /// Total rewards to distribute over the stream (raw token units)
    pub total_rewards: u64,
    /// Rewards unlocked so far
    pub allocated_rewards: Decimal,
    /// Rewards unlocked per share since the stream began
    pub cumulative_rewards_per_share: Decimal,
}

impl PoolReward {
    /// True while `now_ms` lies within `[start_time_ms, end_time_ms)`
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms >= self.start_time_ms && now_ms < self.end_time_ms
    }

    /// Rewards not yet unlocked
    pub fn remaining_rewards(&self) -> Decimal {
        Decimal::from(self.total_rewards).saturating_sub(self.allocated_rewards)
    }

    fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }
}

/// Pool-level reward state for one side of a reserve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRewardManager {
    pub total_shares: u64,
    pub last_update_time_ms: u64,
    /// Reward slots; cancelled or closed streams leave `None`
    pub pool_rewards: Vec<Option<PoolReward>>,
}

impl PoolRewardManager {
    /// Unlocks rewards for the time elapsed since `last_update_time_ms`.
    ///
    /// Returns an unchanged copy when no time has passed. With no shares
    /// outstanding only the clock advances, so idle time never unlocks
    /// rewards. Streams whose end does not follow their start are skipped.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidRewardAccrual`] if `now_ms` is before the last update
    ///
    /// # Example
    ///
    /// ```rust
    /// use lending_rs_sim::{Decimal, PoolReward, PoolRewardManager};
    /// use alloy_primitives::FixedBytes;
    ///
    /// let manager = PoolRewardManager {
    ///     total_shares: 100,
    ///     last_update_time_ms: 0,
    ///     pool_rewards: vec![Some(PoolReward {
    ///         id: FixedBytes::ZERO,
    ///         coin_type: "0x2::sui::SUI".to_string(),
    ///         start_time_ms: 0,
    ///         end_time_ms: 1000,
    ///         total_rewards: 1000,
    ///         allocated_rewards: Decimal::ZERO,
    ///         cumulative_rewards_per_share: Decimal::ZERO,
    ///     })],
    /// };
    ///
    /// let updated = manager.update(500).unwrap();
    /// let reward = updated.pool_rewards[0].as_ref().unwrap();
    /// assert_eq!(reward.allocated_rewards, Decimal::from(500));
    /// assert_eq!(reward.cumulative_rewards_per_share, Decimal::from(5));
    /// ```
    pub fn update(&self, now_ms: u64) -> Result<PoolRewardManager, SimError> {
        if now_ms < self.last_update_time_ms {
            return Err(SimError::InvalidRewardAccrual {
                timestamp_ms: now_ms,
                last_update_ms: self.last_update_time_ms,
            });
        }
        if now_ms == self.last_update_time_ms {
            return Ok(self.clone());
        }

        let mut manager = self.clone();
        manager.last_update_time_ms = now_ms;
        // Nothing unlocks while nobody holds shares
        if self.total_shares == 0 {
            return Ok(manager);
        }

        let total_shares = Decimal::from(self.total_shares);

        for reward in manager.pool_rewards.iter_mut().flatten() {
            if reward.end_time_ms <= reward.start_time_ms {
                warn!(reward_id = %reward.id, "skipping reward stream with empty duration");
                continue;
            }
            if now_ms < reward.start_time_ms || self.last_update_time_ms >= reward.end_time_ms {
                continue;
            }

            let time_passed_ms = now_ms.min(reward.end_time_ms)
                - reward.start_time_ms.max(self.last_update_time_ms);
            let unlocked = Decimal::from(reward.total_rewards)
                .try_mul(time_passed_ms)?
                .try_div(reward.duration_ms())?;

            reward.allocated_rewards = reward.allocated_rewards.try_add(unlocked)?;
            reward.cumulative_rewards_per_share = reward
                .cumulative_rewards_per_share
                .try_add(unlocked.try_div(total_shares)?)?;

            trace!(
                reward_id = %reward.id,
                time_passed_ms,
                unlocked = %unlocked,
                "unlocked pool rewards"
            );
        }

        Ok(manager)
    }
}

/// A user's position in a single reward stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReward {
    pub pool_reward_id: ObjectId,
    pub earned_rewards: Decimal,
    /// Pool cumulative rewards per share at the last sync
    pub cumulative_rewards_per_share: Decimal,
}

/// A user's reward ledger, indexed in lockstep with a [`PoolRewardManager`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRewardManager {
    pub share: u64,
    pub last_update_time_ms: u64,
    pub rewards: Vec<Option<UserReward>>,
}

impl UserRewardManager {
    /// Credits rewards accumulated in `pool` since the last sync.
    ///
    /// `pool` should already be updated to `now_ms`. Slots missing on the user
    /// side are created lazily for streams that had not ended at the user's
    /// last update; if the user predates the stream's start, the slot is
    /// back-dated to everything the stream has distributed so far.
    pub fn sync(
        &self,
        pool: &PoolRewardManager,
        now_ms: u64,
    ) -> Result<UserRewardManager, SimError> {
        let mut user = self.clone();
        let share = Decimal::from(self.share);

        for (i, slot) in pool.pool_rewards.iter().enumerate() {
            let Some(pool_reward) = slot else {
                continue;
            };

            if user.rewards.len() <= i {
                user.rewards.resize(i + 1, None);
            }

            if let Some(reward) = &mut user.rewards[i] {
                let new_rewards = pool_reward
                    .cumulative_rewards_per_share
                    .try_sub(reward.cumulative_rewards_per_share)?
                    .try_mul(share)?;
                reward.earned_rewards = reward.earned_rewards.try_add(new_rewards)?;
                reward.cumulative_rewards_per_share = pool_reward.cumulative_rewards_per_share;
                continue;
            }

            if self.last_update_time_ms > pool_reward.end_time_ms {
                continue;
            }
            let earned_rewards = if self.last_update_time_ms <= pool_reward.start_time_ms {
                pool_reward.cumulative_rewards_per_share.try_mul(share)?
            } else {
                Decimal::ZERO
            };
            user.rewards[i] = Some(UserReward {
                pool_reward_id: pool_reward.id,
                earned_rewards,
                cumulative_rewards_per_share: pool_reward.cumulative_rewards_per_share,
            });
        }

        user.last_update_time_ms = now_ms;
        Ok(user)
    }

    /// Whole token units claimable from reward slot `index`, if the slot exists
    pub fn claimable_rewards(&self, index: usize) -> Result<Option<u64>, SimError> {
        match self.rewards.get(index) {
            Some(Some(reward)) => reward.earned_rewards.floor_to_u64().map(Some),
            _ => Ok(None),
        }
    }
}
