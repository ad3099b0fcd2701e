//! Staking-pool instance state and ledger operations.
//!
//! A pool owns the authoritative per-staker ledger: a fixed-capacity slot
//! array scanned linearly for a matching or free entry. Payments, token
//! transfers, and registry reporting are orchestrated by the network
//! dispatcher; the methods here mutate only pool-local state.

use serde::{Deserialize, Serialize};

use openstake_types::constants::{ENTRY_TIME_DELAY_SECS, MAX_STAKERS_PER_POOL};
use openstake_types::{Address, PoolKey, StakedInfo};

use crate::error::{CapacityError, ProtocolError, ProtocolResult, StakeError, TimingError};

/// Size of the staker ledger box: key plus `MAX_STAKERS_PER_POOL` packed
/// records of 64 bytes (account 32, balance 8, rewarded 8, token 8, entry 8).
pub const STAKERS_BOX_BYTES: u64 = 7 + MAX_STAKERS_PER_POOL as u64 * 64;

/// Timestamp at which stake added now starts counting toward an epoch.
pub fn computed_entry_time(now: u64) -> u64 {
    now + ENTRY_TIME_DELAY_SECS
}

/// Result of an unstake against the pool-local ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnstakeOutcome {
    /// Algo removed from the staker's balance.
    pub amount_removed: u64,
    /// Token reward balance taken out of custody accounting.
    pub token_removed: u64,
    /// Whether the staker's slot was freed.
    pub staker_removed: bool,
}

/// One staking-pool instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// This instance's application id.
    pub app_id: u64,
    /// The account controlled by this instance.
    pub address: Address,
    /// The registry application this pool answers to.
    pub registry_app_id: u64,
    /// Validator this pool belongs to (self-reported, bound by the
    /// registry's authentication checks).
    pub validator_id: u64,
    /// This pool's ordinal within the validator (1-based).
    pub pool_id: u64,
    /// Minimum first-entry stake, copied from the validator config.
    pub min_entry_stake: u64,
    /// Cap on this pool's total stake, copied from the validator config.
    pub max_stake_allowed: u64,
    /// Occupied ledger slots.
    pub num_stakers: u64,
    /// Sum of ledger balances.
    pub total_algo_staked: u64,
    /// Start of the current epoch; advanced by each successful payout.
    pub last_payout: u64,
    /// Node software version advertised by the operator.
    pub algod_ver: String,
    /// Naming-service app linked to this pool (0 = none).
    pub nfd_app_id: u64,
    /// Staker ledger; `None` until storage is initialized.
    stakers: Option<Vec<StakedInfo>>,
}

impl PoolState {
    /// One-shot initializer.
    ///
    /// Either all identity arguments are zero (the stored template) or all
    /// are set consistently for a live instance.
    pub fn create(
        app_id: u64,
        address: Address,
        registry_app_id: u64,
        validator_id: u64,
        pool_id: u64,
        min_entry_stake: u64,
        max_stake_allowed: u64,
    ) -> ProtocolResult<Self> {
        let all_zero = registry_app_id == 0
            && validator_id == 0
            && pool_id == 0
            && min_entry_stake == 0
            && max_stake_allowed == 0;
        let all_set = registry_app_id != 0
            && validator_id != 0
            && pool_id != 0
            && min_entry_stake != 0
            && max_stake_allowed != 0;
        if !all_zero && !all_set {
            return Err(ProtocolError::Invariant(
                "pool creation arguments must be all zero or all set".into(),
            ));
        }
        Ok(Self {
            app_id,
            address,
            registry_app_id,
            validator_id,
            pool_id,
            min_entry_stake,
            max_stake_allowed,
            num_stakers: 0,
            total_algo_staked: 0,
            last_payout: 0,
            algod_ver: String::new(),
            nfd_app_id: 0,
            stakers: None,
        })
    }

    /// The composite key this pool presents on privileged calls.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            validator_id: self.validator_id,
            pool_id: self.pool_id,
            pool_app_id: self.app_id,
        }
    }

    /// Whether this is the validator's primary pool.
    pub fn is_primary(&self) -> bool {
        self.pool_id == 1
    }

    /// Whether the staker ledger has been allocated.
    pub fn is_initialized(&self) -> bool {
        self.stakers.is_some()
    }

    /// Allocate the staker ledger and start the first epoch.
    pub fn init_storage(&mut self, now: u64) -> ProtocolResult<()> {
        if self.stakers.is_some() {
            return Err(ProtocolError::StorageAlreadyInitialized);
        }
        self.stakers = Some(vec![StakedInfo::default(); MAX_STAKERS_PER_POOL]);
        self.last_payout = now;
        Ok(())
    }

    /// The staker ledger.
    pub fn stakers(&self) -> ProtocolResult<&[StakedInfo]> {
        self.stakers
            .as_deref()
            .ok_or(ProtocolError::StorageNotInitialized)
    }

    /// The staker ledger, mutable.
    pub fn stakers_mut(&mut self) -> ProtocolResult<&mut [StakedInfo]> {
        self.stakers
            .as_deref_mut()
            .ok_or(ProtocolError::StorageNotInitialized)
    }

    /// Index of the staker's occupied slot, if any.
    pub fn find_slot(&self, account: Address) -> ProtocolResult<Option<usize>> {
        Ok(self
            .stakers()?
            .iter()
            .position(|s| !s.is_empty() && s.account == account))
    }

    /// Record an incoming stake for `staker` and return its entry time.
    ///
    /// Single pass over the ledger: accumulate into the staker's existing
    /// slot, or claim the first empty slot for a new entry.
    pub fn add_stake(&mut self, staker: Address, amount: u64, now: u64) -> ProtocolResult<u64> {
        if staker.is_zero() {
            return Err(StakeError::AccountNotFound(staker).into());
        }
        let new_total = self
            .total_algo_staked
            .checked_add(amount)
            .ok_or(ProtocolError::Overflow)?;
        if new_total > self.max_stake_allowed {
            return Err(StakeError::ExceedsMaxPerPool {
                amount,
                max_per_pool: self.max_stake_allowed,
            }
            .into());
        }
        let entry_time = computed_entry_time(now);
        let min_entry_stake = self.min_entry_stake;

        let stakers = self.stakers_mut()?;
        let mut first_empty = None;
        let mut existing = None;
        for (index, slot) in stakers.iter().enumerate() {
            if slot.is_empty() {
                // Keep scanning: the staker may occupy a later slot.
                if first_empty.is_none() {
                    first_empty = Some(index);
                }
                continue;
            }
            if slot.account == staker {
                existing = Some(index);
                break;
            }
        }

        if let Some(index) = existing {
            let slot = &mut stakers[index];
            slot.balance = slot
                .balance
                .checked_add(amount)
                .ok_or(ProtocolError::Overflow)?;
            slot.entry_time = entry_time;
            self.total_algo_staked = new_total;
            return Ok(entry_time);
        }

        let index = first_empty.ok_or(CapacityError::PoolFull)?;
        if amount < min_entry_stake {
            return Err(StakeError::BelowMinimum {
                amount,
                min_entry_stake,
            }
            .into());
        }
        stakers[index] = StakedInfo {
            account: staker,
            balance: amount,
            total_rewarded: 0,
            reward_token_balance: 0,
            entry_time,
        };
        self.num_stakers += 1;
        self.total_algo_staked = new_total;
        Ok(entry_time)
    }

    /// Remove stake from the staker's slot; `amount = 0` means unstake all.
    ///
    /// The residual balance must be zero or at least the minimum entry
    /// stake. The slot's token reward balance is taken in full on any
    /// unstake; the dispatcher routes the actual transfer.
    pub fn unstake(&mut self, staker: Address, amount: u64) -> ProtocolResult<UnstakeOutcome> {
        let index = self
            .find_slot(staker)?
            .ok_or(StakeError::AccountNotFound(staker))?;
        let min_entry_stake = self.min_entry_stake;
        let slot = &mut self.stakers_mut()?[index];

        let requested = if amount == 0 { slot.balance } else { amount };
        if slot.balance < requested {
            return Err(StakeError::InsufficientBalance {
                held: slot.balance,
                requested,
            }
            .into());
        }
        let residual = slot.balance - requested;
        if residual != 0 && residual < min_entry_stake {
            return Err(StakeError::BelowMinimum {
                amount: residual,
                min_entry_stake,
            }
            .into());
        }

        let token_removed = slot.reward_token_balance;
        slot.reward_token_balance = 0;
        slot.balance = residual;

        let staker_removed = residual == 0;
        if staker_removed {
            slot.clear();
            self.num_stakers -= 1;
        }
        self.total_algo_staked = self
            .total_algo_staked
            .checked_sub(requested)
            .ok_or(ProtocolError::Overflow)?;

        Ok(UnstakeOutcome {
            amount_removed: requested,
            token_removed,
            staker_removed,
        })
    }

    /// Take the staker's pending token reward, leaving the stake untouched.
    pub fn claim_tokens(&mut self, staker: Address) -> ProtocolResult<u64> {
        let index = self
            .find_slot(staker)?
            .ok_or(StakeError::AccountNotFound(staker))?;
        let slot = &mut self.stakers_mut()?[index];
        let token_removed = slot.reward_token_balance;
        slot.reward_token_balance = 0;
        Ok(token_removed)
    }

    /// Enforce the epoch gate against the current time.
    pub fn epoch_gate(&self, now: u64, epoch_secs: u64) -> ProtocolResult<()> {
        let elapsed = now.saturating_sub(self.last_payout);
        if elapsed < epoch_secs {
            return Err(TimingError::EpochTooEarly {
                remaining_secs: epoch_secs - elapsed,
            }
            .into());
        }
        Ok(())
    }
}
