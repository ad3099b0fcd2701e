//! Validator registry state.
//!
//! The registry is the root of trust: it holds every validator record, the
//! per-staker pool membership ledger, the per-pool summary rows, and the
//! cached token payout ratio snapshot. Cross-contract orchestration lives
//! in the network dispatcher; the methods here validate and mutate
//! registry-local state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use openstake_ledger::{box_mbr, Ledger, APP_CREATION_MBR};
use openstake_types::constants::{
    MAX_ALGO_PER_POOL_CEILING, MAX_NODES, MAX_PAYOUT_MINS, MAX_PCT_TO_VALIDATOR,
    MAX_POOLS_PER_NODE, MAX_POOLS_PER_STAKER, MAX_STAKERS_PER_POOL, MIN_ENTRY_STAKE_FLOOR,
    MIN_PAYOUT_MINS, MIN_PCT_TO_VALIDATOR, TOKEN_RATIO_SCALE,
};
use openstake_types::{
    Address, EntryGating, PoolKey, PoolSummary, PoolTokenPayoutRatio, ValidatorConfig,
    ValidatorInfo,
};

use crate::error::{
    CapacityError, ConfigError, ProtocolError, ProtocolResult, StakeError,
};
use crate::math::mul_div;
use crate::NamingService;

/// Packed size of one validator record box: key ("v" + 8-byte id), record
/// head (id, owner, manager, naming app), config, state, pool summary
/// rows, and node assignment slots.
const VALIDATOR_BOX_BYTES: u64 = 9
    + 80
    + 72
    + 26
    + (MAX_NODES * MAX_POOLS_PER_NODE) as u64 * 20
    + (MAX_NODES * MAX_POOLS_PER_NODE) as u64 * 8;

/// Packed size of one staker pool-set box: key ("sps" + 32-byte account)
/// plus `MAX_POOLS_PER_STAKER` 24-byte pool keys.
const POOL_SET_BOX_BYTES: u64 = 35 + MAX_POOLS_PER_STAKER as u64 * 24;

/// Storage deposits required by the registry's allocating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MbrAmounts {
    /// Cost of one validator record.
    pub add_validator_mbr: u64,
    /// Cost of instantiating one pool application.
    pub add_pool_mbr: u64,
    /// Cost of one staker pool-set entry.
    pub add_staker_mbr: u64,
}

/// The storage deposits derived from platform constants.
pub fn mbr_amounts() -> MbrAmounts {
    MbrAmounts {
        add_validator_mbr: box_mbr(VALIDATOR_BOX_BYTES),
        add_pool_mbr: APP_CREATION_MBR,
        add_staker_mbr: box_mbr(POOL_SET_BOX_BYTES),
    }
}

/// Protocol-wide bounds, published for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstraints {
    pub min_payout_mins: u16,
    pub max_payout_mins: u16,
    pub min_pct_to_validator: u32,
    pub max_pct_to_validator: u32,
    pub min_entry_stake_floor: u64,
    pub max_algo_per_pool_ceiling: u64,
    pub max_nodes: u8,
    pub max_pools_per_node: u8,
    pub max_pools_per_staker: u8,
    pub max_stakers_per_pool: u8,
}

/// The published protocol bounds.
pub fn protocol_constraints() -> ProtocolConstraints {
    ProtocolConstraints {
        min_payout_mins: MIN_PAYOUT_MINS,
        max_payout_mins: MAX_PAYOUT_MINS,
        min_pct_to_validator: MIN_PCT_TO_VALIDATOR,
        max_pct_to_validator: MAX_PCT_TO_VALIDATOR,
        min_entry_stake_floor: MIN_ENTRY_STAKE_FLOOR,
        max_algo_per_pool_ceiling: MAX_ALGO_PER_POOL_CEILING,
        max_nodes: MAX_NODES as u8,
        max_pools_per_node: MAX_POOLS_PER_NODE as u8,
        max_pools_per_staker: MAX_POOLS_PER_STAKER as u8,
        max_stakers_per_pool: MAX_STAKERS_PER_POOL as u8,
    }
}

/// Reject a configuration that violates any protocol bound.
pub fn validate_config(config: &ValidatorConfig) -> Result<(), ConfigError> {
    if config.payout_every_mins < MIN_PAYOUT_MINS || config.payout_every_mins > MAX_PAYOUT_MINS {
        return Err(ConfigError::PayoutIntervalOutOfRange(config.payout_every_mins));
    }
    if config.pct_to_validator < MIN_PCT_TO_VALIDATOR
        || config.pct_to_validator > MAX_PCT_TO_VALIDATOR
    {
        return Err(ConfigError::CommissionOutOfRange(config.pct_to_validator));
    }
    if config.commission_address.is_zero() {
        return Err(ConfigError::ZeroAddress("commission address"));
    }
    if config.min_entry_stake < MIN_ENTRY_STAKE_FLOOR {
        return Err(ConfigError::EntryStakeTooLow(config.min_entry_stake));
    }
    if config.max_algo_per_pool > MAX_ALGO_PER_POOL_CEILING {
        return Err(ConfigError::PoolCapTooHigh(config.max_algo_per_pool));
    }
    if config.pools_per_node == 0 || config.pools_per_node as usize > MAX_POOLS_PER_NODE {
        return Err(ConfigError::PoolsPerNodeOutOfRange(config.pools_per_node));
    }
    if config.max_nodes == 0 || config.max_nodes as usize > MAX_NODES {
        return Err(ConfigError::MaxNodesOutOfRange(config.max_nodes));
    }
    if (config.reward_token_id == 0) != (config.reward_per_payout == 0) {
        return Err(ConfigError::RewardTokenMismatch);
    }
    Ok(())
}

/// Check a staker against the validator's entry gate.
pub fn check_entry_gating(
    config: &ValidatorConfig,
    staker: Address,
    ledger: &Ledger,
    naming: &dyn NamingService,
) -> ProtocolResult<()> {
    match &config.entry_gating {
        EntryGating::None => Ok(()),
        EntryGating::AssetRequired {
            asset_ids,
            min_balance,
        } => {
            let holds_one = asset_ids
                .iter()
                .any(|id| ledger.asset_balance(staker, *id).unwrap_or(0) >= *min_balance);
            if holds_one {
                Ok(())
            } else {
                Err(ProtocolError::GateNotSatisfied("required asset not held"))
            }
        }
        EntryGating::AddressAllowList { addresses } => {
            if addresses.contains(&staker) {
                Ok(())
            } else {
                Err(ProtocolError::GateNotSatisfied("address not on allow list"))
            }
        }
        EntryGating::NamingServiceCreator { creator } => {
            if naming.owns_name_created_by(staker, *creator) {
                Ok(())
            } else {
                Err(ProtocolError::GateNotSatisfied(
                    "no name from the required creator",
                ))
            }
        }
        EntryGating::NamingServiceApp { app_id } => {
            if naming.is_linked(*app_id, staker) {
                Ok(())
            } else {
                Err(ProtocolError::GateNotSatisfied(
                    "not linked to the required naming app",
                ))
            }
        }
    }
}

/// The singleton registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryState {
    /// The registry's own application id.
    pub app_id: u64,
    /// The account controlled by the registry.
    pub address: Address,
    /// Template application cloned for every new pool.
    pub template_app_id: u64,
    /// Validator records; `validators[i]` has id `i + 1`.
    validators: Vec<ValidatorInfo>,
    /// Per-staker pool membership, fixed-capacity with reusable slots.
    staker_pool_sets: BTreeMap<Address, [PoolKey; MAX_POOLS_PER_STAKER]>,
    /// Cached token payout ratio per validator.
    token_ratios: BTreeMap<u64, PoolTokenPayoutRatio>,
}

impl RegistryState {
    /// Fresh registry bound to its app identity and pool template.
    pub fn new(app_id: u64, address: Address, template_app_id: u64) -> Self {
        Self {
            app_id,
            address,
            template_app_id,
            validators: Vec::new(),
            staker_pool_sets: BTreeMap::new(),
            token_ratios: BTreeMap::new(),
        }
    }

    /// Number of registered validators.
    pub fn num_validators(&self) -> u64 {
        self.validators.len() as u64
    }

    /// Look up a validator record.
    pub fn validator(&self, validator_id: u64) -> ProtocolResult<&ValidatorInfo> {
        validator_id
            .checked_sub(1)
            .and_then(|i| self.validators.get(i as usize))
            .ok_or(ProtocolError::UnknownValidator(validator_id))
    }

    /// Look up a validator record, mutable.
    pub fn validator_mut(&mut self, validator_id: u64) -> ProtocolResult<&mut ValidatorInfo> {
        validator_id
            .checked_sub(1)
            .and_then(|i| self.validators.get_mut(i as usize))
            .ok_or(ProtocolError::UnknownValidator(validator_id))
    }

    /// Append a validated validator record and return its id.
    pub fn add_validator(
        &mut self,
        owner: Address,
        manager: Address,
        nfd_app_id: u64,
        config: ValidatorConfig,
    ) -> ProtocolResult<u64> {
        if owner.is_zero() {
            return Err(ConfigError::ZeroAddress("owner").into());
        }
        if manager.is_zero() {
            return Err(ConfigError::ZeroAddress("manager").into());
        }
        validate_config(&config)?;
        let id = self.validators.len() as u64 + 1;
        self.validators
            .push(ValidatorInfo::new(id, owner, manager, nfd_app_id, config));
        tracing::info!(validator_id = id, %owner, "validator added");
        Ok(id)
    }

    /// A staker's pool membership slots, if the set was ever created.
    pub fn pool_set(&self, staker: Address) -> Option<&[PoolKey; MAX_POOLS_PER_STAKER]> {
        self.staker_pool_sets.get(&staker)
    }

    /// All staker pool sets, for consistency checks.
    pub fn pool_sets(
        &self,
    ) -> impl Iterator<Item = (&Address, &[PoolKey; MAX_POOLS_PER_STAKER])> {
        self.staker_pool_sets.iter()
    }

    /// Create the staker's pool set if absent; true when newly created.
    pub fn ensure_pool_set(&mut self, staker: Address) -> bool {
        if self.staker_pool_sets.contains_key(&staker) {
            return false;
        }
        self.staker_pool_sets
            .insert(staker, [PoolKey::EMPTY; MAX_POOLS_PER_STAKER]);
        true
    }

    /// Insert a pool key into the staker's set (no-op when present).
    pub fn add_to_pool_set(&mut self, staker: Address, key: PoolKey) -> ProtocolResult<()> {
        let set = self
            .staker_pool_sets
            .get_mut(&staker)
            .ok_or_else(|| ProtocolError::Invariant("pool set missing for staker".into()))?;
        if set.iter().any(|k| *k == key) {
            return Ok(());
        }
        let slot = set
            .iter_mut()
            .find(|k| k.is_empty())
            .ok_or(CapacityError::StakerPoolSetFull)?;
        *slot = key;
        Ok(())
    }

    /// Overwrite the staker's entry for `key` with the sentinel, keeping
    /// the other slots' indices stable.
    pub fn remove_from_pool_set(&mut self, staker: Address, key: PoolKey) -> ProtocolResult<()> {
        let set = self
            .staker_pool_sets
            .get_mut(&staker)
            .ok_or_else(|| ProtocolError::Invariant("pool set missing for staker".into()))?;
        let slot = set
            .iter_mut()
            .find(|k| **k == key)
            .ok_or_else(|| ProtocolError::Invariant("pool key missing from staker set".into()))?;
        *slot = PoolKey::EMPTY;
        Ok(())
    }

    /// Deterministic pool selection for a stake placement.
    ///
    /// A staker already placed with this validator stays in that pool; if
    /// the pool cannot absorb the amount the result is the no-pool
    /// sentinel, never a second pool. New stakers take the first pool in
    /// creation order with room.
    pub fn find_pool_for_staker(
        &self,
        validator_id: u64,
        staker: Address,
        amount: u64,
    ) -> ProtocolResult<PoolKey> {
        let validator = self.validator(validator_id)?;
        let config = &validator.config;
        let fits = |current: u64| {
            current
                .checked_add(amount)
                .is_some_and(|total| total <= config.max_algo_per_pool)
        };
        let sentinel = PoolKey {
            validator_id,
            pool_id: 0,
            pool_app_id: 0,
        };

        let mut bound_to_validator = false;
        if let Some(set) = self.staker_pool_sets.get(&staker) {
            for key in set.iter().filter(|k| !k.is_empty()) {
                if key.validator_id != validator_id {
                    continue;
                }
                bound_to_validator = true;
                let summary = validator
                    .pools
                    .get(key.pool_id as usize - 1)
                    .ok_or_else(|| {
                        ProtocolError::Invariant("pool set references unknown pool".into())
                    })?;
                if fits(summary.total_algo_staked) {
                    return Ok(*key);
                }
            }
        }
        if bound_to_validator {
            return Ok(sentinel);
        }

        if amount < config.min_entry_stake {
            return Err(StakeError::BelowMinimum {
                amount,
                min_entry_stake: config.min_entry_stake,
            }
            .into());
        }
        for (index, summary) in validator.pools.iter().enumerate() {
            if fits(summary.total_algo_staked) {
                return Ok(PoolKey {
                    validator_id,
                    pool_id: index as u64 + 1,
                    pool_app_id: summary.pool_app_id,
                });
            }
        }
        Ok(sentinel)
    }

    /// Record a freshly instantiated pool and return its key.
    pub fn record_new_pool(
        &mut self,
        validator_id: u64,
        node_id: u16,
        pool_app_id: u64,
    ) -> ProtocolResult<PoolKey> {
        let validator = self.validator_mut(validator_id)?;
        let config = &validator.config;
        if validator.pools.len() as u64 >= config.max_pools() {
            return Err(CapacityError::PoolCapExceeded.into());
        }
        if node_id == 0 || node_id > config.max_nodes as u16 {
            return Err(ProtocolError::UnknownNode(node_id));
        }
        let pools_per_node = config.pools_per_node as usize;
        let node = &mut validator.nodes[node_id as usize - 1];
        if node.pool_app_ids.len() >= pools_per_node {
            return Err(CapacityError::NodeFull(node_id).into());
        }
        node.pool_app_ids.push(pool_app_id);
        validator.pools.push(PoolSummary {
            node_id,
            pool_app_id,
            total_stakers: 0,
            total_algo_staked: 0,
        });
        validator.state.num_pools += 1;
        let pool_id = validator.pools.len() as u64;
        tracing::info!(validator_id, pool_id, pool_app_id, node_id, "pool added");
        Ok(PoolKey {
            validator_id,
            pool_id,
            pool_app_id,
        })
    }

    /// Fold a pool's post-`addStake` snapshot into the summary row and the
    /// validator aggregates.
    pub fn record_stake_added(
        &mut self,
        key: PoolKey,
        pool_num_stakers: u64,
        pool_total_staked: u64,
        new_staker: bool,
        amount: u64,
    ) -> ProtocolResult<()> {
        let validator = self.validator_mut(key.validator_id)?;
        let summary = validator
            .pools
            .get_mut(key.pool_id as usize - 1)
            .ok_or(ProtocolError::UnknownPool(key.pool_app_id))?;
        summary.total_stakers = pool_num_stakers as u16;
        summary.total_algo_staked = pool_total_staked;
        if new_staker {
            validator.state.total_stakers += 1;
        }
        validator.state.total_algo_staked = validator
            .state
            .total_algo_staked
            .checked_add(amount)
            .ok_or(ProtocolError::Overflow)?;
        Ok(())
    }

    /// Fold an epoch payout report into the summary row and aggregates.
    pub fn record_stake_updated_via_rewards(
        &mut self,
        key: PoolKey,
        algo_added: u64,
        token_paid_out: u64,
    ) -> ProtocolResult<()> {
        let validator = self.validator_mut(key.validator_id)?;
        let summary = validator
            .pools
            .get_mut(key.pool_id as usize - 1)
            .ok_or(ProtocolError::UnknownPool(key.pool_app_id))?;
        summary.total_algo_staked = summary
            .total_algo_staked
            .checked_add(algo_added)
            .ok_or(ProtocolError::Overflow)?;
        validator.state.total_algo_staked = validator
            .state
            .total_algo_staked
            .checked_add(algo_added)
            .ok_or(ProtocolError::Overflow)?;
        validator.state.reward_token_held_back = validator
            .state
            .reward_token_held_back
            .checked_add(token_paid_out)
            .ok_or(ProtocolError::Overflow)?;
        Ok(())
    }

    /// Fold an unstake (or token claim) report into the summary row, the
    /// aggregates, and the staker's pool set.
    pub fn record_stake_removed(
        &mut self,
        key: PoolKey,
        staker: Address,
        amount_removed: u64,
        token_removed: u64,
        staker_removed: bool,
    ) -> ProtocolResult<()> {
        let validator = self.validator_mut(key.validator_id)?;
        let summary = validator
            .pools
            .get_mut(key.pool_id as usize - 1)
            .ok_or(ProtocolError::UnknownPool(key.pool_app_id))?;
        summary.total_algo_staked = summary
            .total_algo_staked
            .checked_sub(amount_removed)
            .ok_or_else(|| ProtocolError::Invariant("pool summary stake underflow".into()))?;
        validator.state.total_algo_staked = validator
            .state
            .total_algo_staked
            .checked_sub(amount_removed)
            .ok_or_else(|| ProtocolError::Invariant("validator stake underflow".into()))?;
        validator.state.reward_token_held_back = validator
            .state
            .reward_token_held_back
            .checked_sub(token_removed)
            .ok_or_else(|| ProtocolError::Invariant("token holdback underflow".into()))?;
        if staker_removed {
            summary.total_stakers = summary
                .total_stakers
                .checked_sub(1)
                .ok_or_else(|| ProtocolError::Invariant("pool staker count underflow".into()))?;
            validator.state.total_stakers = validator
                .state
                .total_stakers
                .checked_sub(1)
                .ok_or_else(|| ProtocolError::Invariant("staker count underflow".into()))?;
            self.remove_from_pool_set(staker, key)?;
        }
        Ok(())
    }

    /// Snapshot each pool's share of the validator's stake.
    ///
    /// Cached per payout cycle: recomputed only when pool #1 has begun a
    /// new epoch since the stored snapshot.
    pub fn set_token_payout_ratio(
        &mut self,
        validator_id: u64,
        pool1_epoch_start: u64,
    ) -> ProtocolResult<PoolTokenPayoutRatio> {
        if let Some(existing) = self.token_ratios.get(&validator_id) {
            if existing.computed_for_epoch == pool1_epoch_start {
                return Ok(existing.clone());
            }
        }
        let validator = self.validator(validator_id)?;
        let total = validator.state.total_algo_staked;
        let mut pool_pct_of_whole = Vec::with_capacity(validator.pools.len());
        for summary in &validator.pools {
            let pct = if total == 0 {
                0
            } else {
                mul_div(summary.total_algo_staked, TOKEN_RATIO_SCALE, total)?
            };
            pool_pct_of_whole.push(pct);
        }
        let ratio = PoolTokenPayoutRatio {
            pool_pct_of_whole,
            computed_for_epoch: pool1_epoch_start,
        };
        self.token_ratios.insert(validator_id, ratio.clone());
        tracing::debug!(validator_id, "token payout ratio snapshot refreshed");
        Ok(ratio)
    }

    /// The cached ratio snapshot, if any.
    pub fn token_ratio(&self, validator_id: u64) -> Option<&PoolTokenPayoutRatio> {
        self.token_ratios.get(&validator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> Address {
        Address([tag; 32])
    }

    fn make_config() -> ValidatorConfig {
        ValidatorConfig {
            payout_every_mins: 60,
            pct_to_validator: 50_000,
            commission_address: addr(9),
            min_entry_stake: 1_000_000,
            max_algo_per_pool: 100_000_000,
            pools_per_node: 2,
            max_nodes: 2,
            reward_token_id: 0,
            reward_per_payout: 0,
            entry_gating: EntryGating::None,
        }
    }

    fn make_registry() -> RegistryState {
        RegistryState::new(1_000, Address::for_app(1_000), 1_001)
    }

    #[test]
    fn test_validate_config_bounds() {
        validate_config(&make_config()).unwrap();

        let mut config = make_config();
        config.payout_every_mins = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::PayoutIntervalOutOfRange(0))
        ));

        let mut config = make_config();
        config.pct_to_validator = MIN_PCT_TO_VALIDATOR - 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::CommissionOutOfRange(_))
        ));

        let mut config = make_config();
        config.commission_address = Address::ZERO;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ZeroAddress(_))
        ));

        let mut config = make_config();
        config.min_entry_stake = MIN_ENTRY_STAKE_FLOOR - 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::EntryStakeTooLow(_))
        ));

        let mut config = make_config();
        config.pools_per_node = MAX_POOLS_PER_NODE as u8 + 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::PoolsPerNodeOutOfRange(_))
        ));

        let mut config = make_config();
        config.reward_token_id = 55;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::RewardTokenMismatch)
        ));
    }

    #[test]
    fn test_add_validator_assigns_sequential_ids() {
        let mut registry = make_registry();
        let first = registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();
        let second = registry
            .add_validator(addr(3), addr(4), 0, make_config())
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(registry.num_validators(), 2);
        assert!(matches!(
            registry.validator(3),
            Err(ProtocolError::UnknownValidator(3))
        ));
        assert!(matches!(
            registry.validator(0),
            Err(ProtocolError::UnknownValidator(0))
        ));
    }

    #[test]
    fn test_add_validator_rejects_zero_addresses() {
        let mut registry = make_registry();
        let err = registry
            .add_validator(Address::ZERO, addr(2), 0, make_config())
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Config(ConfigError::ZeroAddress("owner"))
        ));
    }

    #[test]
    fn test_pool_set_slot_reuse() {
        let mut registry = make_registry();
        let staker = addr(5);
        assert!(registry.ensure_pool_set(staker));
        assert!(!registry.ensure_pool_set(staker));

        let key_a = PoolKey { validator_id: 1, pool_id: 1, pool_app_id: 11 };
        let key_b = PoolKey { validator_id: 2, pool_id: 1, pool_app_id: 22 };
        registry.add_to_pool_set(staker, key_a).unwrap();
        registry.add_to_pool_set(staker, key_b).unwrap();
        // Re-adding an existing key is a no-op.
        registry.add_to_pool_set(staker, key_a).unwrap();
        let set = registry.pool_set(staker).unwrap();
        assert_eq!(set[0], key_a);
        assert_eq!(set[1], key_b);

        // Removal leaves the sentinel in place, and the freed slot is the
        // first one reused.
        registry.remove_from_pool_set(staker, key_a).unwrap();
        let set = registry.pool_set(staker).unwrap();
        assert!(set[0].is_empty());
        assert_eq!(set[1], key_b);

        let key_c = PoolKey { validator_id: 3, pool_id: 2, pool_app_id: 33 };
        registry.add_to_pool_set(staker, key_c).unwrap();
        assert_eq!(registry.pool_set(staker).unwrap()[0], key_c);
    }

    #[test]
    fn test_pool_set_full() {
        let mut registry = make_registry();
        let staker = addr(5);
        registry.ensure_pool_set(staker);
        for v in 1..=MAX_POOLS_PER_STAKER as u64 {
            registry
                .add_to_pool_set(staker, PoolKey { validator_id: v, pool_id: 1, pool_app_id: v })
                .unwrap();
        }
        let err = registry
            .add_to_pool_set(staker, PoolKey { validator_id: 9, pool_id: 1, pool_app_id: 9 })
            .unwrap_err();
        assert_eq!(err, ProtocolError::Capacity(CapacityError::StakerPoolSetFull));
    }

    #[test]
    fn test_record_new_pool_caps() {
        let mut registry = make_registry();
        registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();

        // 2 nodes × 2 pools per node.
        registry.record_new_pool(1, 1, 101).unwrap();
        registry.record_new_pool(1, 1, 102).unwrap();
        let err = registry.record_new_pool(1, 1, 103).unwrap_err();
        assert_eq!(err, ProtocolError::Capacity(CapacityError::NodeFull(1)));

        registry.record_new_pool(1, 2, 103).unwrap();
        registry.record_new_pool(1, 2, 104).unwrap();
        let err = registry.record_new_pool(1, 2, 105).unwrap_err();
        assert_eq!(err, ProtocolError::Capacity(CapacityError::PoolCapExceeded));

        assert!(matches!(
            registry.record_new_pool(1, 3, 106),
            Err(ProtocolError::Capacity(CapacityError::PoolCapExceeded))
        ));
        assert_eq!(registry.validator(1).unwrap().state.num_pools, 4);
    }

    #[test]
    fn test_find_pool_prefers_existing_membership() {
        let mut registry = make_registry();
        registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();
        let key1 = registry.record_new_pool(1, 1, 101).unwrap();
        let key2 = registry.record_new_pool(1, 1, 102).unwrap();

        let staker = addr(5);
        // New staker lands in the first pool with room.
        let chosen = registry.find_pool_for_staker(1, staker, 2_000_000).unwrap();
        assert_eq!(chosen, key1);

        // Bound stakers come back to their pool even when a later pool is
        // emptier.
        registry.ensure_pool_set(staker);
        registry.add_to_pool_set(staker, key2).unwrap();
        registry
            .record_stake_added(key2, 1, 2_000_000, true, 2_000_000)
            .unwrap();
        let chosen = registry.find_pool_for_staker(1, staker, 1_000_000).unwrap();
        assert_eq!(chosen, key2);
    }

    #[test]
    fn test_find_pool_bound_staker_never_moves_pools() {
        let mut registry = make_registry();
        registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();
        let key1 = registry.record_new_pool(1, 1, 101).unwrap();
        registry.record_new_pool(1, 1, 102).unwrap();

        let staker = addr(5);
        registry.ensure_pool_set(staker);
        registry.add_to_pool_set(staker, key1).unwrap();
        // Fill pool 1 to its cap.
        registry
            .record_stake_added(key1, 1, 100_000_000, true, 100_000_000)
            .unwrap();

        // A top-up that does not fit returns the sentinel even though pool
        // 2 has room.
        let chosen = registry.find_pool_for_staker(1, staker, 1_000_000).unwrap();
        assert!(chosen.is_empty());
        assert_eq!(chosen.validator_id, 1);
    }

    #[test]
    fn test_find_pool_walks_in_order_and_enforces_minimum() {
        let mut registry = make_registry();
        registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();
        let key1 = registry.record_new_pool(1, 1, 101).unwrap();
        let key2 = registry.record_new_pool(1, 1, 102).unwrap();

        // New stakers below the minimum entry stake are rejected.
        let err = registry.find_pool_for_staker(1, addr(6), 999_999).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Stake(StakeError::BelowMinimum { .. })
        ));

        // Pool 1 nearly full: an amount that does not fit rolls to pool 2.
        registry
            .record_stake_added(key1, 1, 99_500_000, true, 99_500_000)
            .unwrap();
        let chosen = registry.find_pool_for_staker(1, addr(6), 1_000_000).unwrap();
        assert_eq!(chosen, key2);

        // Nothing fits: sentinel.
        registry
            .record_stake_added(key2, 2, 99_500_000, true, 99_500_000)
            .unwrap();
        let chosen = registry.find_pool_for_staker(1, addr(7), 1_000_000).unwrap();
        assert!(chosen.is_empty());
    }

    #[test]
    fn test_token_ratio_snapshot_and_cache() {
        let mut registry = make_registry();
        let mut config = make_config();
        config.reward_token_id = 42;
        config.reward_per_payout = 1_000;
        registry.add_validator(addr(1), addr(2), 0, config).unwrap();
        let key1 = registry.record_new_pool(1, 1, 101).unwrap();
        let key2 = registry.record_new_pool(1, 1, 102).unwrap();
        registry
            .record_stake_added(key1, 1, 3_000_000, true, 3_000_000)
            .unwrap();
        registry
            .record_stake_added(key2, 1, 1_000_000, true, 1_000_000)
            .unwrap();

        let ratio = registry.set_token_payout_ratio(1, 9_000).unwrap();
        assert_eq!(ratio.pool_pct_of_whole, vec![750_000, 250_000]);

        // Same epoch start: the cached snapshot is reused even though the
        // underlying stake moved.
        registry
            .record_stake_added(key2, 2, 3_000_000, true, 2_000_000)
            .unwrap();
        let cached = registry.set_token_payout_ratio(1, 9_000).unwrap();
        assert_eq!(cached.pool_pct_of_whole, vec![750_000, 250_000]);

        // New epoch start: recomputed.
        let fresh = registry.set_token_payout_ratio(1, 10_000).unwrap();
        assert_eq!(fresh.pool_pct_of_whole, vec![500_000, 500_000]);
    }

    #[test]
    fn test_stake_removed_underflow_is_invariant_violation() {
        let mut registry = make_registry();
        registry
            .add_validator(addr(1), addr(2), 0, make_config())
            .unwrap();
        let key = registry.record_new_pool(1, 1, 101).unwrap();
        let err = registry
            .record_stake_removed(key, addr(5), 1, 0, false)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Invariant(_)));
    }
}
