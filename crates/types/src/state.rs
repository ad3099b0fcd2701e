//! Mutable registry-side state records.

use serde::{Deserialize, Serialize};

use crate::{config::ValidatorConfig, constants::MAX_NODES, Address};

/// Aggregate state of one validator, updated only via defined transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorState {
    /// Pools created so far (never decreases).
    pub num_pools: u16,
    /// Stakers across all of the validator's pools.
    pub total_stakers: u64,
    /// Stake across all of the validator's pools.
    pub total_algo_staked: u64,
    /// Token rewards credited to stakers but still in pool #1's custody.
    pub reward_token_held_back: u64,
}

/// Registry-held summary row for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Node the pool is placed on (1-based).
    pub node_id: u16,
    /// Application id of the pool instance.
    pub pool_app_id: u64,
    /// Stakers currently in the pool.
    pub total_stakers: u16,
    /// Stake currently in the pool.
    pub total_algo_staked: u64,
}

/// Pool app ids placed on one node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodePoolAssignment {
    pub pool_app_ids: Vec<u64>,
}

/// One validator's full registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// 1-based validator id.
    pub id: u64,
    /// Owner: may edit manager, commission address, and naming link.
    pub owner: Address,
    /// Manager: may add pools and operate participation keys.
    pub manager: Address,
    /// Optional naming-service app linked to the validator (0 = none).
    pub nfd_app_id: u64,
    pub config: ValidatorConfig,
    pub state: ValidatorState,
    /// Per-node pool placement, indexed by node id - 1.
    pub nodes: Vec<NodePoolAssignment>,
    /// Pool summaries in creation order; `pools[i]` has pool id `i + 1`.
    pub pools: Vec<PoolSummary>,
}

impl ValidatorInfo {
    /// Fresh record for a newly added validator.
    pub fn new(
        id: u64,
        owner: Address,
        manager: Address,
        nfd_app_id: u64,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            id,
            owner,
            manager,
            nfd_app_id,
            config,
            state: ValidatorState::default(),
            nodes: vec![NodePoolAssignment::default(); MAX_NODES],
            pools: Vec::new(),
        }
    }
}

/// One slot of a pool's staker ledger.
///
/// Empty slots carry the zero address; a slot's index is stable for the
/// whole occupied lifetime of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StakedInfo {
    pub account: Address,
    /// Current stake, compounded by epoch payouts.
    pub balance: u64,
    /// Cumulative algo rewards ever credited to this entry.
    pub total_rewarded: u64,
    /// Token rewards credited but not yet claimed.
    pub reward_token_balance: u64,
    /// Timestamp at which this stake counts for reward purposes.
    pub entry_time: u64,
}

impl StakedInfo {
    /// Whether the slot is unoccupied.
    pub fn is_empty(&self) -> bool {
        self.account.is_zero()
    }

    /// Return the slot to the empty state.
    pub fn clear(&mut self) {
        *self = StakedInfo::default();
    }
}

/// Snapshot of each pool's share of the validator's stake, used to split
/// the per-epoch token reward across pools.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolTokenPayoutRatio {
    /// Scaled share per pool, indexed by pool id - 1
    /// (`TOKEN_RATIO_SCALE` = 100%).
    pub pool_pct_of_whole: Vec<u64>,
    /// Pool #1 epoch start (its `last_payout`) this snapshot was taken for.
    pub computed_for_epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryGating;

    fn make_config() -> ValidatorConfig {
        ValidatorConfig {
            payout_every_mins: 30,
            pct_to_validator: 50_000,
            commission_address: Address([9u8; 32]),
            min_entry_stake: 1_000_000,
            max_algo_per_pool: 10_000_000_000,
            pools_per_node: 2,
            max_nodes: 3,
            reward_token_id: 0,
            reward_per_payout: 0,
            entry_gating: EntryGating::None,
        }
    }

    #[test]
    fn test_new_validator_record() {
        let info = ValidatorInfo::new(1, Address([1u8; 32]), Address([2u8; 32]), 0, make_config());
        assert_eq!(info.id, 1);
        assert_eq!(info.nodes.len(), MAX_NODES);
        assert!(info.pools.is_empty());
        assert_eq!(info.state, ValidatorState::default());
    }

    #[test]
    fn test_staked_info_slot_cycle() {
        let mut slot = StakedInfo {
            account: Address([3u8; 32]),
            balance: 5_000_000,
            total_rewarded: 100,
            reward_token_balance: 0,
            entry_time: 1_000,
        };
        assert!(!slot.is_empty());
        slot.clear();
        assert!(slot.is_empty());
        assert_eq!(slot.balance, 0);
    }
}
