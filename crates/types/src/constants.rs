//! Bit-exact protocol constants.
//!
//! Reward arithmetic and capacity bounds depend on these values; tests
//! assert against them directly.

/// Blocks before newly placed stake becomes visible to consensus.
pub const STAKE_VISIBILITY_DELAY_BLOCKS: u64 = 320;

/// Average block time in tenths of a second (2.8 s).
pub const AVG_BLOCK_TIME_TENTHS: u64 = 28;

/// Maximum nodes a validator may declare.
pub const MAX_NODES: usize = 12;

/// Maximum pools hosted per node.
pub const MAX_POOLS_PER_NODE: usize = 4;

/// Maximum pools per validator.
pub const MAX_POOLS: usize = MAX_NODES * MAX_POOLS_PER_NODE;

/// Capacity of a single pool's staker ledger.
pub const MAX_STAKERS_PER_POOL: usize = 80;

/// Pools a single staker may participate in across all validators.
pub const MAX_POOLS_PER_STAKER: usize = 4;

/// Minimum epoch length in minutes.
pub const MIN_PAYOUT_MINS: u16 = 1;

/// Maximum epoch length in minutes (one week).
pub const MAX_PAYOUT_MINS: u16 = 10_080;

/// Minimum validator commission, four-decimal fixed point (1.0000%).
pub const MIN_PCT_TO_VALIDATOR: u32 = 10_000;

/// Maximum validator commission, four-decimal fixed point (100%).
pub const MAX_PCT_TO_VALIDATOR: u32 = 1_000_000;

/// Denominator of the four-decimal commission fixed point.
pub const COMMISSION_DENOMINATOR: u64 = 1_000_000;

/// Denominator of the partial-epoch time weight (tenths of a percent).
pub const TIME_PERCENT_DENOMINATOR: u64 = 1_000;

/// Scale of the per-pool token payout ratio.
pub const TOKEN_RATIO_SCALE: u64 = 1_000_000;

/// Cap on a single validator's share of online stake, in tenths of a
/// percent (100 = 10.0%). Rewards redirect to the fee sink above this.
pub const MAX_VALIDATOR_PCT_OF_ONLINE_TENTHS: u64 = 100;

/// Protocol floor for a validator's configured minimum entry stake.
pub const MIN_ENTRY_STAKE_FLOOR: u64 = 1_000_000;

/// Protocol ceiling for a validator's configured per-pool stake cap.
pub const MAX_ALGO_PER_POOL_CEILING: u64 = 70_000_000_000_000;

/// One whole unit of the staking currency in micro units.
pub const MICRO_UNIT: u64 = 1_000_000;

/// Seconds added to a stake entry before it counts toward an epoch:
/// the platform's stake-visibility delay expressed in wall-clock time.
pub const ENTRY_TIME_DELAY_SECS: u64 =
    STAKE_VISIBILITY_DELAY_BLOCKS * AVG_BLOCK_TIME_TENTHS / 10;
