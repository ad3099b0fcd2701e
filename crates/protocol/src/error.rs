//! Error types for protocol operations.
//!
//! Every error aborts the enclosing operation atomically: the dispatcher
//! restores the pre-call snapshot, so partial effects are never observable.

use openstake_ledger::LedgerError;
use openstake_types::Address;
use thiserror::Error;

/// Top-level error type for protocol operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Validator configuration rejected at the gate.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sender is not allowed to perform the requested method.
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    /// A capacity bound was reached.
    #[error("capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// A stake amount violated a balance rule.
    #[error("stake error: {0}")]
    Stake(#[from] StakeError),

    /// The accompanying payment was missing or malformed.
    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),

    /// The operation was attempted at the wrong time.
    #[error("timing error: {0}")]
    Timing(#[from] TimingError),

    /// A ledger effect failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A computed state update would break a protocol invariant.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Arithmetic overflow in a state update.
    #[error("arithmetic overflow")]
    Overflow,

    /// No validator with this id.
    #[error("unknown validator {0}")]
    UnknownValidator(u64),

    /// No pool instance with this app id.
    #[error("unknown pool app {0}")]
    UnknownPool(u64),

    /// Node id outside the validator's declared node range.
    #[error("unknown node {0}")]
    UnknownNode(u16),

    /// Pool storage has not been initialized yet.
    #[error("pool storage not initialized")]
    StorageNotInitialized,

    /// Pool storage was already initialized.
    #[error("pool storage already initialized")]
    StorageAlreadyInitialized,

    /// The staker did not pass the validator's entry gate.
    #[error("entry gate not satisfied: {0}")]
    GateNotSatisfied(&'static str),
}

/// Bounds violations on a submitted validator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Epoch length outside the allowed range.
    #[error("payout interval {0} minutes out of range")]
    PayoutIntervalOutOfRange(u16),

    /// Commission outside the allowed range.
    #[error("commission {0} out of range")]
    CommissionOutOfRange(u32),

    /// A required address field carried the zero sentinel.
    #[error("{0} must not be the zero address")]
    ZeroAddress(&'static str),

    /// Configured minimum entry stake below the protocol floor.
    #[error("minimum entry stake {0} below protocol floor")]
    EntryStakeTooLow(u64),

    /// Configured per-pool cap above the protocol ceiling.
    #[error("per-pool stake cap {0} above protocol ceiling")]
    PoolCapTooHigh(u64),

    /// Pools-per-node outside `[1, MAX_POOLS_PER_NODE]`.
    #[error("pools per node {0} out of range")]
    PoolsPerNodeOutOfRange(u8),

    /// Node count outside `[1, MAX_NODES]`.
    #[error("node count {0} out of range")]
    MaxNodesOutOfRange(u8),

    /// Token reward configured without a per-payout amount, or vice versa.
    #[error("reward token and per-payout amount must be configured together")]
    RewardTokenMismatch,

    /// Naming-service link could not be verified for the owner.
    #[error("naming-service app {0} is not owned by the claimed account")]
    NamingLinkRejected(u64),
}

/// Sender not entitled to the requested method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Method restricted to the validator owner.
    #[error("sender is not the validator owner")]
    NotOwner,

    /// Method restricted to the validator owner or manager.
    #[error("sender is not the validator owner or manager")]
    NotOwnerOrManager,

    /// Method restricted to the registry application account.
    #[error("sender {0} is not the registry account")]
    NotRegistry(Address),

    /// A privileged call's pool key failed the binding checks.
    #[error("pool key rejected: {0}")]
    PoolKeyRejected(&'static str),

    /// Ratio proxy caller is not a sibling pool of the same validator.
    #[error("caller app {0} is not a sibling pool")]
    NotSiblingPool(u64),

    /// Method restricted to the primary pool (pool #1).
    #[error("method restricted to the primary pool")]
    NotPrimaryPool,
}

/// A capacity bound was reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// Pool's staker ledger has no free slot.
    #[error("pool staker ledger is full")]
    PoolFull,

    /// Validator already has its maximum number of pools.
    #[error("validator pool cap reached")]
    PoolCapExceeded,

    /// The target node already hosts its maximum pools.
    #[error("node {0} already hosts its maximum pools")]
    NodeFull(u16),

    /// No pool of the validator can absorb the stake.
    #[error("no pool available for the requested stake")]
    NoPoolAvailable,

    /// The staker already participates in the maximum number of pools.
    #[error("staker pool set is full")]
    StakerPoolSetFull,
}

/// A stake amount violated a balance rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeError {
    /// Unstake larger than the staker's balance.
    #[error("insufficient balance: held {held}, requested {requested}")]
    InsufficientBalance { held: u64, requested: u64 },

    /// Amount (or residual balance) below the validator's minimum entry stake.
    #[error("amount {amount} below minimum entry stake {min_entry_stake}")]
    BelowMinimum { amount: u64, min_entry_stake: u64 },

    /// Stake would push the pool past its configured cap.
    #[error("stake of {amount} would exceed the pool cap of {max_per_pool}")]
    ExceedsMaxPerPool { amount: u64, max_per_pool: u64 },

    /// The account has no entry in the pool's ledger.
    #[error("account {0} not found in pool ledger")]
    AccountNotFound(Address),
}

/// The accompanying payment was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Payment sender differs from the caller.
    #[error("payment sender {actual} does not match caller {expected}")]
    WrongSender { expected: Address, actual: Address },

    /// Payment receiver is not the required account.
    #[error("payment receiver {actual} does not match {expected}")]
    WrongReceiver { expected: Address, actual: Address },

    /// Payment amount does not match the required amount exactly.
    #[error("payment of {actual} does not match required {expected}")]
    WrongAmount { expected: u64, actual: u64 },
}

/// The operation was attempted at the wrong time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    /// Payout attempted before a full epoch elapsed.
    #[error("epoch payout {remaining_secs} seconds early")]
    EpochTooEarly { remaining_secs: u64 },

    /// No token reward and the algo reward is below one whole unit.
    #[error("reward of {algo_reward} too small to distribute")]
    RewardTooSmall { algo_reward: u64 },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
