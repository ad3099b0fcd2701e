//! Error types for ledger operations.

use openstake_types::Address;
use thiserror::Error;

/// Errors raised by the transactional substrate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Account has never held funds and cannot act as a sender.
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    /// Spendable balance (above the minimum-balance requirement) is too low.
    #[error("insufficient funds in {address}: spendable {spendable}, requested {requested}")]
    InsufficientFunds {
        address: Address,
        spendable: u64,
        requested: u64,
    },

    /// Balance would drop below the account's minimum-balance requirement.
    #[error("balance of {address} would drop below its minimum of {min_balance}")]
    BelowMinBalance { address: Address, min_balance: u64 },

    /// Account is not opted in to the asset.
    #[error("account {address} is not opted in to asset {asset_id}")]
    NotOptedIn { address: Address, asset_id: u64 },

    /// Account is already opted in to the asset.
    #[error("account {address} is already opted in to asset {asset_id}")]
    AlreadyOptedIn { address: Address, asset_id: u64 },

    /// Asset balance is too low for the transfer.
    #[error(
        "insufficient asset {asset_id} balance in {address}: held {held}, requested {requested}"
    )]
    InsufficientAssetBalance {
        address: Address,
        asset_id: u64,
        held: u64,
        requested: u64,
    },
}

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
