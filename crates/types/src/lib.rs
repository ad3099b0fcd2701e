//! Core types for the openstake staking-pool protocol
//!
//! This crate provides the type definitions shared by the registry, the
//! staking pools, and the ledger substrate:
//! - Account addresses and application identities
//! - Validator configuration and aggregate state
//! - Per-pool summaries and the per-staker ledger record
//! - The composite pool key used to authenticate cross-contract calls
//! - Bit-exact protocol constants

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod constants;

mod config;
mod state;

pub use config::{EntryGating, ValidatorConfig};
pub use state::{
    NodePoolAssignment, PoolSummary, PoolTokenPayoutRatio, StakedInfo, ValidatorInfo,
    ValidatorState,
};

/// A 32-byte account address.
///
/// The zero address is a sentinel: empty ledger slots and unset config
/// fields carry it, and it is never a valid transaction sender.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero sentinel address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Whether this is the zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The account address controlled by an application.
    ///
    /// Derived by hashing a domain prefix and the big-endian application id,
    /// so the address is a pure function of the id and cannot be claimed by
    /// any keyed account.
    pub fn for_app(app_id: u64) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(b"appID");
        hasher.update(app_id.to_be_bytes());
        Address(hasher.finalize().into())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address({:02x}{:02x}{:02x}{:02x}..{:02x}{:02x})",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[30], self.0[31]
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Composite identity of a pool within the protocol.
///
/// Carried on every privileged inter-contract call; the receiver binds it
/// against its own records before trusting the caller (see the protocol
/// crate's authentication helper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolKey {
    /// The validator this pool belongs to (1-based, 0 = none).
    pub validator_id: u64,
    /// The pool's ordinal within the validator (1-based, 0 = none).
    pub pool_id: u64,
    /// The application id of the pool instance.
    pub pool_app_id: u64,
}

impl PoolKey {
    /// The empty-slot sentinel.
    pub const EMPTY: PoolKey = PoolKey {
        validator_id: 0,
        pool_id: 0,
        pool_app_id: 0,
    };

    /// Whether this key is the empty sentinel or a "no pool" result.
    pub fn is_empty(&self) -> bool {
        self.pool_id == 0
    }
}
