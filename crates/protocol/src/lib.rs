//! Delegated staking-pool protocol core
//!
//! This crate implements:
//! - The singleton validator registry: validator records, configuration
//!   validation, the per-staker pool membership ledger, and deterministic
//!   pool selection for stake placement
//! - Staking-pool instances with fixed-capacity staker ledgers
//! - The two-pass proportional epoch payout engine
//! - Cross-contract authentication for the registry/pool protocol and the
//!   token-ratio proxy through each validator's primary pool
//!
//! Operations run on a deterministic, single-threaded transactional
//! substrate (`openstake-ledger`); each public method of [`Network`] either
//! commits wholly or rolls back.

use openstake_types::Address;

mod auth;
mod error;
mod math;
mod network;
mod payout;
mod pool;
mod registry;

pub use auth::verify_pool_caller;
pub use error::{
    AuthError, CapacityError, ConfigError, PaymentError, ProtocolError, ProtocolResult,
    StakeError, TimingError,
};
pub use network::Network;
pub use payout::{compute_payout, PayoutInputs, PayoutPlan, StakerCredit};
pub use pool::{computed_entry_time, PoolState, UnstakeOutcome, STAKERS_BOX_BYTES};
pub use registry::{
    check_entry_gating, mbr_amounts, protocol_constraints, validate_config, MbrAmounts,
    ProtocolConstraints, RegistryState,
};

/// External naming-service collaborator.
///
/// Entry gating and validator/pool name links consult this seam; the
/// protocol core treats the naming app itself as opaque.
pub trait NamingService {
    /// Whether `address` controls the naming app.
    fn is_owned_by(&self, app_id: u64, address: Address) -> bool;

    /// Whether `address` owns any name created by `creator`.
    fn owns_name_created_by(&self, address: Address, creator: Address) -> bool;

    /// Whether `address` is linked to the naming app.
    fn is_linked(&self, app_id: u64, address: Address) -> bool;
}

/// Default collaborator: no naming service deployed, every check fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNamingService;

impl NamingService for NullNamingService {
    fn is_owned_by(&self, _app_id: u64, _address: Address) -> bool {
        false
    }

    fn owns_name_created_by(&self, _address: Address, _creator: Address) -> bool {
        false
    }

    fn is_linked(&self, _app_id: u64, _address: Address) -> bool {
        false
    }
}
