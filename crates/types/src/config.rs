//! Validator configuration.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Optional gate a staker must pass before entering a validator's pools.
///
/// The registry enforces `AssetRequired` and `AddressAllowList` directly
/// against the ledger; the naming-service variants are resolved through an
/// external collaborator and are opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryGating {
    /// No gate: anyone may stake.
    #[default]
    None,
    /// Staker must hold at least `min_balance` of one of the listed assets.
    AssetRequired {
        asset_ids: Vec<u64>,
        min_balance: u64,
    },
    /// Staker must appear on the allow list.
    AddressAllowList { addresses: Vec<Address> },
    /// Staker must own a name created by this account.
    NamingServiceCreator { creator: Address },
    /// Staker must be linked to this naming-service app.
    NamingServiceApp { app_id: u64 },
}

/// A validator's configuration.
///
/// Immutable after `add_validator` except for the explicit owner-edit
/// surface (manager, commission address, naming-service link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Epoch length in minutes.
    pub payout_every_mins: u16,
    /// Validator commission, four-decimal fixed point (50000 = 5%).
    pub pct_to_validator: u32,
    /// Account receiving the validator commission.
    pub commission_address: Address,
    /// Minimum stake for a staker's first entry into a pool.
    pub min_entry_stake: u64,
    /// Hard cap on a single pool's total stake.
    pub max_algo_per_pool: u64,
    /// Pools each declared node may host.
    pub pools_per_node: u8,
    /// Nodes the validator operates.
    pub max_nodes: u8,
    /// Secondary reward asset id; 0 means no token stream.
    pub reward_token_id: u64,
    /// Token units paid out per epoch across all pools.
    pub reward_per_payout: u64,
    /// Entry gate applied at stake placement.
    pub entry_gating: EntryGating,
}

impl ValidatorConfig {
    /// The validator-wide pool cap implied by the node layout.
    pub fn max_pools(&self) -> u64 {
        self.max_nodes as u64 * self.pools_per_node as u64
    }

    /// Whether a secondary reward token is configured.
    pub fn has_reward_token(&self) -> bool {
        self.reward_token_id != 0
    }

    /// Epoch length in seconds.
    pub fn epoch_secs(&self) -> u64 {
        self.payout_every_mins as u64 * 60
    }
}
