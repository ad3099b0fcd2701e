//! Scenario harness: a deployed network plus builders for the common
//! multi-step flows.

use openstake_ledger::{box_mbr, Payment, ACCOUNT_MIN_BALANCE, ASSET_HOLDING_MBR};
use openstake_protocol::{
    mbr_amounts, NamingService, Network, ProtocolResult, STAKERS_BOX_BYTES,
};
use openstake_types::constants::MICRO_UNIT;
use openstake_types::{Address, EntryGating, PoolKey, ValidatorConfig};

/// Online stake the harness reports by default, large enough that the
/// protocol cap never trips unless a scenario lowers it.
pub const DEFAULT_ONLINE_STAKE: u64 = 1_000_000_000 * MICRO_UNIT;

/// Funding given to harness-created accounts.
const DEFAULT_FUNDING: u64 = 100_000_000 * MICRO_UNIT;

/// Canned naming-service collaborator for gating and link scenarios.
#[derive(Debug, Clone, Default)]
pub struct StaticNamingService {
    /// `(app_id, owner)` pairs.
    pub owners: Vec<(u64, Address)>,
    /// `(address, creator)` pairs: address owns a name by creator.
    pub names_by_creator: Vec<(Address, Address)>,
    /// `(app_id, address)` linked pairs.
    pub links: Vec<(u64, Address)>,
}

impl NamingService for StaticNamingService {
    fn is_owned_by(&self, app_id: u64, address: Address) -> bool {
        self.owners.contains(&(app_id, address))
    }

    fn owns_name_created_by(&self, address: Address, creator: Address) -> bool {
        self.names_by_creator.contains(&(address, creator))
    }

    fn is_linked(&self, app_id: u64, address: Address) -> bool {
        self.links.contains(&(app_id, address))
    }
}

/// A deployed network with account bookkeeping.
pub struct SimHarness {
    pub net: Network,
    next_account: u64,
}

impl Default for SimHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHarness {
    /// Deploy a fresh network with the default online-stake figure.
    pub fn new() -> Self {
        let mut net = Network::new();
        net.ledger_mut().set_online_stake(DEFAULT_ONLINE_STAKE);
        Self {
            net,
            next_account: 0,
        }
    }

    /// Deploy with a naming-service collaborator.
    pub fn with_naming(naming: StaticNamingService) -> Self {
        let mut net = Network::new().with_naming(Box::new(naming));
        net.ledger_mut().set_online_stake(DEFAULT_ONLINE_STAKE);
        Self {
            net,
            next_account: 0,
        }
    }

    /// A fresh, funded account.
    pub fn account(&mut self) -> Address {
        self.next_account += 1;
        let mut bytes = [0xAC; 32];
        bytes[..8].copy_from_slice(&self.next_account.to_be_bytes());
        let address = Address(bytes);
        self.net.ledger_mut().fund(address, DEFAULT_FUNDING);
        address
    }

    /// A baseline configuration: hourly epochs, 5% commission.
    pub fn default_config(commission_address: Address) -> ValidatorConfig {
        ValidatorConfig {
            payout_every_mins: 60,
            pct_to_validator: 50_000,
            commission_address,
            min_entry_stake: MICRO_UNIT,
            max_algo_per_pool: 10_000_000 * MICRO_UNIT,
            pools_per_node: 2,
            max_nodes: 2,
            reward_token_id: 0,
            reward_per_payout: 0,
            entry_gating: EntryGating::None,
        }
    }

    fn registry_payment(&self, sender: Address, amount: u64) -> Payment {
        Payment {
            sender,
            receiver: self.net.registry().address,
            amount,
        }
    }

    /// Register a validator owned and managed by `owner`.
    pub fn add_validator(
        &mut self,
        owner: Address,
        config: ValidatorConfig,
    ) -> ProtocolResult<u64> {
        let payment = self.registry_payment(owner, mbr_amounts().add_validator_mbr);
        self.net
            .add_validator(owner, payment, owner, owner, 0, config)
    }

    /// Add a pool on node 1 and initialize its storage.
    pub fn add_pool(&mut self, owner: Address, validator_id: u64) -> ProtocolResult<PoolKey> {
        self.add_pool_on_node(owner, validator_id, 1)
    }

    /// Add a pool on a specific node and initialize its storage.
    pub fn add_pool_on_node(
        &mut self,
        owner: Address,
        validator_id: u64,
        node_id: u16,
    ) -> ProtocolResult<PoolKey> {
        let payment = self.registry_payment(owner, mbr_amounts().add_pool_mbr);
        let key = self.net.add_pool(owner, payment, validator_id, node_id)?;

        let config = self.net.validator_config(validator_id)?;
        let mut cost = ACCOUNT_MIN_BALANCE + box_mbr(STAKERS_BOX_BYTES);
        if key.pool_id == 1 && config.has_reward_token() {
            cost += ASSET_HOLDING_MBR;
        }
        let pool_address = self.net.pool(key.pool_app_id)?.address;
        self.net.init_pool_storage(
            owner,
            key.pool_app_id,
            Payment {
                sender: owner,
                receiver: pool_address,
                amount: cost,
            },
        )?;
        Ok(key)
    }

    /// Owner + validator + one initialized pool, ready to take stake.
    pub fn bootstrap_validator(&mut self, config: ValidatorConfig) -> (Address, u64, PoolKey) {
        let owner = self.account();
        let validator_id = self
            .add_validator(owner, config)
            .expect("harness validator config must validate");
        let key = self
            .add_pool(owner, validator_id)
            .expect("harness pool bootstrap must succeed");
        tracing::debug!(validator_id, pool_app_id = key.pool_app_id, "validator bootstrapped");
        (owner, validator_id, key)
    }

    /// Place stake with a validator.
    pub fn stake(
        &mut self,
        staker: Address,
        validator_id: u64,
        amount: u64,
    ) -> ProtocolResult<PoolKey> {
        let payment = self.registry_payment(staker, amount);
        self.net.add_stake(staker, payment, validator_id)
    }

    /// Simulate block-reward income landing on the pool's account.
    pub fn simulate_rewards(&mut self, key: PoolKey, amount: u64) {
        let pool_address = self
            .net
            .pool(key.pool_app_id)
            .expect("pool must exist to receive rewards")
            .address;
        self.net.ledger_mut().fund(pool_address, amount);
    }

    /// Advance past one full epoch plus the stake-visibility delay, so
    /// stakers placed at the epoch start count as full-epoch.
    pub fn advance_full_epoch(&mut self, validator_id: u64) {
        let config = self
            .net
            .validator_config(validator_id)
            .expect("validator must exist");
        let delay = openstake_types::constants::ENTRY_TIME_DELAY_SECS;
        self.net.ledger_mut().advance_time(config.epoch_secs() + delay);
    }
}
