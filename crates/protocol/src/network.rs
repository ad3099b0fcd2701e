//! The network dispatcher.
//!
//! Owns the ledger, the registry, and every pool instance, and routes the
//! cross-contract protocol between them: registry-to-pool stake forwarding,
//! pool-to-registry reporting, and the token-ratio proxy through pool #1.
//!
//! Every public operation executes atomically: on any error the pre-call
//! snapshot of ledger, registry, and pool state is restored, mirroring the
//! platform's whole-group rollback.

use std::collections::BTreeMap;
use std::fmt;

use openstake_ledger::{
    box_mbr, Ledger, ParticipationKeys, Payment, ACCOUNT_MIN_BALANCE, ASSET_HOLDING_MBR, FEE_SINK,
};
use openstake_types::constants::{MAX_VALIDATOR_PCT_OF_ONLINE_TENTHS, TOKEN_RATIO_SCALE};
use openstake_types::{
    Address, PoolKey, PoolSummary, PoolTokenPayoutRatio, ValidatorConfig, ValidatorState,
};

use crate::auth::verify_pool_caller;
use crate::error::{
    AuthError, CapacityError, ConfigError, PaymentError, ProtocolError, ProtocolResult,
};
use crate::math::mul_div;
use crate::payout::{compute_payout, PayoutInputs};
use crate::pool::{PoolState, STAKERS_BOX_BYTES};
use crate::registry::{check_entry_gating, mbr_amounts, RegistryState};
use crate::{NamingService, NullNamingService};

/// The deployed protocol: ledger substrate, registry, and pools.
pub struct Network {
    ledger: Ledger,
    registry: RegistryState,
    pools: BTreeMap<u64, PoolState>,
    naming: Box<dyn NamingService>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("registry", &self.registry)
            .field("pools", &self.pools)
            .finish()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Deploy a fresh protocol instance: registry app, pool template, and
    /// bootstrap funding for the registry account's base minimum balance.
    pub fn new() -> Self {
        let mut ledger = Ledger::new();
        let (registry_app_id, registry_address) = ledger.create_app();
        ledger.fund(registry_address, ACCOUNT_MIN_BALANCE);
        let (template_app_id, _) = ledger.create_app();
        let registry = RegistryState::new(registry_app_id, registry_address, template_app_id);
        tracing::info!(registry_app_id, template_app_id, "protocol deployed");
        Self {
            ledger,
            registry,
            pools: BTreeMap::new(),
            naming: Box::new(NullNamingService),
        }
    }

    /// Replace the naming-service collaborator.
    pub fn with_naming(mut self, naming: Box<dyn NamingService>) -> Self {
        self.naming = naming;
        self
    }

    /// The ledger substrate.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The ledger substrate, mutable (time travel, funding, online stake).
    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// The registry state.
    pub fn registry(&self) -> &RegistryState {
        &self.registry
    }

    /// A pool instance by app id.
    pub fn pool(&self, pool_app_id: u64) -> ProtocolResult<&PoolState> {
        self.pools
            .get(&pool_app_id)
            .ok_or(ProtocolError::UnknownPool(pool_app_id))
    }

    /// The pools a staker currently participates in.
    pub fn staked_pools(&self, staker: Address) -> Vec<PoolKey> {
        self.registry
            .pool_set(staker)
            .map(|set| set.iter().copied().filter(|k| !k.is_empty()).collect())
            .unwrap_or_default()
    }

    /// A validator's configuration.
    pub fn validator_config(&self, validator_id: u64) -> ProtocolResult<ValidatorConfig> {
        Ok(self.registry.validator(validator_id)?.config.clone())
    }

    /// A validator's aggregate state.
    pub fn validator_state(&self, validator_id: u64) -> ProtocolResult<ValidatorState> {
        Ok(self.registry.validator(validator_id)?.state)
    }

    /// A validator's owner and manager.
    pub fn validator_owner_and_manager(
        &self,
        validator_id: u64,
    ) -> ProtocolResult<(Address, Address)> {
        let validator = self.registry.validator(validator_id)?;
        Ok((validator.owner, validator.manager))
    }

    /// A validator's pool summary rows.
    pub fn validator_pools(&self, validator_id: u64) -> ProtocolResult<Vec<PoolSummary>> {
        Ok(self.registry.validator(validator_id)?.pools.clone())
    }

    /// The app id of one of a validator's pools.
    pub fn pool_app_id(&self, validator_id: u64, pool_id: u64) -> ProtocolResult<u64> {
        let validator = self.registry.validator(validator_id)?;
        pool_id
            .checked_sub(1)
            .and_then(|i| validator.pools.get(i as usize))
            .map(|summary| summary.pool_app_id)
            .ok_or(ProtocolError::UnknownPool(pool_id))
    }

    /// Run an operation atomically: restore the pre-call snapshot on error.
    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ProtocolResult<T>,
    ) -> ProtocolResult<T> {
        let ledger = self.ledger.clone();
        let registry = self.registry.clone();
        let pools = self.pools.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.ledger = ledger;
                self.registry = registry;
                self.pools = pools;
                Err(err)
            }
        }
    }

    fn verify_payment(
        payment: &Payment,
        expected_sender: Address,
        expected_receiver: Address,
        expected_amount: u64,
    ) -> ProtocolResult<()> {
        if payment.sender != expected_sender {
            return Err(PaymentError::WrongSender {
                expected: expected_sender,
                actual: payment.sender,
            }
            .into());
        }
        if payment.receiver != expected_receiver {
            return Err(PaymentError::WrongReceiver {
                expected: expected_receiver,
                actual: payment.receiver,
            }
            .into());
        }
        if payment.amount != expected_amount {
            return Err(PaymentError::WrongAmount {
                expected: expected_amount,
                actual: payment.amount,
            }
            .into());
        }
        Ok(())
    }

    fn owner_or_manager_of(&self, validator_id: u64, sender: Address) -> ProtocolResult<()> {
        let validator = self.registry.validator(validator_id)?;
        if sender != validator.owner && sender != validator.manager {
            return Err(AuthError::NotOwnerOrManager.into());
        }
        Ok(())
    }

    /// Register a validator. The accompanying payment must carry exactly
    /// the validator-record storage deposit to the registry.
    pub fn add_validator(
        &mut self,
        sender: Address,
        mbr_payment: Payment,
        owner: Address,
        manager: Address,
        nfd_app_id: u64,
        config: ValidatorConfig,
    ) -> ProtocolResult<u64> {
        self.transact(|net| {
            let mbr = mbr_amounts();
            Self::verify_payment(&mbr_payment, sender, net.registry.address, mbr.add_validator_mbr)?;
            if nfd_app_id != 0 && !net.naming.is_owned_by(nfd_app_id, owner) {
                return Err(ConfigError::NamingLinkRejected(nfd_app_id).into());
            }
            net.ledger
                .pay(mbr_payment.sender, mbr_payment.receiver, mbr_payment.amount)?;
            let validator_id = net.registry.add_validator(owner, manager, nfd_app_id, config)?;
            net.ledger
                .raise_min_balance(net.registry.address, mbr.add_validator_mbr)?;
            net.ledger.charge_fee(sender, 0)?;
            Ok(validator_id)
        })
    }

    /// Instantiate a new pool for a validator on the given node.
    pub fn add_pool(
        &mut self,
        sender: Address,
        mbr_payment: Payment,
        validator_id: u64,
        node_id: u16,
    ) -> ProtocolResult<PoolKey> {
        self.transact(|net| {
            net.owner_or_manager_of(validator_id, sender)?;
            let config = net.registry.validator(validator_id)?.config.clone();
            let mbr = mbr_amounts();
            Self::verify_payment(&mbr_payment, sender, net.registry.address, mbr.add_pool_mbr)?;
            net.ledger
                .pay(mbr_payment.sender, mbr_payment.receiver, mbr_payment.amount)?;

            let (pool_app_id, pool_address) = net.ledger.create_app();
            let key = net.registry.record_new_pool(validator_id, node_id, pool_app_id)?;
            let pool = PoolState::create(
                pool_app_id,
                pool_address,
                net.registry.app_id,
                validator_id,
                key.pool_id,
                config.min_entry_stake,
                config.max_algo_per_pool,
            )?;
            net.pools.insert(pool_app_id, pool);
            net.ledger
                .raise_min_balance(net.registry.address, mbr.add_pool_mbr)?;
            net.ledger.charge_fee(sender, 1)?;
            Ok(key)
        })
    }

    /// Allocate a pool's staker ledger.
    ///
    /// The payment must cover the pool account's base minimum balance, the
    /// ledger box, and (for a primary pool with a reward token) the asset
    /// holding.
    pub fn init_pool_storage(
        &mut self,
        sender: Address,
        pool_app_id: u64,
        mbr_payment: Payment,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            if pool.is_initialized() {
                return Err(ProtocolError::StorageAlreadyInitialized);
            }
            let pool_address = pool.address;
            let is_primary = pool.is_primary();
            let validator_id = pool.validator_id;
            let config = net.registry.validator(validator_id)?.config.clone();

            let opts_into_token = is_primary && config.has_reward_token();
            let mut required = ACCOUNT_MIN_BALANCE + box_mbr(STAKERS_BOX_BYTES);
            if opts_into_token {
                required += ASSET_HOLDING_MBR;
            }
            Self::verify_payment(&mbr_payment, sender, pool_address, required)?;
            net.ledger
                .pay(mbr_payment.sender, mbr_payment.receiver, mbr_payment.amount)?;

            let now = net.ledger.now();
            net.pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .init_storage(now)?;
            net.ledger
                .raise_min_balance(pool_address, box_mbr(STAKERS_BOX_BYTES))?;
            let mut inner = 0;
            if opts_into_token {
                net.ledger.opt_in_asset(pool_address, config.reward_token_id)?;
                inner = 1;
            }
            tracing::info!(pool_app_id, validator_id, "pool storage initialized");
            net.ledger.charge_fee(sender, inner)?;
            Ok(())
        })
    }

    /// Place stake with a validator.
    ///
    /// The registry selects a pool, deducts the one-time staker storage
    /// deposit for first-time stakers, forwards the remainder to the pool,
    /// and folds the pool's post-call snapshot into its aggregates.
    pub fn add_stake(
        &mut self,
        sender: Address,
        staked_amount_payment: Payment,
        validator_id: u64,
    ) -> ProtocolResult<PoolKey> {
        self.transact(|net| {
            if staked_amount_payment.sender != sender {
                return Err(PaymentError::WrongSender {
                    expected: sender,
                    actual: staked_amount_payment.sender,
                }
                .into());
            }
            if staked_amount_payment.receiver != net.registry.address {
                return Err(PaymentError::WrongReceiver {
                    expected: net.registry.address,
                    actual: staked_amount_payment.receiver,
                }
                .into());
            }
            let config = net.registry.validator(validator_id)?.config.clone();
            check_entry_gating(&config, sender, &net.ledger, net.naming.as_ref())?;

            let amount = staked_amount_payment.amount;
            let key = net.registry.find_pool_for_staker(validator_id, sender, amount)?;
            if key.is_empty() {
                return Err(CapacityError::NoPoolAvailable.into());
            }
            net.ledger.pay(
                staked_amount_payment.sender,
                staked_amount_payment.receiver,
                amount,
            )?;

            let new_staker_set = net.registry.ensure_pool_set(sender);
            let deposit = if new_staker_set {
                mbr_amounts().add_staker_mbr
            } else {
                0
            };
            net.registry.add_to_pool_set(sender, key)?;
            if deposit > 0 {
                net.ledger.raise_min_balance(net.registry.address, deposit)?;
            }
            let forwarded = amount.checked_sub(deposit).ok_or(ProtocolError::Overflow)?;

            let pool_address = net.pool(key.pool_app_id)?.address;
            let registry_address = net.registry.address;
            let inner_payment = net.ledger.pay(registry_address, pool_address, forwarded)?;

            let stakers_before = net.pool(key.pool_app_id)?.num_stakers;
            net.pool_add_stake(registry_address, key.pool_app_id, inner_payment, sender)?;

            let pool = net.pool(key.pool_app_id)?;
            let new_staker = pool.num_stakers > stakers_before;
            let (num_stakers, total_staked) = (pool.num_stakers, pool.total_algo_staked);
            net.registry
                .record_stake_added(key, num_stakers, total_staked, new_staker, forwarded)?;

            tracing::info!(
                validator_id,
                pool_id = key.pool_id,
                staker = %sender,
                amount = forwarded,
                new_staker,
                "stake added"
            );
            net.ledger.charge_fee(sender, 2)?;
            Ok(key)
        })
    }

    /// Pool-side stake recording; callable only by the registry with the
    /// forwarded payment.
    pub fn pool_add_stake(
        &mut self,
        caller: Address,
        pool_app_id: u64,
        inner_payment: Payment,
        staker: Address,
    ) -> ProtocolResult<u64> {
        self.transact(|net| {
            let registry_address = net.registry.address;
            if caller != registry_address {
                return Err(AuthError::NotRegistry(caller).into());
            }
            let pool = net
                .pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?;
            if inner_payment.sender != registry_address || inner_payment.receiver != pool.address {
                return Err(PaymentError::WrongReceiver {
                    expected: pool.address,
                    actual: inner_payment.receiver,
                }
                .into());
            }
            let now = net.ledger.now();
            pool.add_stake(staker, inner_payment.amount, now)
        })
    }

    /// Unstake from a pool; `amount = 0` unstakes everything.
    pub fn remove_stake(
        &mut self,
        sender: Address,
        pool_app_id: u64,
        amount: u64,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            let key = pool.pool_key();
            let pool_address = pool.address;
            let is_primary = pool.is_primary();
            let config = net.registry.validator(key.validator_id)?.config.clone();

            let outcome = net
                .pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .unstake(sender, amount)?;

            let mut inner = 1;
            if outcome.token_removed > 0 && is_primary {
                net.ledger.asset_transfer(
                    pool_address,
                    sender,
                    config.reward_token_id,
                    outcome.token_removed,
                )?;
                inner += 1;
            }
            net.ledger.pay(pool_address, sender, outcome.amount_removed)?;
            inner += 1;
            net.stake_removed(
                pool_address,
                key,
                sender,
                outcome.amount_removed,
                outcome.token_removed,
                outcome.staker_removed,
            )?;
            tracing::info!(
                pool_app_id,
                staker = %sender,
                amount = outcome.amount_removed,
                token = outcome.token_removed,
                staker_removed = outcome.staker_removed,
                "stake removed"
            );
            net.ledger.charge_fee(sender, inner)?;
            Ok(())
        })
    }

    /// Pay out the staker's pending token reward, leaving stake untouched.
    pub fn claim_tokens(&mut self, sender: Address, pool_app_id: u64) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            let key = pool.pool_key();
            let pool_address = pool.address;
            let is_primary = pool.is_primary();
            let config = net.registry.validator(key.validator_id)?.config.clone();

            let token_removed = net
                .pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .claim_tokens(sender)?;
            if token_removed == 0 {
                return Ok(());
            }
            let mut inner = 1;
            if is_primary {
                net.ledger.asset_transfer(
                    pool_address,
                    sender,
                    config.reward_token_id,
                    token_removed,
                )?;
                inner += 1;
            }
            net.stake_removed(pool_address, key, sender, 0, token_removed, false)?;
            tracing::info!(pool_app_id, staker = %sender, token = token_removed, "tokens claimed");
            net.ledger.charge_fee(sender, inner)?;
            Ok(())
        })
    }

    /// Registry entry point: a pool reports the stake its epoch payout
    /// added and the token rewards it credited.
    pub fn stake_updated_via_rewards(
        &mut self,
        caller: Address,
        pool_key: PoolKey,
        algo_added: u64,
        token_paid_out: u64,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            verify_pool_caller(&net.registry, &net.pools, &pool_key, caller)?;
            net.registry
                .record_stake_updated_via_rewards(pool_key, algo_added, token_paid_out)
        })
    }

    /// Registry entry point: a pool reports an unstake or token claim.
    ///
    /// For a non-primary caller with a token amount, the registry routes
    /// the actual transfer out of pool #1's custody.
    pub fn stake_removed(
        &mut self,
        caller: Address,
        pool_key: PoolKey,
        staker: Address,
        amount_removed: u64,
        token_removed: u64,
        staker_removed: bool,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            verify_pool_caller(&net.registry, &net.pools, &pool_key, caller)?;
            net.registry.record_stake_removed(
                pool_key,
                staker,
                amount_removed,
                token_removed,
                staker_removed,
            )?;
            if pool_key.pool_id != 1 && token_removed > 0 {
                let validator = net.registry.validator(pool_key.validator_id)?;
                let pool1_app_id = validator
                    .pools
                    .first()
                    .map(|summary| summary.pool_app_id)
                    .ok_or_else(|| {
                        ProtocolError::Invariant("validator has no primary pool".into())
                    })?;
                let reward_token_id = validator.config.reward_token_id;
                let registry_address = net.registry.address;
                net.pay_token_reward(
                    registry_address,
                    pool1_app_id,
                    staker,
                    reward_token_id,
                    token_removed,
                )?;
            }
            Ok(())
        })
    }

    /// Primary-pool entry point: transfer token rewards out of custody.
    /// Callable only by the registry, and only on pool #1.
    pub fn pay_token_reward(
        &mut self,
        caller: Address,
        pool_app_id: u64,
        staker: Address,
        reward_token_id: u64,
        amount: u64,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            if caller != net.registry.address {
                return Err(AuthError::NotRegistry(caller).into());
            }
            let pool = net.pool(pool_app_id)?;
            if !pool.is_primary() {
                return Err(AuthError::NotPrimaryPool.into());
            }
            let pool_address = pool.address;
            net.ledger
                .asset_transfer(pool_address, staker, reward_token_id, amount)?;
            Ok(())
        })
    }

    /// Registry entry point: snapshot each pool's share of the validator's
    /// stake. Callable only by the validator's primary pool.
    pub fn set_token_payout_ratio(
        &mut self,
        caller: Address,
        validator_id: u64,
    ) -> ProtocolResult<PoolTokenPayoutRatio> {
        self.transact(|net| {
            let validator = net.registry.validator(validator_id)?;
            let pool1_app_id = validator
                .pools
                .first()
                .map(|summary| summary.pool_app_id)
                .ok_or_else(|| ProtocolError::Invariant("validator has no primary pool".into()))?;
            let pool1 = net.pool(pool1_app_id)?;
            if caller != pool1.address {
                return Err(AuthError::PoolKeyRejected(
                    "only the primary pool may snapshot the payout ratio",
                )
                .into());
            }
            let epoch_start = pool1.last_payout;
            net.registry.set_token_payout_ratio(validator_id, epoch_start)
        })
    }

    /// Pool #1 entry point: a sibling pool fetches the ratio snapshot
    /// through the primary pool.
    pub fn proxied_set_token_payout_ratio(
        &mut self,
        caller: Address,
        pool1_app_id: u64,
        caller_key: PoolKey,
    ) -> ProtocolResult<PoolTokenPayoutRatio> {
        self.transact(|net| {
            let pool1 = net.pool(pool1_app_id)?;
            if !pool1.is_primary() {
                return Err(AuthError::NotPrimaryPool.into());
            }
            if caller_key.pool_app_id == pool1_app_id
                || caller_key.validator_id != pool1.validator_id
            {
                return Err(AuthError::NotSiblingPool(caller_key.pool_app_id).into());
            }
            verify_pool_caller(&net.registry, &net.pools, &caller_key, caller)?;
            let validator_id = pool1.validator_id;
            let pool1_address = pool1.address;
            net.set_token_payout_ratio(pool1_address, validator_id)
        })
    }

    /// Settle one epoch for a pool. Anyone may call; correctness depends
    /// only on state and time.
    pub fn epoch_balance_update(&mut self, sender: Address, pool_app_id: u64) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            let key = pool.pool_key();
            let pool_address = pool.address;
            let is_primary = pool.is_primary();
            let total_staked = pool.total_algo_staked;
            if !pool.is_initialized() {
                return Err(ProtocolError::StorageNotInitialized);
            }

            let validator = net.registry.validator(key.validator_id)?;
            let config = validator.config.clone();
            let vstate = validator.state;
            let epoch_secs = config.epoch_secs();
            let now = net.ledger.now();
            pool.epoch_gate(now, epoch_secs)?;
            net.pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .last_payout = now;

            let mut inner = 0;
            let mut token_reward = 0;
            if config.has_reward_token() {
                let pool1_app_id = net
                    .registry
                    .validator(key.validator_id)?
                    .pools
                    .first()
                    .map(|summary| summary.pool_app_id)
                    .ok_or_else(|| {
                        ProtocolError::Invariant("validator has no primary pool".into())
                    })?;
                let ratio = if is_primary {
                    net.set_token_payout_ratio(pool_address, key.validator_id)?
                } else {
                    net.proxied_set_token_payout_ratio(pool_address, pool1_app_id, key)?
                };
                inner += 1;
                let pool1_address = net.pool(pool1_app_id)?.address;
                let custody = net
                    .ledger
                    .asset_balance(pool1_address, config.reward_token_id)
                    .unwrap_or(0);
                let available = custody
                    .checked_sub(vstate.reward_token_held_back)
                    .ok_or_else(|| {
                        ProtocolError::Invariant("token holdback exceeds custody balance".into())
                    })?;
                if available >= config.reward_per_payout {
                    let pct = ratio
                        .pool_pct_of_whole
                        .get(key.pool_id as usize - 1)
                        .copied()
                        .ok_or_else(|| {
                            ProtocolError::Invariant("ratio snapshot missing this pool".into())
                        })?;
                    token_reward = mul_div(config.reward_per_payout, pct, TOKEN_RATIO_SCALE)?;
                }
            }

            let online_stake = net.ledger.online_stake();
            // A zero online-stake figure means the cap is not yet known.
            let exceeds_online_cap = online_stake > 0
                && vstate.total_algo_staked
                    > mul_div(online_stake, MAX_VALIDATOR_PCT_OF_ONLINE_TENTHS, 1_000)?;

            let stakers_snapshot = net.pool(pool_app_id)?.stakers()?.to_vec();
            let inputs = PayoutInputs {
                now,
                epoch_secs,
                pct_to_validator: config.pct_to_validator,
                pool_balance: net.ledger.balance(pool_address),
                pool_min_balance: net.ledger.min_balance(pool_address),
                total_staked,
                stakers: &stakers_snapshot,
                exceeds_online_cap,
                token_reward,
            };
            let plan = compute_payout(&inputs)?;

            if plan.fee_sink_payment > 0 {
                net.ledger.pay(pool_address, FEE_SINK, plan.fee_sink_payment)?;
                inner += 1;
            }
            if plan.validator_payment > 0 {
                net.ledger
                    .pay(pool_address, config.commission_address, plan.validator_payment)?;
                inner += 1;
            }

            let pool = net
                .pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?;
            {
                let slots = pool.stakers_mut()?;
                for credit in &plan.credits {
                    let slot = &mut slots[credit.slot];
                    slot.balance = slot
                        .balance
                        .checked_add(credit.algo)
                        .ok_or(ProtocolError::Overflow)?;
                    slot.total_rewarded = slot
                        .total_rewarded
                        .checked_add(credit.algo)
                        .ok_or(ProtocolError::Overflow)?;
                    slot.reward_token_balance = slot
                        .reward_token_balance
                        .checked_add(credit.token)
                        .ok_or(ProtocolError::Overflow)?;
                }
            }
            pool.total_algo_staked = pool
                .total_algo_staked
                .checked_add(plan.increased_stake)
                .ok_or(ProtocolError::Overflow)?;

            net.stake_updated_via_rewards(
                pool_address,
                key,
                plan.increased_stake,
                plan.token_paid_out,
            )?;
            inner += 1;

            tracing::info!(
                pool_app_id,
                validator_id = key.validator_id,
                pool_id = key.pool_id,
                increased_stake = plan.increased_stake,
                validator_payment = plan.validator_payment,
                fee_sink_payment = plan.fee_sink_payment,
                token_paid_out = plan.token_paid_out,
                "epoch settled"
            );
            net.ledger.charge_fee(sender, inner)?;
            Ok(())
        })
    }

    /// Register the pool's account online with participation keys.
    pub fn go_online(
        &mut self,
        sender: Address,
        pool_app_id: u64,
        keys: ParticipationKeys,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            let pool_address = pool.address;
            net.owner_or_manager_of(pool.validator_id, sender)?;
            net.ledger.register_online(pool_address, keys)?;
            net.ledger.charge_fee(sender, 1)?;
            Ok(())
        })
    }

    /// Take the pool's account offline. The registry itself may also call
    /// this, so pools can be migrated.
    pub fn go_offline(&mut self, sender: Address, pool_app_id: u64) -> ProtocolResult<()> {
        self.transact(|net| {
            let pool = net.pool(pool_app_id)?;
            let pool_address = pool.address;
            if sender != net.registry.address {
                net.owner_or_manager_of(pool.validator_id, sender)?;
            }
            net.ledger.register_offline(pool_address)?;
            net.ledger.charge_fee(sender, 1)?;
            Ok(())
        })
    }

    /// Update the node software version advertised by a pool.
    pub fn update_algod_ver(
        &mut self,
        sender: Address,
        pool_app_id: u64,
        version: String,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let validator_id = net.pool(pool_app_id)?.validator_id;
            net.owner_or_manager_of(validator_id, sender)?;
            net.pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .algod_ver = version;
            net.ledger.charge_fee(sender, 0)?;
            Ok(())
        })
    }

    /// Link a pool to a naming-service app owned by the validator owner.
    pub fn link_pool_to_nfd(
        &mut self,
        sender: Address,
        pool_app_id: u64,
        nfd_app_id: u64,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let validator_id = net.pool(pool_app_id)?.validator_id;
            net.owner_or_manager_of(validator_id, sender)?;
            let owner = net.registry.validator(validator_id)?.owner;
            if !net.naming.is_owned_by(nfd_app_id, owner) {
                return Err(ConfigError::NamingLinkRejected(nfd_app_id).into());
            }
            net.pools
                .get_mut(&pool_app_id)
                .ok_or(ProtocolError::UnknownPool(pool_app_id))?
                .nfd_app_id = nfd_app_id;
            net.ledger.charge_fee(sender, 1)?;
            Ok(())
        })
    }

    /// Owner edit: replace the validator's manager.
    pub fn change_validator_manager(
        &mut self,
        sender: Address,
        validator_id: u64,
        new_manager: Address,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let validator = net.registry.validator_mut(validator_id)?;
            if sender != validator.owner {
                return Err(AuthError::NotOwner.into());
            }
            if new_manager.is_zero() {
                return Err(ConfigError::ZeroAddress("manager").into());
            }
            validator.manager = new_manager;
            tracing::info!(validator_id, %new_manager, "manager changed");
            net.ledger.charge_fee(sender, 0)?;
            Ok(())
        })
    }

    /// Owner edit: replace the commission address.
    pub fn change_validator_commission_address(
        &mut self,
        sender: Address,
        validator_id: u64,
        new_address: Address,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            let validator = net.registry.validator_mut(validator_id)?;
            if sender != validator.owner {
                return Err(AuthError::NotOwner.into());
            }
            if new_address.is_zero() {
                return Err(ConfigError::ZeroAddress("commission address").into());
            }
            validator.config.commission_address = new_address;
            tracing::info!(validator_id, %new_address, "commission address changed");
            net.ledger.charge_fee(sender, 0)?;
            Ok(())
        })
    }

    /// Owner/manager edit: relink the validator's naming-service app.
    pub fn change_validator_nfd(
        &mut self,
        sender: Address,
        validator_id: u64,
        nfd_app_id: u64,
    ) -> ProtocolResult<()> {
        self.transact(|net| {
            net.owner_or_manager_of(validator_id, sender)?;
            let owner = net.registry.validator(validator_id)?.owner;
            if nfd_app_id != 0 && !net.naming.is_owned_by(nfd_app_id, owner) {
                return Err(ConfigError::NamingLinkRejected(nfd_app_id).into());
            }
            net.registry.validator_mut(validator_id)?.nfd_app_id = nfd_app_id;
            net.ledger.charge_fee(sender, 0)?;
            Ok(())
        })
    }
}
