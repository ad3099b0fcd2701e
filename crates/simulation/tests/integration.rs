//! End-to-end protocol scenarios driven through the simulation harness.

use openstake_ledger::FEE_SINK;
use openstake_protocol::{
    mbr_amounts, CapacityError, ProtocolError, TimingError,
};
use openstake_simulation::{check_invariants, SimHarness, StaticNamingService};
use openstake_types::constants::MICRO_UNIT;
use openstake_types::{Address, EntryGating};

const UNIT: u64 = MICRO_UNIT;

fn commission_account() -> Address {
    Address([0xEE; 32])
}

#[test]
fn commission_and_single_staker_full_epoch() {
    let mut sim = SimHarness::new();
    let commission = commission_account();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission));

    let staker = sim.account();
    sim.stake(staker, validator_id, 1_000 * UNIT).unwrap();
    check_invariants(&sim.net);

    let deposit = mbr_amounts().add_staker_mbr;
    let staked = 1_000 * UNIT - deposit;
    assert_eq!(
        sim.net.pool(key.pool_app_id).unwrap().total_algo_staked,
        staked
    );

    sim.simulate_rewards(key, 100 * UNIT);
    sim.advance_full_epoch(validator_id);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();

    // 5% commission on the 100-unit reward, the rest compounds.
    assert_eq!(sim.net.ledger().balance(commission), 5 * UNIT);
    let pool = sim.net.pool(key.pool_app_id).unwrap();
    assert_eq!(pool.total_algo_staked, staked + 95 * UNIT);
    let slot = pool.stakers().unwrap()[0];
    assert_eq!(slot.balance, staked + 95 * UNIT);
    assert_eq!(slot.total_rewarded, 95 * UNIT);
    assert_eq!(
        sim.net.validator_state(validator_id).unwrap().total_algo_staked,
        staked + 95 * UNIT
    );
    check_invariants(&sim.net);
}

#[test]
fn partial_epoch_staker_gets_time_weighted_share() {
    let mut sim = SimHarness::new();
    let mut config = SimHarness::default_config(commission_account());
    config.pct_to_validator = 10_000; // 1%
    let (_owner, validator_id, key) = sim.bootstrap_validator(config);

    let alice = sim.account();
    let bob = sim.account();
    let deposit = mbr_amounts().add_staker_mbr;
    let weight = 1_000 * UNIT - deposit;

    // Alice stakes at epoch start, Bob half an epoch later.
    sim.stake(alice, validator_id, 1_000 * UNIT).unwrap();
    sim.net.ledger_mut().advance_time(1_800);
    sim.stake(bob, validator_id, 1_000 * UNIT).unwrap();
    sim.simulate_rewards(key, 100 * UNIT);

    // Land exactly at epoch end with Alice's entry delay fully elapsed:
    // Alice is full-epoch, Bob sat for half the epoch.
    sim.net.ledger_mut().advance_time(2_696);
    sim.net.epoch_balance_update(alice, key.pool_app_id).unwrap();

    assert_eq!(sim.net.ledger().balance(commission_account()), UNIT);
    let slots = sim.net.pool(key.pool_app_id).unwrap().stakers().unwrap().to_vec();
    let alice_slot = slots.iter().find(|s| s.account == alice).unwrap();
    let bob_slot = slots.iter().find(|s| s.account == bob).unwrap();

    // Bob: 99 × w × 500 / (2w × 1000) = 24.75 units; Alice takes the
    // 74.25-unit residual over the full-epoch stake.
    assert_eq!(bob_slot.balance, weight + 24_750_000);
    assert_eq!(alice_slot.balance, weight + 74_250_000);
    assert!(alice_slot.total_rewarded >= bob_slot.total_rewarded);
    check_invariants(&sim.net);
}

#[test]
fn stake_that_fits_no_pool_is_rejected_without_effects() {
    let mut sim = SimHarness::new();
    let mut config = SimHarness::default_config(commission_account());
    config.max_algo_per_pool = 10 * UNIT;
    let (_owner, validator_id, key) = sim.bootstrap_validator(config);

    let alice = sim.account();
    let bob = sim.account();
    sim.stake(alice, validator_id, 8 * UNIT).unwrap();

    let bob_balance = sim.net.ledger().balance(bob);
    let state_before = sim.net.validator_state(validator_id).unwrap();
    let err = sim.stake(bob, validator_id, 3 * UNIT).unwrap_err();
    assert_eq!(err, ProtocolError::Capacity(CapacityError::NoPoolAvailable));

    // No partial effects: payment unwound, no membership, no counters.
    assert_eq!(sim.net.ledger().balance(bob), bob_balance);
    assert!(sim.net.staked_pools(bob).is_empty());
    assert_eq!(sim.net.validator_state(validator_id).unwrap(), state_before);
    assert_eq!(
        sim.net.pool(key.pool_app_id).unwrap().num_stakers,
        1
    );
    check_invariants(&sim.net);
}

#[test]
fn over_cap_validator_rewards_redirect_to_fee_sink() {
    let mut sim = SimHarness::new();
    let commission = commission_account();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission));

    let staker = sim.account();
    sim.stake(staker, validator_id, 1_000 * UNIT).unwrap();
    let staked = sim.net.pool(key.pool_app_id).unwrap().total_algo_staked;

    // Online stake of 1000 units caps any validator at 100; this one
    // holds ~1000.
    sim.net.ledger_mut().set_online_stake(1_000 * UNIT);
    sim.simulate_rewards(key, 50 * UNIT);
    sim.advance_full_epoch(validator_id);

    let sink_before = sim.net.ledger().balance(FEE_SINK);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();

    assert_eq!(sim.net.ledger().balance(FEE_SINK), sink_before + 50 * UNIT);
    assert_eq!(sim.net.ledger().balance(commission), 0);
    let pool = sim.net.pool(key.pool_app_id).unwrap();
    assert_eq!(pool.total_algo_staked, staked);
    assert_eq!(pool.stakers().unwrap()[0].balance, staked);
    check_invariants(&sim.net);
}

#[test]
fn token_rewards_split_across_pools_and_route_through_primary() {
    const TOKEN: u64 = 4_242;
    let mut sim = SimHarness::new();
    let mut config = SimHarness::default_config(commission_account());
    config.reward_token_id = TOKEN;
    config.reward_per_payout = 1_000;
    config.max_algo_per_pool = 100 * UNIT;
    let (owner, validator_id, key1) = sim.bootstrap_validator(config);
    let key2 = sim.add_pool(owner, validator_id).unwrap();
    assert_eq!(key2.pool_id, 2);

    let pool1_address = sim.net.pool(key1.pool_app_id).unwrap().address;
    sim.net
        .ledger_mut()
        .mint_asset(pool1_address, TOKEN, 1_000_000)
        .unwrap();

    let alice = sim.account();
    let bob = sim.account();
    sim.net.ledger_mut().opt_in_asset(alice, TOKEN).unwrap();
    sim.net.ledger_mut().opt_in_asset(bob, TOKEN).unwrap();

    // Equal stakes; the first fills pool 1, the second rolls to pool 2.
    let placed1 = sim.stake(alice, validator_id, 100 * UNIT).unwrap();
    let placed2 = sim.stake(bob, validator_id, 100 * UNIT).unwrap();
    assert_eq!(placed1, key1);
    assert_eq!(placed2, key2);

    sim.advance_full_epoch(validator_id);

    // Pool 2 settles first: its payout fetches the ratio snapshot through
    // pool #1's proxy.
    sim.net.epoch_balance_update(bob, key2.pool_app_id).unwrap();
    let ratio = sim.net.registry().token_ratio(validator_id).unwrap();
    assert_eq!(ratio.pool_pct_of_whole, vec![500_000, 500_000]);
    assert_eq!(
        sim.net
            .validator_state(validator_id)
            .unwrap()
            .reward_token_held_back,
        500
    );

    sim.net.epoch_balance_update(alice, key1.pool_app_id).unwrap();
    assert_eq!(
        sim.net
            .validator_state(validator_id)
            .unwrap()
            .reward_token_held_back,
        1_000
    );
    let pool1 = sim.net.pool(key1.pool_app_id).unwrap();
    let pool2 = sim.net.pool(key2.pool_app_id).unwrap();
    assert_eq!(pool1.stakers().unwrap()[0].reward_token_balance, 500);
    assert_eq!(pool2.stakers().unwrap()[0].reward_token_balance, 500);
    check_invariants(&sim.net);

    // Bob unstakes from the non-primary pool: the registry routes the
    // token transfer out of pool #1's custody.
    sim.net.remove_stake(bob, key2.pool_app_id, 0).unwrap();
    assert_eq!(sim.net.ledger().asset_balance(bob, TOKEN), Some(500));
    assert_eq!(
        sim.net.ledger().asset_balance(pool1_address, TOKEN),
        Some(999_500)
    );
    assert_eq!(
        sim.net
            .validator_state(validator_id)
            .unwrap()
            .reward_token_held_back,
        500
    );
    assert!(sim.net.staked_pools(bob).is_empty());
    check_invariants(&sim.net);

    // Alice claims from the primary pool directly, stake untouched.
    let alice_stake = sim.net.pool(key1.pool_app_id).unwrap().stakers().unwrap()[0].balance;
    sim.net.claim_tokens(alice, key1.pool_app_id).unwrap();
    assert_eq!(sim.net.ledger().asset_balance(alice, TOKEN), Some(500));
    assert_eq!(
        sim.net
            .validator_state(validator_id)
            .unwrap()
            .reward_token_held_back,
        0
    );
    assert_eq!(
        sim.net.pool(key1.pool_app_id).unwrap().stakers().unwrap()[0].balance,
        alice_stake
    );
    check_invariants(&sim.net);
}

#[test]
fn early_payout_is_rejected_and_last_payout_is_monotone() {
    let mut sim = SimHarness::new();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission_account()));

    let staker = sim.account();
    sim.stake(staker, validator_id, 1_000 * UNIT).unwrap();
    sim.simulate_rewards(key, 100 * UNIT);
    sim.advance_full_epoch(validator_id);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();

    let last_payout = sim.net.pool(key.pool_app_id).unwrap().last_payout;
    let state = sim.net.validator_state(validator_id).unwrap();

    // One second short of the next epoch.
    sim.net.ledger_mut().advance_time(3_599);
    let err = sim
        .net
        .epoch_balance_update(staker, key.pool_app_id)
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::Timing(TimingError::EpochTooEarly { remaining_secs: 1 })
    );
    assert_eq!(sim.net.pool(key.pool_app_id).unwrap().last_payout, last_payout);
    assert_eq!(sim.net.validator_state(validator_id).unwrap(), state);

    // The boundary second plus fresh rewards settles fine.
    sim.net.ledger_mut().advance_time(1);
    sim.simulate_rewards(key, 10 * UNIT);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();
    let next = sim.net.pool(key.pool_app_id).unwrap().last_payout;
    assert!(next > last_payout);
    assert!(next - last_payout >= 3_600);
    check_invariants(&sim.net);
}

#[test]
fn stake_unstake_round_trip_restores_everything() {
    let mut sim = SimHarness::new();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission_account()));

    let staker = sim.account();
    sim.stake(staker, validator_id, 5 * UNIT).unwrap();
    let balance_after_stake = sim.net.ledger().balance(staker);
    let deposit = mbr_amounts().add_staker_mbr;

    sim.net.remove_stake(staker, key.pool_app_id, 0).unwrap();

    // The staker gets back everything that reached the pool; the one-time
    // storage deposit stays with the registry.
    assert_eq!(
        sim.net.ledger().balance(staker),
        balance_after_stake + 5 * UNIT - deposit
    );
    let pool = sim.net.pool(key.pool_app_id).unwrap();
    assert_eq!(pool.num_stakers, 0);
    assert_eq!(pool.total_algo_staked, 0);
    assert!(pool.stakers().unwrap().iter().all(|s| s.is_empty()));
    assert!(sim.net.staked_pools(staker).is_empty());
    let state = sim.net.validator_state(validator_id).unwrap();
    assert_eq!(state.total_stakers, 0);
    assert_eq!(state.total_algo_staked, 0);
    check_invariants(&sim.net);
}

#[test]
fn partial_unstake_keeps_membership() {
    let mut sim = SimHarness::new();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission_account()));

    let staker = sim.account();
    sim.stake(staker, validator_id, 10 * UNIT).unwrap();
    sim.net.remove_stake(staker, key.pool_app_id, 4 * UNIT).unwrap();

    assert_eq!(sim.net.staked_pools(staker), vec![key]);
    assert_eq!(sim.net.pool(key.pool_app_id).unwrap().num_stakers, 1);
    check_invariants(&sim.net);

    // A second stake placement comes back to the same pool without a new
    // storage deposit.
    let placed = sim.stake(staker, validator_id, 2 * UNIT).unwrap();
    assert_eq!(placed, key);
    assert_eq!(sim.net.validator_state(validator_id).unwrap().total_stakers, 1);
    check_invariants(&sim.net);
}

#[test]
fn staker_pool_set_capacity_is_enforced() {
    let mut sim = SimHarness::new();
    let staker = sim.account();

    let mut keys = Vec::new();
    for _ in 0..5 {
        let (_owner, validator_id, key) =
            sim.bootstrap_validator(SimHarness::default_config(commission_account()));
        keys.push((validator_id, key));
    }

    for (validator_id, _key) in keys.iter().take(4) {
        sim.stake(staker, *validator_id, 2 * UNIT).unwrap();
    }
    let (fifth_validator, _) = keys[4];
    let err = sim.stake(staker, fifth_validator, 2 * UNIT).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::Capacity(CapacityError::StakerPoolSetFull)
    );
    assert_eq!(sim.net.staked_pools(staker).len(), 4);
    check_invariants(&sim.net);
}

#[test]
fn fees_are_charged_per_inner_transaction() {
    let mut sim = SimHarness::new();
    let (_owner, validator_id, _key) =
        sim.bootstrap_validator(SimHarness::default_config(commission_account()));
    let staker = sim.account();

    sim.net.ledger_mut().set_base_fee(1_000);
    let sink_before = sim.net.ledger().balance(FEE_SINK);
    sim.stake(staker, validator_id, 10 * UNIT).unwrap();

    // addStake forwards one payment and makes one pool call: base fee
    // times (1 + 2).
    assert_eq!(sim.net.ledger().balance(FEE_SINK), sink_before + 3_000);
}

#[test]
fn asset_gate_blocks_stakers_without_the_asset() {
    const GATE_ASSET: u64 = 777;
    let mut sim = SimHarness::new();
    let mut config = SimHarness::default_config(commission_account());
    config.entry_gating = EntryGating::AssetRequired {
        asset_ids: vec![GATE_ASSET],
        min_balance: 10,
    };
    let (_owner, validator_id, _key) = sim.bootstrap_validator(config);

    let staker = sim.account();
    let err = sim.stake(staker, validator_id, 2 * UNIT).unwrap_err();
    assert!(matches!(err, ProtocolError::GateNotSatisfied(_)));

    sim.net.ledger_mut().opt_in_asset(staker, GATE_ASSET).unwrap();
    sim.net.ledger_mut().mint_asset(staker, GATE_ASSET, 10).unwrap();
    sim.stake(staker, validator_id, 2 * UNIT).unwrap();
    check_invariants(&sim.net);
}

#[test]
fn allow_list_gate_admits_only_listed_addresses() {
    let mut sim = SimHarness::new();
    let listed = sim.account();
    let unlisted = sim.account();
    let mut config = SimHarness::default_config(commission_account());
    config.entry_gating = EntryGating::AddressAllowList {
        addresses: vec![listed],
    };
    let (_owner, validator_id, _key) = sim.bootstrap_validator(config);

    sim.stake(listed, validator_id, 2 * UNIT).unwrap();
    let err = sim.stake(unlisted, validator_id, 2 * UNIT).unwrap_err();
    assert!(matches!(err, ProtocolError::GateNotSatisfied(_)));
    check_invariants(&sim.net);
}

#[test]
fn naming_service_gate_consults_the_collaborator() {
    let creator = Address([0xCE; 32]);
    let mut naming = StaticNamingService::default();
    let mut sim = {
        // The named staker is known up front so the collaborator can be
        // seeded before deployment.
        let named = {
            let mut bytes = [0xAC; 32];
            bytes[..8].copy_from_slice(&1u64.to_be_bytes());
            Address(bytes)
        };
        naming.names_by_creator.push((named, creator));
        SimHarness::with_naming(naming)
    };

    let named = sim.account();
    let unnamed = sim.account();
    let mut config = SimHarness::default_config(commission_account());
    config.entry_gating = EntryGating::NamingServiceCreator { creator };
    let (_owner, validator_id, _key) = sim.bootstrap_validator(config);

    sim.stake(named, validator_id, 2 * UNIT).unwrap();
    let err = sim.stake(unnamed, validator_id, 2 * UNIT).unwrap_err();
    assert!(matches!(err, ProtocolError::GateNotSatisfied(_)));
    check_invariants(&sim.net);
}

#[test]
fn rewards_compound_across_epochs() {
    let mut sim = SimHarness::new();
    let (_owner, validator_id, key) =
        sim.bootstrap_validator(SimHarness::default_config(commission_account()));

    let staker = sim.account();
    sim.stake(staker, validator_id, 1_000 * UNIT).unwrap();
    let deposit = mbr_amounts().add_staker_mbr;
    let staked = 1_000 * UNIT - deposit;

    sim.simulate_rewards(key, 100 * UNIT);
    sim.advance_full_epoch(validator_id);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();
    check_invariants(&sim.net);

    sim.simulate_rewards(key, 100 * UNIT);
    sim.net.ledger_mut().advance_time(3_600);
    sim.net.epoch_balance_update(staker, key.pool_app_id).unwrap();

    // Two epochs of 95 units each land on the same slot.
    let slot = sim.net.pool(key.pool_app_id).unwrap().stakers().unwrap()[0];
    assert_eq!(slot.balance, staked + 190 * UNIT);
    assert_eq!(slot.total_rewarded, 190 * UNIT);
    check_invariants(&sim.net);
}
