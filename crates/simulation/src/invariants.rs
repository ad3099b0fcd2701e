//! Whole-network conservation and membership checks.
//!
//! Run after every mutation in the integration scenarios: stake
//! conservation across registry aggregates, summary rows, and pool
//! ledgers; pool-set membership consistency in both directions; token
//! holdback accounting against pool #1's custody.

use openstake_protocol::Network;
use openstake_types::PoolKey;

/// Assert the cross-component invariants over the whole network.
///
/// Panics with a descriptive message on the first violation; intended for
/// use inside tests.
pub fn check_invariants(net: &Network) {
    let registry = net.registry();

    for validator_id in 1..=registry.num_validators() {
        let info = registry
            .validator(validator_id)
            .expect("validator ids are dense");
        let config = &info.config;

        let mut sum_pool_stake: u64 = 0;
        let mut sum_pool_stakers: u64 = 0;
        let mut sum_token_pending: u64 = 0;

        for (index, summary) in info.pools.iter().enumerate() {
            let pool_id = index as u64 + 1;
            let pool = net
                .pool(summary.pool_app_id)
                .expect("summary row references a live pool");

            // Registry row and pool self-report agree on identity.
            assert_eq!(pool.validator_id, validator_id, "pool self-reported validator");
            assert_eq!(pool.pool_id, pool_id, "pool self-reported pool id");

            if !pool.is_initialized() {
                assert_eq!(summary.total_stakers, 0, "uninitialized pool with stakers");
                assert_eq!(summary.total_algo_staked, 0, "uninitialized pool with stake");
                continue;
            }
            let slots = pool.stakers().expect("initialized pool has a ledger");

            let mut ledger_stake: u64 = 0;
            let mut occupied: u64 = 0;
            for slot in slots.iter().filter(|s| !s.is_empty()) {
                occupied += 1;
                ledger_stake += slot.balance;
                sum_token_pending += slot.reward_token_balance;
                assert!(
                    slot.balance >= config.min_entry_stake,
                    "occupied slot below minimum entry stake"
                );
                let key = PoolKey {
                    validator_id,
                    pool_id,
                    pool_app_id: summary.pool_app_id,
                };
                assert!(
                    net.staked_pools(slot.account).contains(&key),
                    "ledger slot without matching pool-set entry"
                );
            }

            assert_eq!(pool.num_stakers, occupied, "pool staker count drift");
            assert_eq!(pool.total_algo_staked, ledger_stake, "pool stake total drift");
            assert_eq!(
                summary.total_stakers as u64, occupied,
                "summary staker count drift"
            );
            assert_eq!(
                summary.total_algo_staked, ledger_stake,
                "summary stake total drift"
            );
            assert!(
                pool.total_algo_staked <= config.max_algo_per_pool,
                "pool above its stake cap"
            );

            sum_pool_stake += ledger_stake;
            sum_pool_stakers += occupied;
        }

        assert_eq!(
            info.state.total_algo_staked, sum_pool_stake,
            "validator stake aggregate drift"
        );
        assert_eq!(
            info.state.total_stakers, sum_pool_stakers,
            "validator staker aggregate drift"
        );
        assert_eq!(
            info.state.reward_token_held_back, sum_token_pending,
            "token holdback does not match pending balances"
        );

        if config.has_reward_token() {
            if let Some(primary) = info.pools.first() {
                let pool1 = net
                    .pool(primary.pool_app_id)
                    .expect("primary pool referenced by summary");
                let custody = net
                    .ledger()
                    .asset_balance(pool1.address, config.reward_token_id)
                    .unwrap_or(0);
                assert!(
                    info.state.reward_token_held_back <= custody,
                    "token holdback exceeds pool #1 custody"
                );
            }
        }
    }

    // Converse membership: every pool-set entry points at an occupied
    // slot, and a staker holds at most one pool per validator.
    for (staker, set) in registry.pool_sets() {
        let mut validators_seen = Vec::new();
        for key in set.iter().filter(|k| !k.is_empty()) {
            assert!(
                !validators_seen.contains(&key.validator_id),
                "staker bound to two pools of one validator"
            );
            validators_seen.push(key.validator_id);

            let pool = net
                .pool(key.pool_app_id)
                .expect("pool-set entry references a live pool");
            let occupied = pool
                .stakers()
                .expect("pool-set entry references an initialized pool")
                .iter()
                .any(|s| !s.is_empty() && s.account == *staker);
            assert!(occupied, "pool-set entry without a ledger slot");
        }
    }
}
