//! Cross-contract authentication.
//!
//! Every privileged inter-contract call carries a composite pool key. A
//! single check is insufficient: a malicious deployer can instantiate a
//! lookalike pool app that self-reports any identity it likes. The checks
//! here bind claim, caller, and registry-approved identity together before
//! the key is trusted.

use std::collections::BTreeMap;

use openstake_types::{Address, PoolKey};

use crate::error::{AuthError, ProtocolError, ProtocolResult};
use crate::pool::PoolState;
use crate::registry::RegistryState;

/// Verify that `sender` is the legitimate pool identified by `key`.
///
/// All four bindings must hold:
/// 1. the validator exists and the pool id is in range,
/// 2. the registry's own summary row records this app id for that pool,
/// 3. the sender is the account derived from the app id,
/// 4. the pool instance self-reports the claimed validator and pool ids.
pub fn verify_pool_caller(
    registry: &RegistryState,
    pools: &BTreeMap<u64, PoolState>,
    key: &PoolKey,
    sender: Address,
) -> ProtocolResult<()> {
    let validator = registry.validator(key.validator_id)?;
    if key.pool_id == 0 || key.pool_id > validator.state.num_pools as u64 {
        return Err(AuthError::PoolKeyRejected("pool id out of range").into());
    }
    let summary = &validator.pools[key.pool_id as usize - 1];
    if summary.pool_app_id != key.pool_app_id {
        return Err(AuthError::PoolKeyRejected("app id does not match the registry record").into());
    }
    if sender != Address::for_app(key.pool_app_id) {
        return Err(AuthError::PoolKeyRejected("sender is not the pool's application account").into());
    }
    let pool = pools
        .get(&key.pool_app_id)
        .ok_or(ProtocolError::UnknownPool(key.pool_app_id))?;
    if pool.validator_id != key.validator_id || pool.pool_id != key.pool_id {
        return Err(AuthError::PoolKeyRejected("pool self-reported identity mismatch").into());
    }
    Ok(())
}
