//! Two-pass proportional epoch payout planner.
//!
//! Rewards accrued in the pool's balance over an epoch mix
//! indistinguishably with stake, so the share computation runs over a
//! snapshot: first partial-epoch stakers are paid a time-weighted slice of
//! the original reward pools, then full-epoch stakers split the residual
//! over the stake that was present the whole epoch. A single pass would let
//! a just-arrived staker skim a full epoch's yield.
//!
//! The planner is a pure function from a snapshot to a credit plan; the
//! dispatcher applies the plan to the ledger, the pool, and the registry.

use openstake_types::constants::{COMMISSION_DENOMINATOR, MICRO_UNIT, TIME_PERCENT_DENOMINATOR};
use openstake_types::StakedInfo;

use crate::error::{ProtocolError, ProtocolResult, TimingError};
use crate::math::{mul3_div2, mul_div};

/// Snapshot of everything the payout computation reads.
#[derive(Debug, Clone)]
pub struct PayoutInputs<'a> {
    /// Current block timestamp; the epoch being settled ends here.
    pub now: u64,
    /// Epoch length in seconds.
    pub epoch_secs: u64,
    /// Validator commission, four-decimal fixed point.
    pub pct_to_validator: u32,
    /// Pool account balance.
    pub pool_balance: u64,
    /// Pool account minimum-balance requirement.
    pub pool_min_balance: u64,
    /// Pool's recorded total stake.
    pub total_staked: u64,
    /// The pool's staker ledger.
    pub stakers: &'a [StakedInfo],
    /// Whether the validator exceeds the protocol-wide online-stake cap.
    pub exceeds_online_cap: bool,
    /// This pool's token reward for the epoch (0 when no token stream).
    pub token_reward: u64,
}

/// A reward credit for one ledger slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakerCredit {
    /// Ledger slot index.
    pub slot: usize,
    /// Algo credited to the slot's balance (compounding).
    pub algo: u64,
    /// Token credited to the slot's pending reward balance.
    pub token: u64,
}

/// The effects of one epoch payout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutPlan {
    /// Reward redirected to the fee sink (protocol cap exceeded).
    pub fee_sink_payment: u64,
    /// Commission paid to the validator's commission address.
    pub validator_payment: u64,
    /// Per-slot credits.
    pub credits: Vec<StakerCredit>,
    /// Sum of algo credits; the pool's stake grows by this much.
    pub increased_stake: u64,
    /// Sum of token credits; held back in pool #1's custody until claimed.
    pub token_paid_out: u64,
}

/// Compute the payout plan for one epoch.
pub fn compute_payout(inputs: &PayoutInputs<'_>) -> ProtocolResult<PayoutPlan> {
    let gross = inputs
        .pool_balance
        .checked_sub(inputs.total_staked)
        .and_then(|v| v.checked_sub(inputs.pool_min_balance))
        .ok_or_else(|| {
            ProtocolError::Invariant("pool balance below recorded stake plus minimum".into())
        })?;

    let mut plan = PayoutPlan::default();
    let mut algo_reward = gross;

    if inputs.exceeds_online_cap {
        // Above the protocol cap the whole algo reward goes to the fee
        // sink: no commission, no staker credit.
        plan.fee_sink_payment = algo_reward;
        algo_reward = 0;
    } else {
        plan.validator_payment = mul_div(
            algo_reward,
            inputs.pct_to_validator as u64,
            COMMISSION_DENOMINATOR,
        )?;
        algo_reward -= plan.validator_payment;
        // Pure-empty payouts are rejected on the post-commission residual.
        if inputs.token_reward == 0 && algo_reward <= MICRO_UNIT {
            return Err(TimingError::RewardTooSmall { algo_reward }.into());
        }
    }

    // Pass 1: partial-epoch stakers take a time-weighted slice of the
    // original pools. Their balances are excluded from pass 2's stake base.
    let orig_algo = algo_reward;
    let orig_token = inputs.token_reward;
    let mut pass1_algo: u64 = 0;
    let mut pass1_token: u64 = 0;
    let mut partial_total: u64 = 0;

    for (slot, entry) in inputs.stakers.iter().enumerate() {
        if entry.is_empty() {
            continue;
        }
        if entry.entry_time > inputs.now {
            // Not yet visible to consensus this epoch: zero time weight.
            partial_total = partial_total
                .checked_add(entry.balance)
                .ok_or(ProtocolError::Overflow)?;
            continue;
        }
        let time_in_pool = inputs.now - entry.entry_time;
        if time_in_pool >= inputs.epoch_secs {
            continue;
        }
        let time_percent = time_in_pool * TIME_PERCENT_DENOMINATOR / inputs.epoch_secs;
        partial_total = partial_total
            .checked_add(entry.balance)
            .ok_or(ProtocolError::Overflow)?;
        let algo = mul3_div2(
            orig_algo,
            entry.balance,
            time_percent,
            inputs.total_staked,
            TIME_PERCENT_DENOMINATOR,
        )?;
        let token = mul3_div2(
            orig_token,
            entry.balance,
            time_percent,
            inputs.total_staked,
            TIME_PERCENT_DENOMINATOR,
        )?;
        pass1_algo += algo;
        pass1_token += token;
        if algo > 0 || token > 0 {
            plan.credits.push(StakerCredit { slot, algo, token });
        }
    }

    // Pass 2: full-epoch stakers split the residual over the stake that
    // was present the whole epoch.
    let residual_algo = orig_algo
        .checked_sub(pass1_algo)
        .ok_or_else(|| ProtocolError::Invariant("partial credits exceed reward pool".into()))?;
    let residual_token = orig_token
        .checked_sub(pass1_token)
        .ok_or_else(|| ProtocolError::Invariant("partial credits exceed token pool".into()))?;
    let effective_stake = inputs
        .total_staked
        .checked_sub(partial_total)
        .ok_or_else(|| ProtocolError::Invariant("partial stake exceeds pool total".into()))?;

    if effective_stake > 0 {
        for (slot, entry) in inputs.stakers.iter().enumerate() {
            if entry.is_empty() || entry.entry_time > inputs.now {
                continue;
            }
            if inputs.now - entry.entry_time < inputs.epoch_secs {
                continue;
            }
            let algo = mul_div(residual_algo, entry.balance, effective_stake)?;
            let token = mul_div(residual_token, entry.balance, effective_stake)?;
            if algo > 0 || token > 0 {
                plan.credits.push(StakerCredit { slot, algo, token });
            }
        }
    }
    // When effective_stake is zero every staker was partial this epoch and
    // the unallocated residual stays in the pool balance for the next one.

    for credit in &plan.credits {
        plan.increased_stake += credit.algo;
        plan.token_paid_out += credit.token;
    }
    Ok(plan)
}
