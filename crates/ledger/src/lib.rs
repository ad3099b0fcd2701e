//! Deterministic transactional substrate for the openstake protocol.
//!
//! Models the pieces of the chain the contracts observe:
//! - Account balances, payments, and spendability above the minimum-balance
//!   requirement (MBR)
//! - Asset holdings with explicit opt-in
//! - Application accounts derived from application ids
//! - Block wall-clock time, the network online-stake figure, the fee sink,
//!   and participation registration
//!
//! Every operation executes atomically from the contracts' point of view:
//! callers apply a sequence of ledger effects and surface the first error,
//! at which point the enclosing protocol operation fails as a whole.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use openstake_types::Address;

mod error;

pub use error::{LedgerError, LedgerResult};

/// Base minimum balance of any funded account.
pub const ACCOUNT_MIN_BALANCE: u64 = 100_000;

/// Minimum-balance increase for each asset holding.
pub const ASSET_HOLDING_MBR: u64 = 100_000;

/// Flat minimum-balance cost of a storage box.
pub const BOX_FLAT_MBR: u64 = 2_500;

/// Per-byte minimum-balance cost of a storage box.
pub const BOX_BYTE_MBR: u64 = 400;

/// Minimum-balance increase on a creator per application created.
pub const APP_CREATION_MBR: u64 = 100_000;

/// Minimum-balance cost of a box of `len` bytes (key included in `len`).
pub fn box_mbr(len: u64) -> u64 {
    BOX_FLAT_MBR + BOX_BYTE_MBR * len
}

/// Participation key material registered by an online account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationKeys {
    pub vote_pk: [u8; 32],
    pub selection_pk: [u8; 32],
    pub state_proof_pk: Vec<u8>,
    pub vote_first: u64,
    pub vote_last: u64,
    pub vote_key_dilution: u64,
}

/// A single account's ledger-side state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// Balance in micro units.
    pub balance: u64,
    /// Minimum balance the account must retain.
    pub min_balance: u64,
    /// Asset holdings; presence of a key means the account is opted in.
    pub assets: BTreeMap<u64, u64>,
    /// Whether the account is registered online for consensus.
    pub online: bool,
    /// Keys registered while online.
    pub participation: Option<ParticipationKeys>,
}

/// Receipt of an executed payment.
///
/// Protocol operations that require an accompanying payment take one of
/// these and verify its sender, receiver, and amount before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
}

/// The transactional substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    accounts: BTreeMap<Address, AccountState>,
    now: u64,
    online_stake: u64,
    base_fee: u64,
    next_app_id: u64,
}

/// The protocol-defined account receiving redirected rewards and fees.
pub const FEE_SINK: Address = Address([0xfe; 32]);

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Fresh ledger with only the fee sink present.
    pub fn new() -> Self {
        let mut accounts = BTreeMap::new();
        accounts.insert(FEE_SINK, AccountState::default());
        Self {
            accounts,
            now: 1_000_000,
            online_stake: 0,
            base_fee: 0,
            next_app_id: 1_000,
        }
    }

    /// Current block wall-clock timestamp.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advance block time by `secs`.
    pub fn advance_time(&mut self, secs: u64) {
        self.now += secs;
    }

    /// Total online stake across the network.
    pub fn online_stake(&self) -> u64 {
        self.online_stake
    }

    /// Set the network online-stake figure.
    pub fn set_online_stake(&mut self, amount: u64) {
        self.online_stake = amount;
    }

    /// Flat fee per transaction.
    pub fn base_fee(&self) -> u64 {
        self.base_fee
    }

    /// Set the flat per-transaction fee.
    pub fn set_base_fee(&mut self, fee: u64) {
        self.base_fee = fee;
    }

    /// Mint funds into an account (genesis / test faucet).
    pub fn fund(&mut self, address: Address, amount: u64) {
        let account = self.accounts.entry(address).or_default();
        account.balance += amount;
        if account.min_balance < ACCOUNT_MIN_BALANCE {
            account.min_balance = ACCOUNT_MIN_BALANCE;
        }
    }

    /// Balance of an account; zero if it has never been funded.
    pub fn balance(&self, address: Address) -> u64 {
        self.accounts.get(&address).map_or(0, |a| a.balance)
    }

    /// Minimum balance the account must retain.
    pub fn min_balance(&self, address: Address) -> u64 {
        self.accounts.get(&address).map_or(0, |a| a.min_balance)
    }

    /// Whether the account is registered online.
    pub fn is_online(&self, address: Address) -> bool {
        self.accounts.get(&address).is_some_and(|a| a.online)
    }

    /// Registered participation keys, if any.
    pub fn participation(&self, address: Address) -> Option<&ParticipationKeys> {
        self.accounts
            .get(&address)
            .and_then(|a| a.participation.as_ref())
    }

    fn account_mut(&mut self, address: Address) -> LedgerResult<&mut AccountState> {
        self.accounts
            .get_mut(&address)
            .ok_or(LedgerError::UnknownAccount(address))
    }

    /// Execute a payment and return its receipt.
    ///
    /// The sender must keep its minimum balance; the receiver account is
    /// created on first credit.
    pub fn pay(&mut self, sender: Address, receiver: Address, amount: u64) -> LedgerResult<Payment> {
        let from = self.account_mut(sender)?;
        let spendable = from.balance.saturating_sub(from.min_balance);
        if spendable < amount {
            return Err(LedgerError::InsufficientFunds {
                address: sender,
                spendable,
                requested: amount,
            });
        }
        from.balance -= amount;
        let to = self.accounts.entry(receiver).or_default();
        to.balance += amount;
        // A funded account always carries the base minimum balance.
        if to.min_balance < ACCOUNT_MIN_BALANCE {
            to.min_balance = ACCOUNT_MIN_BALANCE;
        }
        tracing::debug!(%sender, %receiver, amount, "payment");
        Ok(Payment {
            sender,
            receiver,
            amount,
        })
    }

    /// Allocate a fresh application id and its derived account.
    pub fn create_app(&mut self) -> (u64, Address) {
        let app_id = self.next_app_id;
        self.next_app_id += 1;
        let address = Address::for_app(app_id);
        self.accounts.entry(address).or_default();
        tracing::debug!(app_id, %address, "application created");
        (app_id, address)
    }

    /// Raise an account's minimum balance (storage allocation).
    ///
    /// The current balance must already cover the new requirement.
    pub fn raise_min_balance(&mut self, address: Address, delta: u64) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        let new_min = account.min_balance + delta;
        if account.balance < new_min {
            return Err(LedgerError::BelowMinBalance {
                address,
                min_balance: new_min,
            });
        }
        account.min_balance = new_min;
        Ok(())
    }

    /// Lower an account's minimum balance (storage released).
    pub fn lower_min_balance(&mut self, address: Address, delta: u64) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        account.min_balance = account.min_balance.saturating_sub(delta);
        Ok(())
    }

    /// Opt an account in to an asset, raising its minimum balance.
    pub fn opt_in_asset(&mut self, address: Address, asset_id: u64) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        if account.assets.contains_key(&asset_id) {
            return Err(LedgerError::AlreadyOptedIn { address, asset_id });
        }
        let new_min = account.min_balance + ASSET_HOLDING_MBR;
        if account.balance < new_min {
            return Err(LedgerError::BelowMinBalance {
                address,
                min_balance: new_min,
            });
        }
        account.min_balance = new_min;
        account.assets.insert(asset_id, 0);
        tracing::debug!(%address, asset_id, "asset opt-in");
        Ok(())
    }

    /// Asset balance; `None` when the account is not opted in.
    pub fn asset_balance(&self, address: Address, asset_id: u64) -> Option<u64> {
        self.accounts
            .get(&address)
            .and_then(|a| a.assets.get(&asset_id).copied())
    }

    /// Mint asset units into an opted-in account (test faucet).
    pub fn mint_asset(&mut self, address: Address, asset_id: u64, amount: u64) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        let held = account
            .assets
            .get_mut(&asset_id)
            .ok_or(LedgerError::NotOptedIn { address, asset_id })?;
        *held += amount;
        Ok(())
    }

    /// Transfer asset units between two opted-in accounts.
    pub fn asset_transfer(
        &mut self,
        sender: Address,
        receiver: Address,
        asset_id: u64,
        amount: u64,
    ) -> LedgerResult<()> {
        let from = self
            .accounts
            .get_mut(&sender)
            .ok_or(LedgerError::UnknownAccount(sender))?;
        let held = from.assets.get_mut(&asset_id).ok_or(LedgerError::NotOptedIn {
            address: sender,
            asset_id,
        })?;
        if *held < amount {
            return Err(LedgerError::InsufficientAssetBalance {
                address: sender,
                asset_id,
                held: *held,
                requested: amount,
            });
        }
        *held -= amount;
        let to = self
            .accounts
            .get_mut(&receiver)
            .ok_or(LedgerError::UnknownAccount(receiver))?;
        let to_held = to.assets.get_mut(&asset_id).ok_or(LedgerError::NotOptedIn {
            address: receiver,
            asset_id,
        })?;
        *to_held += amount;
        tracing::debug!(%sender, %receiver, asset_id, amount, "asset transfer");
        Ok(())
    }

    /// Register an account online with participation keys.
    pub fn register_online(&mut self, address: Address, keys: ParticipationKeys) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        account.online = true;
        account.participation = Some(keys);
        tracing::info!(%address, "registered online");
        Ok(())
    }

    /// Take an account offline.
    pub fn register_offline(&mut self, address: Address) -> LedgerResult<()> {
        let account = self.account_mut(address)?;
        account.online = false;
        account.participation = None;
        tracing::info!(%address, "registered offline");
        Ok(())
    }

    /// Debit the flat fee for a call that issued `inner_count` inner
    /// transactions. A no-op when the base fee is zero.
    pub fn charge_fee(&mut self, payer: Address, inner_count: u64) -> LedgerResult<()> {
        if self.base_fee == 0 {
            return Ok(());
        }
        let total = self.base_fee * (1 + inner_count);
        self.pay(payer, FEE_SINK, total)?;
        tracing::debug!(%payer, inner_count, total, "fee charged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> Address {
        Address([tag; 32])
    }

    #[test]
    fn test_fund_and_pay() {
        let mut ledger = Ledger::new();
        ledger.fund(addr(1), 10_000_000);

        let receipt = ledger.pay(addr(1), addr(2), 3_000_000).unwrap();
        assert_eq!(receipt.amount, 3_000_000);
        assert_eq!(ledger.balance(addr(1)), 7_000_000);
        assert_eq!(ledger.balance(addr(2)), 3_000_000);
    }

    #[test]
    fn test_pay_respects_min_balance() {
        let mut ledger = Ledger::new();
        ledger.fund(addr(1), 1_000_000);

        // Spendable is balance minus ACCOUNT_MIN_BALANCE.
        let err = ledger.pay(addr(1), addr(2), 950_000).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        ledger.pay(addr(1), addr(2), 900_000).unwrap();
    }

    #[test]
    fn test_unknown_sender() {
        let mut ledger = Ledger::new();
        let err = ledger.pay(addr(9), addr(2), 1).unwrap_err();
        assert_eq!(err, LedgerError::UnknownAccount(addr(9)));
    }

    #[test]
    fn test_asset_lifecycle() {
        let mut ledger = Ledger::new();
        ledger.fund(addr(1), 10_000_000);
        ledger.fund(addr(2), 10_000_000);

        assert_eq!(ledger.asset_balance(addr(1), 77), None);
        ledger.opt_in_asset(addr(1), 77).unwrap();
        ledger.opt_in_asset(addr(2), 77).unwrap();
        ledger.mint_asset(addr(1), 77, 500).unwrap();

        ledger.asset_transfer(addr(1), addr(2), 77, 200).unwrap();
        assert_eq!(ledger.asset_balance(addr(1), 77), Some(300));
        assert_eq!(ledger.asset_balance(addr(2), 77), Some(200));

        let err = ledger.asset_transfer(addr(1), addr(2), 77, 400).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAssetBalance { .. }));
    }

    #[test]
    fn test_opt_in_raises_min_balance() {
        let mut ledger = Ledger::new();
        ledger.fund(addr(1), 10_000_000);
        let before = ledger.min_balance(addr(1));
        ledger.opt_in_asset(addr(1), 5).unwrap();
        assert_eq!(ledger.min_balance(addr(1)), before + ASSET_HOLDING_MBR);

        let err = ledger.opt_in_asset(addr(1), 5).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOptedIn { .. }));
    }

    #[test]
    fn test_app_accounts_are_distinct() {
        let mut ledger = Ledger::new();
        let (id_a, addr_a) = ledger.create_app();
        let (id_b, addr_b) = ledger.create_app();
        assert_ne!(id_a, id_b);
        assert_ne!(addr_a, addr_b);
        assert_eq!(addr_a, Address::for_app(id_a));
    }

    #[test]
    fn test_time_advances() {
        let mut ledger = Ledger::new();
        let start = ledger.now();
        ledger.advance_time(3_600);
        assert_eq!(ledger.now(), start + 3_600);
    }

    #[test]
    fn test_fee_charging() {
        let mut ledger = Ledger::new();
        ledger.fund(addr(1), 10_000_000);

        // Zero base fee: no debit.
        ledger.charge_fee(addr(1), 3).unwrap();
        assert_eq!(ledger.balance(addr(1)), 10_000_000);

        ledger.set_base_fee(1_000);
        ledger.charge_fee(addr(1), 3).unwrap();
        assert_eq!(ledger.balance(addr(1)), 10_000_000 - 4_000);
        assert_eq!(ledger.balance(FEE_SINK), 4_000);
    }

    #[test]
    fn test_box_mbr() {
        assert_eq!(box_mbr(0), BOX_FLAT_MBR);
        assert_eq!(box_mbr(10), BOX_FLAT_MBR + 10 * BOX_BYTE_MBR);
    }
}
