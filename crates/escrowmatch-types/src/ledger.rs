//! External fungible-ledger seam.
//!
//! Both the traded asset and the payment instrument live on ledgers the
//! engine does not own. The engine custodies escrow under its own account
//! and only moves owner funds it has a verified allowance for.
//!
//! Multi-leg moves go through a two-phase batch: `prepare` validates every
//! transfer and places a hold on the debited balances and allowances, then
//! exactly one of `finalize` (credit the recipients) or `abort` (release the
//! hold) follows. A prepared batch always finalizes.

use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::{AccountId, AssetHandle, EscrowMatchError, Result};

/// One transfer inside a batch, relative to the batch's spender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTransfer {
    /// `owner → spender`, consuming the owner's allowance to the spender.
    Pull { owner: AccountId, amount: Decimal },
    /// `spender → recipient`, out of the spender's own balance.
    Push { recipient: AccountId, amount: Decimal },
}

impl LedgerTransfer {
    #[must_use]
    pub fn amount(&self) -> Decimal {
        match *self {
            Self::Pull { amount, .. } | Self::Push { amount, .. } => amount,
        }
    }
}

/// Handle to a prepared, not yet settled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u64);

/// A fungible-asset ledger.
///
/// Implementations own their synchronization; every method takes `&self`.
pub trait FungibleLedger: Send + Sync {
    /// The handle this ledger is registered under.
    fn handle(&self) -> &AssetHandle;

    fn balance_of(&self, account: &AccountId) -> Decimal;

    /// Amount `spender` may still move out of `owner`'s balance.
    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Decimal;

    /// Move `amount` from `owner` to `recipient`, consuming `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: &AccountId,
        owner: &AccountId,
        recipient: &AccountId,
        amount: Decimal,
    ) -> Result<()>;

    /// Move `amount` out of `from`'s own balance.
    fn transfer(&self, from: &AccountId, recipient: &AccountId, amount: Decimal) -> Result<()>;

    /// Validate `transfers` in order and hold every debit they imply.
    ///
    /// # Errors
    /// The batch as a whole is refused; no hold is placed.
    fn prepare(&self, spender: &AccountId, transfers: &[LedgerTransfer]) -> Result<BatchId>;

    /// Apply a prepared batch. Unknown ids are ignored.
    fn finalize(&self, batch: BatchId);

    /// Release a prepared batch's hold, restoring balances and allowances.
    /// Unknown ids are ignored.
    fn abort(&self, batch: BatchId);
}

/// Held effects of a prepared batch.
#[derive(Debug, Default)]
struct Hold {
    debits: Vec<(AccountId, Decimal)>,
    credits: Vec<(AccountId, Decimal)>,
    allowances: Vec<((AccountId, AccountId), Decimal)>,
}

#[derive(Debug, Default)]
struct LedgerBook {
    balances: HashMap<AccountId, Decimal>,
    allowances: HashMap<(AccountId, AccountId), Decimal>,
    holds: HashMap<BatchId, Hold>,
    next_batch: u64,
    /// Set by tests to make the next batch fail after verification.
    fail_next_transfer: bool,
}

impl LedgerBook {
    fn balance(&self, account: &AccountId) -> Decimal {
        self.balances.get(account).copied().unwrap_or(Decimal::ZERO)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Decimal {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn add_balance(&mut self, account: AccountId, amount: Decimal) {
        let entry = self.balances.entry(account).or_insert(Decimal::ZERO);
        *entry = entry.saturating_add(amount);
    }

    fn take_injected_failure(&mut self, asset: &AssetHandle) -> Result<()> {
        if std::mem::take(&mut self.fail_next_transfer) {
            return Err(EscrowMatchError::TransferFailed {
                asset: asset.clone(),
                reason: "ledger rejected transfer".to_string(),
            });
        }
        Ok(())
    }

    /// Walk `transfers` against a scratch copy and place the resulting hold.
    fn hold(
        &mut self,
        asset: &AssetHandle,
        spender: &AccountId,
        transfers: &[LedgerTransfer],
    ) -> Result<BatchId> {
        let mut balances: HashMap<AccountId, Decimal> = HashMap::new();
        let mut allowances: HashMap<AccountId, Decimal> = HashMap::new();

        for transfer in transfers {
            let amount = transfer.amount();
            if amount < Decimal::ZERO {
                return Err(EscrowMatchError::InvalidAmount(amount));
            }
            let (from, to) = match *transfer {
                LedgerTransfer::Pull { owner, .. } => {
                    let approved = *allowances
                        .entry(owner)
                        .or_insert_with(|| self.allowance(&owner, spender));
                    if approved < amount {
                        return Err(EscrowMatchError::InsufficientAllowance {
                            asset: asset.clone(),
                            needed: amount,
                            approved,
                        });
                    }
                    allowances.insert(owner, approved - amount);
                    (owner, *spender)
                }
                LedgerTransfer::Push { recipient, .. } => (*spender, recipient),
            };

            let available = *balances.entry(from).or_insert_with(|| self.balance(&from));
            if available < amount {
                return Err(EscrowMatchError::InsufficientBalance {
                    asset: asset.clone(),
                    needed: amount,
                    available,
                });
            }
            balances.insert(from, available - amount);
            let current = *balances.entry(to).or_insert_with(|| self.balance(&to));
            let credited =
                current
                    .checked_add(amount)
                    .ok_or_else(|| EscrowMatchError::TransferFailed {
                        asset: asset.clone(),
                        reason: format!("balance overflow crediting {to}"),
                    })?;
            balances.insert(to, credited);
        }

        let mut hold = Hold::default();
        for (account, after) in balances {
            let before = self.balance(&account);
            if after < before {
                self.balances.insert(account, after);
                hold.debits.push((account, before - after));
            } else if after > before {
                hold.credits.push((account, after - before));
            }
        }
        for (owner, remaining) in allowances {
            let key = (owner, *spender);
            let consumed = self.allowance(&owner, spender) - remaining;
            self.allowances.insert(key, remaining);
            hold.allowances.push((key, consumed));
        }

        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        self.holds.insert(id, hold);
        Ok(id)
    }

    fn finalize(&mut self, id: BatchId) {
        if let Some(hold) = self.holds.remove(&id) {
            for (account, amount) in hold.credits {
                self.add_balance(account, amount);
            }
        }
    }

    fn abort(&mut self, id: BatchId) {
        if let Some(hold) = self.holds.remove(&id) {
            for (account, amount) in hold.debits {
                self.add_balance(account, amount);
            }
            for (key, consumed) in hold.allowances {
                let entry = self.allowances.entry(key).or_insert(Decimal::ZERO);
                *entry = entry.saturating_add(consumed);
            }
        }
    }
}

/// In-memory reference ledger with ERC-20 style balances and allowances.
#[derive(Debug)]
pub struct InMemoryLedger {
    handle: AssetHandle,
    book: Mutex<LedgerBook>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(handle: impl Into<AssetHandle>) -> Self {
        Self {
            handle: handle.into(),
            book: Mutex::new(LedgerBook::default()),
        }
    }

    fn book(&self) -> std::sync::MutexGuard<'_, LedgerBook> {
        self.book.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Create `amount` new units for `to`.
    pub fn mint(&self, to: AccountId, amount: Decimal) {
        *self.book().balances.entry(to).or_insert(Decimal::ZERO) += amount;
    }

    /// Set `spender`'s allowance over `owner`'s balance (overwrites).
    pub fn approve(&self, owner: AccountId, spender: AccountId, amount: Decimal) {
        self.book().allowances.insert((owner, spender), amount);
    }

    /// Sum of every balance on this ledger, held debits included.
    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        let book = self.book();
        let held: Decimal = book
            .holds
            .values()
            .flat_map(|h| h.debits.iter().map(|(_, amount)| *amount))
            .sum();
        book.balances.values().copied().sum::<Decimal>() + held
    }

    /// Make the next transfer or `prepare` fail with `TransferFailed`.
    pub fn fail_next_transfer(&self) {
        self.book().fail_next_transfer = true;
    }

    fn apply(&self, spender: &AccountId, transfers: &[LedgerTransfer]) -> Result<()> {
        let mut book = self.book();
        book.take_injected_failure(&self.handle)?;
        let id = book.hold(&self.handle, spender, transfers)?;
        book.finalize(id);
        Ok(())
    }
}

impl FungibleLedger for InMemoryLedger {
    fn handle(&self) -> &AssetHandle {
        &self.handle
    }

    fn balance_of(&self, account: &AccountId) -> Decimal {
        self.book().balance(account)
    }

    fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Decimal {
        self.book().allowance(owner, spender)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        owner: &AccountId,
        recipient: &AccountId,
        amount: Decimal,
    ) -> Result<()> {
        self.apply(
            spender,
            &[
                LedgerTransfer::Pull {
                    owner: *owner,
                    amount,
                },
                LedgerTransfer::Push {
                    recipient: *recipient,
                    amount,
                },
            ],
        )
    }

    fn transfer(&self, from: &AccountId, recipient: &AccountId, amount: Decimal) -> Result<()> {
        self.apply(
            from,
            &[LedgerTransfer::Push {
                recipient: *recipient,
                amount,
            }],
        )
    }

    fn prepare(&self, spender: &AccountId, transfers: &[LedgerTransfer]) -> Result<BatchId> {
        let mut book = self.book();
        book.take_injected_failure(&self.handle)?;
        book.hold(&self.handle, spender, transfers)
    }

    fn finalize(&self, batch: BatchId) {
        self.book().finalize(batch);
    }

    fn abort(&self, batch: BatchId) {
        self.book().abort(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn mint_and_balance() {
        let ledger = InMemoryLedger::new("USDC");
        let alice = AccountId::new();
        ledger.mint(alice, dec(1000));
        assert_eq!(ledger.balance_of(&alice), dec(1000));
        assert_eq!(ledger.total_supply(), dec(1000));
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let ledger = InMemoryLedger::new("USDC");
        let (alice, engine) = (AccountId::new(), AccountId::new());
        ledger.mint(alice, dec(1000));
        ledger.approve(alice, engine, dec(300));

        ledger.transfer_from(&engine, &alice, &engine, dec(200)).unwrap();
        assert_eq!(ledger.balance_of(&alice), dec(800));
        assert_eq!(ledger.balance_of(&engine), dec(200));
        assert_eq!(ledger.allowance(&alice, &engine), dec(100));
    }

    #[test]
    fn transfer_from_without_allowance_fails_cleanly() {
        let ledger = InMemoryLedger::new("USDC");
        let (alice, engine) = (AccountId::new(), AccountId::new());
        ledger.mint(alice, dec(1000));
        ledger.approve(alice, engine, dec(50));

        let err = ledger
            .transfer_from(&engine, &alice, &engine, dec(200))
            .unwrap_err();
        assert!(matches!(err, EscrowMatchError::InsufficientAllowance { .. }));
        assert_eq!(ledger.balance_of(&alice), dec(1000));
        assert_eq!(ledger.allowance(&alice, &engine), dec(50));
    }

    #[test]
    fn transfer_insufficient_balance() {
        let ledger = InMemoryLedger::new("PROP");
        let (a, b) = (AccountId::new(), AccountId::new());
        ledger.mint(a, dec(5));
        let err = ledger.transfer(&a, &b, dec(6)).unwrap_err();
        assert!(matches!(err, EscrowMatchError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(&a), dec(5));
    }

    #[test]
    fn injected_failure_fires_once() {
        let ledger = InMemoryLedger::new("PROP");
        let (a, b) = (AccountId::new(), AccountId::new());
        ledger.mint(a, dec(5));
        ledger.fail_next_transfer();
        assert!(matches!(
            ledger.transfer(&a, &b, dec(1)).unwrap_err(),
            EscrowMatchError::TransferFailed { .. }
        ));
        ledger.transfer(&a, &b, dec(1)).unwrap();
        assert_eq!(ledger.balance_of(&b), dec(1));
    }

    #[test]
    fn prepared_batch_holds_until_finalized() {
        let ledger = InMemoryLedger::new("PROP");
        let (seller, buyer, engine) = (AccountId::new(), AccountId::new(), AccountId::new());
        ledger.mint(seller, dec(100));
        ledger.approve(seller, engine, dec(100));

        // Push funded only by the pull before it.
        let batch = ledger
            .prepare(
                &engine,
                &[
                    LedgerTransfer::Pull { owner: seller, amount: dec(100) },
                    LedgerTransfer::Push { recipient: buyer, amount: dec(100) },
                ],
            )
            .unwrap();
        assert_eq!(ledger.balance_of(&seller), Decimal::ZERO);
        assert_eq!(ledger.balance_of(&buyer), Decimal::ZERO);
        assert_eq!(ledger.total_supply(), dec(100));

        ledger.finalize(batch);
        assert_eq!(ledger.balance_of(&buyer), dec(100));
        assert_eq!(ledger.balance_of(&engine), Decimal::ZERO);
        assert_eq!(ledger.allowance(&seller, &engine), Decimal::ZERO);
        assert_eq!(ledger.total_supply(), dec(100));
    }

    #[test]
    fn aborted_batch_restores_balance_and_allowance() {
        let ledger = InMemoryLedger::new("USDC");
        let (owner, engine, other) = (AccountId::new(), AccountId::new(), AccountId::new());
        ledger.mint(owner, dec(300));
        ledger.approve(owner, engine, dec(250));
        ledger.mint(engine, dec(40));

        let batch = ledger
            .prepare(
                &engine,
                &[
                    LedgerTransfer::Pull { owner, amount: dec(200) },
                    LedgerTransfer::Push { recipient: other, amount: dec(240) },
                ],
            )
            .unwrap();
        assert_eq!(ledger.allowance(&owner, &engine), dec(50));
        ledger.abort(batch);

        assert_eq!(ledger.balance_of(&owner), dec(300));
        assert_eq!(ledger.balance_of(&engine), dec(40));
        assert_eq!(ledger.balance_of(&other), Decimal::ZERO);
        assert_eq!(ledger.allowance(&owner, &engine), dec(250));
        // Settled ids are forgotten.
        ledger.finalize(batch);
        assert_eq!(ledger.balance_of(&other), Decimal::ZERO);
    }

    #[test]
    fn refused_batch_places_no_hold() {
        let ledger = InMemoryLedger::new("USDC");
        let (owner, engine) = (AccountId::new(), AccountId::new());
        ledger.mint(owner, dec(100));
        ledger.approve(owner, engine, dec(100));

        let err = ledger
            .prepare(
                &engine,
                &[
                    LedgerTransfer::Pull { owner, amount: dec(60) },
                    LedgerTransfer::Pull { owner, amount: dec(60) },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, EscrowMatchError::InsufficientAllowance { approved, .. } if approved == dec(40)));
        assert_eq!(ledger.balance_of(&owner), dec(100));
        assert_eq!(ledger.allowance(&owner, &engine), dec(100));
    }
}
