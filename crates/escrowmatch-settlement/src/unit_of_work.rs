//! Ledger unit of work.
//!
//! A [`LedgerTransaction`] is a write-ahead list of transfers that all move
//! through one custodian account (the engine):
//!
//! - **pull**: `owner → custodian`, spending the owner's allowance
//! - **push**: `custodian → recipient`, out of custody
//!
//! Each leg is verified when it is staged, against the live ledger plus an
//! overlay of everything staged before it. A transaction that stages cleanly
//! is therefore fully funded and fully authorised at the moment it commits.
//!
//! ```text
//!   stage ──► stage ──► ... ──► commit
//!     │                           │ prepare one batch per ledger
//!     └─► Err (nothing moved)     ├─► all held ──► finalize all ──► Ok
//!                                 └─► ledger k refuses
//!                                        │
//!                                        ▼
//!                             abort batches 0..k (reverse order)
//!                                        │
//!                                        ▼
//!                                 Err(TransferFailed)
//! ```
//!
//! Nothing is credited until every ledger has accepted its batch, so a
//! refusal on any ledger leaves balances and allowances exactly as they were.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use escrowmatch_types::{
    AccountId, AssetHandle, BatchId, EscrowMatchError, FungibleLedger, LedgerTransfer, Result,
};
use rust_decimal::Decimal;

use crate::registry::LedgerRegistry;

struct Leg {
    ledger: Arc<dyn FungibleLedger>,
    transfer: LedgerTransfer,
}

/// Units that entered and left custody in one committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustodyFlows {
    pub inflows: BTreeMap<AssetHandle, Decimal>,
    pub outflows: BTreeMap<AssetHandle, Decimal>,
}

impl CustodyFlows {
    #[must_use]
    pub fn inflow(&self, asset: &AssetHandle) -> Decimal {
        self.inflows.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn outflow(&self, asset: &AssetHandle) -> Decimal {
        self.outflows.get(asset).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Staged, verified, all-or-nothing set of custody transfers.
pub struct LedgerTransaction<'a> {
    registry: &'a LedgerRegistry,
    custodian: AccountId,
    legs: Vec<Leg>,
    balance_delta: HashMap<(AssetHandle, AccountId), Decimal>,
    allowance_used: HashMap<(AssetHandle, AccountId), Decimal>,
}

impl<'a> LedgerTransaction<'a> {
    #[must_use]
    pub fn new(registry: &'a LedgerRegistry, custodian: AccountId) -> Self {
        Self {
            registry,
            custodian,
            legs: Vec::new(),
            balance_delta: HashMap::new(),
            allowance_used: HashMap::new(),
        }
    }

    fn delta(&self, asset: &AssetHandle, account: AccountId) -> Decimal {
        self.balance_delta
            .get(&(asset.clone(), account))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn shift(&mut self, asset: &AssetHandle, from: AccountId, to: AccountId, amount: Decimal) {
        *self.balance_delta.entry((asset.clone(), from)).or_default() -= amount;
        *self.balance_delta.entry((asset.clone(), to)).or_default() += amount;
    }

    fn check_leg(amount: Decimal, account: AccountId, role: &str) -> Result<bool> {
        if amount < Decimal::ZERO {
            return Err(EscrowMatchError::InvalidAmount(amount));
        }
        if account.is_nil() {
            return Err(EscrowMatchError::InvalidAccount {
                reason: format!("{role} is the zero address"),
            });
        }
        Ok(amount > Decimal::ZERO)
    }

    /// Stage `owner → custodian` on `asset`, consuming the owner's allowance.
    ///
    /// A zero amount stages nothing.
    ///
    /// # Errors
    /// `UnknownAsset`, `InvalidAmount`, `InvalidAccount`,
    /// `InsufficientAllowance` or `InsufficientBalance`. Nothing is staged
    /// on error.
    pub fn pull(&mut self, asset: &AssetHandle, owner: AccountId, amount: Decimal) -> Result<()> {
        let ledger = Arc::clone(self.registry.get(asset)?);
        if !Self::check_leg(amount, owner, "owner")? {
            return Ok(());
        }

        let key = (asset.clone(), owner);
        let used = self.allowance_used.get(&key).copied().unwrap_or(Decimal::ZERO);
        let approved = ledger.allowance(&owner, &self.custodian) - used;
        if approved < amount {
            return Err(EscrowMatchError::InsufficientAllowance {
                asset: asset.clone(),
                needed: amount,
                approved,
            });
        }
        let available = ledger.balance_of(&owner) + self.delta(asset, owner);
        if available < amount {
            return Err(EscrowMatchError::InsufficientBalance {
                asset: asset.clone(),
                needed: amount,
                available,
            });
        }

        *self.allowance_used.entry(key).or_default() += amount;
        self.shift(asset, owner, self.custodian, amount);
        self.legs.push(Leg {
            ledger,
            transfer: LedgerTransfer::Pull { owner, amount },
        });
        tracing::debug!(%asset, owner = %owner, %amount, "Staged pull into custody");
        Ok(())
    }

    /// Stage `custodian → recipient` on `asset`.
    ///
    /// A zero amount stages nothing.
    ///
    /// # Errors
    /// `UnknownAsset`, `InvalidAmount`, `InvalidAccount` or
    /// `InsufficientBalance` if custody (after earlier legs) cannot cover it.
    pub fn push(
        &mut self,
        asset: &AssetHandle,
        recipient: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        let ledger = Arc::clone(self.registry.get(asset)?);
        if !Self::check_leg(amount, recipient, "recipient")? {
            return Ok(());
        }

        let available = ledger.balance_of(&self.custodian) + self.delta(asset, self.custodian);
        if available < amount {
            return Err(EscrowMatchError::InsufficientBalance {
                asset: asset.clone(),
                needed: amount,
                available,
            });
        }

        self.shift(asset, self.custodian, recipient, amount);
        self.legs.push(Leg {
            ledger,
            transfer: LedgerTransfer::Push { recipient, amount },
        });
        tracing::debug!(%asset, recipient = %recipient, %amount, "Staged push out of custody");
        Ok(())
    }

    /// Number of staged legs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Staged legs grouped into one batch per ledger, in first-use order.
    fn batches(&self) -> Vec<(Arc<dyn FungibleLedger>, Vec<LedgerTransfer>)> {
        let mut batches: Vec<(Arc<dyn FungibleLedger>, Vec<LedgerTransfer>)> = Vec::new();
        for leg in &self.legs {
            let handle = leg.ledger.handle();
            match batches.iter_mut().find(|(ledger, _)| ledger.handle() == handle) {
                Some((_, transfers)) => transfers.push(leg.transfer),
                None => batches.push((Arc::clone(&leg.ledger), vec![leg.transfer])),
            }
        }
        batches
    }

    /// Apply every staged leg, all or nothing across ledgers.
    ///
    /// # Errors
    /// `TransferFailed` if a ledger refuses its batch. Every batch already
    /// held has been aborted by the time this returns.
    pub fn commit(self) -> Result<CustodyFlows> {
        let batches = self.batches();
        let mut prepared: Vec<(&Arc<dyn FungibleLedger>, BatchId)> =
            Vec::with_capacity(batches.len());
        for (ledger, transfers) in &batches {
            match ledger.prepare(&self.custodian, transfers) {
                Ok(batch) => prepared.push((ledger, batch)),
                Err(err) => {
                    let asset = ledger.handle().clone();
                    tracing::error!(
                        %asset,
                        transfers = transfers.len(),
                        held = prepared.len(),
                        error = %err,
                        "Ledger refused a verified batch; aborting"
                    );
                    for (held, batch) in prepared.into_iter().rev() {
                        held.abort(batch);
                    }
                    return Err(match err {
                        EscrowMatchError::TransferFailed { .. } => err,
                        other => EscrowMatchError::TransferFailed {
                            asset,
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }
        for (ledger, batch) in prepared {
            ledger.finalize(batch);
        }

        let mut flows = CustodyFlows::default();
        for leg in &self.legs {
            let side = match leg.transfer {
                LedgerTransfer::Pull { .. } => &mut flows.inflows,
                LedgerTransfer::Push { .. } => &mut flows.outflows,
            };
            *side.entry(leg.ledger.handle().clone()).or_default() += leg.transfer.amount();
        }
        Ok(flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowmatch_types::InMemoryLedger;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Fixture {
        prop: Arc<InMemoryLedger>,
        usdc: Arc<InMemoryLedger>,
        registry: LedgerRegistry,
        engine: AccountId,
    }

    fn fixture() -> Fixture {
        let prop = Arc::new(InMemoryLedger::new("PROP"));
        let usdc = Arc::new(InMemoryLedger::new("USDC"));
        let registry = LedgerRegistry::new()
            .with(Arc::clone(&prop) as Arc<dyn FungibleLedger>)
            .with(Arc::clone(&usdc) as Arc<dyn FungibleLedger>);
        Fixture {
            prop,
            usdc,
            registry,
            engine: AccountId::new(),
        }
    }

    fn usdc() -> AssetHandle {
        AssetHandle::from("USDC")
    }

    fn prop() -> AssetHandle {
        AssetHandle::from("PROP")
    }

    #[test]
    fn pull_then_push_commits() {
        let f = fixture();
        let (alice, bob) = (AccountId::new(), AccountId::new());
        f.usdc.mint(alice, dec(500));
        f.usdc.approve(alice, f.engine, dec(200));

        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        tx.pull(&usdc(), alice, dec(200)).unwrap();
        // Funded only by the pull staged above.
        tx.push(&usdc(), bob, dec(150)).unwrap();
        tx.push(&usdc(), bob, Decimal::ZERO).unwrap();
        assert_eq!(tx.len(), 2);
        let flows = tx.commit().unwrap();
        assert_eq!(flows.inflow(&usdc()), dec(200));
        assert_eq!(flows.outflow(&usdc()), dec(150));
        assert_eq!(flows.outflow(&prop()), Decimal::ZERO);

        assert_eq!(f.usdc.balance_of(&alice), dec(300));
        assert_eq!(f.usdc.balance_of(&bob), dec(150));
        assert_eq!(f.usdc.balance_of(&f.engine), dec(50));
        assert_eq!(f.usdc.allowance(&alice, &f.engine), Decimal::ZERO);
    }

    #[test]
    fn allowance_is_tracked_across_staged_pulls() {
        let f = fixture();
        let alice = AccountId::new();
        f.usdc.mint(alice, dec(500));
        f.usdc.approve(alice, f.engine, dec(100));

        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        tx.pull(&usdc(), alice, dec(60)).unwrap();
        let err = tx.pull(&usdc(), alice, dec(60)).unwrap_err();
        assert!(matches!(
            err,
            EscrowMatchError::InsufficientAllowance { approved, .. } if approved == dec(40)
        ));
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn push_beyond_custody_rejected_at_stage_time() {
        let f = fixture();
        f.prop.mint(f.engine, dec(10));
        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        tx.push(&prop(), AccountId::new(), dec(8)).unwrap();
        assert!(matches!(
            tx.push(&prop(), AccountId::new(), dec(3)).unwrap_err(),
            EscrowMatchError::InsufficientBalance { .. }
        ));
    }

    #[test]
    fn nil_recipient_and_unknown_asset_rejected() {
        let f = fixture();
        f.prop.mint(f.engine, dec(10));
        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        assert!(matches!(
            tx.push(&prop(), AccountId::NIL, dec(1)).unwrap_err(),
            EscrowMatchError::InvalidAccount { .. }
        ));
        assert!(matches!(
            tx.push(&AssetHandle::from("DOGE"), AccountId::new(), dec(1)).unwrap_err(),
            EscrowMatchError::UnknownAsset(_)
        ));
        assert!(tx.is_empty());
    }

    #[test]
    fn refusal_on_a_later_ledger_aborts_earlier_batches() {
        let f = fixture();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        f.usdc.mint(buyer, dec(200));
        f.usdc.approve(buyer, f.engine, dec(200));
        f.prop.mint(f.engine, dec(100));

        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        tx.pull(&usdc(), buyer, dec(200)).unwrap();
        tx.push(&prop(), buyer, dec(100)).unwrap();
        tx.push(&usdc(), seller, dec(200)).unwrap();

        // USDC is prepared first, PROP refuses second.
        f.prop.fail_next_transfer();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, EscrowMatchError::TransferFailed { .. }));

        assert_eq!(f.usdc.balance_of(&buyer), dec(200));
        assert_eq!(f.usdc.allowance(&buyer, &f.engine), dec(200));
        assert_eq!(f.usdc.balance_of(&f.engine), Decimal::ZERO);
        assert_eq!(f.usdc.balance_of(&seller), Decimal::ZERO);
        assert_eq!(f.prop.balance_of(&f.engine), dec(100));
        assert_eq!(f.prop.balance_of(&buyer), Decimal::ZERO);
    }

    #[test]
    fn second_ledger_refusal_leaves_first_ledger_untouched() {
        let f = fixture();
        let recipient = AccountId::new();
        f.prop.mint(f.engine, dec(30));
        f.usdc.mint(f.engine, dec(70));

        let mut tx = LedgerTransaction::new(&f.registry, f.engine);
        tx.push(&prop(), recipient, dec(30)).unwrap();
        tx.push(&usdc(), recipient, dec(70)).unwrap();
        f.usdc.fail_next_transfer();
        assert!(tx.commit().is_err());

        assert_eq!(f.prop.balance_of(&f.engine), dec(30));
        assert_eq!(f.prop.balance_of(&recipient), Decimal::ZERO);
        assert_eq!(f.usdc.balance_of(&f.engine), dec(70));
        assert_eq!(f.prop.total_supply(), dec(30));
    }
}
