//! Escrow ledger: the engine's record of custodied legs.
//!
//! One [`EscrowRecord`] per active order. A record is created when the
//! order opens and removed exactly once: released on cancel or fill, or
//! forfeited when an emergency withdrawal drains custody.
//!
//! Per asset the ledger keeps running totals so that
//! `locked == active + released + forfeited` can be checked at any time.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use escrowmatch_types::{AccountId, AssetHandle, EscrowMatchError, EscrowRecord, OrderId, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifetime totals for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTotals {
    /// Everything ever locked.
    pub locked: Decimal,
    /// Returned on cancel or handed out on fill.
    pub released: Decimal,
    /// Written off by an emergency withdrawal.
    pub forfeited: Decimal,
}

/// Locked-fund accounting keyed by order id.
#[derive(Debug, Default)]
pub struct EscrowLedger {
    records: HashMap<OrderId, EscrowRecord>,
    /// Currently locked, per asset.
    custody: HashMap<AssetHandle, Decimal>,
    totals: BTreeMap<AssetHandle, EscrowTotals>,
}

impl EscrowLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records and totals.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` if the totals do not account for the records.
    pub fn from_parts(
        records: Vec<EscrowRecord>,
        totals: BTreeMap<AssetHandle, EscrowTotals>,
    ) -> Result<Self> {
        let mut ledger = Self {
            records: HashMap::new(),
            custody: HashMap::new(),
            totals,
        };
        for record in records {
            *ledger.custody.entry(record.asset.clone()).or_default() += record.locked_amount;
            ledger.records.insert(record.order_id, record);
        }
        let assets: Vec<AssetHandle> = ledger
            .totals
            .keys()
            .chain(ledger.custody.keys())
            .cloned()
            .collect();
        for asset in &assets {
            ledger.check_totals(asset)?;
        }
        Ok(ledger)
    }

    /// Record the escrow of a freshly opened order.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount` is not positive
    /// - `Internal` if the order already has a record
    /// - `ArithmeticOverflow` if custody totals overflow
    pub fn lock(
        &mut self,
        order_id: OrderId,
        owner: AccountId,
        asset: &AssetHandle,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(EscrowMatchError::InvalidAmount(amount));
        }
        if self.records.contains_key(&order_id) {
            return Err(EscrowMatchError::Internal(format!(
                "escrow for {order_id} already recorded"
            )));
        }
        let custody = self.custody.get(asset).copied().unwrap_or(Decimal::ZERO);
        let totals = self.totals.get(asset).cloned().unwrap_or_default();
        let new_custody = custody
            .checked_add(amount)
            .ok_or(EscrowMatchError::ArithmeticOverflow {
                context: "escrow custody total",
            })?;
        let new_locked = totals
            .locked
            .checked_add(amount)
            .ok_or(EscrowMatchError::ArithmeticOverflow {
                context: "escrow lifetime total",
            })?;

        self.custody.insert(asset.clone(), new_custody);
        self.totals.entry(asset.clone()).or_default().locked = new_locked;
        self.records.insert(
            order_id,
            EscrowRecord {
                order_id,
                owner,
                asset: asset.clone(),
                locked_amount: amount,
                locked_at: now,
            },
        );
        tracing::debug!(order = %order_id, %asset, %amount, "Escrow locked");
        Ok(())
    }

    /// Remove the record for `order_id`, counting it as released.
    ///
    /// The caller moves the funds; this only updates accounting.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` if the order holds no escrow.
    pub fn release(&mut self, order_id: OrderId) -> Result<EscrowRecord> {
        let record = self.take(order_id)?;
        self.totals.entry(record.asset.clone()).or_default().released += record.locked_amount;
        tracing::debug!(
            order = %order_id,
            asset = %record.asset,
            amount = %record.locked_amount,
            "Escrow released"
        );
        Ok(record)
    }

    /// Undo a `lock` whose ledger pull never went through.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` if the order holds no escrow.
    pub fn discard(&mut self, order_id: OrderId) -> Result<EscrowRecord> {
        let record = self.take(order_id)?;
        if let Some(totals) = self.totals.get_mut(&record.asset) {
            totals.locked -= record.locked_amount;
        }
        tracing::debug!(order = %order_id, asset = %record.asset, "Escrow lock discarded");
        Ok(record)
    }

    /// Write off every remaining record, returning the forfeited amount per asset.
    pub fn forfeit_all(&mut self) -> BTreeMap<AssetHandle, Decimal> {
        let mut forfeited: BTreeMap<AssetHandle, Decimal> = BTreeMap::new();
        for (_, record) in self.records.drain() {
            *forfeited.entry(record.asset.clone()).or_default() += record.locked_amount;
            self.totals.entry(record.asset).or_default().forfeited += record.locked_amount;
        }
        self.custody.clear();
        forfeited
    }

    fn take(&mut self, order_id: OrderId) -> Result<EscrowRecord> {
        let record = self.records.remove(&order_id).ok_or_else(|| {
            EscrowMatchError::EscrowInvariantViolation {
                reason: format!("no escrow recorded for {order_id}"),
            }
        })?;
        if let Some(custody) = self.custody.get_mut(&record.asset) {
            *custody -= record.locked_amount;
        }
        Ok(record)
    }

    #[must_use]
    pub fn get(&self, order_id: OrderId) -> Option<&EscrowRecord> {
        self.records.get(&order_id)
    }

    /// Units currently locked for `asset`.
    #[must_use]
    pub fn custody_total(&self, asset: &AssetHandle) -> Decimal {
        self.custody.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn totals(&self, asset: &AssetHandle) -> EscrowTotals {
        self.totals.get(asset).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn all_totals(&self) -> &BTreeMap<AssetHandle, EscrowTotals> {
        &self.totals
    }

    /// Assets that have ever been escrowed.
    pub fn assets(&self) -> impl Iterator<Item = &AssetHandle> {
        self.totals.keys()
    }

    /// Records sorted by order id.
    #[must_use]
    pub fn records(&self) -> Vec<EscrowRecord> {
        let mut records: Vec<EscrowRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.order_id);
        records
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.records.len()
    }

    /// Verify `locked == active + released + forfeited` for `asset`.
    ///
    /// # Errors
    /// Returns [`EscrowMatchError::EscrowInvariantViolation`] on mismatch.
    pub fn check_totals(&self, asset: &AssetHandle) -> Result<()> {
        let totals = self.totals(asset);
        let active = self.custody_total(asset);
        let accounted = active + totals.released + totals.forfeited;
        if accounted != totals.locked {
            return Err(EscrowMatchError::EscrowInvariantViolation {
                reason: format!(
                    "Asset {asset}: active {active} + released {} + forfeited {} != locked {}",
                    totals.released, totals.forfeited, totals.locked
                ),
            });
        }
        Ok(())
    }
}
