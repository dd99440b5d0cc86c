//! Escrow conservation checker.
//!
//! Every unit the engine holds entered custody through a committed pull and
//! leaves through a committed push. Between operations the only units that
//! may remain are the legs of active orders:
//!
//! ```text
//! ∀ asset: Σ(inflows) - Σ(outflows) == Σ(escrow of Active orders)
//!          ledger.balance_of(engine) >= Σ(escrow of Active orders)
//! ```
//!
//! The first line catches accounting drift inside the engine, the second a
//! ledger that no longer backs what the engine believes it custodies.
//! Units sent to the engine account from outside (never pulled) are surplus
//! and do not break either line.

use std::collections::{BTreeMap, BTreeSet};

use escrowmatch_types::{AssetHandle, EscrowMatchError, Result};
use rust_decimal::Decimal;

use crate::unit_of_work::CustodyFlows;

/// Per-asset custody flow totals.
#[derive(Debug, Default)]
pub struct EscrowConservation {
    inflows: BTreeMap<AssetHandle, Decimal>,
    outflows: BTreeMap<AssetHandle, Decimal>,
}

impl EscrowConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from units already in custody, e.g. after a restore.
    #[must_use]
    pub fn seeded(custody: impl IntoIterator<Item = (AssetHandle, Decimal)>) -> Self {
        Self {
            inflows: custody.into_iter().collect(),
            outflows: BTreeMap::new(),
        }
    }

    /// Fold in the flows of one committed transaction.
    pub fn record(&mut self, flows: &CustodyFlows) {
        for (asset, amount) in &flows.inflows {
            *self.inflows.entry(asset.clone()).or_default() += *amount;
        }
        for (asset, amount) in &flows.outflows {
            *self.outflows.entry(asset.clone()).or_default() += *amount;
        }
    }

    /// Record a full sweep of custody. Anything beyond the expected custody
    /// was surplus and is not counted as an outflow.
    ///
    /// Returns the surplus swept for `asset`.
    pub fn record_sweep(&mut self, asset: &AssetHandle, moved: Decimal) -> Decimal {
        let expected = self.expected_custody(asset);
        let counted = moved.min(expected);
        *self.outflows.entry(asset.clone()).or_default() += counted;
        moved - counted
    }

    /// Σ(inflows) - Σ(outflows) for `asset`.
    #[must_use]
    pub fn expected_custody(&self, asset: &AssetHandle) -> Decimal {
        self.total_inflow(asset) - self.total_outflow(asset)
    }

    #[must_use]
    pub fn total_inflow(&self, asset: &AssetHandle) -> Decimal {
        self.inflows.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn total_outflow(&self, asset: &AssetHandle) -> Decimal {
        self.outflows.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Assets that have ever moved through custody.
    #[must_use]
    pub fn tracked_assets(&self) -> BTreeSet<AssetHandle> {
        self.inflows
            .keys()
            .chain(self.outflows.keys())
            .cloned()
            .collect()
    }

    /// Check both conservation lines for `asset`.
    ///
    /// # Errors
    /// Returns [`EscrowMatchError::EscrowInvariantViolation`] if either fails.
    pub fn verify(
        &self,
        asset: &AssetHandle,
        escrowed: Decimal,
        ledger_balance: Decimal,
    ) -> Result<()> {
        let expected = self.expected_custody(asset);
        if expected != escrowed {
            return Err(EscrowMatchError::EscrowInvariantViolation {
                reason: format!(
                    "Asset {asset}: flows imply custody {expected} but active escrow is {escrowed} \
                     (inflows={}, outflows={})",
                    self.total_inflow(asset),
                    self.total_outflow(asset),
                ),
            });
        }
        if ledger_balance < escrowed {
            return Err(EscrowMatchError::EscrowInvariantViolation {
                reason: format!(
                    "Asset {asset}: ledger custody {ledger_balance} does not cover escrow {escrowed}"
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn prop() -> AssetHandle {
        AssetHandle::from("PROP")
    }

    fn flows(inflow: i64, outflow: i64) -> CustodyFlows {
        let mut f = CustodyFlows::default();
        f.inflows.insert(prop(), dec(inflow));
        f.outflows.insert(prop(), dec(outflow));
        f
    }

    #[test]
    fn empty_custody_is_zero() {
        let ec = EscrowConservation::new();
        assert_eq!(ec.expected_custody(&prop()), Decimal::ZERO);
        assert!(ec.verify(&prop(), Decimal::ZERO, Decimal::ZERO).is_ok());
    }

    #[test]
    fn flows_accumulate() {
        let mut ec = EscrowConservation::new();
        ec.record(&flows(100, 0));
        ec.record(&flows(50, 100));
        assert_eq!(ec.expected_custody(&prop()), dec(50));
        assert!(ec.verify(&prop(), dec(50), dec(50)).is_ok());
    }

    #[test]
    fn drift_detected() {
        let mut ec = EscrowConservation::new();
        ec.record(&flows(100, 0));
        let err = ec.verify(&prop(), dec(90), dec(100)).unwrap_err();
        assert!(matches!(err, EscrowMatchError::EscrowInvariantViolation { .. }));
    }

    #[test]
    fn ledger_shortfall_detected_but_surplus_allowed() {
        let mut ec = EscrowConservation::new();
        ec.record(&flows(100, 0));
        assert!(ec.verify(&prop(), dec(100), dec(99)).is_err());
        assert!(ec.verify(&prop(), dec(100), dec(150)).is_ok());
    }

    #[test]
    fn sweep_counts_only_expected_custody() {
        let mut ec = EscrowConservation::seeded([(prop(), dec(100))]);
        let surplus = ec.record_sweep(&prop(), dec(130));
        assert_eq!(surplus, dec(30));
        assert_eq!(ec.expected_custody(&prop()), Decimal::ZERO);
        assert_eq!(ec.tracked_assets().len(), 1);
    }
}
