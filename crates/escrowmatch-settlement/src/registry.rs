//! Registered external ledgers, keyed by asset handle.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use escrowmatch_types::{AssetHandle, EscrowMatchError, FungibleLedger, Result};

/// Every ledger the engine may move funds on.
#[derive(Clone, Default)]
pub struct LedgerRegistry {
    ledgers: BTreeMap<AssetHandle, Arc<dyn FungibleLedger>>,
}

impl LedgerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ledger under its own handle, replacing any previous one.
    pub fn register(&mut self, ledger: Arc<dyn FungibleLedger>) {
        self.ledgers.insert(ledger.handle().clone(), ledger);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, ledger: Arc<dyn FungibleLedger>) -> Self {
        self.register(ledger);
        self
    }

    /// # Errors
    /// `UnknownAsset` if nothing is registered under `asset`.
    pub fn get(&self, asset: &AssetHandle) -> Result<&Arc<dyn FungibleLedger>> {
        self.ledgers
            .get(asset)
            .ok_or_else(|| EscrowMatchError::UnknownAsset(asset.clone()))
    }

    #[must_use]
    pub fn contains(&self, asset: &AssetHandle) -> bool {
        self.ledgers.contains_key(asset)
    }

    /// Ledgers in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FungibleLedger>> {
        self.ledgers.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

impl fmt::Debug for LedgerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ledgers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrowmatch_types::InMemoryLedger;

    #[test]
    fn lookup_by_handle() {
        let registry = LedgerRegistry::new()
            .with(Arc::new(InMemoryLedger::new("PROP")))
            .with(Arc::new(InMemoryLedger::new("USDC")));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get(&AssetHandle::from("USDC")).unwrap().handle(),
            &AssetHandle::from("USDC")
        );
        assert!(matches!(
            registry.get(&AssetHandle::from("DOGE")).err().unwrap(),
            EscrowMatchError::UnknownAsset(_)
        ));
        assert_eq!(format!("{registry:?}"), r#"{AssetHandle("PROP"), AssetHandle("USDC")}"#);
    }
}
