//! Snapshots: durable image of the engine's books.
//!
//! ```text
//!   Exchange::snapshot() ─► EngineSnapshot { version, taken_at, state, checksum }
//!                                  │
//!                     SnapshotStore::save()  snapshot-000000000042.json
//!                                  │          (tmp file, fsync, rename)
//!                     SnapshotStore::load()  verify version + SHA-256
//!                                  │
//!   Exchange::restore() ◄──────────┘  rebuild books, check escrow matches orders
//! ```
//!
//! Ledger balances and role grants live outside the engine and are not part
//! of the image. The retained event records are not persisted either; only
//! the sequence counter is, so numbering continues after a restore.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use escrowmatch_custody::{EscrowLedger, EscrowTotals, OrderBook, RiskController, RiskState};
use escrowmatch_governance::{GovernanceModule, PauseGuard};
use escrowmatch_settlement::{EscrowConservation, LedgerRegistry};
use escrowmatch_types::{
    AssetHandle, AuthorizationGateway, Clock, EngineConfig, EscrowMatchError, EscrowRecord,
    GovernanceRequest, Order, OrderId, Result, constants,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::events::EventLog;
use crate::exchange::{EngineCore, Exchange};

/// Everything needed to rebuild an [`Exchange`], in deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateImage {
    pub config: EngineConfig,
    pub paused: bool,
    /// Every order ever created, sorted by id.
    pub orders: Vec<Order>,
    pub next_order_id: OrderId,
    /// Escrow of active orders, sorted by order id.
    pub escrow_records: Vec<EscrowRecord>,
    pub escrow_totals: Vec<(AssetHandle, EscrowTotals)>,
    pub risk: RiskState,
    pub governance: Option<GovernanceRequest>,
    pub last_event_sequence: u64,
}

impl StateImage {
    /// Hex SHA-256 of the JSON encoding.
    ///
    /// # Errors
    /// `Serialization` if encoding fails.
    pub fn checksum(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// A versioned, checksummed [`StateImage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub state: StateImage,
    pub checksum: String,
}

impl EngineSnapshot {
    /// # Errors
    /// `Serialization` if the image cannot be encoded.
    pub fn new(state: StateImage, taken_at: DateTime<Utc>) -> Result<Self> {
        let checksum = state.checksum()?;
        Ok(Self {
            version: constants::SNAPSHOT_FORMAT_VERSION,
            taken_at,
            state,
            checksum,
        })
    }

    /// Check the format version and the checksum.
    ///
    /// # Errors
    /// `Serialization` on either mismatch.
    pub fn verify(&self) -> Result<()> {
        if self.version != constants::SNAPSHOT_FORMAT_VERSION {
            return Err(EscrowMatchError::Serialization(format!(
                "unsupported snapshot version {} (expected {})",
                self.version,
                constants::SNAPSHOT_FORMAT_VERSION
            )));
        }
        let actual = self.state.checksum()?;
        if actual != self.checksum {
            return Err(EscrowMatchError::Serialization(format!(
                "snapshot checksum mismatch: recorded {}, computed {actual}",
                self.checksum
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.state.last_event_sequence
    }
}

// ───────────────────────── Store ─────────────────────────

const FILE_PREFIX: &str = "snapshot-";
const FILE_SUFFIX: &str = ".json";

/// Directory of snapshot files named by event sequence.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `snapshot` atomically, returning its path.
    ///
    /// # Errors
    /// `Io` or `Serialization`.
    pub fn save(&self, snapshot: &EngineSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec_pretty(snapshot)?;
        let name = format!("{FILE_PREFIX}{:012}{FILE_SUFFIX}", snapshot.sequence());
        let path = self.dir.join(&name);
        let tmp_path = self.dir.join(format!("{name}.tmp"));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        tracing::info!(path = %path.display(), sequence = snapshot.sequence(), "Snapshot saved");
        Ok(path)
    }

    /// Read and verify one snapshot file.
    ///
    /// # Errors
    /// `Io`, or `Serialization` for malformed or tampered content.
    pub fn load(&self, path: &Path) -> Result<EngineSnapshot> {
        let data = fs::read(path)?;
        let snapshot: EngineSnapshot = serde_json::from_slice(&data)?;
        snapshot.verify()?;
        Ok(snapshot)
    }

    /// The snapshot with the highest sequence, if any.
    ///
    /// # Errors
    /// As [`load`](Self::load).
    pub fn load_latest(&self) -> Result<Option<EngineSnapshot>> {
        match self.list()?.pop() {
            Some((_, path)) => self.load(&path).map(Some),
            None => Ok(None),
        }
    }

    /// `(sequence, path)` pairs in ascending sequence order.
    ///
    /// # Errors
    /// `Io` if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let sequence = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                found.push((sequence, entry.path()));
            }
        }
        found.sort_by_key(|(sequence, _)| *sequence);
        Ok(found)
    }
}

// ───────────────────────── Exchange ─────────────────────────

impl Exchange {
    /// Capture the current state.
    ///
    /// # Errors
    /// `Serialization` if the image cannot be encoded.
    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        let core = self.lock();
        let state = StateImage {
            config: core.config.clone(),
            paused: core.pause.is_paused(),
            orders: core.book.iter().cloned().collect(),
            next_order_id: core.book.peek_next_id(),
            escrow_records: core.escrow.records(),
            escrow_totals: core
                .escrow
                .all_totals()
                .iter()
                .map(|(asset, totals)| (asset.clone(), totals.clone()))
                .collect(),
            risk: core.risk.to_state(),
            governance: core.governance.request().cloned(),
            last_event_sequence: core.events.last_sequence(),
        };
        let snapshot = EngineSnapshot::new(state, self.clock.now())?;
        tracing::debug!(
            orders = snapshot.state.orders.len(),
            sequence = snapshot.sequence(),
            "Snapshot taken"
        );
        Ok(snapshot)
    }

    /// Rebuild an exchange from a verified snapshot.
    ///
    /// # Errors
    /// - `Serialization` if the snapshot fails verification or its config
    ///   disagrees with its risk limits
    /// - `Configuration` for an invalid config or missing payment ledger
    /// - `Internal` / `EscrowInvariantViolation` if the books are inconsistent
    pub fn restore(
        snapshot: EngineSnapshot,
        gateway: Arc<dyn AuthorizationGateway>,
        ledgers: LedgerRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        snapshot.verify()?;
        let state = snapshot.state;
        state.config.validate()?;
        Self::check_payment_ledger(&state.config, &ledgers)?;
        if state.config.min_trade_amount != state.risk.min_trade_amount
            || state.config.max_trade_amount != state.risk.max_trade_amount
            || state.config.cooldown != state.risk.cooldown
        {
            return Err(EscrowMatchError::Serialization(
                "snapshot config disagrees with its risk limits".to_string(),
            ));
        }

        let book = OrderBook::from_orders(state.orders, state.next_order_id)?;
        let totals: BTreeMap<AssetHandle, EscrowTotals> = state.escrow_totals.into_iter().collect();
        let escrow = EscrowLedger::from_parts(state.escrow_records, totals)?;
        Self::check_escrow_matches_orders(&book, &escrow)?;

        let conservation = EscrowConservation::seeded(
            escrow
                .all_totals()
                .keys()
                .map(|asset| (asset.clone(), escrow.custody_total(asset))),
        );
        let core = EngineCore {
            governance: GovernanceModule::with_request(&state.config.governance, state.governance),
            risk: RiskController::from_state(state.risk)?,
            pause: PauseGuard::with_state(state.paused),
            events: EventLog::resume(state.last_event_sequence),
            config: state.config,
            book,
            escrow,
            conservation,
        };
        tracing::info!(
            orders = core.book.len(),
            active = core.book.active_count(),
            paused = core.pause.is_paused(),
            sequence = core.events.last_sequence(),
            "Exchange restored from snapshot"
        );
        Ok(Self {
            gateway,
            ledgers,
            clock,
            core: Mutex::new(core),
        })
    }

    /// One escrow record per active order, matching its leg; none otherwise.
    fn check_escrow_matches_orders(book: &OrderBook, escrow: &EscrowLedger) -> Result<()> {
        for order in book.iter() {
            match (order.is_active(), escrow.get(order.id)) {
                (true, Some(record)) => {
                    if &record.asset != order.locked_asset()
                        || record.locked_amount != order.locked_amount()?
                        || record.owner != order.creator
                    {
                        return Err(EscrowMatchError::EscrowInvariantViolation {
                            reason: format!("{} escrow does not match its order", order.id),
                        });
                    }
                }
                (true, None) => {
                    return Err(EscrowMatchError::EscrowInvariantViolation {
                        reason: format!("active {} has no escrow record", order.id),
                    });
                }
                (false, Some(_)) => {
                    return Err(EscrowMatchError::EscrowInvariantViolation {
                        reason: format!("closed {} still holds escrow", order.id),
                    });
                }
                (false, None) => {}
            }
        }
        if escrow.active_count() != book.active_count() {
            return Err(EscrowMatchError::EscrowInvariantViolation {
                reason: format!(
                    "{} escrow records for {} active orders",
                    escrow.active_count(),
                    book.active_count()
                ),
            });
        }
        Ok(())
    }
}
