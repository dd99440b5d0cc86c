//! # escrowmatch-engine
//!
//! The exchange surface consumed by an API layer.
//!
//! [`Exchange`] serialises every operation behind one lock and drives the
//! lower crates in a fixed order:
//!
//! ```text
//!   AuthorizationGateway ──► input validation ──► PauseGuard
//!            │
//!            ▼
//!     RiskController ──► LedgerTransaction (stage, verify, commit)
//!            │
//!            ▼
//!   OrderBook / EscrowLedger / cooldown ──► EventLog
//! ```
//!
//! Ledgers, the authorization gateway and the clock are injected at
//! construction. State can be captured as an [`EngineSnapshot`] and rebuilt
//! with [`Exchange::restore`].

mod admin;
pub mod events;
pub mod exchange;
pub mod logging;
pub mod snapshot;

pub use events::EventLog;
pub use exchange::Exchange;
pub use snapshot::{EngineSnapshot, SnapshotStore, StateImage};

pub use escrowmatch_settlement::{FeeBreakdown, LedgerRegistry, SettlementReceipt};
