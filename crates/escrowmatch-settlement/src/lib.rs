//! # escrowmatch-settlement
//!
//! Moves funds. Nothing in this crate touches order status or risk state
//! directly; it stages ledger transfers, verifies them, and commits them as
//! one unit, then reports what happened so the caller can update its own
//! books.
//!
//! ## Fill flow
//!
//! 1. Stage the caller's leg (pulled into custody under its allowance)
//! 2. Stage release of the creator's escrowed leg to the caller
//! 3. Stage `net` to the seller and `fee` to the fee receiver
//! 4. Verify every staged leg against a balance/allowance overlay
//! 5. Prepare one batch per ledger, then finalize all or abort all
//!
//! Only after step 5 succeeds does the engine mark the order `Filled`,
//! release the escrow record and stamp the caller's cooldown.

pub mod escrow_conservation;
pub mod fee;
pub mod registry;
pub mod settler;
pub mod unit_of_work;

pub use escrow_conservation::EscrowConservation;
pub use fee::FeeBreakdown;
pub use registry::LedgerRegistry;
pub use settler::{SettlementEngine, SettlementReceipt};
pub use unit_of_work::{CustodyFlows, LedgerTransaction};
