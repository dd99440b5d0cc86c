//! # escrowmatch-custody
//!
//! **Custody plane**: the state that every trade touches.
//!
//! 1. **OrderBook**: order records, id allocation, per-account and per-side indices
//! 2. **EscrowLedger**: the locked leg of every active order, plus per-asset
//!    locked/released/forfeited totals
//! 3. **RiskController**: blacklist, trade-size bounds, per-account cooldown
//!
//! None of these talk to external ledgers. The engine pulls funds first and
//! only then records the order and its escrow here, so a failed pull leaves
//! no trace.

pub mod escrow;
pub mod order_book;
pub mod risk_controller;

pub use escrow::{EscrowLedger, EscrowTotals};
pub use order_book::{NewOrder, OrderBook};
pub use risk_controller::{RiskController, RiskState};
