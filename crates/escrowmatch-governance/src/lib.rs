//! # escrowmatch-governance
//!
//! Controls that sit above order flow:
//!
//! - [`PauseGuard`]: admin switch that stops order creation and fills
//! - [`GovernanceModule`]: the single N-of-M, timelocked emergency
//!   withdrawal request
//!
//! Neither touches orders or ledgers. The engine consults them and performs
//! the resulting transfers itself.

pub mod emergency;
pub mod pause;

pub use emergency::GovernanceModule;
pub use pause::PauseGuard;
