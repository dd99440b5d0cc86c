//! # escrowmatch-types
//!
//! Shared types, errors, and configuration for the **EscrowMatch** engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`AccountId`], [`AssetHandle`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`], [`EscrowRecord`]
//! - **Account model**: [`AccountState`]
//! - **Governance model**: [`GovernanceRequest`]
//! - **Events**: [`EngineEvent`] and its payload structs
//! - **Configuration**: [`EngineConfig`], [`GovernanceConfig`], [`SelfTradePolicy`]
//! - **Errors**: [`EscrowMatchError`] with `EM_ERR_` prefix codes
//! - **External seams**: [`AuthorizationGateway`], [`FungibleLedger`], [`Clock`]
//!   together with in-memory implementations of each
//! - **Constants**: defaults and limits

pub mod account;
pub mod auth;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod governance;
pub mod ids;
pub mod ledger;
pub mod order;

pub use account::*;
pub use auth::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use governance::*;
pub use ids::*;
pub use ledger::*;
pub use order::*;

// Constants are accessed via `escrowmatch_types::constants::FOO`.
