//! Error types for the EscrowMatch engine.
//!
//! All errors use the `EM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by category:
//! - 1xx: Validation errors (rejected before any mutation)
//! - 2xx: Authorization errors
//! - 3xx: State errors
//! - 4xx: Resource errors (allowance, balance, transfer)
//! - 5xx: Rate-limit / risk-bound errors
//! - 6xx: Governance errors
//! - 9xx: General / internal errors
//!
//! Every error aborts the whole triggering operation with zero partial
//! effects. The engine never retries internally.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, AssetHandle, OrderId, OrderStatus, Role};

/// Coarse error category, one per group of codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    Authorization,
    State,
    Resource,
    RateLimit,
    Governance,
    Internal,
}

/// Central error enum for all EscrowMatch operations.
#[derive(Debug, Error)]
pub enum EscrowMatchError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Amount is zero, negative or not a whole number of base units.
    #[error("EM_ERR_100: Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Unit price is zero, negative or not a whole number of base units.
    #[error("EM_ERR_101: Invalid price: {0}")]
    InvalidPrice(Decimal),

    /// The zero address was supplied where an account is required.
    #[error("EM_ERR_102: Invalid account: {reason}")]
    InvalidAccount { reason: String },

    /// An administrative parameter is out of range.
    #[error("EM_ERR_103: Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    /// Fixed-point arithmetic overflowed.
    #[error("EM_ERR_104: Arithmetic overflow computing {context}")]
    ArithmeticOverflow { context: &'static str },

    /// No ledger is registered for this asset handle.
    #[error("EM_ERR_105: Unknown asset: {0}")]
    UnknownAsset(AssetHandle),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The caller lacks the role required for this operation.
    #[error("EM_ERR_200: Unauthorized: {account} lacks {role}: {message}")]
    Unauthorized {
        role: Role,
        account: AccountId,
        message: String,
    },

    // =================================================================
    // State Errors (3xx)
    // =================================================================
    /// No order with this id exists.
    #[error("EM_ERR_300: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is no longer active (already filled or cancelled).
    #[error("EM_ERR_301: Order {id} is not active (status {status})")]
    OrderNotActive { id: OrderId, status: OrderStatus },

    /// Only the order creator may cancel it.
    #[error("EM_ERR_302: Caller {caller} does not own {id}")]
    NotOwner { id: OrderId, caller: AccountId },

    /// This admin already approved the pending request.
    #[error("EM_ERR_303: Account {0} already approved the pending request")]
    AlreadyApproved(AccountId),

    /// Trading is paused.
    #[error("EM_ERR_304: Not accepting orders: trading is paused")]
    NotAcceptingOrders,

    /// `pause` called while already paused.
    #[error("EM_ERR_305: Trading is already paused")]
    AlreadyPaused,

    /// `unpause` called while not paused.
    #[error("EM_ERR_306: Trading is not paused")]
    NotPaused,

    /// The caller is blacklisted.
    #[error("EM_ERR_307: Account {0} is blacklisted")]
    AccountBlacklisted(AccountId),

    /// Caller tried to fill their own order under a rejecting self-trade policy.
    #[error("EM_ERR_308: Self-trade blocked: {account} created {id}")]
    SelfTradeBlocked { id: OrderId, account: AccountId },

    /// No emergency-withdrawal request is pending.
    #[error("EM_ERR_309: No active emergency-withdrawal request")]
    NoActiveRequest,

    // =================================================================
    // Resource Errors (4xx)
    // =================================================================
    /// Pre-authorized amount is below what the operation must move.
    #[error("EM_ERR_400: Insufficient allowance on {asset}: need {needed}, approved {approved}")]
    InsufficientAllowance {
        asset: AssetHandle,
        needed: Decimal,
        approved: Decimal,
    },

    /// Ledger balance is below what the operation must move.
    #[error("EM_ERR_401: Insufficient balance on {asset}: need {needed}, have {available}")]
    InsufficientBalance {
        asset: AssetHandle,
        needed: Decimal,
        available: Decimal,
    },

    /// The external ledger refused a transfer.
    #[error("EM_ERR_402: Transfer failed on {asset}: {reason}")]
    TransferFailed { asset: AssetHandle, reason: String },

    // =================================================================
    // Rate-limit Errors (5xx)
    // =================================================================
    /// The account traded too recently.
    #[error("EM_ERR_500: Account {account} in cooldown until {until}")]
    InCooldown {
        account: AccountId,
        until: DateTime<Utc>,
    },

    /// Trade amount below the configured minimum.
    #[error("EM_ERR_501: Amount {amount} below minimum {minimum}")]
    AmountBelowMinimum { amount: Decimal, minimum: Decimal },

    /// Trade amount above the configured maximum.
    #[error("EM_ERR_502: Amount {amount} above maximum {maximum}")]
    AmountAboveMaximum { amount: Decimal, maximum: Decimal },

    // =================================================================
    // Governance Errors (6xx)
    // =================================================================
    /// Fewer distinct approvals than required.
    #[error("EM_ERR_600: Not enough approvals: have {have}, need {need}")]
    NotEnoughApprovals { have: usize, need: usize },

    /// The timelock has not elapsed yet.
    #[error("EM_ERR_601: Timelock not expired: executable at {executable_at}")]
    TimelockNotExpired { executable_at: DateTime<Utc> },

    /// A request is already pending.
    #[error("EM_ERR_602: An emergency-withdrawal request is already active")]
    RequestAlreadyActive,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Escrow conservation invariant violated. Critical.
    #[error("EM_ERR_900: Escrow invariant violation: {reason}")]
    EscrowInvariantViolation { reason: String },

    /// Unrecoverable internal error.
    #[error("EM_ERR_901: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("EM_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("EM_ERR_903: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (snapshot files).
    #[error("EM_ERR_904: I/O error: {0}")]
    Io(String),
}

impl EscrowMatchError {
    /// The category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidPrice(_)
            | Self::InvalidAccount { .. }
            | Self::InvalidParameter { .. }
            | Self::ArithmeticOverflow { .. }
            | Self::UnknownAsset(_) => ErrorCategory::Validation,
            Self::Unauthorized { .. } => ErrorCategory::Authorization,
            Self::OrderNotFound(_)
            | Self::OrderNotActive { .. }
            | Self::NotOwner { .. }
            | Self::AlreadyApproved(_)
            | Self::NotAcceptingOrders
            | Self::AlreadyPaused
            | Self::NotPaused
            | Self::AccountBlacklisted(_)
            | Self::SelfTradeBlocked { .. }
            | Self::NoActiveRequest => ErrorCategory::State,
            Self::InsufficientAllowance { .. }
            | Self::InsufficientBalance { .. }
            | Self::TransferFailed { .. } => ErrorCategory::Resource,
            Self::InCooldown { .. }
            | Self::AmountBelowMinimum { .. }
            | Self::AmountAboveMaximum { .. } => ErrorCategory::RateLimit,
            Self::NotEnoughApprovals { .. }
            | Self::TimelockNotExpired { .. }
            | Self::RequestAlreadyActive => ErrorCategory::Governance,
            Self::EscrowInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorCategory::Internal,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, EscrowMatchError>;

impl From<std::io::Error> for EscrowMatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EscrowMatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
