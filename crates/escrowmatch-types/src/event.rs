//! Observability facts emitted by committed operations.
//!
//! Events are appended only after the operation that produced them commits,
//! so the log never shows a state the engine did not reach. Every event
//! carries its timestamp and, for parameter changes, the old and new values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetHandle, OrderId, OrderSide};

/// A single observable fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    OrderCreated {
        order_id: OrderId,
        creator: AccountId,
        side: OrderSide,
        asset: AssetHandle,
        amount: Decimal,
        unit_price: Decimal,
        locked_asset: AssetHandle,
        locked_amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    OrderCancelled {
        order_id: OrderId,
        creator: AccountId,
        released_asset: AssetHandle,
        released_amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    OrderExecuted {
        order_id: OrderId,
        /// The resting order's creator.
        maker: AccountId,
        /// The account that filled it.
        taker: AccountId,
        /// Side of the resting order.
        side: OrderSide,
        amount: Decimal,
        unit_price: Decimal,
        gross: Decimal,
        fee: Decimal,
        net: Decimal,
        timestamp: DateTime<Utc>,
    },
    FeeRateUpdated {
        old_bps: u32,
        new_bps: u32,
        timestamp: DateTime<Utc>,
    },
    FeeReceiverUpdated {
        old: AccountId,
        new: AccountId,
        timestamp: DateTime<Utc>,
    },
    TradingPaused {
        by: AccountId,
        timestamp: DateTime<Utc>,
    },
    TradingUnpaused {
        by: AccountId,
        timestamp: DateTime<Utc>,
    },
    MinTradeAmountUpdated {
        old: Decimal,
        new: Decimal,
        timestamp: DateTime<Utc>,
    },
    MaxTradeAmountUpdated {
        old: Decimal,
        new: Decimal,
        timestamp: DateTime<Utc>,
    },
    CooldownPeriodUpdated {
        old_secs: i64,
        new_secs: i64,
        timestamp: DateTime<Utc>,
    },
    AccountBlacklisted {
        account: AccountId,
        old: bool,
        new: bool,
        timestamp: DateTime<Utc>,
    },
    EmergencyWithdrawalInitiated {
        initiator: AccountId,
        required_approvals: usize,
        executable_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    EmergencyWithdrawalApproved {
        approver: AccountId,
        approval_count: usize,
        timestamp: DateTime<Utc>,
    },
    EmergencyWithdrawalExecuted {
        executor: AccountId,
        recipient: AccountId,
        /// Units moved per ledger.
        amounts: Vec<(AssetHandle, Decimal)>,
        /// Orders voided because their escrow left custody.
        voided_orders: Vec<OrderId>,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::OrderCreated { timestamp, .. }
            | Self::OrderCancelled { timestamp, .. }
            | Self::OrderExecuted { timestamp, .. }
            | Self::FeeRateUpdated { timestamp, .. }
            | Self::FeeReceiverUpdated { timestamp, .. }
            | Self::TradingPaused { timestamp, .. }
            | Self::TradingUnpaused { timestamp, .. }
            | Self::MinTradeAmountUpdated { timestamp, .. }
            | Self::MaxTradeAmountUpdated { timestamp, .. }
            | Self::CooldownPeriodUpdated { timestamp, .. }
            | Self::AccountBlacklisted { timestamp, .. }
            | Self::EmergencyWithdrawalInitiated { timestamp, .. }
            | Self::EmergencyWithdrawalApproved { timestamp, .. }
            | Self::EmergencyWithdrawalExecuted { timestamp, .. } => *timestamp,
        }
    }

    /// Stable event name, e.g. `ORDER_EXECUTED`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "ORDER_CREATED",
            Self::OrderCancelled { .. } => "ORDER_CANCELLED",
            Self::OrderExecuted { .. } => "ORDER_EXECUTED",
            Self::FeeRateUpdated { .. } => "FEE_RATE_UPDATED",
            Self::FeeReceiverUpdated { .. } => "FEE_RECEIVER_UPDATED",
            Self::TradingPaused { .. } => "TRADING_PAUSED",
            Self::TradingUnpaused { .. } => "TRADING_UNPAUSED",
            Self::MinTradeAmountUpdated { .. } => "MIN_TRADE_AMOUNT_UPDATED",
            Self::MaxTradeAmountUpdated { .. } => "MAX_TRADE_AMOUNT_UPDATED",
            Self::CooldownPeriodUpdated { .. } => "COOLDOWN_PERIOD_UPDATED",
            Self::AccountBlacklisted { .. } => "ACCOUNT_BLACKLISTED",
            Self::EmergencyWithdrawalInitiated { .. } => "EMERGENCY_WITHDRAWAL_INITIATED",
            Self::EmergencyWithdrawalApproved { .. } => "EMERGENCY_WITHDRAWAL_APPROVED",
            Self::EmergencyWithdrawalExecuted { .. } => "EMERGENCY_WITHDRAWAL_EXECUTED",
        }
    }
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name(), self.timestamp().to_rfc3339())
    }
}

/// An event with its position in the engine's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Starts at 1; strictly increasing.
    pub sequence: u64,
    pub event: EngineEvent,
}
