//! Order and escrow-record types.
//!
//! An order is created only after its leg has been pulled into escrow, so
//! every `Active` order is fully backed. Status moves one way:
//!
//! ```text
//!   ┌────────┐   fill    ┌────────┐
//!   │ ACTIVE ├──────────▶│ FILLED │
//!   └───┬────┘           └────────┘
//!       │ cancel / emergency void
//!       ▼
//!   ┌───────────┐
//!   │ CANCELLED │
//!   └───────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AssetHandle, EscrowMatchError, OrderId, Result};

/// Which side the order creator is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    /// Creator sells `amount` of the asset; the asset leg is escrowed.
    Sell,
    /// Creator buys `amount` of the asset; `amount * unit_price` of payment is escrowed.
    Buy,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Sell => Self::Buy,
            Self::Buy => Self::Sell,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Buy => write!(f, "BUY"),
        }
    }
}

/// Lifecycle status of an order. `Filled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Can an order move from this status to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Active, Self::Filled | Self::Cancelled))
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub creator: AccountId,
    /// Ledger of the traded asset.
    pub asset: AssetHandle,
    /// Ledger of the payment instrument.
    pub payment: AssetHandle,
    /// Asset quantity, in whole base units.
    pub amount: Decimal,
    /// Payment units per asset unit.
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub side: OrderSide,
    pub status: OrderStatus,
}

impl Order {
    /// `amount * unit_price`, overflow checked.
    pub fn gross(&self) -> Result<Decimal> {
        checked_notional(self.amount, self.unit_price)
    }

    /// Ledger whose units this order keeps in escrow.
    #[must_use]
    pub fn locked_asset(&self) -> &AssetHandle {
        match self.side {
            OrderSide::Sell => &self.asset,
            OrderSide::Buy => &self.payment,
        }
    }

    /// Units this order keeps in escrow: the amount for a sell, the notional for a buy.
    pub fn locked_amount(&self) -> Result<Decimal> {
        match self.side {
            OrderSide::Sell => Ok(self.amount),
            OrderSide::Buy => self.gross(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Move to a terminal status.
    ///
    /// # Errors
    /// Returns `OrderNotActive` if the order already left `Active`.
    pub fn transition(&mut self, target: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(EscrowMatchError::OrderNotActive {
                id: self.id,
                status: self.status,
            });
        }
        self.status = target;
        Ok(())
    }
}

/// `amount * unit_price` with overflow mapped to [`EscrowMatchError::ArithmeticOverflow`].
pub fn checked_notional(amount: Decimal, unit_price: Decimal) -> Result<Decimal> {
    amount
        .checked_mul(unit_price)
        .ok_or(EscrowMatchError::ArithmeticOverflow {
            context: "amount * unit_price",
        })
}

/// The escrowed leg of one active order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub order_id: OrderId,
    /// Who gets the leg back on cancel.
    pub owner: AccountId,
    pub asset: AssetHandle,
    pub locked_amount: Decimal,
    pub locked_at: DateTime<Utc>,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(side: OrderSide, amount: Decimal, unit_price: Decimal) -> Self {
        Self {
            id: OrderId::FIRST,
            creator: AccountId::new(),
            asset: AssetHandle::from("PROP"),
            payment: AssetHandle::from("USDC"),
            amount,
            unit_price,
            created_at: Utc::now(),
            side,
            status: OrderStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_locks_asset_amount() {
        let order = Order::dummy(OrderSide::Sell, Decimal::new(100, 0), Decimal::new(2, 0));
        assert_eq!(order.locked_asset(), &AssetHandle::from("PROP"));
        assert_eq!(order.locked_amount().unwrap(), Decimal::new(100, 0));
    }

    #[test]
    fn buy_locks_payment_notional() {
        let order = Order::dummy(OrderSide::Buy, Decimal::new(100, 0), Decimal::new(2, 0));
        assert_eq!(order.locked_asset(), &AssetHandle::from("USDC"));
        assert_eq!(order.locked_amount().unwrap(), Decimal::new(200, 0));
    }

    #[test]
    fn notional_overflow_is_rejected() {
        let err = checked_notional(Decimal::MAX, Decimal::TWO).unwrap_err();
        assert!(matches!(err, EscrowMatchError::ArithmeticOverflow { .. }));
    }

    #[test]
    fn terminal_status_is_immutable() {
        let mut order = Order::dummy(OrderSide::Sell, Decimal::ONE, Decimal::ONE);
        order.transition(OrderStatus::Filled).unwrap();
        let err = order.transition(OrderStatus::Cancelled).unwrap_err();
        assert!(matches!(
            err,
            EscrowMatchError::OrderNotActive {
                status: OrderStatus::Filled,
                ..
            }
        ));
        let err = order.transition(OrderStatus::Filled).unwrap_err();
        assert!(matches!(err, EscrowMatchError::OrderNotActive { .. }));
    }

    #[test]
    fn active_is_not_a_target() {
        assert!(!OrderStatus::Active.can_transition_to(OrderStatus::Active));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Active));
    }

    #[test]
    fn side_display_and_opposite() {
        assert_eq!(format!("{}", OrderSide::Buy), "BUY");
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn order_serde_roundtrip() {
        let order = Order::dummy(OrderSide::Buy, Decimal::new(5, 0), Decimal::new(3, 0));
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
