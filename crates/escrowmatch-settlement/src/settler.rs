//! Atomic two-leg settlement of a single fill.
//!
//! ```text
//!  filling a SELL order (taker buys)       filling a BUY order (taker sells)
//!  ─────────────────────────────────       ─────────────────────────────────
//!  pull  payment  taker   → custody gross  pull  asset    taker   → custody amount
//!  push  asset    custody → taker  amount  push  asset    custody → maker   amount
//!  push  payment  custody → maker  net     push  payment  custody → taker   net
//!  push  payment  custody → fee    fee     push  payment  custody → fee     fee
//! ```
//!
//! The seller always receives `net`; the fee always comes out of the payment
//! leg. Order status, escrow record and cooldown stamp change only after the
//! ledger transaction commits.

use chrono::{DateTime, Utc};
use escrowmatch_custody::{EscrowLedger, OrderBook, RiskController};
use escrowmatch_types::{
    AccountId, AssetHandle, EngineConfig, EscrowMatchError, OrderId, OrderSide, Result,
    SelfTradePolicy,
};
use rust_decimal::Decimal;

use crate::fee::FeeBreakdown;
use crate::registry::LedgerRegistry;
use crate::unit_of_work::{CustodyFlows, LedgerTransaction};

/// What a committed fill did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub order_id: OrderId,
    /// Creator of the resting order.
    pub maker: AccountId,
    /// Caller that filled it.
    pub taker: AccountId,
    /// Side of the resting order.
    pub side: OrderSide,
    pub asset: AssetHandle,
    pub payment: AssetHandle,
    pub amount: Decimal,
    pub unit_price: Decimal,
    pub fees: FeeBreakdown,
    pub fee_receiver: AccountId,
    pub settled_at: DateTime<Utc>,
    pub flows: CustodyFlows,
}

impl SettlementReceipt {
    /// Account that delivered the asset and received `net`.
    #[must_use]
    pub fn seller(&self) -> AccountId {
        match self.side {
            OrderSide::Sell => self.maker,
            OrderSide::Buy => self.taker,
        }
    }

    /// Account that paid `gross` and received the asset.
    #[must_use]
    pub fn buyer(&self) -> AccountId {
        match self.side {
            OrderSide::Sell => self.taker,
            OrderSide::Buy => self.maker,
        }
    }
}

/// Drives one fill across the ledgers and the engine's books.
pub struct SettlementEngine<'a> {
    ledgers: &'a LedgerRegistry,
    custodian: AccountId,
}

impl<'a> SettlementEngine<'a> {
    #[must_use]
    pub fn new(ledgers: &'a LedgerRegistry, custodian: AccountId) -> Self {
        Self { ledgers, custodian }
    }

    /// Fill the resting order `order_id`, which must be on `expected_side`,
    /// on behalf of `taker`.
    ///
    /// # Errors
    /// - `OrderNotFound` / `OrderNotActive` for a missing or closed order
    /// - `InvalidParameter` if the order is on the other side
    /// - `AccountBlacklisted` / `InCooldown` from the risk controller
    /// - `SelfTradeBlocked` under [`SelfTradePolicy::Reject`]
    /// - `ArithmeticOverflow` from fee math
    /// - `InsufficientAllowance` / `InsufficientBalance` while staging
    /// - `TransferFailed` if a ledger refuses a verified leg
    ///
    /// On any error no order, escrow or risk state has changed.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        &self,
        book: &mut OrderBook,
        escrow: &mut EscrowLedger,
        risk: &mut RiskController,
        config: &EngineConfig,
        taker: AccountId,
        order_id: OrderId,
        expected_side: OrderSide,
        now: DateTime<Utc>,
    ) -> Result<SettlementReceipt> {
        let order = book.require_active(order_id)?.clone();
        if order.side != expected_side {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!("{order_id} is a {} order, expected {expected_side}", order.side),
            });
        }

        risk.check_not_blacklisted(&taker)?;
        risk.check_cooldown(&taker, now)?;
        if config.self_trade_policy == SelfTradePolicy::Reject && taker == order.creator {
            tracing::warn!(order = %order_id, account = %taker, "Self-trade rejected");
            return Err(EscrowMatchError::SelfTradeBlocked {
                id: order_id,
                account: taker,
            });
        }

        let fees = FeeBreakdown::compute(order.amount, order.unit_price, config.fee_rate_bps)?;
        let locked = escrow
            .get(order_id)
            .ok_or_else(|| EscrowMatchError::EscrowInvariantViolation {
                reason: format!("active {order_id} has no escrow record"),
            })?;
        let expected_lock = order.locked_amount()?;
        if locked.locked_amount != expected_lock || &locked.asset != order.locked_asset() {
            return Err(EscrowMatchError::EscrowInvariantViolation {
                reason: format!(
                    "{order_id} escrow {} {} does not match order leg {expected_lock} {}",
                    locked.locked_amount,
                    locked.asset,
                    order.locked_asset()
                ),
            });
        }

        let mut tx = LedgerTransaction::new(self.ledgers, self.custodian);
        match order.side {
            OrderSide::Sell => {
                tx.pull(&order.payment, taker, fees.gross)?;
                tx.push(&order.asset, taker, order.amount)?;
                tx.push(&order.payment, order.creator, fees.net)?;
            }
            OrderSide::Buy => {
                tx.pull(&order.asset, taker, order.amount)?;
                tx.push(&order.asset, order.creator, order.amount)?;
                tx.push(&order.payment, taker, fees.net)?;
            }
        }
        tx.push(&order.payment, config.fee_receiver, fees.fee)?;
        tracing::debug!(order = %order_id, legs = tx.len(), "Fill staged and verified");

        let flows = tx.commit()?;

        escrow.release(order_id)?;
        book.mark_filled(order_id)?;
        risk.record_trade(taker, now);

        tracing::info!(
            order = %order_id,
            side = %order.side,
            maker = %order.creator,
            taker = %taker,
            amount = %order.amount,
            price = %order.unit_price,
            gross = %fees.gross,
            fee = %fees.fee,
            net = %fees.net,
            "Order filled"
        );

        Ok(SettlementReceipt {
            order_id,
            maker: order.creator,
            taker,
            side: order.side,
            asset: order.asset,
            payment: order.payment,
            amount: order.amount,
            unit_price: order.unit_price,
            fees,
            fee_receiver: config.fee_receiver,
            settled_at: now,
            flows,
        })
    }
}
