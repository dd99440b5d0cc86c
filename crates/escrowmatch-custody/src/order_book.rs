//! Order book: owns every order record.
//!
//! Ids are allocated here, densely and in creation order. Two indices are
//! maintained incrementally so that account and side queries never scan the
//! whole table:
//!
//! - `by_account`: every order an account ever created
//! - `active`: currently active ids, per side

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use escrowmatch_types::{
    AccountId, AssetHandle, EscrowMatchError, Order, OrderId, OrderSide, OrderStatus, Result,
};
use rust_decimal::Decimal;

/// Parameters of an order about to be opened.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub creator: AccountId,
    pub asset: AssetHandle,
    pub payment: AssetHandle,
    pub side: OrderSide,
    pub amount: Decimal,
    pub unit_price: Decimal,
}

/// Order table with incremental indices.
#[derive(Debug)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    by_account: HashMap<AccountId, Vec<OrderId>>,
    active: HashMap<OrderSide, BTreeSet<OrderId>>,
    next_id: OrderId,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
            by_account: HashMap::new(),
            active: HashMap::new(),
            next_id: OrderId::FIRST,
        }
    }

    /// Rebuild a book (and its indices) from a list of orders.
    ///
    /// # Errors
    /// Returns `Internal` if ids repeat or `next_id` does not exceed every id.
    pub fn from_orders(orders: Vec<Order>, next_id: OrderId) -> Result<Self> {
        let mut book = Self::new();
        for order in orders {
            if order.id >= next_id {
                return Err(EscrowMatchError::Internal(format!(
                    "{} is not below next id {next_id}",
                    order.id
                )));
            }
            if book.orders.contains_key(&order.id) {
                return Err(EscrowMatchError::Internal(format!("duplicate {}", order.id)));
            }
            book.index(&order);
            book.orders.insert(order.id, order);
        }
        book.next_id = next_id;
        Ok(book)
    }

    fn index(&mut self, order: &Order) {
        self.by_account.entry(order.creator).or_default().push(order.id);
        if order.is_active() {
            self.active.entry(order.side).or_default().insert(order.id);
        }
    }

    /// The id the next `open` will allocate.
    #[must_use]
    pub fn peek_next_id(&self) -> OrderId {
        self.next_id
    }

    /// Record a new `Active` order. Call only after its escrow has been pulled.
    pub fn open(&mut self, new: NewOrder, now: DateTime<Utc>) -> &Order {
        let id = self.next_id;
        self.next_id = id.next();
        let order = Order {
            id,
            creator: new.creator,
            asset: new.asset,
            payment: new.payment,
            amount: new.amount,
            unit_price: new.unit_price,
            created_at: now,
            side: new.side,
            status: OrderStatus::Active,
        };
        self.index(&order);
        self.orders.entry(id).or_insert(order)
    }

    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Look up an order that must still be active.
    ///
    /// # Errors
    /// `OrderNotFound` or `OrderNotActive`.
    pub fn require_active(&self, id: OrderId) -> Result<&Order> {
        let order = self.orders.get(&id).ok_or(EscrowMatchError::OrderNotFound(id))?;
        if !order.is_active() {
            return Err(EscrowMatchError::OrderNotActive {
                id,
                status: order.status,
            });
        }
        Ok(order)
    }

    fn close(&mut self, id: OrderId, target: OrderStatus) -> Result<&Order> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(EscrowMatchError::OrderNotFound(id))?;
        order.transition(target)?;
        if let Some(ids) = self.active.get_mut(&order.side) {
            ids.remove(&id);
        }
        Ok(order)
    }

    /// `Active → Filled`.
    pub fn mark_filled(&mut self, id: OrderId) -> Result<&Order> {
        self.close(id, OrderStatus::Filled)
    }

    /// `Active → Cancelled`.
    pub fn mark_cancelled(&mut self, id: OrderId) -> Result<&Order> {
        self.close(id, OrderStatus::Cancelled)
    }

    /// Cancel every active order, returning the voided ids in ascending order.
    pub fn void_all_active(&mut self) -> Vec<OrderId> {
        let ids: Vec<OrderId> = self
            .active
            .values()
            .flat_map(|set| set.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for id in &ids {
            if let Some(order) = self.orders.get_mut(id) {
                order.status = OrderStatus::Cancelled;
            }
        }
        self.active.clear();
        ids
    }

    /// Every order `account` created, oldest first.
    #[must_use]
    pub fn user_orders(&self, account: &AccountId) -> Vec<OrderId> {
        self.by_account.get(account).cloned().unwrap_or_default()
    }

    /// Active orders on `side`, oldest first.
    #[must_use]
    pub fn active_orders(&self, side: OrderSide) -> Vec<OrderId> {
        self.active
            .get(&side)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// All orders in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
