//! The exchange: order lifecycle and fills.
//!
//! Every public method takes `&self`, locks the engine core once, and runs
//! to completion under that lock. Within an operation the order is always:
//!
//! 1. authorization (only when trading is role-gated, for trading calls)
//! 2. input validation
//! 3. pause check (create and fill only)
//! 4. risk checks
//! 5. ledger transaction: stage, verify, commit
//! 6. order book / escrow / cooldown updates
//! 7. event append
//!
//! Steps 1-5 may fail; nothing in the engine changes until step 5 succeeds.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use escrowmatch_custody::{EscrowLedger, NewOrder, OrderBook, RiskController};
use escrowmatch_governance::{GovernanceModule, PauseGuard};
use escrowmatch_settlement::{
    EscrowConservation, LedgerRegistry, LedgerTransaction, SettlementEngine, SettlementReceipt,
};
use escrowmatch_types::{
    AccountId, AccountState, AssetHandle, AuthorizationGateway, Clock, EngineConfig, EngineEvent,
    EscrowMatchError, EventRecord, GovernanceRequest, Order, OrderId, OrderSide, Result, Role,
    checked_notional, constants,
};
use rust_decimal::Decimal;

use crate::events::EventLog;

/// Everything guarded by the engine lock.
pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) book: OrderBook,
    pub(crate) escrow: EscrowLedger,
    pub(crate) risk: RiskController,
    pub(crate) pause: PauseGuard,
    pub(crate) governance: GovernanceModule,
    pub(crate) conservation: EscrowConservation,
    pub(crate) events: EventLog,
}

/// Escrow-based order matching and settlement engine.
pub struct Exchange {
    pub(crate) gateway: Arc<dyn AuthorizationGateway>,
    pub(crate) ledgers: LedgerRegistry,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) core: Mutex<EngineCore>,
}

impl Exchange {
    /// Build an engine with empty books.
    ///
    /// # Errors
    /// `Configuration` if `config` is invalid or the payment ledger is not
    /// registered.
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn AuthorizationGateway>,
        ledgers: LedgerRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Self::check_payment_ledger(&config, &ledgers)?;
        let risk = RiskController::with_limits(
            config.min_trade_amount,
            config.max_trade_amount,
            config.cooldown,
        )?;
        let core = EngineCore {
            governance: GovernanceModule::new(&config.governance),
            book: OrderBook::new(),
            escrow: EscrowLedger::new(),
            risk,
            pause: PauseGuard::new(),
            conservation: EscrowConservation::new(),
            events: EventLog::new(),
            config,
        };
        tracing::info!(
            engine = %core.config.engine_account,
            payment = %core.config.payment_asset,
            ledgers = ledgers.len(),
            fee_bps = core.config.fee_rate_bps,
            "Exchange started"
        );
        Ok(Self {
            gateway,
            ledgers,
            clock,
            core: Mutex::new(core),
        })
    }

    pub(crate) fn check_payment_ledger(config: &EngineConfig, ledgers: &LedgerRegistry) -> Result<()> {
        if ledgers.contains(&config.payment_asset) {
            Ok(())
        } else {
            Err(EscrowMatchError::Configuration(format!(
                "payment ledger {} is not registered",
                config.payment_asset
            )))
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ───────────────────────── Guards ─────────────────────────

    pub(crate) fn require_account(account: AccountId, what: &str) -> Result<()> {
        if account.is_nil() {
            return Err(EscrowMatchError::InvalidAccount {
                reason: format!("{what} is the zero address"),
            });
        }
        Ok(())
    }

    /// Positive, whole base units.
    pub(crate) fn require_quantity(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO || !amount.fract().is_zero() {
            return Err(EscrowMatchError::InvalidAmount(amount));
        }
        Ok(())
    }

    fn require_price(unit_price: Decimal) -> Result<()> {
        if unit_price <= Decimal::ZERO || !unit_price.fract().is_zero() {
            return Err(EscrowMatchError::InvalidPrice(unit_price));
        }
        Ok(())
    }

    fn authorize_trading(&self, config: &EngineConfig, caller: AccountId) -> Result<()> {
        if config.trading_requires_role {
            self.gateway
                .validate_role(Role::Trader, &caller, "trading requires the trader role")?;
        }
        Ok(())
    }

    /// Pass if `caller` holds any of `roles`.
    pub(crate) fn authorize_any(&self, roles: &[Role], caller: AccountId, message: &str) -> Result<()> {
        if roles.iter().any(|role| self.gateway.check_role(*role, &caller)) {
            return Ok(());
        }
        let role = roles.first().copied().unwrap_or(Role::Admin);
        tracing::warn!(%role, account = %caller, reason = message, "Role check failed");
        Err(EscrowMatchError::Unauthorized {
            role,
            account: caller,
            message: message.to_string(),
        })
    }

    /// Check escrow accounting and ledger backing for `asset`, logging on
    /// failure. Runs after every committed change.
    pub(crate) fn audit(&self, core: &EngineCore, asset: &AssetHandle) {
        if let Err(err) = self.check_conservation(core, asset) {
            tracing::error!(%asset, error = %err, "Escrow conservation check failed");
        }
    }

    fn check_conservation(&self, core: &EngineCore, asset: &AssetHandle) -> Result<()> {
        core.escrow.check_totals(asset)?;
        let ledger = self.ledgers.get(asset)?;
        core.conservation.verify(
            asset,
            core.escrow.custody_total(asset),
            ledger.balance_of(&core.config.engine_account),
        )
    }

    // ───────────────────────── Orders ─────────────────────────

    /// Escrow `amount` of `asset` and list it for sale at `unit_price`.
    ///
    /// # Errors
    /// Validation, pause, risk and ledger errors; on any error no order
    /// exists and no funds moved.
    pub fn create_sell_order(
        &self,
        seller: AccountId,
        asset: &AssetHandle,
        amount: Decimal,
        unit_price: Decimal,
    ) -> Result<OrderId> {
        self.create_order(seller, OrderSide::Sell, asset, amount, unit_price)
    }

    /// Escrow `amount * unit_price` of the payment asset and bid for
    /// `amount` of `asset`.
    ///
    /// # Errors
    /// As [`create_sell_order`](Self::create_sell_order).
    pub fn create_buy_order(
        &self,
        buyer: AccountId,
        asset: &AssetHandle,
        amount: Decimal,
        unit_price: Decimal,
    ) -> Result<OrderId> {
        self.create_order(buyer, OrderSide::Buy, asset, amount, unit_price)
    }

    fn create_order(
        &self,
        creator: AccountId,
        side: OrderSide,
        asset: &AssetHandle,
        amount: Decimal,
        unit_price: Decimal,
    ) -> Result<OrderId> {
        let mut guard = self.lock();
        let core = &mut *guard;
        let now = self.clock.now();

        self.authorize_trading(&core.config, creator)?;
        Self::require_account(creator, "order creator")?;
        Self::require_quantity(amount)?;
        Self::require_price(unit_price)?;
        if *asset == core.config.payment_asset {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!("{asset} is the payment asset and cannot be listed"),
            });
        }
        if !self.ledgers.contains(asset) {
            return Err(EscrowMatchError::UnknownAsset(asset.clone()));
        }
        core.pause.check_accepting()?;
        core.risk.check_not_blacklisted(&creator)?;
        core.risk.check_trade_amount(amount)?;

        let payment = core.config.payment_asset.clone();
        let (locked_asset, locked_amount) = match side {
            OrderSide::Sell => (asset.clone(), amount),
            OrderSide::Buy => (payment.clone(), checked_notional(amount, unit_price)?),
        };

        let mut tx = LedgerTransaction::new(&self.ledgers, core.config.engine_account);
        tx.pull(&locked_asset, creator, locked_amount)?;

        let id = core.book.peek_next_id();
        core.escrow.lock(id, creator, &locked_asset, locked_amount, now)?;
        let flows = match tx.commit() {
            Ok(flows) => flows,
            Err(err) => {
                core.escrow.discard(id)?;
                return Err(err);
            }
        };
        core.conservation.record(&flows);
        let order = core.book.open(
            NewOrder {
                creator,
                asset: asset.clone(),
                payment,
                side,
                amount,
                unit_price,
            },
            now,
        );
        debug_assert_eq!(order.id, id);

        tracing::info!(
            order = %id,
            %side,
            creator = %creator,
            %asset,
            %amount,
            price = %unit_price,
            locked = %locked_amount,
            "Order created"
        );
        core.events.append(EngineEvent::OrderCreated {
            order_id: id,
            creator,
            side,
            asset: asset.clone(),
            amount,
            unit_price,
            locked_asset: locked_asset.clone(),
            locked_amount,
            timestamp: now,
        });
        self.audit(core, &locked_asset);
        Ok(id)
    }

    /// Cancel an active order and return its escrow to the creator.
    ///
    /// Permitted while trading is paused.
    ///
    /// # Errors
    /// - `AccountBlacklisted` if the caller is blacklisted
    /// - `OrderNotFound`, `NotOwner`, `OrderNotActive`
    /// - ledger errors from the release transfer
    pub fn cancel_order(&self, caller: AccountId, order_id: OrderId) -> Result<()> {
        let mut guard = self.lock();
        let core = &mut *guard;
        let now = self.clock.now();

        self.authorize_trading(&core.config, caller)?;
        Self::require_account(caller, "caller")?;
        core.risk.check_not_blacklisted(&caller)?;

        let order = core
            .book
            .get(order_id)
            .ok_or(EscrowMatchError::OrderNotFound(order_id))?;
        if order.creator != caller {
            tracing::warn!(order = %order_id, caller = %caller, "Cancel by non-owner rejected");
            return Err(EscrowMatchError::NotOwner {
                id: order_id,
                caller,
            });
        }
        core.book.require_active(order_id)?;

        let record = core.escrow.get(order_id).cloned().ok_or_else(|| {
            EscrowMatchError::EscrowInvariantViolation {
                reason: format!("active {order_id} has no escrow record"),
            }
        })?;
        let mut tx = LedgerTransaction::new(&self.ledgers, core.config.engine_account);
        tx.push(&record.asset, record.owner, record.locked_amount)?;
        let flows = tx.commit()?;
        core.conservation.record(&flows);

        core.escrow.release(order_id)?;
        core.book.mark_cancelled(order_id)?;

        tracing::info!(
            order = %order_id,
            creator = %caller,
            asset = %record.asset,
            amount = %record.locked_amount,
            "Order cancelled"
        );
        core.events.append(EngineEvent::OrderCancelled {
            order_id,
            creator: caller,
            released_asset: record.asset.clone(),
            released_amount: record.locked_amount,
            timestamp: now,
        });
        self.audit(core, &record.asset);
        Ok(())
    }

    // ───────────────────────── Fills ─────────────────────────

    /// Fill the sell order `sell_order_id`; `buyer` pays the gross.
    ///
    /// # Errors
    /// Pause, risk, state and ledger errors; on any error nothing moved.
    pub fn buy_order(&self, buyer: AccountId, sell_order_id: OrderId) -> Result<SettlementReceipt> {
        self.fill(buyer, sell_order_id, OrderSide::Sell)
    }

    /// Fill the buy order `buy_order_id`; `seller` delivers the asset and
    /// receives the net.
    ///
    /// # Errors
    /// As [`buy_order`](Self::buy_order).
    pub fn sell_order(&self, seller: AccountId, buy_order_id: OrderId) -> Result<SettlementReceipt> {
        self.fill(seller, buy_order_id, OrderSide::Buy)
    }

    fn fill(&self, taker: AccountId, order_id: OrderId, side: OrderSide) -> Result<SettlementReceipt> {
        let mut guard = self.lock();
        let core = &mut *guard;
        let now = self.clock.now();

        self.authorize_trading(&core.config, taker)?;
        Self::require_account(taker, "taker")?;
        core.pause.check_accepting()?;

        let settler = SettlementEngine::new(&self.ledgers, core.config.engine_account);
        let receipt = settler.fill(
            &mut core.book,
            &mut core.escrow,
            &mut core.risk,
            &core.config,
            taker,
            order_id,
            side,
            now,
        )?;
        core.conservation.record(&receipt.flows);

        core.events.append(EngineEvent::OrderExecuted {
            order_id,
            maker: receipt.maker,
            taker,
            side,
            amount: receipt.amount,
            unit_price: receipt.unit_price,
            gross: receipt.fees.gross,
            fee: receipt.fees.fee,
            net: receipt.fees.net,
            timestamp: now,
        });
        self.audit(core, &receipt.asset);
        self.audit(core, &receipt.payment);
        Ok(receipt)
    }

    // ───────────────────────── Reads ─────────────────────────

    #[must_use]
    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.lock().book.get(order_id).cloned()
    }

    /// Every order `account` created, oldest first.
    #[must_use]
    pub fn get_user_orders(&self, account: &AccountId) -> Vec<OrderId> {
        self.lock().book.user_orders(account)
    }

    /// Active orders on `side`, oldest first.
    #[must_use]
    pub fn get_active_orders(&self, side: OrderSide) -> Vec<OrderId> {
        self.lock().book.active_orders(side)
    }

    #[must_use]
    pub fn get_account_state(&self, account: &AccountId) -> AccountState {
        self.lock().risk.account_state(account)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().pause.is_paused()
    }

    #[must_use]
    pub fn get_config(&self) -> EngineConfig {
        self.lock().config.clone()
    }

    #[must_use]
    pub fn get_governance_request(&self) -> Option<GovernanceRequest> {
        self.lock().governance.request().cloned()
    }

    /// Units of `asset` currently held in escrow.
    #[must_use]
    pub fn custody_balance(&self, asset: &AssetHandle) -> Decimal {
        self.lock().escrow.custody_total(asset)
    }

    #[must_use]
    pub fn get_version(&self) -> &'static str {
        constants::VERSION
    }

    /// Current time on the engine clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().events.all().to_vec()
    }

    /// Events with `sequence > after`.
    #[must_use]
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        self.lock().events.since(after).to_vec()
    }

    /// Check escrow conservation on every registered ledger.
    ///
    /// # Errors
    /// `EscrowInvariantViolation` naming the first asset that fails.
    pub fn verify_conservation(&self) -> Result<()> {
        let core = self.lock();
        for ledger in self.ledgers.iter() {
            self.check_conservation(&core, ledger.handle())?;
        }
        Ok(())
    }
}
