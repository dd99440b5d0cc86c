//! Parameter administration, the pause switch and emergency withdrawal.
//!
//! | Operation                         | Role              |
//! |-----------------------------------|-------------------|
//! | fee rate, fee receiver, blacklist | Manager           |
//! | min / max trade amount, cooldown  | Manager or Admin  |
//! | pause, unpause                    | Admin             |
//! | emergency withdrawal (all steps)  | Admin             |
//!
//! Every call here works while trading is paused.

use chrono::Duration;
use escrowmatch_settlement::LedgerTransaction;
use escrowmatch_types::{AccountId, EngineEvent, EscrowMatchError, OrderId, Result, Role, constants};
use rust_decimal::Decimal;

use crate::exchange::Exchange;

const LIMIT_ROLES: &[Role] = &[Role::Manager, Role::Admin];

impl Exchange {
    // ───────────────────────── Fees ─────────────────────────

    /// # Errors
    /// `Unauthorized` without Manager; `InvalidParameter` above 10 000 bps.
    pub fn set_fee_rate(&self, caller: AccountId, fee_rate_bps: u32) -> Result<()> {
        self.gateway
            .validate_role(Role::Manager, &caller, "only a manager can set the fee rate")?;
        if fee_rate_bps > constants::MAX_FEE_RATE_BPS {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!(
                    "fee rate {fee_rate_bps} bps exceeds {}",
                    constants::MAX_FEE_RATE_BPS
                ),
            });
        }
        let mut core = self.lock();
        let old_bps = std::mem::replace(&mut core.config.fee_rate_bps, fee_rate_bps);
        tracing::info!(old_bps, new_bps = fee_rate_bps, by = %caller, "Fee rate updated");
        core.events.append(EngineEvent::FeeRateUpdated {
            old_bps,
            new_bps: fee_rate_bps,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// # Errors
    /// `Unauthorized` without Manager; `InvalidAccount` for the zero address.
    pub fn set_fee_receiver(&self, caller: AccountId, receiver: AccountId) -> Result<()> {
        self.gateway
            .validate_role(Role::Manager, &caller, "only a manager can set the fee receiver")?;
        Self::require_account(receiver, "fee receiver")?;
        let mut core = self.lock();
        let old = std::mem::replace(&mut core.config.fee_receiver, receiver);
        tracing::info!(%old, new = %receiver, by = %caller, "Fee receiver updated");
        core.events.append(EngineEvent::FeeReceiverUpdated {
            old,
            new: receiver,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    // ───────────────────────── Risk limits ─────────────────────────

    /// # Errors
    /// - `Unauthorized` without Manager or Admin
    /// - `InvalidAmount` unless positive and whole
    /// - `InvalidParameter` if above the current maximum
    pub fn set_min_trade_amount(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.authorize_any(LIMIT_ROLES, caller, "only a manager or admin can set trade limits")?;
        Self::require_quantity(amount)?;
        let mut core = self.lock();
        let old = core.risk.set_min_trade_amount(amount)?;
        core.config.min_trade_amount = amount;
        tracing::info!(%old, new = %amount, by = %caller, "Minimum trade amount updated");
        core.events.append(EngineEvent::MinTradeAmountUpdated {
            old,
            new: amount,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// # Errors
    /// - `Unauthorized` without Manager or Admin
    /// - `InvalidAmount` unless positive and whole
    /// - `InvalidParameter` if below the current minimum
    pub fn set_max_trade_amount(&self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.authorize_any(LIMIT_ROLES, caller, "only a manager or admin can set trade limits")?;
        Self::require_quantity(amount)?;
        let mut core = self.lock();
        let old = core.risk.set_max_trade_amount(amount)?;
        core.config.max_trade_amount = amount;
        tracing::info!(%old, new = %amount, by = %caller, "Maximum trade amount updated");
        core.events.append(EngineEvent::MaxTradeAmountUpdated {
            old,
            new: amount,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// Applies immediately to every account's existing trade stamp.
    ///
    /// # Errors
    /// `Unauthorized` without Manager or Admin; `InvalidParameter` unless positive.
    pub fn set_cooldown_period(&self, caller: AccountId, cooldown: Duration) -> Result<()> {
        self.authorize_any(LIMIT_ROLES, caller, "only a manager or admin can set the cooldown")?;
        let mut core = self.lock();
        let old = core.risk.set_cooldown(cooldown)?;
        core.config.cooldown = cooldown;
        tracing::info!(
            old_secs = old.num_seconds(),
            new_secs = cooldown.num_seconds(),
            by = %caller,
            "Cooldown updated"
        );
        core.events.append(EngineEvent::CooldownPeriodUpdated {
            old_secs: old.num_seconds(),
            new_secs: cooldown.num_seconds(),
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// Block or unblock `account`. Open orders of a blacklisted account
    /// stay on the book and remain fillable by others.
    ///
    /// # Errors
    /// `Unauthorized` without Manager; `InvalidAccount` for the zero address.
    pub fn set_blacklist_status(
        &self,
        caller: AccountId,
        account: AccountId,
        blacklisted: bool,
    ) -> Result<()> {
        self.gateway
            .validate_role(Role::Manager, &caller, "only a manager can change the blacklist")?;
        Self::require_account(account, "blacklist target")?;
        let mut core = self.lock();
        let old = core.risk.set_blacklisted(account, blacklisted);
        tracing::info!(account = %account, old, new = blacklisted, by = %caller, "Blacklist updated");
        core.events.append(EngineEvent::AccountBlacklisted {
            account,
            old,
            new: blacklisted,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    // ───────────────────────── Pause ─────────────────────────

    /// # Errors
    /// `Unauthorized` without Admin; `AlreadyPaused`.
    pub fn pause(&self, caller: AccountId) -> Result<()> {
        self.gateway
            .validate_role(Role::Admin, &caller, "only an admin can pause trading")?;
        let mut core = self.lock();
        core.pause.pause()?;
        tracing::warn!(by = %caller, "Trading paused");
        core.events.append(EngineEvent::TradingPaused {
            by: caller,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// # Errors
    /// `Unauthorized` without Admin; `NotPaused`.
    pub fn unpause(&self, caller: AccountId) -> Result<()> {
        self.gateway
            .validate_role(Role::Admin, &caller, "only an admin can unpause trading")?;
        let mut core = self.lock();
        core.pause.unpause()?;
        tracing::info!(by = %caller, "Trading resumed");
        core.events.append(EngineEvent::TradingUnpaused {
            by: caller,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    // ───────────────────────── Emergency withdrawal ─────────────────────────

    /// Open the emergency-withdrawal request with the caller's approval.
    ///
    /// # Errors
    /// `Unauthorized` without Admin; `RequestAlreadyActive`.
    pub fn initiate_emergency_withdrawal(&self, caller: AccountId) -> Result<()> {
        self.gateway.validate_role(
            Role::Admin,
            &caller,
            "only an admin can initiate an emergency withdrawal",
        )?;
        let now = self.clock.now();
        let mut core = self.lock();
        let request = core.governance.initiate(caller, now)?;
        let event = EngineEvent::EmergencyWithdrawalInitiated {
            initiator: caller,
            required_approvals: request.required_approvals,
            executable_at: request.executable_at(),
            timestamp: now,
        };
        core.events.append(event);
        Ok(())
    }

    /// # Errors
    /// `Unauthorized` without Admin; `NoActiveRequest`; `AlreadyApproved`.
    pub fn approve_emergency_withdrawal(&self, caller: AccountId) -> Result<()> {
        self.gateway.validate_role(
            Role::Admin,
            &caller,
            "only an admin can approve an emergency withdrawal",
        )?;
        let mut core = self.lock();
        let approval_count = core.governance.approve(caller)?;
        core.events.append(EngineEvent::EmergencyWithdrawalApproved {
            approver: caller,
            approval_count,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// Sweep the engine's entire balance on every ledger to `recipient`.
    ///
    /// Every active order is voided and its escrow written off; no
    /// `OrderCancelled` events are emitted for them. The request closes.
    ///
    /// # Errors
    /// - `Unauthorized` without Admin
    /// - `InvalidAccount` for the zero address
    /// - `NoActiveRequest`, `NotEnoughApprovals`, `TimelockNotExpired`
    /// - `TransferFailed` if a ledger refuses the sweep; nothing changes then
    pub fn execute_emergency_withdrawal(&self, caller: AccountId, recipient: AccountId) -> Result<()> {
        self.gateway.validate_role(
            Role::Admin,
            &caller,
            "only an admin can execute an emergency withdrawal",
        )?;
        Self::require_account(recipient, "withdrawal recipient")?;
        let now = self.clock.now();
        let mut guard = self.lock();
        let core = &mut *guard;
        core.governance.check_executable(now)?;

        let engine = core.config.engine_account;
        let mut tx = LedgerTransaction::new(&self.ledgers, engine);
        let mut amounts = Vec::new();
        for ledger in self.ledgers.iter() {
            let balance = ledger.balance_of(&engine);
            if balance > Decimal::ZERO {
                tx.push(ledger.handle(), recipient, balance)?;
                amounts.push((ledger.handle().clone(), balance));
            }
        }
        tx.commit()?;

        for (asset, moved) in &amounts {
            let surplus = core.conservation.record_sweep(asset, *moved);
            if surplus > Decimal::ZERO {
                tracing::warn!(%asset, %surplus, "Swept units that were never escrowed");
            }
        }
        let voided_orders: Vec<OrderId> = core.book.void_all_active();
        let forfeited = core.escrow.forfeit_all();
        core.governance.complete()?;

        tracing::warn!(
            executor = %caller,
            recipient = %recipient,
            ledgers = amounts.len(),
            voided = voided_orders.len(),
            ?forfeited,
            "Emergency withdrawal executed"
        );
        core.events.append(EngineEvent::EmergencyWithdrawalExecuted {
            executor: caller,
            recipient,
            amounts: amounts.clone(),
            voided_orders,
            timestamp: now,
        });
        for (asset, _) in &amounts {
            self.audit(core, asset);
        }
        Ok(())
    }
}
