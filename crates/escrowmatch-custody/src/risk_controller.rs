//! Risk controller: hard gate in front of every mutating call.
//!
//! Three independent checks:
//!
//! - **Blacklist**: a flagged account may not create, cancel or fill
//! - **Bounds**: `min_trade_amount <= amount <= max_trade_amount` on creation
//! - **Cooldown**: an account that filled at `T` may not fill again before
//!   `T + cooldown`
//!
//! Checks never mutate. The only writers are the manager-gated setters and
//! [`RiskController::record_trade`], which settlement calls after a fill
//! commits.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use escrowmatch_types::{AccountId, AccountState, EscrowMatchError, Result, duration_secs};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persistable image of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    pub blacklist: Vec<AccountId>,
    pub last_trades: Vec<(AccountId, DateTime<Utc>)>,
    pub min_trade_amount: Decimal,
    pub max_trade_amount: Decimal,
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
}

/// Blacklist, trade-size bounds and per-account cooldown.
#[derive(Debug)]
pub struct RiskController {
    accounts: HashMap<AccountId, AccountState>,
    min_trade_amount: Decimal,
    max_trade_amount: Decimal,
    cooldown: Duration,
}

impl RiskController {
    /// Create a controller with the given limits.
    ///
    /// # Errors
    /// `InvalidParameter` if `min > max`, `min <= 0` or `cooldown <= 0`.
    pub fn with_limits(
        min_trade_amount: Decimal,
        max_trade_amount: Decimal,
        cooldown: Duration,
    ) -> Result<Self> {
        if min_trade_amount <= Decimal::ZERO || min_trade_amount > max_trade_amount {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!(
                    "trade bounds must satisfy 0 < min <= max, got [{min_trade_amount}, {max_trade_amount}]"
                ),
            });
        }
        if cooldown <= Duration::zero() {
            return Err(EscrowMatchError::InvalidParameter {
                reason: "cooldown must be positive".to_string(),
            });
        }
        Ok(Self {
            accounts: HashMap::new(),
            min_trade_amount,
            max_trade_amount,
            cooldown,
        })
    }

    /// Rebuild from a persisted image.
    pub fn from_state(state: RiskState) -> Result<Self> {
        let mut rc = Self::with_limits(
            state.min_trade_amount,
            state.max_trade_amount,
            state.cooldown,
        )?;
        for account in state.blacklist {
            rc.accounts.entry(account).or_default().blacklisted = true;
        }
        for (account, at) in state.last_trades {
            rc.accounts.entry(account).or_default().last_trade_at = Some(at);
        }
        Ok(rc)
    }

    /// Persistable image, sorted for stable output.
    #[must_use]
    pub fn to_state(&self) -> RiskState {
        let mut blacklist: Vec<AccountId> = self
            .accounts
            .iter()
            .filter(|(_, s)| s.blacklisted)
            .map(|(a, _)| *a)
            .collect();
        blacklist.sort();
        let mut last_trades: Vec<(AccountId, DateTime<Utc>)> = self
            .accounts
            .iter()
            .filter_map(|(a, s)| s.last_trade_at.map(|t| (*a, t)))
            .collect();
        last_trades.sort();
        RiskState {
            blacklist,
            last_trades,
            min_trade_amount: self.min_trade_amount,
            max_trade_amount: self.max_trade_amount,
            cooldown: self.cooldown,
        }
    }

    // ───────────────────────── Checks ─────────────────────────

    /// # Errors
    /// `AccountBlacklisted` if `account` is flagged.
    pub fn check_not_blacklisted(&self, account: &AccountId) -> Result<()> {
        if self.is_blacklisted(account) {
            tracing::warn!(account = %account, "Blacklisted account rejected");
            return Err(EscrowMatchError::AccountBlacklisted(*account));
        }
        Ok(())
    }

    /// # Errors
    /// `AmountBelowMinimum` / `AmountAboveMaximum`.
    pub fn check_trade_amount(&self, amount: Decimal) -> Result<()> {
        if amount < self.min_trade_amount {
            return Err(EscrowMatchError::AmountBelowMinimum {
                amount,
                minimum: self.min_trade_amount,
            });
        }
        if amount > self.max_trade_amount {
            return Err(EscrowMatchError::AmountAboveMaximum {
                amount,
                maximum: self.max_trade_amount,
            });
        }
        Ok(())
    }

    /// # Errors
    /// `InCooldown` if `now < last_trade_at + cooldown`.
    pub fn check_cooldown(&self, account: &AccountId, now: DateTime<Utc>) -> Result<()> {
        let until = self
            .accounts
            .get(account)
            .and_then(|s| s.cooldown_until(self.cooldown));
        if let Some(until) = until {
            if now < until {
                tracing::warn!(account = %account, %until, "Fill attempted during cooldown");
                return Err(EscrowMatchError::InCooldown {
                    account: *account,
                    until,
                });
            }
        }
        Ok(())
    }

    // ───────────────────────── Mutations ─────────────────────────

    /// Stamp a completed fill. Only settlement calls this.
    pub fn record_trade(&mut self, account: AccountId, at: DateTime<Utc>) {
        self.accounts.entry(account).or_default().last_trade_at = Some(at);
    }

    /// Set the blacklist flag, returning the previous value.
    pub fn set_blacklisted(&mut self, account: AccountId, blacklisted: bool) -> bool {
        let state = self.accounts.entry(account).or_default();
        std::mem::replace(&mut state.blacklisted, blacklisted)
    }

    /// Returns the previous minimum.
    ///
    /// # Errors
    /// `InvalidParameter` if `amount <= 0` or `amount > max`.
    pub fn set_min_trade_amount(&mut self, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO || amount > self.max_trade_amount {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!(
                    "min trade amount {amount} must be positive and <= max {}",
                    self.max_trade_amount
                ),
            });
        }
        Ok(std::mem::replace(&mut self.min_trade_amount, amount))
    }

    /// Returns the previous maximum.
    ///
    /// # Errors
    /// `InvalidParameter` if `amount < min`.
    pub fn set_max_trade_amount(&mut self, amount: Decimal) -> Result<Decimal> {
        if amount < self.min_trade_amount {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!(
                    "max trade amount {amount} must be >= min {}",
                    self.min_trade_amount
                ),
            });
        }
        Ok(std::mem::replace(&mut self.max_trade_amount, amount))
    }

    /// Returns the previous cooldown.
    ///
    /// # Errors
    /// `InvalidParameter` if `cooldown <= 0`.
    pub fn set_cooldown(&mut self, cooldown: Duration) -> Result<Duration> {
        if cooldown <= Duration::zero() {
            return Err(EscrowMatchError::InvalidParameter {
                reason: "cooldown must be positive".to_string(),
            });
        }
        Ok(std::mem::replace(&mut self.cooldown, cooldown))
    }

    // ───────────────────────── Queries ─────────────────────────

    #[must_use]
    pub fn is_blacklisted(&self, account: &AccountId) -> bool {
        self.accounts.get(account).is_some_and(|s| s.blacklisted)
    }

    #[must_use]
    pub fn account_state(&self, account: &AccountId) -> AccountState {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn min_trade_amount(&self) -> Decimal {
        self.min_trade_amount
    }

    #[must_use]
    pub fn max_trade_amount(&self) -> Decimal {
        self.max_trade_amount
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn controller() -> RiskController {
        RiskController::with_limits(dec(10), dec(500), Duration::seconds(60)).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let rc = controller();
        assert!(rc.check_trade_amount(dec(10)).is_ok());
        assert!(rc.check_trade_amount(dec(500)).is_ok());
        assert!(matches!(
            rc.check_trade_amount(dec(5)).unwrap_err(),
            EscrowMatchError::AmountBelowMinimum { .. }
        ));
        assert!(matches!(
            rc.check_trade_amount(dec(501)).unwrap_err(),
            EscrowMatchError::AmountAboveMaximum { .. }
        ));
    }

    #[test]
    fn invalid_construction_rejected() {
        assert!(RiskController::with_limits(dec(600), dec(500), Duration::seconds(1)).is_err());
        assert!(RiskController::with_limits(dec(0), dec(500), Duration::seconds(1)).is_err());
        assert!(RiskController::with_limits(dec(1), dec(500), Duration::zero()).is_err());
    }

    #[test]
    fn bound_updates_preserve_ordering() {
        let mut rc = controller();
        assert!(rc.set_min_trade_amount(dec(501)).is_err());
        assert!(rc.set_max_trade_amount(dec(9)).is_err());
        assert_eq!(rc.min_trade_amount(), dec(10));
        assert_eq!(rc.max_trade_amount(), dec(500));

        assert_eq!(rc.set_min_trade_amount(dec(500)).unwrap(), dec(10));
        assert_eq!(rc.set_max_trade_amount(dec(500)).unwrap(), dec(500));
    }

    #[test]
    fn blacklist_toggle_reports_previous() {
        let mut rc = controller();
        let mallory = AccountId::new();
        assert!(!rc.set_blacklisted(mallory, true));
        assert!(matches!(
            rc.check_not_blacklisted(&mallory).unwrap_err(),
            EscrowMatchError::AccountBlacklisted(a) if a == mallory
        ));
        assert!(rc.set_blacklisted(mallory, false));
        assert!(rc.check_not_blacklisted(&mallory).is_ok());
    }

    #[test]
    fn cooldown_boundary() {
        let mut rc = controller();
        let alice = AccountId::new();
        let t = Utc::now();
        assert!(rc.check_cooldown(&alice, t).is_ok());

        rc.record_trade(alice, t);
        assert!(matches!(
            rc.check_cooldown(&alice, t + Duration::seconds(59)).unwrap_err(),
            EscrowMatchError::InCooldown { .. }
        ));
        assert!(rc.check_cooldown(&alice, t + Duration::seconds(60)).is_ok());
    }

    #[test]
    fn cooldown_change_applies_to_existing_stamps() {
        let mut rc = controller();
        let alice = AccountId::new();
        let t = Utc::now();
        rc.record_trade(alice, t);
        assert_eq!(rc.set_cooldown(Duration::seconds(10)).unwrap(), Duration::seconds(60));
        assert!(rc.check_cooldown(&alice, t + Duration::seconds(10)).is_ok());
        assert!(rc.set_cooldown(Duration::zero()).is_err());
    }

    #[test]
    fn state_roundtrip() {
        let mut rc = controller();
        let (a, b) = (AccountId::new(), AccountId::new());
        let t = Utc::now();
        rc.set_blacklisted(a, true);
        rc.record_trade(b, t);

        let state = rc.to_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: RiskState = serde_json::from_str(&json).unwrap();
        let rebuilt = RiskController::from_state(back).unwrap();
        assert!(rebuilt.is_blacklisted(&a));
        assert_eq!(rebuilt.account_state(&b).last_trade_at, Some(t));
        assert_eq!(rebuilt.cooldown(), Duration::seconds(60));
    }
}
