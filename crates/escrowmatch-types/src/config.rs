//! Engine configuration.
//!
//! Loaded from JSON, validated once at construction, then mutated only
//! through the parameter-administration entry points.

use std::path::Path;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, duration_secs, AccountId, AssetHandle, EscrowMatchError, Result};

/// What to do when a caller fills an order they created themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTradePolicy {
    /// Permit the fill.
    #[default]
    Allow,
    /// Fail with `SelfTradeBlocked`.
    Reject,
}

/// Emergency-withdrawal governance thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Distinct admin approvals needed, initiator included.
    pub required_approvals: usize,
    /// Minimum time between initiation and execution.
    #[serde(with = "duration_secs")]
    pub timelock: Duration,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            required_approvals: constants::DEFAULT_REQUIRED_APPROVALS,
            timelock: Duration::seconds(constants::DEFAULT_TIMELOCK_SECS),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The engine's own custody account on every ledger.
    pub engine_account: AccountId,
    /// Ledger used for the payment leg.
    pub payment_asset: AssetHandle,
    pub fee_rate_bps: u32,
    pub fee_receiver: AccountId,
    pub min_trade_amount: Decimal,
    pub max_trade_amount: Decimal,
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    #[serde(default)]
    pub self_trade_policy: SelfTradePolicy,
    /// When set, trading entry points require [`Role::Trader`](crate::Role::Trader).
    #[serde(default)]
    pub trading_requires_role: bool,
    #[serde(default)]
    pub governance: GovernanceConfig,
}

impl EngineConfig {
    /// Defaults for everything except the accounts and the payment ledger.
    #[must_use]
    pub fn new(
        engine_account: AccountId,
        payment_asset: impl Into<AssetHandle>,
        fee_receiver: AccountId,
    ) -> Self {
        Self {
            engine_account,
            payment_asset: payment_asset.into(),
            fee_rate_bps: constants::DEFAULT_FEE_RATE_BPS,
            fee_receiver,
            min_trade_amount: Decimal::new(constants::DEFAULT_MIN_TRADE_AMOUNT, 0),
            max_trade_amount: Decimal::new(constants::DEFAULT_MAX_TRADE_AMOUNT, 0),
            cooldown: Duration::seconds(constants::DEFAULT_COOLDOWN_SECS),
            self_trade_policy: SelfTradePolicy::default(),
            trading_requires_role: false,
            governance: GovernanceConfig::default(),
        }
    }

    /// Check every range constraint.
    ///
    /// # Errors
    /// Returns `Configuration` naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EscrowMatchError::Configuration(msg));
        if self.engine_account.is_nil() {
            return fail("engine_account must not be the zero address".into());
        }
        if self.fee_receiver.is_nil() {
            return fail("fee_receiver must not be the zero address".into());
        }
        if self.fee_rate_bps > constants::MAX_FEE_RATE_BPS {
            return fail(format!(
                "fee_rate_bps {} exceeds {}",
                self.fee_rate_bps,
                constants::MAX_FEE_RATE_BPS
            ));
        }
        if self.min_trade_amount <= Decimal::ZERO {
            return fail(format!("min_trade_amount {} must be positive", self.min_trade_amount));
        }
        if self.min_trade_amount > self.max_trade_amount {
            return fail(format!(
                "min_trade_amount {} exceeds max_trade_amount {}",
                self.min_trade_amount, self.max_trade_amount
            ));
        }
        if self.cooldown <= Duration::zero() {
            return fail("cooldown must be positive".into());
        }
        if self.governance.required_approvals == 0 {
            return fail("governance.required_approvals must be at least 1".into());
        }
        if self.governance.timelock < Duration::zero() {
            return fail("governance.timelock must not be negative".into());
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| EscrowMatchError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineConfig {
        EngineConfig::new(AccountId::new(), "USDC", AccountId::new())
    }

    #[test]
    fn defaults_validate() {
        let cfg = sample();
        cfg.validate().unwrap();
        assert_eq!(cfg.fee_rate_bps, 250);
        assert_eq!(cfg.governance.required_approvals, 2);
        assert_eq!(cfg.governance.timelock, Duration::hours(24));
        assert_eq!(cfg.self_trade_policy, SelfTradePolicy::Allow);
    }

    #[test]
    fn min_above_max_rejected() {
        let mut cfg = sample();
        cfg.min_trade_amount = Decimal::new(600, 0);
        cfg.max_trade_amount = Decimal::new(500, 0);
        assert!(matches!(
            cfg.validate().unwrap_err(),
            EscrowMatchError::Configuration(_)
        ));
    }

    #[test]
    fn fee_rate_above_100_percent_rejected() {
        let mut cfg = sample();
        cfg.fee_rate_bps = 10_001;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_cooldown_rejected() {
        let mut cfg = sample();
        cfg.cooldown = Duration::zero();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nil_fee_receiver_rejected() {
        let mut cfg = sample();
        cfg.fee_receiver = AccountId::NIL;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_roundtrip_stores_seconds() {
        let cfg = sample();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"cooldown\":60"), "Got: {json}");
        let back = EngineConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let engine = AccountId::new();
        let fee = AccountId::new();
        let json = format!(
            r#"{{
                "engine_account": "{engine}",
                "payment_asset": "USDC",
                "fee_rate_bps": 100,
                "fee_receiver": "{fee}",
                "min_trade_amount": "10",
                "max_trade_amount": "500",
                "cooldown": 30
            }}"#
        );
        let cfg = EngineConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg.min_trade_amount, Decimal::new(10, 0));
        assert_eq!(cfg.cooldown, Duration::seconds(30));
        assert!(!cfg.trading_requires_role);
        assert_eq!(cfg.governance, GovernanceConfig::default());
    }

    #[test]
    fn from_json_file_reads_disk() {
        let cfg = sample();
        let dir = std::env::temp_dir().join(format!("escrowmatch-cfg-{}", AccountId::new()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");
        std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
        let back = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg, back);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
