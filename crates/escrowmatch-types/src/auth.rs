//! Authorization seam.
//!
//! Role storage lives outside the engine. Every mutating entry point asks an
//! injected [`AuthorizationGateway`]; there is no process-wide registry.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::{AccountId, EscrowMatchError, Result};

/// Roles consulted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Pause/unpause, governance, bound changes.
    Admin,
    /// Fee rate and receiver, limits, blacklist.
    Manager,
    /// Trading entry points, when trading is role-gated.
    Trader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "ADMIN"),
            Self::Manager => write!(f, "MANAGER"),
            Self::Trader => write!(f, "TRADER"),
        }
    }
}

/// Role-check oracle.
pub trait AuthorizationGateway: Send + Sync {
    /// Does `account` hold `role`?
    fn check_role(&self, role: Role, account: &AccountId) -> bool;

    /// Like [`check_role`](Self::check_role) but aborts the calling
    /// operation with [`EscrowMatchError::Unauthorized`].
    fn validate_role(&self, role: Role, account: &AccountId, failure_message: &str) -> Result<()> {
        if self.check_role(role, account) {
            Ok(())
        } else {
            tracing::warn!(%role, account = %account, failure_message, "Role check failed");
            Err(EscrowMatchError::Unauthorized {
                role,
                account: *account,
                message: failure_message.to_string(),
            })
        }
    }
}

/// In-memory role table.
#[derive(Debug, Default)]
pub struct StaticRoleRegistry {
    roles: RwLock<HashMap<Role, HashSet<AccountId>>>,
}

impl StaticRoleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with(self, role: Role, account: AccountId) -> Self {
        self.grant(role, account);
        self
    }

    pub fn grant(&self, role: Role, account: AccountId) {
        self.roles
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(role)
            .or_default()
            .insert(account);
    }

    pub fn revoke(&self, role: Role, account: &AccountId) {
        if let Some(holders) = self
            .roles
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(&role)
        {
            holders.remove(account);
        }
    }
}

impl AuthorizationGateway for StaticRoleRegistry {
    fn check_role(&self, role: Role, account: &AccountId) -> bool {
        self.roles
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&role)
            .is_some_and(|holders| holders.contains(account))
    }
}
