//! Emergency-withdrawal request record.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{duration_secs, AccountId};

/// The single pending emergency-withdrawal request.
///
/// Executable once `approvals.len() >= required_approvals` and
/// `now >= initiated_at + timelock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceRequest {
    pub initiator: AccountId,
    /// Distinct approving admins, initiator included.
    pub approvals: BTreeSet<AccountId>,
    pub required_approvals: usize,
    pub initiated_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub timelock: Duration,
    pub active: bool,
}

impl GovernanceRequest {
    /// A fresh request carrying the initiator's approval.
    #[must_use]
    pub fn initiate(
        initiator: AccountId,
        required_approvals: usize,
        timelock: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            initiator,
            approvals: BTreeSet::from([initiator]),
            required_approvals,
            initiated_at: now,
            timelock,
            active: true,
        }
    }

    #[must_use]
    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }

    /// Saturates at the latest representable instant.
    #[must_use]
    pub fn executable_at(&self) -> DateTime<Utc> {
        self.initiated_at
            .checked_add_signed(self.timelock)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub fn has_quorum(&self) -> bool {
        self.approval_count() >= self.required_approvals
    }

    #[must_use]
    pub fn timelock_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.executable_at()
    }
}
