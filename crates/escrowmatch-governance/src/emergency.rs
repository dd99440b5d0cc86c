//! Emergency withdrawal governance.
//!
//! ```text
//!            initiate(admin)                 approve(other admin) ...
//!   ┌──────┐ ───────────────► ┌─────────┐ ◄──────────────────────┐
//!   │ Idle │                  │ Pending │ ───────────────────────┘
//!   └──────┘ ◄─────────────── └─────────┘
//!             complete()           │ check_executable(now):
//!                                  │   approvals >= required
//!                                  │   now >= initiated_at + timelock
//! ```
//!
//! One request at a time. A second `initiate` while pending fails and leaves
//! the existing approvals alone. The initiator's own approval counts towards
//! the quorum; each admin approves at most once.
//!
//! Thresholds are captured into the request when it is initiated, so a
//! configuration change never alters a request already in flight.

use chrono::{DateTime, Duration, Utc};
use escrowmatch_types::{AccountId, EscrowMatchError, GovernanceConfig, GovernanceRequest, Result};

/// Owner of the single emergency-withdrawal request.
#[derive(Debug, Clone)]
pub struct GovernanceModule {
    required_approvals: usize,
    timelock: Duration,
    request: Option<GovernanceRequest>,
}

impl GovernanceModule {
    #[must_use]
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            required_approvals: config.required_approvals,
            timelock: config.timelock,
            request: None,
        }
    }

    /// Restore with a persisted request. Inactive requests are dropped.
    #[must_use]
    pub fn with_request(config: &GovernanceConfig, request: Option<GovernanceRequest>) -> Self {
        Self {
            request: request.filter(|r| r.active),
            ..Self::new(config)
        }
    }

    /// Open a request carrying `initiator`'s approval.
    ///
    /// # Errors
    /// `RequestAlreadyActive` if one is pending.
    pub fn initiate(&mut self, initiator: AccountId, now: DateTime<Utc>) -> Result<&GovernanceRequest> {
        if self.request.is_some() {
            tracing::warn!(initiator = %initiator, "Emergency withdrawal already pending");
            return Err(EscrowMatchError::RequestAlreadyActive);
        }
        let request =
            GovernanceRequest::initiate(initiator, self.required_approvals, self.timelock, now);
        tracing::info!(
            initiator = %initiator,
            required = request.required_approvals,
            executable_at = %request.executable_at(),
            "Emergency withdrawal initiated"
        );
        Ok(&*self.request.insert(request))
    }

    /// Add `approver`'s approval, returning the new count.
    ///
    /// # Errors
    /// - `NoActiveRequest` when idle
    /// - `AlreadyApproved` if `approver` approved already
    pub fn approve(&mut self, approver: AccountId) -> Result<usize> {
        let request = self.request.as_mut().ok_or(EscrowMatchError::NoActiveRequest)?;
        if !request.approvals.insert(approver) {
            tracing::warn!(approver = %approver, "Duplicate emergency approval");
            return Err(EscrowMatchError::AlreadyApproved(approver));
        }
        let count = request.approval_count();
        tracing::info!(
            approver = %approver,
            approvals = count,
            required = request.required_approvals,
            "Emergency withdrawal approved"
        );
        Ok(count)
    }

    /// Confirm the pending request may execute at `now`.
    ///
    /// # Errors
    /// `NoActiveRequest`, `NotEnoughApprovals` or `TimelockNotExpired`,
    /// checked in that order.
    pub fn check_executable(&self, now: DateTime<Utc>) -> Result<&GovernanceRequest> {
        let request = self.request.as_ref().ok_or(EscrowMatchError::NoActiveRequest)?;
        if !request.has_quorum() {
            return Err(EscrowMatchError::NotEnoughApprovals {
                have: request.approval_count(),
                need: request.required_approvals,
            });
        }
        if !request.timelock_expired(now) {
            return Err(EscrowMatchError::TimelockNotExpired {
                executable_at: request.executable_at(),
            });
        }
        Ok(request)
    }

    /// Close the request after its withdrawal ran, returning it with
    /// `active = false` and approvals cleared.
    ///
    /// # Errors
    /// `NoActiveRequest` when idle.
    pub fn complete(&mut self) -> Result<GovernanceRequest> {
        let mut request = self.request.take().ok_or(EscrowMatchError::NoActiveRequest)?;
        request.active = false;
        request.approvals.clear();
        Ok(request)
    }

    #[must_use]
    pub fn request(&self) -> Option<&GovernanceRequest> {
        self.request.as_ref()
    }
}
