//! Per-account risk state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Risk-relevant state of a single account.
///
/// `blacklisted` is toggled only by a manager; `last_trade_at` advances only
/// when the account completes a fill as the taker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub blacklisted: bool,
    /// `None` until the first successful fill.
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl AccountState {
    /// Earliest instant at which the account may fill again.
    ///
    /// Saturates at the latest representable instant.
    #[must_use]
    pub fn cooldown_until(&self, cooldown: Duration) -> Option<DateTime<Utc>> {
        self.last_trade_at
            .map(|t| t.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}
