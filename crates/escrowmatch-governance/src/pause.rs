//! Trading pause switch.
//!
//! While paused, order creation and fills are rejected with
//! `NotAcceptingOrders`. Cancels, reads, parameter changes and governance
//! keep working.

use escrowmatch_types::{EscrowMatchError, Result};

/// Admin-controlled pause flag.
#[derive(Debug, Clone, Default)]
pub struct PauseGuard {
    paused: bool,
}

impl PauseGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted flag.
    #[must_use]
    pub fn with_state(paused: bool) -> Self {
        Self { paused }
    }

    /// # Errors
    /// `AlreadyPaused` if trading is already paused.
    pub fn pause(&mut self) -> Result<()> {
        if self.paused {
            return Err(EscrowMatchError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    /// # Errors
    /// `NotPaused` if trading is running.
    pub fn unpause(&mut self) -> Result<()> {
        if !self.paused {
            return Err(EscrowMatchError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Guard an order-creating or order-filling call.
    ///
    /// # Errors
    /// `NotAcceptingOrders` while paused.
    pub fn check_accepting(&self) -> Result<()> {
        if self.paused {
            Err(EscrowMatchError::NotAcceptingOrders)
        } else {
            Ok(())
        }
    }
}
