//! Fee extraction.
//!
//! ```text
//! gross = amount * unit_price
//! fee   = floor(gross * fee_rate_bps / 10000)
//! net   = gross - fee
//! ```
//!
//! The fee is floored to a whole base unit and `net` is derived by
//! subtraction, so `fee + net == gross` holds exactly.

use escrowmatch_types::{EscrowMatchError, Result, checked_notional, constants};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Split of a fill's payment leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub gross: Decimal,
    pub fee: Decimal,
    pub net: Decimal,
}

impl FeeBreakdown {
    /// Compute the breakdown for `amount` units at `unit_price`.
    ///
    /// # Errors
    /// - `InvalidParameter` if `fee_rate_bps` exceeds 100%
    /// - `ArithmeticOverflow` if any intermediate overflows
    pub fn compute(amount: Decimal, unit_price: Decimal, fee_rate_bps: u32) -> Result<Self> {
        if fee_rate_bps > constants::MAX_FEE_RATE_BPS {
            return Err(EscrowMatchError::InvalidParameter {
                reason: format!("fee rate {fee_rate_bps} bps exceeds 100%"),
            });
        }
        let gross = checked_notional(amount, unit_price)?;
        let scaled = gross
            .checked_mul(Decimal::from(fee_rate_bps))
            .ok_or(EscrowMatchError::ArithmeticOverflow {
                context: "gross * fee_rate_bps",
            })?;
        let fee = scaled
            .checked_div(Decimal::from(constants::BPS_DENOMINATOR))
            .ok_or(EscrowMatchError::ArithmeticOverflow {
                context: "fee / bps denominator",
            })?
            .floor();
        Ok(Self {
            gross,
            fee,
            net: gross - fee,
        })
    }
}
