//! Minor-Unit Conversion
//!
//! Stripe amounts are integers in the currency's smallest unit. Both
//! directions go through `Decimal` so 19.99 is always exactly 1999.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{PaymentError, Result};

/// Decimal places of a USD amount
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Convert a major-unit amount to minor units.
///
/// Rounds half away from zero to two places first, so `10.005` becomes
/// `1001` rather than being truncated.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    let rounded = amount.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::InvalidAmount(format!("{amount} is out of range")))
}

/// Convert minor units back to a major-unit amount (exact).
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_SCALE)
}
