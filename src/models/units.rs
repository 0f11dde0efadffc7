//! Fixed-point money units.
//!
//! All balance and settlement math runs on `i64` quanta scaled by 10^8.
//! `Decimal` values exist only at the API edge; conversion rejects values
//! that carry more than 8 fractional digits.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// A monetary amount scaled by 10^8.
pub type Quanta = i64;

/// Number of fractional digits carried by a [`Quanta`].
pub const SCALE: u32 = 8;

/// One whole unit expressed in quanta.
pub const UNIT: i64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("value {0} has more than {SCALE} decimal places")]
    ExcessPrecision(Decimal),
    #[error("value {0} is out of the representable range")]
    OutOfRange(Decimal),
}

/// Convert an edge `Decimal` to internal quanta.
pub fn to_quanta(value: Decimal) -> Result<Quanta, UnitError> {
    let scaled = value
        .checked_mul(Decimal::from(UNIT))
        .ok_or(UnitError::OutOfRange(value))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(UnitError::ExcessPrecision(value));
    }
    scaled.to_i64().ok_or(UnitError::OutOfRange(value))
}

/// Convert internal quanta back to an edge `Decimal`.
pub fn from_quanta(quanta: Quanta) -> Decimal {
    Decimal::from(quanta) / Decimal::from(UNIT)
}

/// Notional of `price * quantity`, both in quanta, result in quote quanta.
///
/// Widens through i128 so mid-range prices cannot overflow the product.
pub fn notional(price: Quanta, quantity: Quanta) -> Quanta {
    ((price as i128 * quantity as i128) / UNIT as i128) as i64
}

/// Largest base quantity purchasable with `budget` quote quanta at `price`.
pub fn affordable_quantity(budget: Quanta, price: Quanta) -> Quanta {
    if price <= 0 {
        return 0;
    }
    ((budget as i128 * UNIT as i128) / price as i128) as i64
}
