//! Value-object helpers for quantities and monetary amounts.
//!
//! Quantities and money are `rust_decimal::Decimal`: items may be counted in
//! fractional units (kg, m) and money must not drift through float rounding.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects (equality by value, no identity).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Reject zero and negative values.
pub fn ensure_positive(value: Decimal, what: &str) -> DomainResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{what} must be positive (got {value})"
        )));
    }
    Ok(value)
}

/// Reject negative values.
pub fn ensure_non_negative(value: Decimal, what: &str) -> DomainResult<Decimal> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{what} cannot be negative (got {value})"
        )));
    }
    Ok(value)
}

/// Unwrap a `checked_*` result; `None` means the value left the `Decimal`
/// range and is reported as invalid input.
pub fn in_range(value: Option<Decimal>, what: &str) -> DomainResult<Decimal> {
    value.ok_or_else(|| DomainError::validation(format!("{what} is out of range")))
}

/// Round a monetary amount to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
