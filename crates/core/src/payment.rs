//! Payment tracking shared by sales documents and purchase orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Paid amount and paid date of a document with a grand total.
///
/// Invariant: `0 <= paid_amount <= grand_total`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentState {
    pub grand_total: Decimal,
    pub paid_amount: Decimal,
    pub paid_date: Option<DateTime<Utc>>,
}

impl ValueObject for PaymentState {}

/// Outcome of a successful payment decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub amount: Decimal,
    pub new_paid_amount: Decimal,
    pub paid_date: Option<DateTime<Utc>>,
}

impl PaymentState {
    pub fn new(grand_total: Decimal) -> Self {
        Self {
            grand_total,
            paid_amount: Decimal::ZERO,
            paid_date: None,
        }
    }

    pub fn outstanding(&self) -> Decimal {
        self.grand_total - self.paid_amount
    }

    pub fn is_settled(&self) -> bool {
        self.paid_amount >= self.grand_total
    }

    /// Decide a payment of `amount`.
    ///
    /// An explicit `date` always becomes the paid date. Without one, the paid
    /// date is stamped with `recorded_at` only when this payment settles the
    /// document and no paid date exists yet.
    pub fn record(
        &self,
        amount: Decimal,
        date: Option<DateTime<Utc>>,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<PaymentApplied> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        // Past the Decimal range is past any grand total as well.
        let new_paid_amount = self.paid_amount.checked_add(amount);
        let Some(new_paid_amount) = new_paid_amount.filter(|paid| *paid <= self.grand_total) else {
            return Err(DomainError::conflict(format!(
                "payment of {amount} exceeds outstanding amount {}",
                self.outstanding()
            )));
        };

        let paid_date = match date {
            Some(explicit) => Some(explicit),
            None if new_paid_amount >= self.grand_total && self.paid_date.is_none() => {
                Some(recorded_at)
            }
            None => self.paid_date,
        };

        Ok(PaymentApplied {
            amount,
            new_paid_amount,
            paid_date,
        })
    }

    pub fn apply(&mut self, applied: &PaymentApplied) {
        self.paid_amount = applied.new_paid_amount;
        self.paid_date = applied.paid_date;
    }
}
