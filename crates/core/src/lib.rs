//! `tradeledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod payment;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use payment::{PaymentApplied, PaymentState};
pub use value_object::{ValueObject, ensure_non_negative, ensure_positive, in_range, round_money};
