//! Append-only stock movement ledger.
//!
//! Balances are never stored: `balance(key)` is always the sum of IN minus
//! OUT quantities over the entries recorded for that key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradeledger_core::{DomainError, DomainResult, ensure_positive, in_range};

/// Stock-keeping identifier.
///
/// SKUs (stock-transaction flows, purchasing) and article codes (kitting,
/// price lists) are independent namespaces: `Sku("A1")` and `Article("A1")`
/// are different keys with different balances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "code", rename_all = "lowercase")]
pub enum StockKey {
    Sku(String),
    Article(String),
}

impl StockKey {
    pub fn sku(code: impl AsRef<str>) -> DomainResult<Self> {
        Ok(StockKey::Sku(normalize_code(code.as_ref(), "sku")?))
    }

    pub fn article(code: impl AsRef<str>) -> DomainResult<Self> {
        Ok(StockKey::Article(normalize_code(code.as_ref(), "article")?))
    }

    /// Rebuild a key from its persisted `(scheme, code)` pair.
    pub fn from_parts(scheme: &str, code: &str) -> DomainResult<Self> {
        match scheme {
            "sku" => Self::sku(code),
            "article" => Self::article(code),
            other => Err(DomainError::invalid_id(format!("unknown key scheme '{other}'"))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            StockKey::Sku(_) => "sku",
            StockKey::Article(_) => "article",
        }
    }

    pub fn code(&self) -> &str {
        match self {
            StockKey::Sku(code) | StockKey::Article(code) => code,
        }
    }

    /// Keys built directly through the enum variants bypass trimming; this
    /// re-checks them before anything is written.
    pub fn validate(&self) -> DomainResult<()> {
        let code = self.code();
        if code.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "{} code cannot be empty",
                self.scheme()
            )));
        }
        if code.trim() != code {
            return Err(DomainError::validation(format!(
                "{} code '{code}' has surrounding whitespace",
                self.scheme()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.scheme(), self.code())
    }
}

fn normalize_code(code: &str, scheme: &str) -> DomainResult<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{scheme} code cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(DomainError::validation(format!("unknown direction '{other}'"))),
        }
    }

    /// Apply the direction's sign to a positive quantity.
    pub fn signed(self, quantity: Decimal) -> Decimal {
        match self {
            Direction::In => quantity,
            Direction::Out => -quantity,
        }
    }
}

/// A movement that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub key: StockKey,
    pub direction: Direction,
    pub quantity: Decimal,
    /// Links back to the originating document (GRN number, kit tag, ...).
    pub reference: String,
    pub note: String,
}

impl NewLedgerEntry {
    pub fn inbound(key: StockKey, quantity: Decimal, reference: impl Into<String>) -> Self {
        Self {
            key,
            direction: Direction::In,
            quantity,
            reference: reference.into(),
            note: String::new(),
        }
    }

    pub fn outbound(key: StockKey, quantity: Decimal, reference: impl Into<String>) -> Self {
        Self {
            key,
            direction: Direction::Out,
            quantity,
            reference: reference.into(),
            note: String::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.key.validate()?;
        ensure_positive(self.quantity, "ledger quantity")?;
        Ok(())
    }

    pub fn signed_quantity(&self) -> Decimal {
        self.direction.signed(self.quantity)
    }

    /// Stamp the entry with its store-assigned identity.
    pub fn commit(self, entry_id: Uuid, sequence: u64, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            entry_id,
            sequence,
            key: self.key,
            direction: self.direction,
            quantity: self.quantity,
            reference: self.reference,
            note: self.note,
            created_at,
        }
    }
}

/// An immutable, committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    /// Global commit order.
    pub sequence: u64,
    pub key: StockKey,
    pub direction: Direction,
    pub quantity: Decimal,
    pub reference: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_quantity(&self) -> Decimal {
        self.direction.signed(self.quantity)
    }
}

/// Σ IN − Σ OUT over the entries for `key`.
pub fn balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>, key: &StockKey) -> Decimal {
    entries
        .into_iter()
        .filter(|e| &e.key == key)
        .map(LedgerEntry::signed_quantity)
        .sum()
}

/// Net signed movement per key within one batch, in key order.
///
/// Stores use this to decide which keys need a balance check (net < 0) and
/// to lock them in a stable order. Fails when a key's net leaves the
/// `Decimal` range.
pub fn net_movements(entries: &[NewLedgerEntry]) -> DomainResult<BTreeMap<StockKey, Decimal>> {
    let mut net = BTreeMap::new();
    for e in entries {
        let total = net.entry(e.key.clone()).or_insert(Decimal::ZERO);
        *total = in_range(total.checked_add(e.signed_quantity()), "net movement")?;
    }
    Ok(net)
}

/// Balance of `key` after appending the batch's entries for it, in order,
/// on top of `available`.
///
/// Every intermediate balance must fit in a `Decimal`, which keeps
/// [`balance`] over the committed ledger from overflowing.
pub fn balance_after(
    available: Decimal,
    entries: &[NewLedgerEntry],
    key: &StockKey,
) -> DomainResult<Decimal> {
    entries
        .iter()
        .filter(|e| &e.key == key)
        .try_fold(available, |acc, e| {
            in_range(acc.checked_add(e.signed_quantity()), "stock balance")
        })
}

/// Ledger listing filter. `from`/`to` are inclusive bounds on `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub key: Option<StockKey>,
    pub direction: Option<Direction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn for_key(key: StockKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.key.as_ref().is_none_or(|k| &entry.key == k)
            && self.direction.is_none_or(|d| entry.direction == d)
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
    }
}
