//! Purchase-order internal reference (intRef): `YYMMDD.NN[R<k>]`.
//!
//! `YYMMDD` is the date of first creation, `NN` the daily sequence, and
//! `R<k>` the revision counter, absent until the first post-creation edit.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderReference {
    date: NaiveDate,
    sequence: u32,
    revision: u32,
}

impl ValueObject for OrderReference {}

impl OrderReference {
    /// First reference of a new order (no revision suffix).
    pub fn new(date: NaiveDate, sequence: u32) -> DomainResult<Self> {
        if sequence == 0 {
            return Err(DomainError::invalid_id("daily sequence starts at 1"));
        }
        Ok(Self {
            date,
            sequence,
            revision: 0,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// The same order with the revision counter advanced by one.
    pub fn next_revision(&self) -> Self {
        Self {
            revision: self.revision + 1,
            ..*self
        }
    }

    /// `YYMMDD` part.
    pub fn date_prefix(date: NaiveDate) -> String {
        date.format("%y%m%d").to_string()
    }

    /// Sequence-counter scope shared by every order created on `date`.
    pub fn sequence_scope(date: NaiveDate) -> String {
        format!("po:{}", Self::date_prefix(date))
    }

    /// Reference without the revision suffix.
    pub fn base(&self) -> String {
        format!("{}.{:02}", Self::date_prefix(self.date), self.sequence)
    }
}

impl core::fmt::Display for OrderReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.base())?;
        if self.revision > 0 {
            write!(f, "R{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for OrderReference {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("malformed order reference '{s}'"));

        let (date_part, rest) = s.split_once('.').ok_or_else(invalid)?;
        if date_part.len() != 6 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date_part, "%y%m%d").map_err(|_| invalid())?;

        let (sequence_part, revision_part) = match rest.split_once('R') {
            Some((seq, rev)) => (seq, Some(rev)),
            None => (rest, None),
        };
        if sequence_part.len() < 2 || !sequence_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence: u32 = sequence_part.parse().map_err(|_| invalid())?;
        let revision = match revision_part {
            Some(rev) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
                let revision: u32 = rev.parse().map_err(|_| invalid())?;
                if revision == 0 {
                    return Err(invalid());
                }
                revision
            }
            Some(_) => return Err(invalid()),
            None => 0,
        };

        let mut reference = Self::new(date, sequence)?;
        reference.revision = revision;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()
    }

    #[test]
    fn formats_date_and_two_digit_sequence() {
        let r = OrderReference::new(day(), 3).unwrap();
        assert_eq!(r.to_string(), "250214.03");
        assert_eq!(OrderReference::sequence_scope(day()), "po:250214");
    }

    #[test]
    fn revisions_append_monotonic_suffix() {
        let r = OrderReference::new(day(), 3).unwrap();
        let r1 = r.next_revision();
        let r2 = r1.next_revision();
        assert_eq!(r1.to_string(), "250214.03R1");
        assert_eq!(r2.to_string(), "250214.03R2");
        assert_eq!(r2.base(), "250214.03");
    }

    #[test]
    fn parses_what_it_prints() {
        for text in ["250214.03", "250214.03R1", "250214.120R15"] {
            let parsed: OrderReference = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn rejects_malformed_references() {
        let malformed = [
            "",
            "250214",
            "2502.03",
            "250214.3",
            "250214.03R",
            "250214.03R0",
            "251314.01",
        ];
        for text in malformed {
            assert!(text.parse::<OrderReference>().is_err(), "{text} should not parse");
        }
        assert!(OrderReference::new(day(), 0).is_err());
    }

    proptest::proptest! {
        #[test]
        fn revisions_keep_the_base(sequence in 1u32..100, revisions in 0usize..20) {
            let first = OrderReference::new(day(), sequence).unwrap();
            let mut current = first;
            for _ in 0..revisions {
                let next = current.next_revision();
                proptest::prop_assert!(next > current);
                current = next;
            }
            proptest::prop_assert_eq!(current.base(), first.base());
            proptest::prop_assert_eq!(current.revision() as usize, revisions);
        }
    }
}
