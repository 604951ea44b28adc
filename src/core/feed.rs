//! Input record abstractions

use anyhow::Result;

/// One unvalidated `timestamp;amount;currency` line from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: usize,
    pub timestamp: String,
    pub amount: String,
    pub currency: String,
}

impl RawRecord {
    pub fn new(line: usize, timestamp: &str, amount: &str, currency: &str) -> Self {
        Self {
            line,
            timestamp: timestamp.trim().to_string(),
            amount: amount.trim().to_string(),
            currency: currency.trim().to_string(),
        }
    }
}

/// Supplies the finite, ordered list of records to value.
///
/// An `Err` means the input could not be obtained at all and the run must
/// stop before any price is requested.
pub trait RecordFeed {
    fn records(&self) -> Result<Vec<RawRecord>>;
}
