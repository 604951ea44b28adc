//! Validation of raw input records into positions.

use crate::core::feed::RawRecord;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// What to do with a record whose timestamp cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampFallback {
    /// Value the position as if it was opened right now.
    #[default]
    Now,
    /// Drop the record and count it as skipped.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
}

impl Position {
    pub fn pair(&self, quote_currency: &str) -> String {
        format!("{}{}", self.currency, quote_currency.to_uppercase())
    }
}

/// Positions accepted for valuation plus the number of rejected records.
#[derive(Debug, Default)]
pub struct ParsedPositions {
    pub positions: Vec<Position>,
    pub skipped: usize,
}

/// Converts one record, applying `fallback` to a bad timestamp. `now` is
/// passed in so a whole batch shares the same fallback instant.
pub fn parse_record(
    record: &RawRecord,
    fallback: TimestampFallback,
    now: DateTime<Utc>,
) -> Result<Position> {
    let amount = Decimal::from_str(&record.amount)
        .or_else(|_| Decimal::from_scientific(&record.amount))
        .with_context(|| {
            format!(
                "Invalid amount '{}' at line {}",
                record.amount, record.line
            )
        })?;

    if record.currency.is_empty() || !record.currency.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(anyhow!(
            "Invalid currency '{}' at line {}",
            record.currency,
            record.line
        ));
    }

    let timestamp = match DateTime::parse_from_rfc3339(&record.timestamp) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => match fallback {
            TimestampFallback::Now => {
                warn!(
                    line = record.line,
                    timestamp = %record.timestamp,
                    "Unparseable timestamp, using current time"
                );
                now
            }
            TimestampFallback::Skip => {
                return Err(e).with_context(|| {
                    format!(
                        "Invalid timestamp '{}' at line {}",
                        record.timestamp, record.line
                    )
                });
            }
        },
    };

    Ok(Position {
        timestamp,
        amount,
        currency: record.currency.to_uppercase(),
    })
}

/// Parses every record, keeping the valid ones in input order.
pub fn parse_records(
    records: &[RawRecord],
    fallback: TimestampFallback,
    now: DateTime<Utc>,
) -> ParsedPositions {
    let mut parsed = ParsedPositions::default();
    for record in records {
        match parse_record(record, fallback, now) {
            Ok(position) => parsed.positions.push(position),
            Err(e) => {
                warn!(error = %e, "Skipping input record");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}
