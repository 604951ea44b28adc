//! Pricing abstractions and core types

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub pair: String,
    pub price: Decimal,
}

impl PriceQuote {
    /// Builds a quote from the decimal string the exchange returns. Zero,
    /// negative and unparseable prices are rejected.
    pub fn parse(pair: &str, raw_price: &str) -> Result<Self> {
        let price = Decimal::from_str(raw_price.trim())
            .map_err(|e| anyhow!("Invalid price '{}' for pair {}: {}", raw_price, pair, e))?;
        if price <= Decimal::ZERO {
            return Err(anyhow!("Non-positive price {} for pair {}", price, pair));
        }
        Ok(Self {
            pair: pair.to_string(),
            price,
        })
    }
}

/// Source of exchange rates for a trading pair such as `BTCUSDT`.
///
/// Implementations are shared across every valuation task of a batch, so
/// they must tolerate concurrent calls.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price of the first bar at or after `at`.
    async fn historical(&self, pair: &str, at: DateTime<Utc>) -> Result<PriceQuote>;

    async fn current(&self, pair: &str) -> Result<PriceQuote>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_quote() {
        let quote = PriceQuote::parse("BTCUSDT", "42000.01000000").unwrap();
        assert_eq!(quote.pair, "BTCUSDT");
        assert_eq!(quote.price, dec!(42000.01));
    }

    #[test]
    fn test_parse_rejects_bad_prices() {
        assert!(PriceQuote::parse("BTCUSDT", "abc").is_err());
        assert!(PriceQuote::parse("BTCUSDT", "0.00000000").is_err());

        let err = PriceQuote::parse("BTCUSDT", "-1").unwrap_err();
        assert_eq!(err.to_string(), "Non-positive price -1 for pair BTCUSDT");
    }
}
