//! Core business logic abstractions

pub mod aggregate;
pub mod config;
pub mod feed;
pub mod log;
pub mod position;
pub mod price;

// Re-export main types for cleaner imports
pub use aggregate::{AggregateReport, Aggregator, AggregatorOptions, Valuation, ValuationResult};
pub use feed::{RawRecord, RecordFeed};
pub use position::{Position, TimestampFallback};
pub use price::{PriceQuote, PriceSource};
