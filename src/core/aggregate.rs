//! Concurrent valuation of positions and race-free aggregation of their profit.
//!
//! Every position is valued by its own future. The futures run concurrently
//! through a bounded `buffer_unordered` stream, and the stream has exactly one
//! consumer which owns the [`Accumulator`]. Valuation futures never touch the
//! totals; they only yield a [`Valuation`] which the consumer merges one at a
//! time. Monetary values are `Decimal`s rounded to cents when computed, so
//! the sums do not depend on the order in which valuations complete.
use crate::core::position::Position;
use crate::core::price::{PriceQuote, PriceSource};
use anyhow::{Result, anyhow};
use futures::stream::{self, StreamExt};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Fractional digits kept for every monetary value.
pub const MONEY_DP: u32 = 2;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Profit of a single successfully priced position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuationResult {
    pub currency: String,
    pub open_value: Decimal,
    pub current_value: Decimal,
    pub pnl: Decimal,
}

impl ValuationResult {
    /// Values `amount` at both prices. Returns `None` if a product overflows.
    pub fn compute(
        currency: &str,
        amount: Decimal,
        historical_price: Decimal,
        current_price: Decimal,
    ) -> Option<Self> {
        let open_value = round_money(amount.checked_mul(historical_price)?);
        let current_value = round_money(amount.checked_mul(current_price)?);
        Some(Self {
            currency: currency.to_string(),
            open_value,
            current_value,
            pnl: current_value.checked_sub(open_value)?,
        })
    }
}

/// Terminal state of one valuation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Valuation {
    Valued(ValuationResult),
    Failed { currency: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub total_open_value: Decimal,
    pub total_current_value: Decimal,
    pub total_pnl: Decimal,
    pub per_currency_pnl: BTreeMap<String, Decimal>,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// `(currency, reason)` for every failed valuation, sorted.
    pub failures: Vec<(String, String)>,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.per_currency_pnl.is_empty() && self.failed_count == 0
    }
}

/// In-progress report. Owned by the single consumer of the valuation stream.
#[derive(Debug, Default)]
pub struct Accumulator {
    report: AggregateReport,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one valuation to the report. A valued position whose values
    /// would overflow the running totals is recorded as a failure instead and
    /// leaves the totals untouched.
    pub fn merge(&mut self, valuation: Valuation) {
        match valuation {
            Valuation::Valued(result) => {
                if !self.try_add(&result) {
                    warn!(currency = %result.currency, "Totals overflowed, position not counted");
                    self.record_failure(
                        result.currency,
                        format!("Value overflow while adding {} to the totals", result.pnl),
                    );
                }
            }
            Valuation::Failed { currency, reason } => self.record_failure(currency, reason),
        }
    }

    fn try_add(&mut self, result: &ValuationResult) -> bool {
        let report = &mut self.report;
        let currency_pnl = report
            .per_currency_pnl
            .get(&result.currency)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let sums = (
            report.total_open_value.checked_add(result.open_value),
            report.total_current_value.checked_add(result.current_value),
            report.total_pnl.checked_add(result.pnl),
            currency_pnl.checked_add(result.pnl),
        );
        let (Some(open), Some(current), Some(pnl), Some(currency_pnl)) = sums else {
            return false;
        };
        report.total_open_value = open;
        report.total_current_value = current;
        report.total_pnl = pnl;
        report
            .per_currency_pnl
            .insert(result.currency.clone(), currency_pnl);
        true
    }

    fn record_failure(&mut self, currency: String, reason: String) {
        self.report.failed_count += 1;
        self.report.failures.push((currency, reason));
    }

    pub fn finish(mut self) -> AggregateReport {
        self.report.failures.sort();
        debug_assert_eq!(
            self.report.total_pnl,
            self.report.per_currency_pnl.values().copied().sum::<Decimal>()
        );
        debug_assert_eq!(
            self.report.total_pnl,
            self.report.total_current_value - self.report.total_open_value
        );
        self.report
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub quote_currency: String,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            quote_currency: "USDT".to_string(),
            max_concurrency: 16,
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Aggregator {
    options: AggregatorOptions,
}

impl Aggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self { options }
    }

    /// Values all `positions` concurrently and merges the outcomes.
    ///
    /// Returns once every valuation reached a terminal state.
    /// `update_callback` runs once per finished valuation, on the merging
    /// task.
    #[instrument(name = "Aggregate", skip_all, fields(positions = positions.len()))]
    pub async fn aggregate(
        &self,
        positions: &[Position],
        source: &(dyn PriceSource + Send + Sync),
        update_callback: &(dyn Fn() + Sync),
    ) -> AggregateReport {
        let mut valuations = stream::iter(positions)
            .map(|position| self.value_position(position, source))
            .buffer_unordered(self.options.max_concurrency.max(1));

        let mut accumulator = Accumulator::new();
        while let Some(valuation) = valuations.next().await {
            accumulator.merge(valuation);
            update_callback();
        }

        accumulator.finish()
    }

    async fn value_position(
        &self,
        position: &Position,
        source: &(dyn PriceSource + Send + Sync),
    ) -> Valuation {
        let pair = position.pair(&self.options.quote_currency);
        match self.fetch_prices(&pair, position, source).await {
            Ok((historical, current)) => match ValuationResult::compute(
                &position.currency,
                position.amount,
                historical.price,
                current.price,
            ) {
                Some(result) => {
                    debug!(
                        pair = %pair,
                        open = %result.open_value,
                        current = %result.current_value,
                        pnl = %result.pnl,
                        "Valued position"
                    );
                    Valuation::Valued(result)
                }
                None => Valuation::Failed {
                    currency: position.currency.clone(),
                    reason: format!("Value overflow for {} {}", position.amount, pair),
                },
            },
            Err(e) => {
                debug!(pair = %pair, error = %e, "Valuation failed");
                Valuation::Failed {
                    currency: position.currency.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fetch_prices(
        &self,
        pair: &str,
        position: &Position,
        source: &(dyn PriceSource + Send + Sync),
    ) -> Result<(PriceQuote, PriceQuote)> {
        let historical = self
            .with_timeout(source.historical(pair, position.timestamp), pair)
            .await?;
        let current = self.with_timeout(source.current(pair), pair).await?;
        Ok((historical, current))
    }

    async fn with_timeout<F>(&self, lookup: F, pair: &str) -> Result<PriceQuote>
    where
        F: Future<Output = Result<PriceQuote>>,
    {
        let limit = self.options.request_timeout;
        tokio::time::timeout(limit, lookup)
            .await
            .map_err(|_| anyhow!("Price lookup for {} timed out after {:?}", pair, limit))?
    }
}
