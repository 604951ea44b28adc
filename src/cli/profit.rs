use super::ui;
use crate::core::config::AppConfig;
use crate::core::position::parse_records;
use crate::core::{AggregateReport, Aggregator, PriceSource, RawRecord, RecordFeed};
use crate::providers::{BinancePriceSource, CsvRecordFeed};
use anyhow::{Result, anyhow};
use chrono::Utc;
use comfy_table::Cell;
use tracing::{debug, info};

impl AggregateReport {
    pub fn display_as_table(&self, quote_currency: &str) -> String {
        if self.is_empty() {
            let mut output = ui::style_text("No positions to value", ui::StyleType::Subtle);
            if self.skipped_count > 0 {
                output.push_str(&format!(
                    " ({} input record(s) skipped)",
                    self.skipped_count
                ));
            }
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell(&format!("Profit ({quote_currency})")),
        ]);
        for (currency, pnl) in &self.per_currency_pnl {
            table.add_row(vec![Cell::new(currency), ui::pnl_cell(*pnl)]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text("Your coins", ui::StyleType::Title)
        );
        output.push_str(&table.to_string());

        let totals = [
            ("Start value", self.total_open_value),
            ("Current value", self.total_current_value),
            ("Profit", self.total_pnl),
        ];
        output.push('\n');
        for (label, value) in totals {
            output.push_str(&format!(
                "\n{} ({}): {}",
                ui::style_text(label, ui::StyleType::TotalLabel),
                quote_currency,
                ui::style_text(&format!("{value:.2}"), ui::StyleType::TotalValue)
            ));
        }

        if self.failed_count > 0 {
            output.push_str(&format!(
                "\n\n{}",
                ui::style_text(
                    &format!("{} position(s) could not be priced:", self.failed_count),
                    ui::StyleType::Error
                )
            ));
            for (currency, reason) in &self.failures {
                output.push_str(&format!(
                    "\n  {currency}: {}",
                    ui::style_text(reason, ui::StyleType::Subtle)
                ));
            }
        }
        if self.skipped_count > 0 {
            output.push_str(&format!(
                "\n\n{}",
                ui::style_text(
                    &format!("{} input record(s) skipped", self.skipped_count),
                    ui::StyleType::Subtle
                )
            ));
        }

        output
    }
}

/// Values `records` against `source` and returns the merged report.
/// Records that fail validation are counted as skipped.
pub async fn build_report(
    config: &AppConfig,
    records: &[RawRecord],
    source: &(dyn PriceSource + Send + Sync),
    update_callback: &(dyn Fn() + Sync),
) -> AggregateReport {
    let parsed = parse_records(records, config.timestamp_fallback, Utc::now());
    info!(
        positions = parsed.positions.len(),
        skipped = parsed.skipped,
        "Valuing positions"
    );

    let aggregator = Aggregator::new(config.aggregator_options());
    let mut report = aggregator
        .aggregate(&parsed.positions, source, update_callback)
        .await;
    report.skipped_count = parsed.skipped;
    debug!(?report, "Aggregated report");
    report
}

pub async fn run(config: &AppConfig, input: Option<&str>) -> Result<AggregateReport> {
    let input = input
        .or(config.input.as_deref())
        .ok_or_else(|| anyhow!("No input file given; pass --input or set `input` in the config"))?;
    let records = CsvRecordFeed::new(input).records()?;
    let source = BinancePriceSource::new(
        config.binance_url(),
        &config.interval,
        config.request_timeout(),
    )?;

    let pb = ui::new_progress_bar(records.len() as u64);
    pb.set_message("Fetching prices...");
    let report = build_report(config, &records, &source, &|| pb.inc(1)).await;
    pb.finish_and_clear();

    println!("{}", report.display_as_table(&config.quote_currency));
    Ok(report)
}
