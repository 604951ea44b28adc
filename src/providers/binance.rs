use crate::core::price::{PriceQuote, PriceSource};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const KLINES_PATH: &str = "/api/v3/klines";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";

/// Index of the open price within a kline array.
const KLINE_OPEN_INDEX: usize = 1;

/// Query parameters of `GET /api/v3/klines`.
#[derive(Serialize, Debug)]
struct KlineQuery<'a> {
    symbol: &'a str,
    interval: &'a str,
    #[serde(rename = "startTime")]
    start_time: i64,
    limit: u16,
}

/// Query parameters of `GET /api/v3/ticker/price`.
#[derive(Serialize, Debug)]
struct TickerQuery<'a> {
    symbol: &'a str,
}

#[derive(Deserialize, Debug)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Price source backed by the Binance spot market REST API.
pub struct BinancePriceSource {
    base_url: String,
    interval: String,
    client: reqwest::Client,
}

impl BinancePriceSource {
    pub fn new(base_url: &str, interval: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("coinpnl/1.0")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(BinancePriceSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            interval: interval.to_string(),
            client,
        })
    }

    async fn get_json<Q: Serialize + std::fmt::Debug>(
        &self,
        path: &str,
        query: &Q,
        pair: &str,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(?query, "Requesting {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for pair: {} URL: {}", e, pair, url))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiError>(&text) {
                Ok(err) => anyhow!("Binance error {} for pair {}: {}", err.code, pair, err.msg),
                Err(_) => anyhow!("HTTP error: {} for pair: {}", status, pair),
            });
        }
        Ok(text)
    }
}

/// Extracts the open price of the first bar of a klines response.
fn first_bar_open(pair: &str, bars: &[Vec<Value>]) -> Result<PriceQuote> {
    let bar = bars
        .first()
        .ok_or_else(|| anyhow!("No price data found for pair: {}", pair))?;
    let open = bar
        .get(KLINE_OPEN_INDEX)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Malformed kline for pair: {}", pair))?;
    PriceQuote::parse(pair, open)
}

#[async_trait]
impl PriceSource for BinancePriceSource {
    #[instrument(name = "BinanceHistoricalPrice", skip(self), fields(pair = %pair))]
    async fn historical(&self, pair: &str, at: DateTime<Utc>) -> Result<PriceQuote> {
        let query = KlineQuery {
            symbol: pair,
            interval: &self.interval,
            start_time: at.timestamp_millis(),
            limit: 1,
        };
        let text = self.get_json(KLINES_PATH, &query, pair).await?;

        let bars: Vec<Vec<Value>> = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;
        let quote = first_bar_open(pair, &bars)?;
        debug!(price = %quote.price, "Historical price");
        Ok(quote)
    }

    #[instrument(name = "BinanceCurrentPrice", skip(self), fields(pair = %pair))]
    async fn current(&self, pair: &str) -> Result<PriceQuote> {
        let text = self
            .get_json(TICKER_PRICE_PATH, &TickerQuery { symbol: pair }, pair)
            .await?;

        let ticker: TickerPrice = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;
        if ticker.symbol != pair {
            return Err(anyhow!(
                "Ticker returned {} instead of requested pair {}",
                ticker.symbol,
                pair
            ));
        }
        let quote = PriceQuote::parse(pair, &ticker.price)?;
        debug!(price = %quote.price, "Current price");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BTC_KLINES: &str = r#"[
        [1704067200000, "42283.58000000", "42298.62000000", "42261.02000000",
         "42298.61000000", "35.92724000", 1704067259999, "1519032.28022260",
         1327, "21.05282000", "890116.36498360", "0"]
    ]"#;

    fn source(server: &MockServer) -> BinancePriceSource {
        BinancePriceSource::new(&server.uri(), "1m", Duration::from_secs(5)).unwrap()
    }

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_successful_historical_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KLINES_PATH))
            .and(query_param("symbol", "BTCUSDT"))
            .and(query_param("interval", "1m"))
            .and(query_param("startTime", "1704067200000"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BTC_KLINES))
            .mount(&mock_server)
            .await;

        let quote = source(&mock_server)
            .historical("BTCUSDT", new_year())
            .await
            .unwrap();
        assert_eq!(quote.pair, "BTCUSDT");
        assert_eq!(quote.price, dec!(42283.58));
    }

    #[tokio::test]
    async fn test_no_klines_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KLINES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).historical("BTCUSDT", new_year()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No price data found for pair: BTCUSDT"
        );
    }

    #[tokio::test]
    async fn test_malformed_kline() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KLINES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("[[1704067200000]]"))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).historical("BTCUSDT", new_year()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Malformed kline for pair: BTCUSDT"
        );
    }

    #[tokio::test]
    async fn test_successful_current_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKER_PRICE_PATH))
            .and(query_param("symbol", "ETHUSDT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"symbol":"ETHUSDT","price":"1900.50000000"}"#),
            )
            .mount(&mock_server)
            .await;

        let quote = source(&mock_server).current("ETHUSDT").await.unwrap();
        assert_eq!(quote.price, dec!(1900.5));
    }

    #[tokio::test]
    async fn test_unknown_symbol_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKER_PRICE_PATH))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"code":-1121,"msg":"Invalid symbol."}"#),
            )
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).current("FOOUSDT").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Binance error -1121 for pair FOOUSDT: Invalid symbol."
        );
    }

    #[tokio::test]
    async fn test_server_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKER_PRICE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).current("BTCUSDT").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for pair: BTCUSDT"
        );
    }

    #[tokio::test]
    async fn test_malformed_ticker_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKER_PRICE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"symbol":"BTCUSDT"}"#))
            .mount(&mock_server)
            .await;

        let result = source(&mock_server).current("BTCUSDT").await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON response for BTCUSDT")
        );
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKER_PRICE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"symbol":"BTCUSDT","price":"1.0"}"#)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let source =
            BinancePriceSource::new(&mock_server.uri(), "1m", Duration::from_millis(50)).unwrap();
        let result = source.current("BTCUSDT").await;
        assert!(result.unwrap_err().to_string().starts_with("Request error"));
    }
}
