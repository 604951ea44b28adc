pub mod binance;
pub mod csv_feed;

pub use binance::BinancePriceSource;
pub use csv_feed::CsvRecordFeed;
