use crate::core::feed::{RawRecord, RecordFeed};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads `timestamp;amount;currency` lines from a file.
///
/// Lines starting with `#` are comments. Missing fields are passed on as
/// empty strings so the record is rejected during validation instead of
/// failing the whole file.
pub struct CsvRecordFeed {
    path: PathBuf,
}

impl CsvRecordFeed {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordFeed for CsvRecordFeed {
    fn records(&self) -> Result<Vec<RawRecord>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Unable to read input file {}", self.path.display()))?;
        let records = read_records(file)
            .with_context(|| format!("Unable to parse input file {}", self.path.display()))?;
        debug!(count = records.len(), path = %self.path.display(), "Read input records");
        Ok(records)
    }
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut records = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let rec = record.with_context(|| format!("Failed to read record {}", row_idx + 1))?;
        if rec.iter().all(str::is_empty) {
            continue;
        }
        let line = rec
            .position()
            .map_or(row_idx + 1, |pos| pos.line() as usize);
        let field = |i: usize| rec.get(i).unwrap_or("");
        records.push(RawRecord::new(line, field(0), field(1), field(2)));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_records() {
        let input = "\
2024-01-01T00:00:00Z;10;BTC
# opened after the halving
 2024-05-01T12:30:00Z ; 0.25 ; eth

2024-06-01T00:00:00Z;5
";
        let records = read_records(input.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            RawRecord::new(1, "2024-01-01T00:00:00Z", "10", "BTC")
        );
        assert_eq!(records[1].timestamp, "2024-05-01T12:30:00Z");
        assert_eq!(records[1].amount, "0.25");
        assert_eq!(records[1].currency, "eth");
        assert!(records[1].line > records[0].line);
        assert_eq!(records[2].currency, "");
    }

    #[test]
    fn test_feed_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "2024-01-01T00:00:00Z;10;BTC")?;
        writeln!(file, "2024-01-01T00:00:00Z;5;ETH")?;

        let records = CsvRecordFeed::new(file.path()).records()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].currency, "ETH");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = CsvRecordFeed::new("/nonexistent/values.csv").records();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unable to read input file /nonexistent/values.csv")
        );
    }
}
