//! Historical OHLCV loading for the backtest simulator (§10.8).
//!
//! Grounded on `original_source/src/backtest/data_loader.py`, generalized
//! from pandas' `read_csv`/`sort_values` into a plain `csv` + `chrono` parse
//! since there is no dataframe library in the teacher's stack.

use crate::errors::BacktestError;
use crate::exchange::Candle;
use chrono::DateTime;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Loads candles from a CSV with a `timestamp,open,high,low,close,volume`
/// header. `timestamp` accepts either an RFC3339 string or a raw millisecond
/// epoch integer. Rows are sorted ascending by time after parsing.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>, BacktestError> {
    let path_ref = path.as_ref();
    let mut reader = csv::Reader::from_path(path_ref).map_err(|source| BacktestError::Csv {
        path: path_ref.display().to_string(),
        source,
    })?;

    let mut candles = Vec::new();
    for record in reader.deserialize() {
        let row: CsvRow = record.map_err(|source| BacktestError::Csv {
            path: path_ref.display().to_string(),
            source,
        })?;
        let ts_ms = parse_timestamp(&row.timestamp);
        candles.push(Candle {
            ts_ms,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    if candles.is_empty() {
        return Err(BacktestError::EmptyDataset);
    }
    candles.sort_by_key(|c| c.ts_ms);
    Ok(candles)
}

fn parse_timestamp(raw: &str) -> i64 {
    if let Ok(ms) = raw.parse::<i64>() {
        return ms;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_sorts_rows_by_timestamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-02T00:00:00Z,101,102,100,101,5").unwrap();
        writeln!(file, "2024-01-01T00:00:00Z,100,101,99,100,10").unwrap();
        file.flush().unwrap();

        let candles = load_csv(file.path()).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].ts_ms < candles[1].ts_ms);
        assert_eq!(candles[0].close, 100.0);
    }

    #[test]
    fn rejects_empty_dataset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        file.flush().unwrap();
        assert!(matches!(load_csv(file.path()), Err(BacktestError::EmptyDataset)));
    }
}
