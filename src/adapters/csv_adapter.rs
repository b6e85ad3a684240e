//! CSV candle files.
//!
//! Columns are `time,open,high,low,close,volume`. `time` may be epoch
//! seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
//! A directory source names files `<SYMBOL>_<TIMEFRAME>.csv`.

use crate::domain::candle::Candle;
use crate::domain::error::EngineError;
use crate::ports::data_port::CandleSource;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

fn data_error(reason: impl Into<String>) -> EngineError {
    EngineError::Data {
        reason: reason.into(),
    }
}

pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp(secs, 0);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn column(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, EngineError> {
    record
        .get(index)
        .ok_or_else(|| data_error(format!("line {}: missing {} column", line, name)))?
        .trim()
        .parse()
        .map_err(|e| data_error(format!("line {}: invalid {} value: {}", line, name, e)))
}

/// Parse candle CSV text; the result is sorted by time.
pub fn parse_candles(content: &str) -> Result<Vec<Candle>, EngineError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut candles = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
        let line = record.position().map_or(0, |p| p.line());

        let raw_time = record
            .get(0)
            .ok_or_else(|| data_error(format!("line {}: missing time column", line)))?;
        let time = parse_time(raw_time)
            .ok_or_else(|| data_error(format!("line {}: invalid time '{}'", line, raw_time)))?;

        candles.push(Candle {
            time,
            open: column(&record, 1, "open", line)?,
            high: column(&record, 2, "high", line)?,
            low: column(&record, 3, "low", line)?,
            close: column(&record, 4, "close", line)?,
            volume: column(&record, 5, "volume", line)?,
        });
    }

    candles.sort_by_key(|c| c.time);
    Ok(candles)
}

pub fn read_candles<P: AsRef<Path>>(path: P) -> Result<Vec<Candle>, EngineError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
    parse_candles(&content)
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

impl CandleSource for CsvAdapter {
    fn fetch_candles(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>, EngineError> {
        read_candles(self.csv_path(symbol, timeframe))
    }

    fn list_symbols(&self, timeframe: &str) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let suffix = format!("_{}.csv", timeframe);
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(&suffix) {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
