//! CSV directory market-data adapter.
//!
//! One file per market and timeframe, named `{BASE}{QUOTE}_{timeframe}.csv`
//! (e.g. `BTCUSDT_1d.csv`), with a header row and the columns
//! `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339 or
//! milliseconds since the Unix epoch. A market is listed when any of its
//! timeframe files exists. A row with a non-finite or negative value, or a
//! non-positive close, fails the whole fetch.

use crate::domain::error::TrendError;
use crate::domain::ohlcv::{Bar, Timeframe};
use crate::domain::universe::TradingPair;
use crate::ports::data_port::MarketDataPort;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

fn data_error(reason: impl Into<String>) -> TrendError {
    TrendError::Data {
        reason: reason.into(),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TrendError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| data_error(format!("timestamp out of range: {}", raw)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| data_error(format!("invalid timestamp '{}': {}", raw, e)))
}

fn field(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, TrendError> {
    record
        .get(index)
        .ok_or_else(|| data_error(format!("line {}: missing {} column", line, name)))?
        .trim()
        .parse()
        .map_err(|e| data_error(format!("line {}: invalid {} value: {}", line, name, e)))
}

impl MarketDataPort for CsvMarketData {
    fn has_market(&self, base: &str, quote: &str) -> bool {
        let symbol = format!("{}{}", base, quote);
        Timeframe::ALL
            .iter()
            .any(|&tf| self.csv_path(&symbol, tf).is_file())
    }

    fn fetch_bars(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, TrendError> {
        let path = self.csv_path(&pair.symbol(), timeframe);
        if !path.is_file() {
            debug!(path = %path.display(), "no data file");
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let timestamp = parse_timestamp(
                record
                    .get(0)
                    .ok_or_else(|| data_error(format!("line {}: missing timestamp column", line)))?,
            )?;
            if since.is_some_and(|s| timestamp <= s) {
                continue;
            }

            let bar = Bar {
                timestamp,
                open: field(&record, 1, "open", line)?,
                high: field(&record, 2, "high", line)?,
                low: field(&record, 3, "low", line)?,
                close: field(&record, 4, "close", line)?,
                volume: field(&record, 5, "volume", line)?,
            };
            bar.validate()
                .map_err(|reason| data_error(format!("{} line {}: {}", path.display(), line, reason)))?;
            bars.push(bar);
        }

        // Duplicate timestamps are left for the series to reject.
        bars.sort_by_key(|b| b.timestamp);
        debug!(symbol = %pair.symbol(), %timeframe, bars = bars.len(), "loaded csv");
        Ok(bars)
    }
}
