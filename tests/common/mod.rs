#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
pub use trendlevels::domain::ohlcv::{Bar, SeriesKey, Timeframe};
use trendlevels::domain::config::PipelineConfig;
use trendlevels::domain::error::TrendError;
use trendlevels::domain::notification::Notification;
use trendlevels::domain::rule_parser::parse_rules;
use trendlevels::domain::signal::{SignalEvent, SignalKind};
use trendlevels::domain::universe::TradingPair;
use trendlevels::ports::data_port::MarketDataPort;
use trendlevels::ports::notification_port::NotificationPort;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Market keyed by `BASEQUOTE` symbol. Every timeframe serves the same bars.
#[derive(Default)]
pub struct MockMarketData {
    bars: Mutex<HashMap<String, Vec<Bar>>>,
    errors: Mutex<HashMap<String, String>>,
    pub fetches: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fetch_delay_ms: u64,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.lock().unwrap().insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(self, symbol: &str, reason: &str) -> Self {
        self.errors
            .lock()
            .unwrap()
            .insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.fetch_delay_ms = ms;
        self
    }

    pub fn delist(&self, symbol: &str) {
        self.bars.lock().unwrap().remove(symbol);
    }

    pub fn push_bars(&self, symbol: &str, more: Vec<Bar>) {
        self.bars
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .extend(more);
    }
}

impl MarketDataPort for MockMarketData {
    fn has_market(&self, base: &str, quote: &str) -> bool {
        self.bars
            .lock()
            .unwrap()
            .contains_key(&format!("{}{}", base, quote))
    }

    fn fetch_bars(
        &self,
        pair: &TradingPair,
        _timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, TrendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.fetch_delay_ms > 0 {
            thread::sleep(std::time::Duration::from_millis(self.fetch_delay_ms));
        }
        let result = match self.errors.lock().unwrap().get(&pair.symbol()) {
            Some(reason) => Err(TrendError::Data {
                reason: reason.clone(),
            }),
            None => Ok(self
                .bars
                .lock()
                .unwrap()
                .get(&pair.symbol())
                .map(|bars| {
                    bars.iter()
                        .filter(|b| since.is_none_or(|s| b.timestamp > s))
                        .copied()
                        .collect()
                })
                .unwrap_or_default()),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Shared handle so a test keeps access after boxing into the orchestrator.
pub struct SharedMarket(pub Arc<MockMarketData>);

impl MarketDataPort for SharedMarket {
    fn has_market(&self, base: &str, quote: &str) -> bool {
        self.0.has_market(base, quote)
    }

    fn fetch_bars(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, TrendError> {
        self.0.fetch_bars(pair, timeframe, since)
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Vec<Notification>>>);

impl RecordingSink {
    pub fn received(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }
}

impl NotificationPort for RecordingSink {
    fn deliver(&self, notification: &Notification) -> Result<(), TrendError> {
        self.0.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn day(i: i64) -> DateTime<Utc> {
    start() + Duration::days(i)
}

pub fn bar_at(timestamp: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

/// One daily bar per close, starting at [`start`].
pub fn daily_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar_at(day(i as i64), c))
        .collect()
}

pub fn signal(key: &SeriesKey, index: i64, kind: SignalKind, price: f64) -> SignalEvent {
    SignalEvent {
        timestamp: day(index),
        asset: key.asset.clone(),
        timeframe: key.timeframe,
        kind,
        rule: "CROSS(EMA(3), EMA(5))".to_string(),
        snapshot: Vec::new(),
        price,
    }
}

pub fn test_config(assets: &[&str], rules: &str) -> PipelineConfig {
    PipelineConfig {
        assets: assets.iter().map(|a| a.to_string()).collect(),
        timeframes: vec![Timeframe::D1],
        rules: parse_rules(rules).unwrap(),
        backtest_lookback_bars: 200,
        ..PipelineConfig::default()
    }
}

/// The reference closes used across the scenario tests.
pub const REFERENCE_CLOSES: [f64; 10] = [10.0, 10.0, 10.0, 12.0, 14.0, 13.0, 11.0, 9.0, 11.0, 13.0];
