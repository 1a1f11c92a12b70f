//! Signal events emitted by the detector.

use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::{SeriesKey, Timeframe};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
}

impl SignalKind {
    pub fn opposite(&self) -> Self {
        match self {
            SignalKind::Buy => SignalKind::Sell,
            SignalKind::Sell => SignalKind::Buy,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
        }
    }
}

/// Current regime of a rule: which side of zero its predicate sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "Bullish"),
            Trend::Bearish => write!(f, "Bearish"),
            Trend::Neutral => write!(f, "Neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorReading {
    pub indicator: IndicatorType,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub timeframe: Timeframe,
    pub kind: SignalKind,
    /// Display form of the rule that fired.
    pub rule: String,
    pub snapshot: Vec<IndicatorReading>,
    pub price: f64,
}

impl SignalEvent {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.asset.clone(), self.timeframe)
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @ {} [{}]",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.asset,
            self.timeframe,
            self.kind,
            self.price,
            self.rule
        )
    }
}
