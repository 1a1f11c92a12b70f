//! Indicator engine.
//!
//! - `IndicatorType`: indicator identity + parameters (serves as map key)
//! - `IndicatorState`: the O(1) recurrence state behind one indicator
//! - `IndicatorSeries`: bounded tail of defined points for one indicator
//! - `IndicatorEngine`: all indicators for one (asset, timeframe)

pub mod ema;
pub mod zlma;

use crate::domain::error::TrendError;
use crate::domain::ohlcv::{Bar, SeriesKey};
use chrono::{DateTime, Utc};
use ema::EmaState;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use zlma::ZlmaState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Ema(usize),
    Zlma(usize),
}

impl IndicatorType {
    pub fn window(&self) -> usize {
        match self {
            IndicatorType::Ema(w) | IndicatorType::Zlma(w) => *w,
        }
    }

    /// Bars needed before the first value is defined.
    pub fn warmup_bars(&self) -> usize {
        match self {
            IndicatorType::Ema(w) => *w,
            IndicatorType::Zlma(w) => *w + zlma::lag_for(*w),
        }
    }

    fn new_state(&self) -> IndicatorState {
        match self {
            IndicatorType::Ema(w) => IndicatorState::Ema(EmaState::new(*w)),
            IndicatorType::Zlma(w) => IndicatorState::Zlma(ZlmaState::new(*w)),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(w) => write!(f, "EMA({})", w),
            IndicatorType::Zlma(w) => write!(f, "ZLMA({})", w),
        }
    }
}

impl Serialize for IndicatorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorState {
    Ema(EmaState),
    Zlma(ZlmaState),
}

impl IndicatorState {
    pub fn update(&mut self, timestamp: DateTime<Utc>, close: f64) -> Option<f64> {
        match self {
            IndicatorState::Ema(s) => s.update(timestamp, close),
            IndicatorState::Zlma(s) => s.update(timestamp, close),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            IndicatorState::Ema(s) => s.value(),
            IndicatorState::Zlma(s) => s.value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    points: VecDeque<IndicatorPoint>,
    #[serde(skip)]
    capacity: usize,
}

impl IndicatorSeries {
    pub fn new(indicator_type: IndicatorType, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            indicator_type,
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, point: IndicatorPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorPoint> {
        self.points.back()
    }

    /// The last `n` defined points, oldest first.
    pub fn tail(&self, n: usize) -> Vec<IndicatorPoint> {
        let start = self.points.len().saturating_sub(n);
        self.points.range(start..).copied().collect()
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    state: IndicatorState,
    series: IndicatorSeries,
}

/// Every indicator tracked for one (asset, timeframe).
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    key: SeriesKey,
    tracked: BTreeMap<IndicatorType, Tracked>,
    bars_seen: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl IndicatorEngine {
    pub fn new(key: SeriesKey, types: &[IndicatorType], tail_capacity: usize) -> Self {
        let tracked = types
            .iter()
            .map(|t| {
                (
                    *t,
                    Tracked {
                        state: t.new_state(),
                        series: IndicatorSeries::new(*t, tail_capacity),
                    },
                )
            })
            .collect();
        Self {
            key,
            tracked,
            bars_seen: 0,
            last_timestamp: None,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    pub fn types(&self) -> impl Iterator<Item = IndicatorType> + '_ {
        self.tracked.keys().copied()
    }

    /// Advance every indicator by one bar.
    pub fn update(&mut self, bar: &Bar) -> Result<(), TrendError> {
        if let Some(last) = self.last_timestamp {
            if bar.timestamp <= last {
                return Err(TrendError::OutOfOrder {
                    asset: self.key.asset.clone(),
                    timeframe: self.key.timeframe,
                    last,
                    attempted: bar.timestamp,
                });
            }
        }
        // A NaN would poison every recurrence from here on.
        if !bar.close.is_finite() {
            return Err(TrendError::InvalidBar {
                asset: self.key.asset.clone(),
                timeframe: self.key.timeframe,
                timestamp: bar.timestamp,
                reason: format!("close is not finite ({})", bar.close),
            });
        }
        for tracked in self.tracked.values_mut() {
            if let Some(value) = tracked.state.update(bar.timestamp, bar.close) {
                tracked.series.push(IndicatorPoint {
                    timestamp: bar.timestamp,
                    value,
                });
            }
        }
        self.bars_seen += 1;
        self.last_timestamp = Some(bar.timestamp);
        Ok(())
    }

    /// Current value, or `InsufficientHistory` while warming up.
    pub fn value(&self, indicator: IndicatorType) -> Result<f64, TrendError> {
        let tracked = self
            .tracked
            .get(&indicator)
            .ok_or(TrendError::IndicatorNotTracked { indicator })?;
        tracked
            .state
            .value()
            .ok_or(TrendError::InsufficientHistory {
                indicator,
                have: self.bars_seen,
                need: indicator.warmup_bars(),
            })
    }

    pub fn series(&self, indicator: IndicatorType) -> Option<&IndicatorSeries> {
        self.tracked.get(&indicator).map(|t| &t.series)
    }

    /// (type, value) for every indicator that is past warm-up.
    pub fn readings(&self) -> Vec<(IndicatorType, f64)> {
        self.tracked
            .iter()
            .filter_map(|(t, tracked)| tracked.state.value().map(|v| (*t, v)))
            .collect()
    }
}
