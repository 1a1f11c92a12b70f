//! Zero-lag moving average.
//!
//! lag = (n-1)/2, input[t] = close[t] + (close[t] - close[t-lag]), then EMA(n)
//! over the inputs. Defined from t >= n-1+lag.

use crate::domain::indicator::ema::{EmaState, ema_over};
use crate::domain::ohlcv::Bar;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub fn lag_for(window: usize) -> usize {
    window.saturating_sub(1) / 2
}

/// Incremental ZLMA: the last `lag + 1` closes plus the inner EMA state.
#[derive(Debug, Clone, PartialEq)]
pub struct ZlmaState {
    lag: usize,
    closes: VecDeque<f64>,
    ema: EmaState,
}

impl ZlmaState {
    pub fn new(window: usize) -> Self {
        let lag = lag_for(window);
        Self {
            lag,
            closes: VecDeque::with_capacity(lag + 1),
            ema: EmaState::new(window),
        }
    }

    pub fn lag(&self) -> usize {
        self.lag
    }

    pub fn value(&self) -> Option<f64> {
        self.ema.value()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.ema.last_timestamp()
    }

    pub fn update(&mut self, timestamp: DateTime<Utc>, close: f64) -> Option<f64> {
        if self.closes.len() == self.lag + 1 {
            self.closes.pop_front();
        }
        self.closes.push_back(close);
        if self.closes.len() < self.lag + 1 {
            return None;
        }
        let lagged = self.closes.front().copied().unwrap_or(close);
        self.ema.update(timestamp, close + (close - lagged))
    }
}

/// Batch ZLMA over closes. One entry per bar; `None` before `n-1+lag`.
pub fn calculate_zlma(bars: &[Bar], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; bars.len()];
    }
    let lag = lag_for(window);
    if bars.len() <= lag {
        return vec![None; bars.len()];
    }
    let inputs: Vec<f64> = (lag..bars.len())
        .map(|t| bars[t].close + (bars[t].close - bars[t - lag].close))
        .collect();
    let mut values = vec![None; lag];
    values.extend(ema_over(&inputs, window));
    values
}
