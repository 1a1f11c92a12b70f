//! Exponential Moving Average.
//!
//! alpha = 2/(n+1), seed with the SMA of the first n inputs, then
//! EMA[t] = alpha*x[t] + (1-alpha)*EMA[t-1]. The first (n-1) points are undefined.

use crate::domain::ohlcv::Bar;
use chrono::{DateTime, Utc};

/// Incremental EMA state. One `update` per input, O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct EmaState {
    window: usize,
    alpha: f64,
    seed_sum: f64,
    count: usize,
    last_value: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl EmaState {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            alpha: smoothing(window),
            seed_sum: 0.0,
            count: 0,
            last_value: None,
            last_timestamp: None,
        }
    }

    /// State that is already past warm-up, as if `value` had been computed at `timestamp`.
    pub fn seeded(window: usize, value: f64, timestamp: DateTime<Utc>) -> Self {
        let mut state = Self::new(window);
        state.count = state.window;
        state.last_value = Some(value);
        state.last_timestamp = Some(timestamp);
        state
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Inputs consumed so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    pub fn update(&mut self, timestamp: DateTime<Utc>, input: f64) -> Option<f64> {
        self.last_timestamp = Some(timestamp);
        self.count += 1;
        match self.last_value {
            Some(prev) => {
                let ema = self.alpha * input + (1.0 - self.alpha) * prev;
                self.last_value = Some(ema);
            }
            None => {
                self.seed_sum += input;
                if self.count == self.window {
                    self.last_value = Some(self.seed_sum / self.window as f64);
                }
            }
        }
        self.last_value
    }
}

pub fn smoothing(window: usize) -> f64 {
    2.0 / (window as f64 + 1.0)
}

/// Batch EMA over closes. Returns one entry per bar; `None` during warm-up.
pub fn calculate_ema(bars: &[Bar], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; bars.len()];
    }
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    ema_over(&closes, window)
}

pub(crate) fn ema_over(inputs: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(inputs.len());
    let k = smoothing(window);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &x) in inputs.iter().enumerate() {
        if i < window - 1 {
            sum += x;
            values.push(None);
        } else if i == window - 1 {
            sum += x;
            ema = sum / window as f64;
            values.push(Some(ema));
        } else {
            ema = x * k + ema * (1.0 - k);
            values.push(Some(ema));
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn make_bars(prices: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn ema_warmup() {
        let values = calculate_ema(&make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);
        assert!(values[0].is_none());
        assert!(values[1].is_none());
        assert!(values[2..].iter().all(Option::is_some));
    }

    #[test]
    fn ema_seed_is_sma() {
        let values = calculate_ema(&make_bars(&[10.0, 20.0, 30.0]), 3);
        assert_relative_eq!(values[2].unwrap(), 20.0);
    }

    #[test]
    fn ema_recursive_calculation() {
        let values = calculate_ema(&make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);
        let k = 0.5;
        let ema_3 = 40.0 * k + 20.0 * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert_relative_eq!(values[3].unwrap(), ema_3);
        assert_relative_eq!(values[4].unwrap(), ema_4);
    }

    #[test]
    fn ema_window_1_tracks_close() {
        let values = calculate_ema(&make_bars(&[10.0, 20.0, 30.0]), 1);
        assert_eq!(values, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_window_0_is_never_defined() {
        let values = calculate_ema(&make_bars(&[10.0, 20.0]), 0);
        assert_eq!(values, vec![None, None]);
    }

    #[test]
    fn ema_empty_bars() {
        assert!(calculate_ema(&[], 3).is_empty());
    }

    #[test]
    fn incremental_matches_batch() {
        let bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 14.0, 13.0, 11.0, 9.0, 11.0, 13.0]);
        let batch = calculate_ema(&bars, 5);
        let mut state = EmaState::new(5);
        for (bar, expected) in bars.iter().zip(&batch) {
            let got = state.update(bar.timestamp, bar.close);
            match (got, expected) {
                (Some(a), Some(b)) => assert_relative_eq!(a, *b, epsilon = 1e-12),
                (None, None) => {}
                other => panic!("definedness mismatch: {other:?}"),
            }
        }
        assert_eq!(state.count(), bars.len());
        assert_eq!(state.last_timestamp(), Some(bars[9].timestamp));
    }

    #[test]
    fn seeded_state_continues_recurrence() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut state = EmaState::seeded(3, 100.0, t);
        assert_eq!(state.value(), Some(100.0));
        let next = state.update(t + Duration::days(1), 110.0).unwrap();
        assert_relative_eq!(next, 105.0);
    }

    #[test]
    fn smoothing_factor() {
        assert_relative_eq!(smoothing(10), 2.0 / 11.0);
        assert_relative_eq!(EmaState::new(15).alpha(), 0.125);
    }
}
