//! Backtest evaluator.
//!
//! Replays a signal stream against its bar series: enter at each BUY, exit at
//! the next SELL, both at the signal price. The result is only returned once
//! every bar has been stepped, so a cancelled run publishes nothing.

use crate::domain::error::TrendError;
use crate::domain::metrics::BacktestSummary;
use crate::domain::ohlcv::{Bar, SeriesKey, Timeframe};
use crate::domain::signal::{SignalEvent, SignalKind};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Cooperative cancellation flag shared between a caller and running backtests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inclusive timestamp range. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| ts >= f) && self.to.is_none_or(|t| ts <= t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub entry: SignalEvent,
    pub exit: SignalEvent,
    /// (exit - entry) / entry
    pub trade_return: f64,
}

impl ClosedTrade {
    pub fn new(entry: SignalEvent, exit: SignalEvent) -> Self {
        let trade_return = (exit.price - entry.price) / entry.price;
        Self {
            entry,
            exit,
            trade_return,
        }
    }

    pub fn holding(&self) -> Duration {
        self.exit.timestamp - self.entry.timestamp
    }
}

/// A BUY with no later SELL, marked to the last close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub entry: SignalEvent,
    pub mark_price: f64,
    pub marked_at: DateTime<Utc>,
    pub unrealized_return: f64,
}

impl OpenPosition {
    pub fn mark(entry: SignalEvent, mark_price: f64, marked_at: DateTime<Utc>) -> Self {
        let unrealized_return = (mark_price - entry.price) / entry.price;
        Self {
            entry,
            mark_price,
            marked_at,
            unrealized_return,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub asset: String,
    pub timeframe: Timeframe,
    pub range: DateRange,
    pub bars_evaluated: usize,
    pub trades: Vec<ClosedTrade>,
    pub open_position: Option<OpenPosition>,
    pub summary: BacktestSummary,
}

/// Signals for `key` inside `[first, last]`, time-ordered, with consecutive
/// same-kind signals collapsed to the first.
fn prepare_signals(
    key: &SeriesKey,
    signals: &[SignalEvent],
    first: DateTime<Utc>,
    last: DateTime<Utc>,
) -> Vec<SignalEvent> {
    let mut relevant: Vec<&SignalEvent> = signals
        .iter()
        .filter(|s| s.asset == key.asset && s.timeframe == key.timeframe)
        .filter(|s| s.timestamp >= first && s.timestamp <= last)
        .collect();
    relevant.sort_by_key(|s| s.timestamp);

    let mut collapsed: Vec<SignalEvent> = Vec::with_capacity(relevant.len());
    for s in relevant {
        if collapsed.last().is_some_and(|prev| prev.kind == s.kind) {
            continue;
        }
        collapsed.push(s.clone());
    }
    collapsed
}

/// Evaluate `signals` over the bars of `key` that fall inside `range`.
pub fn evaluate(
    key: &SeriesKey,
    bars: &[Bar],
    signals: &[SignalEvent],
    range: DateRange,
    cancel: &CancelToken,
) -> Result<BacktestResult, TrendError> {
    let window: Vec<&Bar> = bars.iter().filter(|b| range.contains(b.timestamp)).collect();
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return Err(TrendError::NoData {
            asset: key.asset.clone(),
            timeframe: key.timeframe,
        });
    };
    let (first_ts, last_bar) = (first.timestamp, **last);

    let pending = prepare_signals(key, signals, first_ts, last_bar.timestamp);
    let mut next = pending.iter().peekable();
    let mut trades = Vec::new();
    let mut position: Option<SignalEvent> = None;

    for (processed, bar) in window.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TrendError::BacktestAborted {
                asset: key.asset.clone(),
                timeframe: key.timeframe,
                processed,
            });
        }
        while let Some(signal) = next.next_if(|s| s.timestamp <= bar.timestamp) {
            match (signal.kind, position.take()) {
                (SignalKind::Buy, None) => position = Some(signal.clone()),
                (SignalKind::Sell, Some(entry)) => {
                    trades.push(ClosedTrade::new(entry, signal.clone()));
                }
                (SignalKind::Sell, None) => {
                    debug!(pair = %key, at = %signal.timestamp, "ignoring SELL with no open position");
                }
                (SignalKind::Buy, Some(entry)) => position = Some(entry),
            }
        }
    }

    let open_position =
        position.map(|entry| OpenPosition::mark(entry, last_bar.close, last_bar.timestamp));
    let summary = BacktestSummary::compute(&trades, open_position.as_ref());

    Ok(BacktestResult {
        asset: key.asset.clone(),
        timeframe: key.timeframe,
        range,
        bars_evaluated: window.len(),
        trades,
        open_position,
        summary,
    })
}
