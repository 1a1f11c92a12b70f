//! Outbound notification events and at-most-once delivery bookkeeping.

use crate::domain::ohlcv::Timeframe;
use crate::domain::signal::{SignalEvent, SignalKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Signal(SignalEvent),
    UnresolvedPair {
        asset: String,
        primary: String,
        fallback: String,
        cycle: u64,
    },
    /// Informational: the asset trades against the fallback quote.
    QuoteFallback {
        asset: String,
        primary: String,
        fallback: String,
        cycle: u64,
    },
    DataGap {
        asset: String,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        missing_bars: i64,
    },
    PipelineSuspended {
        asset: String,
        timeframe: Timeframe,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The market-data port failed for this pair; retried next cycle.
    FetchFailed {
        asset: String,
        timeframe: Timeframe,
        reason: String,
        cycle: u64,
    },
    StatusReport(StatusSummary),
}

/// Periodic overview of what is monitored and what the live signals say.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub at: DateTime<Utc>,
    pub cycle: u64,
    pub bullish_signals: usize,
    pub bearish_signals: usize,
    pub total_signals: usize,
    pub bullish_pairs: usize,
    pub bearish_pairs: usize,
    pub neutral_pairs: usize,
    /// Resolved pairs, e.g. `BTC/USDT`.
    pub monitored: Vec<String>,
}

/// Identity of the underlying event a notification reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryKey {
    Signal {
        asset: String,
        timeframe: Timeframe,
        kind: SignalKind,
        timestamp: DateTime<Utc>,
    },
    UnresolvedPair { asset: String, cycle: u64 },
    QuoteFallback { asset: String, cycle: u64 },
    DataGap {
        asset: String,
        timeframe: Timeframe,
        to: DateTime<Utc>,
    },
    PipelineSuspended {
        asset: String,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    },
    FetchFailed {
        asset: String,
        timeframe: Timeframe,
        cycle: u64,
    },
    StatusReport { cycle: u64 },
}

impl DeliveryKey {
    /// Refresh cycle the key belongs to, for cycle-scoped events.
    fn cycle(&self) -> Option<u64> {
        match self {
            DeliveryKey::UnresolvedPair { cycle, .. }
            | DeliveryKey::QuoteFallback { cycle, .. }
            | DeliveryKey::FetchFailed { cycle, .. }
            | DeliveryKey::StatusReport { cycle } => Some(*cycle),
            _ => None,
        }
    }

    /// Bar or wall-clock time the key belongs to, for time-scoped events.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            DeliveryKey::Signal { timestamp, .. } => Some(*timestamp),
            DeliveryKey::DataGap { to, .. } => Some(*to),
            DeliveryKey::PipelineSuspended { at, .. } => Some(*at),
            _ => None,
        }
    }
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Notification::Signal(_)
            | Notification::QuoteFallback { .. }
            | Notification::StatusReport(_) => Severity::Info,
            Notification::DataGap { .. } => Severity::Warning,
            Notification::UnresolvedPair { .. }
            | Notification::PipelineSuspended { .. }
            | Notification::FetchFailed { .. } => Severity::Error,
        }
    }

    pub fn delivery_key(&self) -> DeliveryKey {
        match self {
            Notification::Signal(e) => DeliveryKey::Signal {
                asset: e.asset.clone(),
                timeframe: e.timeframe,
                kind: e.kind,
                timestamp: e.timestamp,
            },
            Notification::UnresolvedPair { asset, cycle, .. } => DeliveryKey::UnresolvedPair {
                asset: asset.clone(),
                cycle: *cycle,
            },
            Notification::QuoteFallback { asset, cycle, .. } => DeliveryKey::QuoteFallback {
                asset: asset.clone(),
                cycle: *cycle,
            },
            Notification::DataGap {
                asset,
                timeframe,
                to,
                ..
            } => DeliveryKey::DataGap {
                asset: asset.clone(),
                timeframe: *timeframe,
                to: *to,
            },
            Notification::PipelineSuspended {
                asset,
                timeframe,
                at,
                ..
            } => DeliveryKey::PipelineSuspended {
                asset: asset.clone(),
                timeframe: *timeframe,
                at: *at,
            },
            Notification::FetchFailed {
                asset,
                timeframe,
                cycle,
                ..
            } => DeliveryKey::FetchFailed {
                asset: asset.clone(),
                timeframe: *timeframe,
                cycle: *cycle,
            },
            Notification::StatusReport(summary) => DeliveryKey::StatusReport {
                cycle: summary.cycle,
            },
        }
    }

    /// Asset the notification is about, if it concerns a single one.
    pub fn asset(&self) -> Option<&str> {
        match self {
            Notification::Signal(e) => Some(&e.asset),
            Notification::UnresolvedPair { asset, .. }
            | Notification::QuoteFallback { asset, .. }
            | Notification::DataGap { asset, .. }
            | Notification::PipelineSuspended { asset, .. }
            | Notification::FetchFailed { asset, .. } => Some(asset),
            Notification::StatusReport(_) => None,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Signal(e) => write!(f, "signal: {}", e),
            Notification::UnresolvedPair {
                asset,
                primary,
                fallback,
                ..
            } => write!(f, "unresolved pair: {} has no {} or {} market", asset, primary, fallback),
            Notification::QuoteFallback {
                asset,
                primary,
                fallback,
                ..
            } => write!(f, "quote fallback: {} trades as {}/{} ({} unavailable)", asset, asset, fallback, primary),
            Notification::DataGap {
                asset,
                timeframe,
                from,
                to,
                missing_bars,
            } => write!(
                f,
                "data gap: {} {} missing {} bar(s) between {} and {}",
                asset,
                timeframe,
                missing_bars,
                from.format("%Y-%m-%d %H:%M"),
                to.format("%Y-%m-%d %H:%M")
            ),
            Notification::PipelineSuspended {
                asset,
                timeframe,
                reason,
                ..
            } => write!(f, "pipeline suspended: {} {}: {}", asset, timeframe, reason),
            Notification::FetchFailed {
                asset,
                timeframe,
                reason,
                ..
            } => write!(f, "fetch failed: {} {}: {}", asset, timeframe, reason),
            Notification::StatusReport(s) => write!(
                f,
                "status: {} bullish / {} bearish of {} signals, {} pairs monitored ({} bullish, {} bearish, {} neutral)",
                s.bullish_signals,
                s.bearish_signals,
                s.total_signals,
                s.monitored.len(),
                s.bullish_pairs,
                s.bearish_pairs,
                s.neutral_pairs
            ),
        }
    }
}

/// Remembers which underlying events have been handed to a sink.
#[derive(Debug, Default)]
pub struct DeliveryLog {
    delivered: HashSet<DeliveryKey>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an event is seen; false for every repeat.
    pub fn first_delivery(&mut self, notification: &Notification) -> bool {
        self.delivered.insert(notification.delivery_key())
    }

    /// Forget keys that can no longer recur: cycle-scoped keys from cycles
    /// before `cycle`, and time-scoped keys older than `horizon`.
    pub fn prune(&mut self, cycle: u64, horizon: Option<DateTime<Utc>>) {
        let before = self.delivered.len();
        self.delivered.retain(|key| {
            if let Some(c) = key.cycle() {
                return c >= cycle;
            }
            match (key.timestamp(), horizon) {
                (Some(t), Some(h)) => t >= h,
                _ => true,
            }
        });
        let pruned = before - self.delivered.len();
        if pruned > 0 {
            debug!(pruned, kept = self.delivered.len(), "delivery log pruned");
        }
    }

    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}
