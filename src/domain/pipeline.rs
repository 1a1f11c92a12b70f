//! Per-(asset, timeframe) pipeline: series append, indicator update, detection.
//!
//! Stages run strictly in sequence for one pair. A data-integrity failure
//! suspends the pipeline; it stays suspended until explicitly resumed.

use crate::domain::detector::SignalDetector;
use crate::domain::error::TrendError;
use crate::domain::indicator::{IndicatorEngine, IndicatorType};
use crate::domain::notification::Notification;
use crate::domain::ohlcv::{Bar, SeriesKey};
use crate::domain::rule::Rule;
use crate::domain::series::Series;
use crate::domain::signal::{SignalEvent, Trend};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Active,
    Suspended {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl PipelineStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, PipelineStatus::Active)
    }
}

/// What one ingest pass produced.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub appended: usize,
    pub signals: Vec<SignalEvent>,
    /// In emission order: gaps, signals and at most one suspension.
    pub notifications: Vec<Notification>,
    pub error: Option<TrendError>,
}

impl IngestOutcome {
    pub fn failed(error: TrendError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PairPipeline {
    key: SeriesKey,
    engine: IndicatorEngine,
    detector: SignalDetector,
    signals: Vec<SignalEvent>,
    status: PipelineStatus,
}

impl PairPipeline {
    pub fn new(
        key: SeriesKey,
        indicators: &[IndicatorType],
        rules: &[Rule],
        tail_capacity: usize,
    ) -> Self {
        Self {
            engine: IndicatorEngine::new(key.clone(), indicators, tail_capacity),
            detector: SignalDetector::new(key.clone(), rules),
            key,
            signals: Vec::new(),
            status: PipelineStatus::Active,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn trend(&self) -> Trend {
        self.detector.trend()
    }

    /// Live signals whose bars are still retained, oldest first.
    pub fn signals(&self) -> &[SignalEvent] {
        &self.signals
    }

    pub fn last_signal(&self) -> Option<&SignalEvent> {
        self.signals.last()
    }

    pub fn resume(&mut self) {
        if !self.status.is_active() {
            info!(pair = %self.key, "pipeline resumed");
        }
        self.status = PipelineStatus::Active;
    }

    fn suspend(&mut self, err: &TrendError, now: DateTime<Utc>) -> Notification {
        let reason = err.to_string();
        warn!(pair = %self.key, %reason, "pipeline suspended");
        self.status = PipelineStatus::Suspended {
            reason: reason.clone(),
            since: now,
        };
        Notification::PipelineSuspended {
            asset: self.key.asset.clone(),
            timeframe: self.key.timeframe,
            reason,
            at: now,
        }
    }

    fn gap_before(&self, series: &Series, bar: &Bar) -> Option<Notification> {
        let prev = series.last()?;
        let step = self.key.timeframe.duration();
        let elapsed = bar.timestamp - prev.timestamp;
        if elapsed <= step {
            return None;
        }
        let missing_bars = elapsed.num_seconds() / step.num_seconds() - 1;
        if missing_bars < 1 {
            return None;
        }
        warn!(pair = %self.key, from = %prev.timestamp, to = %bar.timestamp, missing_bars, "data gap");
        Some(Notification::DataGap {
            asset: self.key.asset.clone(),
            timeframe: self.key.timeframe,
            from: prev.timestamp,
            to: bar.timestamp,
            missing_bars,
        })
    }

    fn check_bar(&self, bar: &Bar) -> Result<(), TrendError> {
        bar.validate().map_err(|reason| TrendError::InvalidBar {
            asset: self.key.asset.clone(),
            timeframe: self.key.timeframe,
            timestamp: bar.timestamp,
            reason,
        })
    }

    /// Push freshly fetched bars through append, indicators and detection.
    pub fn ingest(&mut self, series: &mut Series, bars: Vec<Bar>, now: DateTime<Utc>) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        if let PipelineStatus::Suspended { reason, .. } = &self.status {
            outcome.error = Some(TrendError::PipelineSuspended {
                asset: self.key.asset.clone(),
                timeframe: self.key.timeframe,
                reason: reason.clone(),
            });
            return outcome;
        }

        for bar in bars {
            let gap = self.gap_before(series, &bar);
            let step = self
                .check_bar(&bar)
                .and_then(|()| series.append(bar))
                .and_then(|()| self.engine.update(&bar))
                .and_then(|()| self.detector.on_bar(&bar, &self.engine));
            match step {
                Ok(signal) => {
                    outcome.appended += 1;
                    outcome.notifications.extend(gap);
                    if let Some(event) = signal {
                        info!(
                            pair = %self.key,
                            kind = %event.kind,
                            price = event.price,
                            rule = %event.rule,
                            "signal"
                        );
                        outcome.notifications.push(Notification::Signal(event.clone()));
                        outcome.signals.push(event);
                    }
                }
                Err(e) => {
                    outcome.notifications.push(self.suspend(&e, now));
                    outcome.error = Some(e);
                    break;
                }
            }
        }

        self.signals.extend(outcome.signals.iter().cloned());
        if let Some(oldest) = series.iter().next().map(|b| b.timestamp) {
            self.signals.retain(|s| s.timestamp >= oldest);
        }
        debug!(pair = %self.key, appended = outcome.appended, retained = series.len(), "ingested");
        outcome
    }
}
