//! Signal detector: one crossing state machine per rule, deduplicated per pair.
//!
//! Each rule reduces to a scalar `diff` per bar (`fast - slow` for CROSS,
//! `v[t] - v[t-1]` for SLOPE). A signal fires only when the sign of `diff`
//! flips between consecutive ticks; a zero or NaN diff leaves the state alone.

use crate::domain::backtest::CancelToken;
use crate::domain::error::TrendError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::ohlcv::{Bar, SeriesKey};
use crate::domain::rule::{Rule, extract_indicators};
use crate::domain::signal::{IndicatorReading, SignalEvent, SignalKind, Trend};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossState {
    AwaitingFirstTick,
    Above,
    Below,
}

impl CrossState {
    /// Transition on one tick. Returns the new state and the signal, if any.
    pub fn advance(self, diff: f64) -> (CrossState, Option<SignalKind>) {
        let side = if diff > 0.0 {
            CrossState::Above
        } else if diff < 0.0 {
            CrossState::Below
        } else {
            return (self, None);
        };
        let fired = match (self, side) {
            (CrossState::Below, CrossState::Above) => Some(SignalKind::Buy),
            (CrossState::Above, CrossState::Below) => Some(SignalKind::Sell),
            _ => None,
        };
        (side, fired)
    }

    pub fn trend(&self) -> Trend {
        match self {
            CrossState::AwaitingFirstTick => Trend::Neutral,
            CrossState::Above => Trend::Bullish,
            CrossState::Below => Trend::Bearish,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleTracker {
    rule: Rule,
    state: CrossState,
    previous: Option<f64>,
}

impl RuleTracker {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            state: CrossState::AwaitingFirstTick,
            previous: None,
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn state(&self) -> CrossState {
        self.state
    }

    fn diff(&mut self, bar: &Bar, engine: &IndicatorEngine) -> Result<Option<f64>, TrendError> {
        match &self.rule {
            Rule::Cross { fast, slow } => {
                let fast = fast.resolve(bar, engine)?;
                let slow = slow.resolve(bar, engine)?;
                Ok(Some(fast - slow))
            }
            Rule::Slope { operand } => {
                let value = operand.resolve(bar, engine)?;
                Ok(self.previous.replace(value).map(|prev| value - prev))
            }
        }
    }

    /// Advance on `bar`; `InsufficientHistory` while any operand is warming up.
    pub fn observe(
        &mut self,
        bar: &Bar,
        engine: &IndicatorEngine,
    ) -> Result<Option<SignalKind>, TrendError> {
        let Some(diff) = self.diff(bar, engine)? else {
            return Ok(None);
        };
        let (next, fired) = self.state.advance(diff);
        self.state = next;
        Ok(fired)
    }
}

/// Detector for one (asset, timeframe). Rules are evaluated in order; the
/// first one that fires a kind different from the last emitted signal wins.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    key: SeriesKey,
    trackers: Vec<RuleTracker>,
    last_emitted: Option<SignalKind>,
}

impl SignalDetector {
    pub fn new(key: SeriesKey, rules: &[Rule]) -> Self {
        Self {
            key,
            trackers: rules.iter().cloned().map(RuleTracker::new).collect(),
            last_emitted: None,
        }
    }

    pub fn last_emitted(&self) -> Option<SignalKind> {
        self.last_emitted
    }

    /// Regime of the first configured rule.
    pub fn trend(&self) -> Trend {
        self.trackers
            .first()
            .map(|t| t.state().trend())
            .unwrap_or(Trend::Neutral)
    }

    pub fn trends(&self) -> Vec<(String, Trend)> {
        self.trackers
            .iter()
            .map(|t| (t.rule().to_string(), t.state().trend()))
            .collect()
    }

    /// Feed one bar that has already been applied to `engine`.
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        engine: &IndicatorEngine,
    ) -> Result<Option<SignalEvent>, TrendError> {
        let mut winner: Option<(usize, SignalKind)> = None;

        for (idx, tracker) in self.trackers.iter_mut().enumerate() {
            match tracker.observe(bar, engine) {
                Ok(Some(kind)) => {
                    if winner.is_none() && self.last_emitted != Some(kind) {
                        winner = Some((idx, kind));
                    }
                }
                Ok(None) => {}
                Err(TrendError::InsufficientHistory { indicator, have, need }) => {
                    debug!(
                        pair = %self.key,
                        rule = %tracker.rule(),
                        %indicator,
                        have,
                        need,
                        "warming up"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let Some((idx, kind)) = winner else {
            return Ok(None);
        };
        self.last_emitted = Some(kind);

        let snapshot = engine
            .readings()
            .into_iter()
            .map(|(indicator, value)| IndicatorReading { indicator, value })
            .collect();

        Ok(Some(SignalEvent {
            timestamp: bar.timestamp,
            asset: self.key.asset.clone(),
            timeframe: self.key.timeframe,
            kind,
            rule: self.trackers[idx].rule().to_string(),
            snapshot,
            price: bar.close,
        }))
    }
}

/// Run a fresh engine and detector over `bars` from scratch.
pub fn replay_signals(
    key: &SeriesKey,
    bars: &[Bar],
    rules: &[Rule],
) -> Result<Vec<SignalEvent>, TrendError> {
    replay_signals_until(key, bars, rules, &CancelToken::new())
}

/// [`replay_signals`] that checks `cancel` before every bar.
pub fn replay_signals_until(
    key: &SeriesKey,
    bars: &[Bar],
    rules: &[Rule],
    cancel: &CancelToken,
) -> Result<Vec<SignalEvent>, TrendError> {
    let types = extract_indicators(rules);
    let mut engine = IndicatorEngine::new(key.clone(), &types, 1);
    let mut detector = SignalDetector::new(key.clone(), rules);
    let mut signals = Vec::new();
    for (processed, bar) in bars.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TrendError::BacktestAborted {
                asset: key.asset.clone(),
                timeframe: key.timeframe,
                processed,
            });
        }
        engine.update(bar)?;
        if let Some(event) = detector.on_bar(bar, &engine)? {
            signals.push(event);
        }
    }
    Ok(signals)
}
