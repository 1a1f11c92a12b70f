//! Pipeline orchestrator.
//!
//! Owns the universe, the series store and one [`PairPipeline`] per
//! (asset, timeframe). A refresh cycle resolves pairs, fetches new bars for
//! every active pipeline on a bounded worker pool, then fans notifications
//! out to the registered sinks in a fixed order. Signals for muted assets are
//! recorded but not delivered.

use crate::domain::backtest::{BacktestResult, CancelToken, DateRange, evaluate};
use crate::domain::config::PipelineConfig;
use crate::domain::detector::replay_signals_until;
use crate::domain::error::TrendError;
use crate::domain::indicator::{IndicatorPoint, IndicatorType};
use crate::domain::notification::{DeliveryLog, Notification, StatusSummary};
use crate::domain::ohlcv::{Bar, SeriesKey, Timeframe};
use crate::domain::pipeline::{IngestOutcome, PairPipeline, PipelineStatus};
use crate::domain::series::{Series, SeriesStore};
use crate::domain::signal::{SignalEvent, SignalKind, Trend};
use crate::domain::universe::{PairOutcome, Resolution, TradingPair, Universe};
use crate::ports::data_port::MarketDataPort;
use crate::ports::notification_port::NotificationPort;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Indicator points kept per indicator for the dashboard.
const INDICATOR_TAIL: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub asset: String,
    pub timeframe: Timeframe,
    pub reason: String,
}

/// Everything one refresh cycle did.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub cycle: u64,
    pub pairs: Vec<PairOutcome>,
    pub bars_appended: usize,
    pub signals: Vec<SignalEvent>,
    /// Notifications handed to sinks this cycle (repeats already filtered).
    pub delivered: Vec<Notification>,
    pub failures: Vec<PairFailure>,
}

impl RefreshReport {
    pub fn unresolved(&self) -> impl Iterator<Item = TrendError> + '_ {
        self.pairs.iter().filter_map(PairOutcome::to_error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorTail {
    pub indicator: IndicatorType,
    pub points: Vec<IndicatorPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairSnapshot {
    pub asset: String,
    pub timeframe: Timeframe,
    pub symbol: Option<String>,
    pub status: PipelineStatus,
    pub last_close: Option<f64>,
    pub last_bar_at: Option<DateTime<Utc>>,
    pub trend: Trend,
    pub notifications: bool,
    pub last_signal: Option<SignalEvent>,
    pub signals: Vec<SignalEvent>,
    pub indicators: Vec<IndicatorTail>,
}

/// Read-only view for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub cycle: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub summary: StatusSummary,
    pub pairs: Vec<PairSnapshot>,
}

pub struct Orchestrator {
    config: PipelineConfig,
    market: Box<dyn MarketDataPort>,
    sinks: Vec<Box<dyn NotificationPort>>,
    universe: Universe,
    store: SeriesStore,
    pipelines: BTreeMap<SeriesKey, PairPipeline>,
    delivery: DeliveryLog,
    muted: BTreeSet<String>,
    pool: rayon::ThreadPool,
    last_refresh: Option<DateTime<Utc>>,
    last_status_report: Option<DateTime<Utc>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, market: Box<dyn MarketDataPort>) -> Result<Self, TrendError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency.max(1))
            .thread_name(|i| format!("trendlevels-worker-{}", i))
            .build()
            .map_err(|e| TrendError::Io(std::io::Error::other(e)))?;
        let universe = Universe::new(config.assets.clone(), config.quotes.clone());
        let store = SeriesStore::new(config.retention());
        let muted = config.muted.iter().cloned().collect();
        Ok(Self {
            config,
            market,
            sinks: Vec::new(),
            universe,
            store,
            pipelines: BTreeMap::new(),
            delivery: DeliveryLog::new(),
            muted,
            pool,
            last_refresh: None,
            last_status_report: None,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationPort>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn pipeline(&self, asset: &str, timeframe: Timeframe) -> Option<&PairPipeline> {
        self.pipelines.get(&SeriesKey::new(asset, timeframe))
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    /// Whether the refresh interval has elapsed since the last cycle.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_refresh
            .is_none_or(|last| now - last >= self.config.refresh_interval())
    }

    /// Clear a suspension. Returns false for unknown pairs.
    pub fn resume(&mut self, asset: &str, timeframe: Timeframe) -> bool {
        match self.pipelines.get_mut(&SeriesKey::new(asset, timeframe)) {
            Some(pipeline) => {
                pipeline.resume();
                true
            }
            None => false,
        }
    }

    pub fn notifications_enabled(&self, asset: &str) -> bool {
        !self.muted.contains(asset)
    }

    /// Switch signal notifications for a configured asset on or off.
    /// Returns false for assets outside the universe.
    pub fn set_notifications(&mut self, asset: &str, enabled: bool) -> bool {
        if !self.universe.assets().iter().any(|a| a == asset) {
            return false;
        }
        if enabled {
            self.muted.remove(asset);
        } else {
            self.muted.insert(asset.to_string());
        }
        info!(asset, enabled, "signal notifications toggled");
        true
    }

    fn ensure_pipelines(&mut self, asset: &str) {
        let indicators = self.config.indicator_types();
        for &timeframe in &self.config.timeframes {
            let key = SeriesKey::new(asset, timeframe);
            self.store.register(key.clone());
            self.pipelines.entry(key.clone()).or_insert_with(|| {
                debug!(pair = %key, "pipeline created");
                PairPipeline::new(key, &indicators, &self.config.rules, INDICATOR_TAIL)
            });
        }
    }

    fn pair_notifications(&self, outcomes: &[PairOutcome]) -> Vec<Notification> {
        let cycle = self.universe.cycle();
        let policy = self.universe.policy();
        outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                PairOutcome::Resolved {
                    pair,
                    resolution: Resolution::Fallback,
                } => Some(Notification::QuoteFallback {
                    asset: pair.base.clone(),
                    primary: policy.primary.clone(),
                    fallback: policy.fallback.clone(),
                    cycle,
                }),
                PairOutcome::Unresolved {
                    asset,
                    primary,
                    fallback,
                } => Some(Notification::UnresolvedPair {
                    asset: asset.clone(),
                    primary: primary.clone(),
                    fallback: fallback.clone(),
                    cycle,
                }),
                _ => None,
            })
            .collect()
    }

    /// Run one refresh cycle at `now`.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> RefreshReport {
        let outcomes = self.universe.refresh(self.market.as_ref(), now);
        let mut report = RefreshReport {
            cycle: self.universe.cycle(),
            ..RefreshReport::default()
        };
        info!(cycle = report.cycle, assets = self.universe.count(), "refresh cycle started");

        let mut notifications = self.pair_notifications(&outcomes);
        let resolved: Vec<String> = outcomes
            .iter()
            .filter_map(|o| o.pair().map(|p| p.base.clone()))
            .collect();
        for asset in &resolved {
            self.ensure_pipelines(asset);
        }

        let mut shards: BTreeMap<&SeriesKey, &mut Series> = self.store.shards_mut().collect();
        let mut tasks: Vec<(&mut Series, &mut PairPipeline, TradingPair)> = Vec::new();
        for (key, pipeline) in self.pipelines.iter_mut() {
            let Some(pair) = self.universe.pair(&key.asset) else {
                continue;
            };
            if !pipeline.status().is_active() {
                debug!(pair = %key, "skipping suspended pipeline");
                continue;
            }
            let Some(series) = shards.remove(key) else {
                warn!(pair = %key, "pipeline has no series");
                continue;
            };
            tasks.push((series, pipeline, pair.clone()));
        }

        let cycle = report.cycle;
        let market = self.market.as_ref();
        let results: Vec<(SeriesKey, IngestOutcome)> = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(series, pipeline, pair)| {
                    let key = pipeline.key().clone();
                    let since = series.last().map(|b| b.timestamp);
                    let outcome = match market.fetch_bars(&pair, key.timeframe, since) {
                        Ok(bars) => pipeline.ingest(series, bars, now),
                        Err(e) => {
                            warn!(pair = %key, symbol = %pair.symbol(), error = %e, "fetch failed");
                            let reason = e.to_string();
                            let mut outcome = IngestOutcome::failed(e);
                            outcome.notifications.push(Notification::FetchFailed {
                                asset: key.asset.clone(),
                                timeframe: key.timeframe,
                                reason,
                                cycle,
                            });
                            outcome
                        }
                    };
                    (key, outcome)
                })
                .collect()
        });

        for (key, outcome) in results {
            report.bars_appended += outcome.appended;
            report.signals.extend(outcome.signals);
            notifications.extend(outcome.notifications);
            if let Some(e) = outcome.error {
                report.failures.push(PairFailure {
                    asset: key.asset,
                    timeframe: key.timeframe,
                    reason: e.to_string(),
                });
            }
        }

        if let Some(interval) = self.config.status_report_interval() {
            if self.last_status_report.is_none_or(|last| now - last >= interval) {
                notifications.push(Notification::StatusReport(self.status_summary(now)));
                self.last_status_report = Some(now);
            }
        }

        report.delivered = self.dispatch(notifications);
        self.delivery.prune(report.cycle, self.oldest_retained_bar());
        report.pairs = outcomes;
        self.last_refresh = Some(now);
        info!(
            cycle = report.cycle,
            bars = report.bars_appended,
            signals = report.signals.len(),
            failures = report.failures.len(),
            "refresh cycle finished"
        );
        report
    }

    /// Hand each first-seen notification to every sink.
    fn dispatch(&mut self, notifications: Vec<Notification>) -> Vec<Notification> {
        let mut delivered = Vec::new();
        for notification in notifications {
            if !self.delivery.first_delivery(&notification) {
                debug!(%notification, "already delivered");
                continue;
            }
            if let Notification::Signal(event) = &notification {
                if !self.notifications_enabled(&event.asset) {
                    debug!(%notification, "asset muted");
                    continue;
                }
            }
            for sink in &self.sinks {
                if let Err(e) = sink.deliver(&notification) {
                    warn!(error = %e, %notification, "sink rejected notification");
                }
            }
            delivered.push(notification);
        }
        delivered
    }

    fn oldest_retained_bar(&self) -> Option<DateTime<Utc>> {
        self.store
            .keys()
            .filter_map(|key| self.store.get(key))
            .filter_map(|series| series.iter().next())
            .map(|bar| bar.timestamp)
            .min()
    }

    /// Signal and trend counts over every resolved pair.
    pub fn status_summary(&self, at: DateTime<Utc>) -> StatusSummary {
        let mut summary = StatusSummary {
            at,
            cycle: self.universe.cycle(),
            bullish_signals: 0,
            bearish_signals: 0,
            total_signals: 0,
            bullish_pairs: 0,
            bearish_pairs: 0,
            neutral_pairs: 0,
            monitored: self
                .universe
                .assets()
                .iter()
                .filter_map(|a| self.universe.pair(a))
                .map(TradingPair::to_string)
                .collect(),
        };
        let live = self
            .pipelines
            .values()
            .filter(|p| self.universe.pair(&p.key().asset).is_some());
        for pipeline in live {
            for signal in pipeline.signals() {
                match signal.kind {
                    SignalKind::Buy => summary.bullish_signals += 1,
                    SignalKind::Sell => summary.bearish_signals += 1,
                }
            }
            match pipeline.trend() {
                Trend::Bullish => summary.bullish_pairs += 1,
                Trend::Bearish => summary.bearish_pairs += 1,
                Trend::Neutral => summary.neutral_pairs += 1,
            }
        }
        summary.total_signals = summary.bullish_signals + summary.bearish_signals;
        summary
    }

    /// Indicator tails of at most `tail` points, live signals and status per pair.
    pub fn snapshot(&self, tail: usize) -> DashboardSnapshot {
        let pairs = self
            .pipelines
            .iter()
            .map(|(key, pipeline)| {
                let last_bar = self.store.get(key).and_then(Series::last);
                let indicators = pipeline
                    .engine()
                    .types()
                    .filter_map(|t| {
                        pipeline.engine().series(t).map(|s| IndicatorTail {
                            indicator: t,
                            points: s.tail(tail),
                        })
                    })
                    .collect();
                PairSnapshot {
                    asset: key.asset.clone(),
                    timeframe: key.timeframe,
                    symbol: self.universe.pair(&key.asset).map(TradingPair::symbol),
                    status: pipeline.status().clone(),
                    last_close: last_bar.map(|b| b.close),
                    last_bar_at: last_bar.map(|b| b.timestamp),
                    trend: pipeline.trend(),
                    notifications: self.notifications_enabled(&key.asset),
                    last_signal: pipeline.last_signal().cloned(),
                    signals: pipeline.signals().to_vec(),
                    indicators,
                }
            })
            .collect();
        DashboardSnapshot {
            cycle: self.universe.cycle(),
            last_refresh: self.last_refresh,
            summary: self.status_summary(self.last_refresh.unwrap_or(DateTime::UNIX_EPOCH)),
            pairs,
        }
    }

    fn backtest_bars(&self, key: &SeriesKey) -> Result<Vec<Bar>, TrendError> {
        match self.store.get(key) {
            Some(series) if !series.is_empty() => Ok(series.iter().copied().collect()),
            _ => Err(TrendError::NoData {
                asset: key.asset.clone(),
                timeframe: key.timeframe,
            }),
        }
    }

    /// Replay the configured rules over the retained bars and evaluate them.
    pub fn backtest(
        &self,
        asset: &str,
        timeframe: Timeframe,
        range: DateRange,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, TrendError> {
        let key = SeriesKey::new(asset, timeframe);
        let bars = self.backtest_bars(&key)?;
        let signals = replay_signals_until(&key, &bars, &self.config.rules, cancel)?;
        let result = evaluate(&key, &bars, &signals, range, cancel)?;
        info!(
            pair = %key,
            bars = result.bars_evaluated,
            trades = result.summary.trade_count,
            open = result.summary.open_position,
            "backtest finished"
        );
        Ok(result)
    }

    /// Backtest every pair with data on the worker pool, in key order.
    pub fn backtest_all(
        &self,
        range: DateRange,
        cancel: &CancelToken,
    ) -> Vec<(SeriesKey, Result<BacktestResult, TrendError>)> {
        let keys: Vec<&SeriesKey> = self.store.keys().collect();
        self.pool.install(|| {
            keys.into_par_iter()
                .map(|key| {
                    let result = self.backtest(&key.asset, key.timeframe, range, cancel);
                    (key.clone(), result)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::SignalKind;
    use crate::domain::universe::QuotePolicy;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct StaticMarket {
        bars: HashMap<String, Vec<Bar>>,
    }

    impl StaticMarket {
        fn with(mut self, symbol: &str, closes: &[f64]) -> Self {
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let bars = closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                })
                .collect();
            self.bars.insert(symbol.to_string(), bars);
            self
        }
    }

    impl MarketDataPort for StaticMarket {
        fn has_market(&self, base: &str, quote: &str) -> bool {
            self.bars.contains_key(&format!("{}{}", base, quote))
        }

        fn fetch_bars(
            &self,
            pair: &TradingPair,
            _timeframe: Timeframe,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Bar>, TrendError> {
            Ok(self
                .bars
                .get(&pair.symbol())
                .map(|bars| {
                    bars.iter()
                        .filter(|b| since.is_none_or(|s| b.timestamp > s))
                        .copied()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<Notification>>>);

    impl NotificationPort for Collect {
        fn deliver(&self, notification: &Notification) -> Result<(), TrendError> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn config(assets: &[&str]) -> PipelineConfig {
        PipelineConfig {
            assets: assets.iter().map(|a| a.to_string()).collect(),
            timeframes: vec![Timeframe::D1],
            rules: crate::domain::rule_parser::parse_rules("SLOPE(close)").unwrap(),
            backtest_lookback_bars: 50,
            quotes: QuotePolicy::default(),
            ..PipelineConfig::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn refresh_ingests_and_notifies() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0]);
        let sink = Collect::default();
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market))
            .unwrap()
            .with_sink(Box::new(sink.clone()));

        let report = orch.refresh(now());
        assert_eq!(report.cycle, 1);
        assert_eq!(report.bars_appended, 4);
        assert_eq!(
            report.signals.iter().map(|s| s.kind).collect::<Vec<_>>(),
            vec![SignalKind::Sell, SignalKind::Buy]
        );
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn each_pipeline_feeds_its_own_series() {
        let market = StaticMarket::default()
            .with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0])
            .with("ETHUSDT", &[5.0, 6.0]);
        let cfg = PipelineConfig {
            timeframes: vec![Timeframe::H12, Timeframe::D1],
            ..config(&["BTC", "ETH"])
        };
        let mut orch = Orchestrator::new(cfg, Box::new(market)).unwrap();
        let report = orch.refresh(now());

        assert_eq!(report.bars_appended, 12);
        for (asset, len, last) in [("BTC", 4, 2.0), ("ETH", 2, 6.0)] {
            for tf in [Timeframe::H12, Timeframe::D1] {
                let key = SeriesKey::new(asset, tf);
                let series = orch.store().get(&key).unwrap();
                assert_eq!(series.len(), len);
                assert_eq!(series.last().unwrap().close, last);
                let engine = orch.pipeline(asset, tf).unwrap().engine();
                assert_eq!(engine.key(), &key);
                assert_eq!(engine.bars_seen(), len);
            }
        }
    }

    #[test]
    fn second_refresh_fetches_only_new_bars() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0]);
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market)).unwrap();
        orch.refresh(now());
        let report = orch.refresh(now() + Duration::hours(12));
        assert_eq!(report.bars_appended, 0);
        assert!(report.delivered.is_empty());
        assert_eq!(orch.store().get(&SeriesKey::new("BTC", Timeframe::D1)).unwrap().len(), 3);
    }

    #[test]
    fn fallback_and_unresolved_become_notifications() {
        let market = StaticMarket::default().with("FOOUSDC", &[1.0, 2.0]);
        let mut orch = Orchestrator::new(config(&["FOO", "BAR"]), Box::new(market)).unwrap();
        let report = orch.refresh(now());

        assert_eq!(orch.universe().pair("FOO").unwrap().to_string(), "FOO/USDC");
        assert!(report.delivered.iter().any(|n| matches!(n, Notification::QuoteFallback { asset, .. } if asset == "FOO")));
        assert!(report.delivered.iter().any(|n| matches!(n, Notification::UnresolvedPair { asset, .. } if asset == "BAR")));
        assert_eq!(report.unresolved().count(), 1);
        assert!(orch.pipeline("BAR", Timeframe::D1).is_none());
    }

    #[test]
    fn snapshot_lists_pairs() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0]);
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market)).unwrap();
        orch.refresh(now());
        let snap = orch.snapshot(2);
        assert_eq!(snap.pairs.len(), 1);
        let pair = &snap.pairs[0];
        assert_eq!(pair.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(pair.last_close, Some(2.0));
        assert_eq!(pair.trend, Trend::Bullish);
        assert_eq!(pair.last_signal.as_ref().unwrap().kind, SignalKind::Buy);
        assert!(pair.indicators.iter().all(|t| t.points.len() <= 2));
    }

    #[test]
    fn backtest_unknown_pair_is_no_data() {
        let orch = Orchestrator::new(config(&["BTC"]), Box::new(StaticMarket::default())).unwrap();
        let err = orch
            .backtest("BTC", Timeframe::D1, DateRange::all(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TrendError::NoData { .. }));
    }

    #[test]
    fn backtest_replays_rules() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0, 3.0, 2.5]);
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market)).unwrap();
        orch.refresh(now());
        let result = orch
            .backtest("BTC", Timeframe::D1, DateRange::all(), &CancelToken::new())
            .unwrap();
        // SELL@2 is ignored, BUY@3 closes at SELL@5
        assert_eq!(result.trades.len(), 1);
        assert!((result.trades[0].trade_return - 0.25).abs() < 1e-12);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn muted_asset_signals_are_recorded_not_delivered() {
        let market = StaticMarket::default()
            .with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0])
            .with("ETHUSDT", &[1.0, 2.0, 1.0]);
        let sink = Collect::default();
        let cfg = PipelineConfig {
            muted: vec!["ETH".to_string()],
            ..config(&["BTC", "ETH"])
        };
        let mut orch = Orchestrator::new(cfg, Box::new(market))
            .unwrap()
            .with_sink(Box::new(sink.clone()));

        let report = orch.refresh(now());
        assert_eq!(report.signals.iter().filter(|s| s.asset == "ETH").count(), 1);
        let delivered = sink.0.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|n| n.asset() == Some("BTC")));
        assert!(!orch.snapshot(1).pairs.iter().find(|p| p.asset == "ETH").unwrap().notifications);
    }

    #[test]
    fn set_notifications_toggles_known_assets_only() {
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(StaticMarket::default())).unwrap();
        assert!(orch.notifications_enabled("BTC"));
        assert!(orch.set_notifications("BTC", false));
        assert!(!orch.notifications_enabled("BTC"));
        assert!(orch.set_notifications("BTC", true));
        assert!(orch.notifications_enabled("BTC"));
        assert!(!orch.set_notifications("DOGE", false));
    }

    #[test]
    fn status_report_follows_its_interval() {
        let market = StaticMarket::default()
            .with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0])
            .with("FOOUSDC", &[3.0, 2.0, 1.0]);
        let cfg = PipelineConfig {
            status_report_hours: 24,
            ..config(&["BTC", "FOO"])
        };
        let mut orch = Orchestrator::new(cfg, Box::new(market)).unwrap();

        let first = orch.refresh(now());
        let reports: Vec<&StatusSummary> = first
            .delivered
            .iter()
            .filter_map(|n| match n {
                Notification::StatusReport(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        let summary = reports[0];
        assert_eq!(summary.cycle, 1);
        assert_eq!(summary.monitored, vec!["BTC/USDT", "FOO/USDC"]);
        assert_eq!((summary.bullish_signals, summary.bearish_signals), (1, 1));
        assert_eq!(summary.total_signals, 2);
        assert_eq!((summary.bullish_pairs, summary.bearish_pairs, summary.neutral_pairs), (1, 1, 0));

        let half_day = orch.refresh(now() + Duration::hours(12));
        assert!(!half_day.delivered.iter().any(|n| matches!(n, Notification::StatusReport(_))));
        let next_day = orch.refresh(now() + Duration::hours(24));
        assert!(next_day.delivered.iter().any(|n| matches!(n, Notification::StatusReport(s) if s.cycle == 3)));
    }

    #[test]
    fn snapshot_carries_summary() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0]);
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market)).unwrap();
        orch.refresh(now());
        let snap = orch.snapshot(1);
        assert_eq!(snap.summary.at, now());
        assert_eq!(snap.summary.total_signals, 2);
        assert_eq!(snap.summary.bullish_pairs, 1);
    }

    #[test]
    fn cancelled_backtest_stops_during_replay() {
        let market = StaticMarket::default().with("BTCUSDT", &[1.0, 2.0, 1.0, 2.0]);
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(market)).unwrap();
        orch.refresh(now());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = orch
            .backtest("BTC", Timeframe::D1, DateRange::all(), &cancel)
            .unwrap_err();
        assert!(matches!(err, TrendError::BacktestAborted { processed: 0, .. }));
        assert!(orch.backtest("BTC", Timeframe::D1, DateRange::all(), &CancelToken::new()).is_ok());
    }

    #[test]
    fn is_due_follows_interval() {
        let mut orch = Orchestrator::new(config(&["BTC"]), Box::new(StaticMarket::default())).unwrap();
        assert!(orch.is_due(now()));
        orch.refresh(now());
        assert!(!orch.is_due(now() + Duration::hours(11)));
        assert!(orch.is_due(now() + Duration::hours(12)));
    }
}
