//! Pipeline configuration object.
//!
//! Built once from a [`ConfigPort`] and passed explicitly into the
//! orchestrator. Nothing in the pipeline reads configuration ambiently.

use crate::domain::config_validation::{
    check_lookback, read_assets, read_at_least, read_display_decimals, read_hours, read_muted,
    read_quotes, read_rules, read_timeframes,
};
use crate::domain::error::TrendError;
use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::Timeframe;
use crate::domain::rule::{Operand, Rule, extract_indicators};
use crate::domain::series::Retention;
use crate::domain::universe::QuotePolicy;
use crate::ports::config_port::ConfigPort;
use chrono::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub assets: Vec<String>,
    pub quotes: QuotePolicy,
    pub timeframes: Vec<Timeframe>,
    pub ema_window: usize,
    pub zlma_window: usize,
    /// Evaluation order is tie-break order.
    pub rules: Vec<Rule>,
    pub refresh_interval_hours: u32,
    pub max_concurrency: usize,
    pub backtest_lookback_bars: usize,
    pub display_decimals: u32,
    /// Assets whose signal notifications start switched off.
    pub muted: Vec<String>,
    /// Hours between status reports; 0 disables them.
    pub status_report_hours: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            assets: vec!["BTC".to_string(), "ETH".to_string()],
            quotes: QuotePolicy::default(),
            timeframes: Timeframe::ALL.to_vec(),
            ema_window: 15,
            zlma_window: 15,
            rules: vec![Rule::Cross {
                fast: Operand::Indicator(IndicatorType::Zlma(15)),
                slow: Operand::Indicator(IndicatorType::Ema(15)),
            }],
            refresh_interval_hours: 12,
            max_concurrency: 4,
            backtest_lookback_bars: 180,
            display_decimals: 2,
            muted: Vec::new(),
            status_report_hours: 0,
        }
    }
}

impl PipelineConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, TrendError> {
        let assets = read_assets(config)?;
        let quotes = read_quotes(config)?;
        let timeframes = read_timeframes(config)?;
        let ema_window = read_at_least(config, "indicators", "ema_window", 15, 1)?;
        let zlma_window = read_at_least(config, "indicators", "zlma_window", 15, 1)?;
        let rules = read_rules(config, ema_window, zlma_window)?;
        let refresh_interval_hours = read_hours(config, "schedule", "refresh_interval_hours", 12, 1)?;
        let max_concurrency = read_at_least(config, "schedule", "max_concurrency", 4, 1)?;
        let backtest_lookback_bars = read_at_least(config, "backtest", "lookback_bars", 180, 1)?;
        let display_decimals = read_display_decimals(config)?;
        let muted = read_muted(config, &assets)?;
        let status_report_hours = read_hours(config, "notifications", "status_report_hours", 0, 0)?;

        let parsed = Self {
            assets,
            quotes,
            timeframes,
            ema_window,
            zlma_window,
            rules,
            refresh_interval_hours,
            max_concurrency,
            backtest_lookback_bars,
            display_decimals,
            muted,
            status_report_hours,
        };
        check_lookback(parsed.backtest_lookback_bars, parsed.longest_warmup())?;
        Ok(parsed)
    }

    /// Indicators referenced by the rules plus the configured EMA and ZLMA.
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        let mut types = extract_indicators(&self.rules);
        for t in [
            IndicatorType::Zlma(self.zlma_window),
            IndicatorType::Ema(self.ema_window),
        ] {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    }

    pub fn longest_warmup(&self) -> usize {
        self.indicator_types()
            .iter()
            .map(IndicatorType::warmup_bars)
            .max()
            .unwrap_or(1)
    }

    /// Live window sized to the longest indicator, ceiling to the backtest lookback.
    pub fn retention(&self) -> Retention {
        Retention::live(self.longest_warmup()).with_ceiling(self.backtest_lookback_bars)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::hours(i64::from(self.refresh_interval_hours))
    }

    pub fn status_report_interval(&self) -> Option<Duration> {
        (self.status_report_hours > 0).then(|| Duration::hours(i64::from(self.status_report_hours)))
    }
}
