//! Domain error types.

use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::Timeframe;
use chrono::{DateTime, Utc};

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for trendlevels.
#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    #[error("out-of-order bar for {asset} {timeframe}: {attempted} is not after {last}")]
    OutOfOrder {
        asset: String,
        timeframe: Timeframe,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("insufficient history for {indicator}: have {have} bars, need {need}")]
    InsufficientHistory {
        indicator: IndicatorType,
        have: usize,
        need: usize,
    },

    #[error("indicator {indicator} is not tracked by this engine")]
    IndicatorNotTracked { indicator: IndicatorType },

    #[error("no market for {asset} against {primary} or {fallback}")]
    UnresolvedPair {
        asset: String,
        primary: String,
        fallback: String,
    },

    #[error("backtest for {asset} {timeframe} aborted after {processed} bars")]
    BacktestAborted {
        asset: String,
        timeframe: Timeframe,
        processed: usize,
    },

    #[error("pipeline {asset} {timeframe} is suspended: {reason}")]
    PipelineSuspended {
        asset: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error("invalid bar for {asset} {timeframe} at {timestamp}: {reason}")]
    InvalidBar {
        asset: String,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("no data for {asset} {timeframe}")]
    NoData { asset: String, timeframe: Timeframe },

    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error("notification delivery failed: {reason}")]
    Notification { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TrendError> for std::process::ExitCode {
    fn from(err: &TrendError) -> Self {
        let code: u8 = match err {
            TrendError::Io(_) | TrendError::Notification { .. } => 1,
            TrendError::ConfigParse { .. }
            | TrendError::ConfigMissing { .. }
            | TrendError::ConfigInvalid { .. } => 2,
            TrendError::Data { .. }
            | TrendError::NoData { .. }
            | TrendError::OutOfOrder { .. }
            | TrendError::InvalidBar { .. }
            | TrendError::UnresolvedPair { .. } => 3,
            TrendError::RuleParse(_) | TrendError::IndicatorNotTracked { .. } => 4,
            TrendError::InsufficientHistory { .. }
            | TrendError::BacktestAborted { .. }
            | TrendError::PipelineSuspended { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
