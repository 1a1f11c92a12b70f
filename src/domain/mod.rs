//! Core domain types and logic.

pub mod ohlcv;
pub mod series;
pub mod indicator;
pub mod rule;
pub mod rule_parser;
pub mod signal;
pub mod detector;
pub mod backtest;
pub mod metrics;
pub mod universe;
pub mod notification;
pub mod config;
pub mod config_validation;
pub mod pipeline;
pub mod orchestrator;
pub mod error;
