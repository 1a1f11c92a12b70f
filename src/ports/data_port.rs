//! Market data port trait.
//!
//! Implementations must be `Sync`: the orchestrator fetches for independent
//! pairs from a worker pool.

use crate::domain::error::TrendError;
use crate::domain::ohlcv::{Bar, Timeframe};
use crate::domain::universe::TradingPair;
use chrono::{DateTime, Utc};

pub trait MarketDataPort: Send + Sync {
    /// Whether `BASEQUOTE` is currently listed.
    fn has_market(&self, base: &str, quote: &str) -> bool;

    /// Bars for `pair` strictly after `since` (all bars when `None`), oldest first.
    fn fetch_bars(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, TrendError>;
}
