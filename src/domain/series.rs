//! Series store: per-(asset, timeframe) bar ring buffers.
//!
//! Appends are transactional: a bar whose timestamp is not strictly after the
//! last retained bar is rejected and the series is left untouched.

use crate::domain::error::TrendError;
use crate::domain::ohlcv::{Bar, SeriesKey, Timeframe};
use std::collections::vec_deque;
use std::collections::{BTreeMap, VecDeque};

static EMPTY: VecDeque<Bar> = VecDeque::new();

/// Bars allocated up front; larger series grow on demand.
const PREALLOCATED_BARS: usize = 1024;

/// How many bars each series keeps.
///
/// `live_window` is what the indicators need; `ceiling` is an optional larger
/// bound kept for backtesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub live_window: usize,
    pub ceiling: Option<usize>,
}

impl Retention {
    pub fn live(window: usize) -> Self {
        Self {
            live_window: window,
            ceiling: None,
        }
    }

    pub fn with_ceiling(self, ceiling: usize) -> Self {
        Self {
            ceiling: Some(ceiling),
            ..self
        }
    }

    pub fn capacity(&self) -> usize {
        self.live_window.max(self.ceiling.unwrap_or(0)).max(1)
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    key: SeriesKey,
    bars: VecDeque<Bar>,
    capacity: usize,
    appended: usize,
}

impl Series {
    pub fn new(key: SeriesKey, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            bars: VecDeque::with_capacity(capacity.min(PREALLOCATED_BARS)),
            capacity,
            appended: 0,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn append(&mut self, bar: Bar) -> Result<(), TrendError> {
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return Err(TrendError::OutOfOrder {
                    asset: self.key.asset.clone(),
                    timeframe: self.key.timeframe,
                    last: last.timestamp,
                    attempted: bar.timestamp,
                });
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        self.appended += 1;
        Ok(())
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bars ever appended, including those evicted by retention.
    pub fn total_appended(&self) -> usize {
        self.appended
    }

    /// The last `n` retained bars (fewer if the series is shorter).
    pub fn window(&self, n: usize) -> SeriesWindow<'_> {
        SeriesWindow::over(&self.bars, n)
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Bar> {
        self.bars.iter()
    }
}

/// A borrowed tail of a series.
///
/// The window is `Copy`; every call to [`SeriesWindow::iter`] (or
/// `into_iter`) starts again from the oldest bar in the window.
#[derive(Debug, Clone, Copy)]
pub struct SeriesWindow<'a> {
    bars: &'a VecDeque<Bar>,
    start: usize,
}

impl<'a> SeriesWindow<'a> {
    fn over(bars: &'a VecDeque<Bar>, n: usize) -> Self {
        Self {
            bars,
            start: bars.len().saturating_sub(n),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> vec_deque::Iter<'a, Bar> {
        self.bars.range(self.start..)
    }

    pub fn first(&self) -> Option<&'a Bar> {
        self.bars.get(self.start)
    }

    pub fn last(&self) -> Option<&'a Bar> {
        if self.is_empty() {
            None
        } else {
            self.bars.back()
        }
    }

    pub fn to_vec(&self) -> Vec<Bar> {
        self.iter().copied().collect()
    }
}

impl<'a> IntoIterator for SeriesWindow<'a> {
    type Item = &'a Bar;
    type IntoIter = vec_deque::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// All series, keyed by (asset, timeframe). Iteration order is key order.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    retention: Retention,
    series: BTreeMap<SeriesKey, Series>,
}

impl SeriesStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            series: BTreeMap::new(),
        }
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Ensure a series exists for `key`, creating it empty if needed.
    pub fn register(&mut self, key: SeriesKey) -> &mut Series {
        let capacity = self.retention.capacity();
        self.series
            .entry(key.clone())
            .or_insert_with(|| Series::new(key, capacity))
    }

    pub fn append(&mut self, asset: &str, timeframe: Timeframe, bar: Bar) -> Result<(), TrendError> {
        self.register(SeriesKey::new(asset, timeframe)).append(bar)
    }

    /// The last `n` bars for the pair; empty if the pair has never been seen.
    pub fn get_window(&self, asset: &str, timeframe: Timeframe, n: usize) -> SeriesWindow<'_> {
        match self.series.get(&SeriesKey::new(asset, timeframe)) {
            Some(series) => series.window(n),
            None => SeriesWindow::over(&EMPTY, n),
        }
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&Series> {
        self.series.get(key)
    }

    pub fn contains(&self, key: &SeriesKey) -> bool {
        self.series.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Disjoint mutable access to every series, in key order.
    pub fn shards_mut(&mut self) -> impl Iterator<Item = (&SeriesKey, &mut Series)> {
        self.series.iter_mut()
    }
}
