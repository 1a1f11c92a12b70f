//! Asset universe and trading-pair resolution.
//!
//! Each asset is priced against the primary quote when that market exists,
//! otherwise against the fallback. A resolved pair is kept across refreshes
//! while its market stays available and re-resolved at most once per refresh
//! cycle when it does not.

use crate::domain::error::TrendError;
use crate::ports::data_port::MarketDataPort;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePolicy {
    pub primary: String,
    pub fallback: String,
}

impl QuotePolicy {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }

    pub fn is_quote(&self, asset: &str) -> bool {
        asset == self.primary || asset == self.fallback
    }
}

impl Default for QuotePolicy {
    fn default() -> Self {
        Self::new("USDT", "USDC")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
    pub resolved_at: DateTime<Utc>,
}

impl TradingPair {
    /// Exchange symbol, e.g. `BTCUSDT`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Resolve `asset` on the primary quote, then the fallback.
pub fn resolve_pair(
    market: &dyn MarketDataPort,
    asset: &str,
    policy: &QuotePolicy,
    now: DateTime<Utc>,
) -> Result<(TradingPair, Resolution), TrendError> {
    let candidates = [
        (&policy.primary, Resolution::Primary),
        (&policy.fallback, Resolution::Fallback),
    ];
    for (quote, resolution) in candidates {
        if market.has_market(asset, quote) {
            let pair = TradingPair {
                base: asset.to_string(),
                quote: quote.clone(),
                resolved_at: now,
            };
            return Ok((pair, resolution));
        }
    }
    Err(TrendError::UnresolvedPair {
        asset: asset.to_string(),
        primary: policy.primary.clone(),
        fallback: policy.fallback.clone(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// Previously resolved pair whose market is still listed.
    Kept(TradingPair),
    Resolved {
        pair: TradingPair,
        resolution: Resolution,
    },
    Unresolved {
        asset: String,
        primary: String,
        fallback: String,
    },
}

impl PairOutcome {
    pub fn pair(&self) -> Option<&TradingPair> {
        match self {
            PairOutcome::Kept(pair) | PairOutcome::Resolved { pair, .. } => Some(pair),
            PairOutcome::Unresolved { .. } => None,
        }
    }

    pub fn to_error(&self) -> Option<TrendError> {
        match self {
            PairOutcome::Unresolved {
                asset,
                primary,
                fallback,
            } => Some(TrendError::UnresolvedPair {
                asset: asset.clone(),
                primary: primary.clone(),
                fallback: fallback.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Universe {
    assets: Vec<String>,
    policy: QuotePolicy,
    pairs: BTreeMap<String, TradingPair>,
    cycle: u64,
}

impl Universe {
    /// Assets that are themselves a quote asset are dropped with a warning.
    pub fn new(assets: Vec<String>, policy: QuotePolicy) -> Self {
        let assets = assets
            .into_iter()
            .filter(|a| {
                let is_quote = policy.is_quote(a);
                if is_quote {
                    warn!(asset = %a, "skipping asset that is a quote currency");
                }
                !is_quote
            })
            .collect();
        Self {
            assets,
            policy,
            pairs: BTreeMap::new(),
            cycle: 0,
        }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }

    pub fn policy(&self) -> &QuotePolicy {
        &self.policy
    }

    /// Refresh cycles run so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn pair(&self, asset: &str) -> Option<&TradingPair> {
        self.pairs.get(asset)
    }

    /// Start a new refresh cycle and (re)resolve every asset once.
    pub fn refresh(&mut self, market: &dyn MarketDataPort, now: DateTime<Utc>) -> Vec<PairOutcome> {
        self.cycle += 1;
        let mut outcomes = Vec::with_capacity(self.assets.len());

        for asset in &self.assets {
            if let Some(pair) = self.pairs.get(asset) {
                if market.has_market(&pair.base, &pair.quote) {
                    outcomes.push(PairOutcome::Kept(pair.clone()));
                    continue;
                }
                warn!(pair = %pair, "market no longer listed, re-resolving");
            }

            match resolve_pair(market, asset, &self.policy, now) {
                Ok((pair, resolution)) => {
                    match resolution {
                        Resolution::Primary => info!(pair = %pair, "resolved"),
                        Resolution::Fallback => {
                            info!(pair = %pair, primary = %self.policy.primary, "resolved on fallback quote")
                        }
                    }
                    self.pairs.insert(asset.clone(), pair.clone());
                    outcomes.push(PairOutcome::Resolved { pair, resolution });
                }
                Err(e) => {
                    warn!(asset = %asset, cycle = self.cycle, "{}", e);
                    self.pairs.remove(asset);
                    outcomes.push(PairOutcome::Unresolved {
                        asset: asset.clone(),
                        primary: self.policy.primary.clone(),
                        fallback: self.policy.fallback.clone(),
                    });
                }
            }
        }

        outcomes
    }
}
