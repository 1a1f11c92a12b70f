//! Configuration validation.
//!
//! Each reader validates one key and returns its parsed value, so the
//! `validate` command and [`PipelineConfig::from_port`] share the same checks.

use crate::domain::config::PipelineConfig;
use crate::domain::error::TrendError;
use crate::domain::ohlcv::Timeframe;
use crate::domain::rule::Rule;
use crate::domain::rule_parser::parse_rules;
use crate::domain::universe::{QuotePolicy, parse_assets};
use crate::ports::config_port::ConfigPort;

pub const MAX_DISPLAY_DECIMALS: i64 = 8;

/// Check every key; the first problem found is returned.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TrendError> {
    PipelineConfig::from_port(config).map(|_| ())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrendError {
    TrendError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Integer key; absent means `default`, present but non-numeric is an error.
fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TrendError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(section, key, format!("'{}' is not an integer", raw.trim()))),
    }
}

pub(crate) fn read_at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    minimum: i64,
) -> Result<usize, TrendError> {
    let value = read_int(config, section, key, default)?;
    if value < minimum {
        return Err(invalid(
            section,
            key,
            format!("{} must be at least {}", key, minimum),
        ));
    }
    usize::try_from(value).map_err(|_| invalid(section, key, format!("{} is too large", value)))
}

/// Hour count that must fit a `u32`.
pub(crate) fn read_hours(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    minimum: i64,
) -> Result<u32, TrendError> {
    let value = read_at_least(config, section, key, default, minimum)?;
    u32::try_from(value).map_err(|_| {
        invalid(section, key, format!("{} must be at most {}", key, u32::MAX))
    })
}

/// Assets whose signals are not delivered. Must be configured assets.
pub(crate) fn read_muted(config: &dyn ConfigPort, assets: &[String]) -> Result<Vec<String>, TrendError> {
    let raw = match config.get_string("notifications", "muted") {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(Vec::new()),
    };
    let muted = parse_assets(&raw).map_err(|e| invalid("notifications", "muted", e.to_string()))?;
    if let Some(unknown) = muted.iter().find(|m| !assets.contains(m)) {
        return Err(invalid(
            "notifications",
            "muted",
            format!("{} is not in [universe] assets", unknown),
        ));
    }
    Ok(muted)
}

pub(crate) fn read_assets(config: &dyn ConfigPort) -> Result<Vec<String>, TrendError> {
    match config.get_string("universe", "assets") {
        Some(s) if !s.trim().is_empty() => {
            parse_assets(&s).map_err(|e| invalid("universe", "assets", e.to_string()))
        }
        _ => Err(TrendError::ConfigMissing {
            section: "universe".to_string(),
            key: "assets".to_string(),
        }),
    }
}

pub(crate) fn read_quotes(config: &dyn ConfigPort) -> Result<QuotePolicy, TrendError> {
    let read = |key: &str, default: &str| -> Result<String, TrendError> {
        let value = config
            .get_string("universe", key)
            .unwrap_or_else(|| default.to_string())
            .trim()
            .to_uppercase();
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("universe", key, format!("invalid quote asset '{}'", value)));
        }
        Ok(value)
    };
    let primary = read("primary_quote", "USDT")?;
    let fallback = read("fallback_quote", "USDC")?;
    if primary == fallback {
        return Err(invalid(
            "universe",
            "fallback_quote",
            "fallback_quote must differ from primary_quote",
        ));
    }
    Ok(QuotePolicy::new(primary, fallback))
}

pub(crate) fn read_timeframes(config: &dyn ConfigPort) -> Result<Vec<Timeframe>, TrendError> {
    let items = config
        .get_list("indicators", "timeframes", ',')
        .unwrap_or_else(|| Timeframe::ALL.iter().map(|t| t.to_string()).collect());
    if items.is_empty() {
        return Err(invalid("indicators", "timeframes", "at least one timeframe is required"));
    }
    let mut timeframes = Vec::with_capacity(items.len());
    for item in items {
        let tf: Timeframe = item
            .parse()
            .map_err(|e: String| invalid("indicators", "timeframes", e))?;
        if timeframes.contains(&tf) {
            return Err(invalid("indicators", "timeframes", format!("duplicate timeframe {}", tf)));
        }
        timeframes.push(tf);
    }
    Ok(timeframes)
}

pub(crate) fn read_rules(
    config: &dyn ConfigPort,
    ema_window: usize,
    zlma_window: usize,
) -> Result<Vec<Rule>, TrendError> {
    let text = config
        .get_string("signals", "rules")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("CROSS(ZLMA({}), EMA({}))", zlma_window, ema_window));
    parse_rules(&text).map_err(|e| invalid("signals", "rules", e.display_with_context(&text)))
}

pub(crate) fn check_lookback(lookback: usize, warmup: usize) -> Result<(), TrendError> {
    if lookback < warmup {
        return Err(invalid(
            "backtest",
            "lookback_bars",
            format!(
                "lookback_bars ({}) is shorter than the longest indicator warm-up ({})",
                lookback, warmup
            ),
        ));
    }
    Ok(())
}

pub(crate) fn read_display_decimals(config: &dyn ConfigPort) -> Result<u32, TrendError> {
    let value = read_int(config, "backtest", "display_decimals", 2)?;
    if !(0..=MAX_DISPLAY_DECIMALS).contains(&value) {
        return Err(invalid(
            "backtest",
            "display_decimals",
            format!("display_decimals must be between 0 and {}", MAX_DISPLAY_DECIMALS),
        ));
    }
    Ok(value as u32)
}
