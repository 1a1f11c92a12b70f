//! CLI definition and dispatch.
//!
//! Results go to stdout; progress and diagnostics go to the tracing log on
//! stderr.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, info, warn};

use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::domain::backtest::{BacktestResult, CancelToken, DateRange};
use crate::domain::config::PipelineConfig;
use crate::domain::error::TrendError;
use crate::domain::ohlcv::Timeframe;
use crate::domain::orchestrator::{Orchestrator, RefreshReport};

#[derive(Parser, Debug)]
#[command(name = "trendlevels", about = "Crypto trend signals and backtests")]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run refresh cycles over a CSV data directory
    Refresh {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Number of cycles; unlimited with --watch when omitted
        #[arg(long)]
        cycles: Option<u32>,
        /// Sleep for the configured refresh interval between cycles
        #[arg(long)]
        watch: bool,
        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Backtest the configured rules for one pair, or every pair
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        asset: Option<String>,
        #[arg(long)]
        timeframe: Option<Timeframe>,
        /// Inclusive start (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_from_date)]
        from: Option<DateTime<Utc>>,
        /// Inclusive end (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_to_date)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        json: bool,
    },
    /// Print the dashboard snapshot as JSON
    Snapshot {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Indicator points per series
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Refresh {
            config,
            data,
            cycles,
            watch,
            json,
        } => run_refresh(&config, &data, cycles, watch, json),
        Command::Backtest {
            config,
            data,
            asset,
            timeframe,
            from,
            to,
            json,
        } => run_backtest(
            &config,
            &data,
            asset.as_deref(),
            timeframe,
            DateRange::new(from, to),
            json,
        ),
        Command::Snapshot { config, data, tail } => run_snapshot(&config, &data, tail),
        Command::Validate { config } => run_validate(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn parse_date(s: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(time).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", s))
}

/// A bare date starts at midnight.
pub fn parse_from_date(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date(s, NaiveTime::MIN)
}

/// A bare date covers the whole day.
pub fn parse_to_date(s: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    parse_date(s, end_of_day)
}

pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, TrendError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    PipelineConfig::from_port(&adapter)
}

pub fn build_orchestrator(config_path: &Path, data_dir: &Path) -> Result<Orchestrator, TrendError> {
    let config = load_pipeline_config(config_path)?;
    if !data_dir.is_dir() {
        return Err(TrendError::Data {
            reason: format!("data directory {} does not exist", data_dir.display()),
        });
    }
    Ok(Orchestrator::new(config, Box::new(CsvMarketData::new(data_dir)))?
        .with_sink(Box::new(LogNotifier)))
}

/// Error for a cycle in which no asset resolved.
fn nothing_resolved(report: &RefreshReport) -> Option<TrendError> {
    if report.pairs.iter().any(|p| p.pair().is_some()) {
        return None;
    }
    report.unresolved().next()
}

/// One-shot runs fail when nothing resolved; watch mode waits for the next cycle.
fn check_cycle(report: &RefreshReport, watch: bool) -> Result<(), TrendError> {
    match nothing_resolved(report) {
        Some(e) if watch => {
            warn!(cycle = report.cycle, error = %e, "no pair resolved, retrying next cycle");
            Ok(())
        }
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_report(report: &RefreshReport, json: bool) -> Result<(), TrendError> {
    for notification in &report.delivered {
        if json {
            let line = serde_json::to_string(notification)
                .map_err(|e| TrendError::Io(std::io::Error::other(e)))?;
            println!("{}", line);
        } else {
            println!("{}", notification);
        }
    }
    Ok(())
}

fn run_refresh(
    config_path: &Path,
    data_dir: &Path,
    cycles: Option<u32>,
    watch: bool,
    json: bool,
) -> Result<(), TrendError> {
    let mut orchestrator = build_orchestrator(config_path, data_dir)?;
    let limit = match (cycles, watch) {
        (Some(n), _) => Some(n.max(1)),
        (None, true) => None,
        (None, false) => Some(1),
    };
    let interval = orchestrator
        .config()
        .refresh_interval()
        .to_std()
        .map_err(|e| TrendError::Io(std::io::Error::other(e)))?;

    let mut done = 0u32;
    loop {
        let report = orchestrator.refresh(Utc::now());
        print_report(&report, json)?;
        check_cycle(&report, watch)?;
        done += 1;
        if limit.is_some_and(|n| done >= n) {
            return Ok(());
        }
        if watch {
            info!(seconds = interval.as_secs(), "sleeping until next refresh");
            std::thread::sleep(interval);
        }
    }
}

pub fn format_backtest(result: &BacktestResult, decimals: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== {} {} ({} bars) ===",
        result.asset, result.timeframe, result.bars_evaluated
    );
    for trade in &result.trades {
        let _ = writeln!(
            out,
            "  {} BUY @ {}  ->  {} SELL @ {}  {:+.*}%",
            trade.entry.timestamp.format("%Y-%m-%d %H:%M"),
            trade.entry.price,
            trade.exit.timestamp.format("%Y-%m-%d %H:%M"),
            trade.exit.price,
            decimals as usize,
            trade.trade_return * 100.0
        );
    }
    if let Some(open) = &result.open_position {
        let _ = writeln!(
            out,
            "  {} BUY @ {}  ->  open, marked {} @ {}",
            open.entry.timestamp.format("%Y-%m-%d %H:%M"),
            open.entry.price,
            open.marked_at.format("%Y-%m-%d %H:%M"),
            open.mark_price
        );
    }
    let _ = writeln!(out, "{}", result.summary.display(decimals));
    out
}

fn run_backtest(
    config_path: &Path,
    data_dir: &Path,
    asset: Option<&str>,
    timeframe: Option<Timeframe>,
    range: DateRange,
    json: bool,
) -> Result<(), TrendError> {
    let mut orchestrator = build_orchestrator(config_path, data_dir)?;
    let report = orchestrator.refresh(Utc::now());
    if let Some(e) = nothing_resolved(&report) {
        return Err(e);
    }
    let decimals = orchestrator.config().display_decimals;
    let cancel = CancelToken::new();

    let results: Vec<BacktestResult> = match asset {
        Some(asset) => {
            let asset = asset.trim().to_uppercase();
            let timeframes = match timeframe {
                Some(tf) => vec![tf],
                None => orchestrator.config().timeframes.clone(),
            };
            timeframes
                .into_iter()
                .map(|tf| orchestrator.backtest(&asset, tf, range, &cancel))
                .collect::<Result<_, _>>()?
        }
        None => orchestrator
            .backtest_all(range, &cancel)
            .into_iter()
            .filter(|(key, _)| timeframe.is_none_or(|tf| key.timeframe == tf))
            .filter_map(|(key, result)| match result {
                Ok(r) => Some(r),
                Err(e) => {
                    info!(pair = %key, "skipped: {}", e);
                    None
                }
            })
            .collect(),
    };

    for result in results {
        if json {
            let rounded = BacktestResult {
                summary: result.summary.rounded(decimals),
                ..result
            };
            let line = serde_json::to_string(&rounded)
                .map_err(|e| TrendError::Io(std::io::Error::other(e)))?;
            println!("{}", line);
        } else {
            println!("{}", format_backtest(&result, decimals));
        }
    }
    Ok(())
}

fn run_snapshot(config_path: &Path, data_dir: &Path, tail: usize) -> Result<(), TrendError> {
    let mut orchestrator = build_orchestrator(config_path, data_dir)?;
    orchestrator.refresh(Utc::now());
    let snapshot = orchestrator.snapshot(tail);
    let text = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| TrendError::Io(std::io::Error::other(e)))?;
    println!("{}", text);
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), TrendError> {
    let config = load_pipeline_config(config_path)?;
    println!("Assets:     {}", config.assets.join(", "));
    println!("Quotes:     {} (fallback {})", config.quotes.primary, config.quotes.fallback);
    println!(
        "Timeframes: {}",
        config
            .timeframes
            .iter()
            .map(Timeframe::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Rules:");
    for (i, rule) in config.rules.iter().enumerate() {
        println!("  {}. {}", i + 1, rule);
    }
    println!("Warm-up:    {} bars", config.longest_warmup());
    if !config.muted.is_empty() {
        println!("Muted:      {}", config.muted.join(", "));
    }
    if config.status_report_hours > 0 {
        println!("Status:     every {} hours", config.status_report_hours);
    }
    println!("\nConfiguration is valid.");
    Ok(())
}
