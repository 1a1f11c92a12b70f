//! CLI integration tests against real INI and CSV files on disk.
//!
//! Tests cover:
//! - Config loading and validation through the file adapter
//! - Orchestrator construction from a config file and a CSV directory
//! - Malformed CSV prices failing only the affected market
//! - Backtest formatting with the configured display precision
//! - Exit codes for each command

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;
use trendlevels::cli::{self, Cli};
use trendlevels::domain::backtest::{CancelToken, DateRange};
use trendlevels::domain::error::TrendError;
use trendlevels::domain::notification::Notification;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_csv(dir: &Path, name: &str, closes: &[f64]) {
    let mut body = String::from("timestamp,open,high,low,close,volume\n");
    for bar in daily_bars(closes) {
        body.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.to_rfc3339(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    fs::write(dir.join(name), body).unwrap();
}

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_csv(dir.path(), "BTCUSDT_1d.csv", &REFERENCE_CLOSES);
    write_csv(dir.path(), "FOOUSDC_1d.csv", &[1.0, 2.0, 1.0, 2.0]);
    dir
}

const VALID_INI: &str = r#"
[universe]
assets = BTC, FOO
primary_quote = USDT
fallback_quote = USDC

[indicators]
timeframes = 1d
ema_window = 5
zlma_window = 3

[signals]
rules = CROSS(EMA(3), EMA(5)) | SLOPE(close)

[schedule]
refresh_interval_hours = 12
max_concurrency = 2

[backtest]
lookback_bars = 50
display_decimals = 2
"#;

fn exit_code_text(code: ExitCode) -> String {
    format!("{code:?}")
}

fn run_args(args: &[&str]) -> String {
    let mut argv = vec!["trendlevels"];
    argv.extend_from_slice(args);
    exit_code_text(cli::run(Cli::try_parse_from(argv).unwrap()))
}

mod config_loading {
    use super::*;

    #[test]
    fn load_pipeline_config_reads_file() {
        let file = write_temp_ini(VALID_INI);
        let config = cli::load_pipeline_config(file.path()).unwrap();
        assert_eq!(config.assets, vec!["BTC", "FOO"]);
        assert_eq!(config.timeframes, vec![Timeframe::D1]);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.longest_warmup(), 5);
    }

    #[test]
    fn missing_file_is_config_parse_error() {
        let err = cli::load_pipeline_config(Path::new("/nonexistent/trendlevels.ini")).unwrap_err();
        assert!(matches!(err, TrendError::ConfigParse { .. }));
    }

    #[test]
    fn bad_rule_is_config_invalid() {
        let file = write_temp_ini(&VALID_INI.replace("SLOPE(close)", "SLOPE(volume)"));
        let err = cli::load_pipeline_config(file.path()).unwrap_err();
        assert!(matches!(err, TrendError::ConfigInvalid { key, .. } if key == "rules"));
    }
}

mod orchestration {
    use super::*;

    #[test]
    fn build_orchestrator_runs_refresh_from_csv() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let mut orch = cli::build_orchestrator(file.path(), dir.path()).unwrap();
        let report = orch.refresh(day(30));

        assert_eq!(report.bars_appended, 14);
        assert_eq!(orch.universe().pair("FOO").unwrap().to_string(), "FOO/USDC");
        assert!(report.failures.is_empty());
        assert!(!report.signals.is_empty());
    }

    #[test]
    fn nan_close_in_csv_fails_only_that_market() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let path = dir.path().join("BTCUSDT_1d.csv");
        let body = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = body.lines().map(str::to_string).collect();
        let mut fields: Vec<&str> = lines[7].split(',').collect();
        fields[4] = "NaN";
        lines[7] = fields.join(",");
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let mut orch = cli::build_orchestrator(file.path(), dir.path()).unwrap();
        let report = orch.refresh(day(30));

        assert_eq!(report.bars_appended, 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].asset, "BTC");
        assert!(report.failures[0].reason.contains("line 8"));
        assert!(report.failures[0].reason.contains("close is not finite"));
        assert!(report.delivered.iter().any(|n| matches!(
            n,
            Notification::FetchFailed { asset, .. } if asset == "BTC"
        )));
        assert!(orch.pipeline("BTC", Timeframe::D1).unwrap().status().is_active());
        assert!(orch.store().get(&SeriesKey::new("BTC", Timeframe::D1)).unwrap().is_empty());
    }

    #[test]
    fn missing_data_dir_is_data_error() {
        let file = write_temp_ini(VALID_INI);
        let err = cli::build_orchestrator(file.path(), Path::new("/nonexistent/data")).err().unwrap();
        assert!(matches!(err, TrendError::Data { .. }));
    }

    #[test]
    fn format_backtest_uses_display_decimals() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let mut orch = cli::build_orchestrator(file.path(), dir.path()).unwrap();
        orch.refresh(day(30));
        let result = orch
            .backtest("FOO", Timeframe::D1, DateRange::all(), &CancelToken::new())
            .unwrap();
        let text = cli::format_backtest(&result, 2);

        assert!(text.starts_with("=== FOO 1d (4 bars) ==="));
        assert!(text.contains("Trades:        0 (0 won, 0 lost, 0 even)"));
        assert!(text.contains("Open position: yes (0.00% unrealized)"));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_succeeds_for_valid_config() {
        let file = write_temp_ini(VALID_INI);
        let path = file.path().to_str().unwrap();
        assert_eq!(run_args(&["validate", "-c", path]), exit_code_text(ExitCode::SUCCESS));
    }

    #[test]
    fn validate_reports_config_exit_code() {
        let file = write_temp_ini("[indicators]\nema_window = 5\n");
        let path = file.path().to_str().unwrap();
        let expected = TrendError::ConfigMissing {
            section: "universe".into(),
            key: "assets".into(),
        };
        assert_eq!(
            run_args(&["validate", "-c", path]),
            exit_code_text(ExitCode::from(&expected))
        );
    }

    #[test]
    fn refresh_and_snapshot_succeed() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let cfg = file.path().to_str().unwrap();
        let data = dir.path().to_str().unwrap();
        let ok = exit_code_text(ExitCode::SUCCESS);

        assert_eq!(run_args(&["refresh", "-c", cfg, "-d", data, "--cycles", "2"]), ok);
        assert_eq!(run_args(&["refresh", "-c", cfg, "-d", data, "--json"]), ok);
        assert_eq!(run_args(&["snapshot", "-c", cfg, "-d", data, "--tail", "3"]), ok);
    }

    #[test]
    fn backtest_single_pair_and_all() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let cfg = file.path().to_str().unwrap();
        let data = dir.path().to_str().unwrap();
        let ok = exit_code_text(ExitCode::SUCCESS);

        assert_eq!(
            run_args(&["backtest", "-c", cfg, "-d", data, "--asset", "btc", "--timeframe", "1d"]),
            ok
        );
        assert_eq!(run_args(&["backtest", "-c", cfg, "-d", data, "--json"]), ok);
    }

    #[test]
    fn backtest_empty_range_is_no_data() {
        let file = write_temp_ini(VALID_INI);
        let dir = data_dir();
        let cfg = file.path().to_str().unwrap();
        let data = dir.path().to_str().unwrap();
        let expected = TrendError::NoData {
            asset: "BTC".into(),
            timeframe: Timeframe::D1,
        };
        assert_eq!(
            run_args(&[
                "backtest", "-c", cfg, "-d", data, "--asset", "BTC", "--from", "2030-01-01",
            ]),
            exit_code_text(ExitCode::from(&expected))
        );
    }

    #[test]
    fn refresh_with_no_resolvable_asset_fails() {
        let file = write_temp_ini(&VALID_INI.replace("assets = BTC, FOO", "assets = NOPE"));
        let dir = data_dir();
        let expected = TrendError::UnresolvedPair {
            asset: "NOPE".into(),
            primary: "USDT".into(),
            fallback: "USDC".into(),
        };
        assert_eq!(
            run_args(&[
                "refresh",
                "-c",
                file.path().to_str().unwrap(),
                "-d",
                dir.path().to_str().unwrap(),
            ]),
            exit_code_text(ExitCode::from(&expected))
        );
    }
}
