//! CLI integration tests.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_markowitz_settings)
//! - Ticker resolution (resolve_tickers)
//! - Every subcommand against INI and CSV files on disk

mod common;

use common::*;
use portopt::adapters::csv_report_adapter::SUMMARY_FILE;
use portopt::adapters::file_config_adapter::FileConfigAdapter;
use portopt::cli::{self, Cli, Command};
use portopt::domain::allocator::AllocationPolicy;
use portopt::domain::error::PortoptError;
use portopt::domain::rebalance::RebalanceFreq;
use portopt::ports::config_port::ConfigPort;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;

const VALID_INI: &str = r#"
[data]
dir = ./data

[portfolio]
tickers = AAPL, MSFT, GOOG
benchmark = ^GSPC
risk_free_rate = 0.03

[backtest]
start_date = 2020-01-01
end_date = 2024-12-31
rebalance = quarterly
lookback_days = 126

[optimizer]
max_iterations = 500
tolerance = 1e-9
ridge = 1e-8

[predictions]
path = preds.csv
policy = proportional
"#;

fn code(exit: ExitCode) -> String {
    format!("{exit:?}")
}

fn assert_exit(exit: ExitCode, expected: u8) {
    assert_eq!(code(exit), code(ExitCode::from(expected)));
}

/// A workspace with four price files, a prediction file and an INI file.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(days: usize, with_predictions: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();

        let dates = trading_dates(date(2022, 1, 3), days);
        for (k, ticker) in ["AAA", "BBB", "CCC", "IDX"].iter().enumerate() {
            let closes = wave_closes(days, 40.0 + 10.0 * k as f64, 0.0003 * k as f64, k as f64);
            let mut csv = String::from("date,open,close,adj_close\n");
            for (d, c) in dates.iter().zip(&closes) {
                writeln!(csv, "{d},{c},{c},{c}").unwrap();
            }
            fs::write(data.join(format!("{ticker}.csv")), csv).unwrap();
        }

        fs::write(
            dir.path().join("preds.csv"),
            "ticker,predicted_return\nAAA,0.12\nBBB,0.03\nCCC,-0.01\n",
        )
        .unwrap();

        let mut ini = format!(
            "[data]\ndir = {data}\n\n\
             [portfolio]\ntickers = AAA,BBB,CCC\nbenchmark = IDX\nrisk_free_rate = 0.01\n\n\
             [backtest]\nrebalance = monthly\nlookback_days = 60\n\n\
             [report]\noutput_dir = {out}\n",
            data = data.display(),
            out = dir.path().join("out").display(),
        );
        if with_predictions {
            writeln!(
                ini,
                "\n[predictions]\npath = {}",
                dir.path().join("preds.csv").display()
            )
            .unwrap();
        }
        fs::write(dir.path().join("portopt.ini"), ini).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("portopt.ini")
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

fn run(command: Command) -> ExitCode {
    cli::run(Cli {
        verbose: 0,
        command,
    })
}

fn backtest(config: &Path) -> Command {
    Command::Backtest {
        config: config.to_path_buf(),
        output: None,
        tickers: None,
        dry_run: false,
    }
}

mod config_loading {
    use super::*;

    /// Config values kept verbatim, surrounding whitespace included.
    struct RawConfig(HashMap<(String, String), String>);

    impl RawConfig {
        fn with(section: &str, key: &str, value: &str) -> Self {
            let mut values = HashMap::new();
            values.insert((section.to_string(), key.to_string()), value.to_string());
            Self(values)
        }
    }

    impl ConfigPort for RawConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
        fn get_int(&self, _: &str, _: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _: &str, _: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _: &str, _: &str, default: bool) -> bool {
            default
        }
    }

    #[test]
    fn predictions_path_is_trimmed() {
        let config = RawConfig::with("predictions", "path", "  preds/latest.csv \t");
        assert_eq!(
            cli::predictions_path(&config),
            Some(PathBuf::from("preds/latest.csv"))
        );
        assert_eq!(
            cli::predictions_path(&RawConfig::with("predictions", "path", "   ")),
            None
        );
    }

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.start_date, Some(date(2020, 1, 1)));
        assert_eq!(config.end_date, Some(date(2024, 12, 31)));
        assert!((config.risk_free_rate - 0.03).abs() < f64::EPSILON);
        assert_eq!(config.rebalance, RebalanceFreq::Quarterly);
        assert_eq!(config.lookback_days, 126);
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("[portfolio]\ntickers = A,B\n").unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.start_date, None);
        assert_eq!(config.end_date, None);
        assert!((config.risk_free_rate - 0.02).abs() < f64::EPSILON);
        assert_eq!(config.rebalance, RebalanceFreq::Never);
        assert_eq!(config.lookback_days, 252);
    }

    #[test]
    fn build_backtest_config_rejects_negative_lookback() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nlookback_days = -5\n").unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, PortoptError::ConfigInvalid { key, .. } if key == "lookback_days"));
    }

    #[test]
    fn build_strategy_settings_reads_optimizer_and_policy() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let settings = cli::build_strategy_settings(&adapter).unwrap();

        assert_eq!(settings.markowitz.optimizer.max_iterations, 500);
        assert!((settings.markowitz.optimizer.tolerance - 1e-9).abs() < f64::EPSILON);
        assert!((settings.markowitz.estimator.ridge - 1e-8).abs() < f64::EPSILON);
        assert_eq!(settings.policy, AllocationPolicy::ProportionalClip);
    }

    #[test]
    fn resolve_tickers_prefers_override() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        assert_eq!(
            cli::resolve_tickers(Some("tsla,nvda"), &adapter).unwrap(),
            vec!["TSLA", "NVDA"]
        );
        assert_eq!(
            cli::resolve_tickers(None, &adapter).unwrap(),
            vec!["AAPL", "MSFT", "GOOG"]
        );
    }

    #[test]
    fn resolve_tickers_missing_is_config_error() {
        let adapter = FileConfigAdapter::from_string("[data]\ndir = x\n").unwrap();
        let err = cli::resolve_tickers(None, &adapter).unwrap_err();
        assert!(matches!(err, PortoptError::ConfigMissing { key, .. } if key == "tickers"));
    }
}

mod commands {
    use super::*;

    #[test]
    fn backtest_writes_markowitz_reports() {
        let ws = Workspace::new(200, false);
        assert_exit(run(backtest(&ws.config())), 0);

        let out = ws.out();
        assert!(out.join("markowitz_weights.csv").exists());
        assert!(!out.join("prediction_weights.csv").exists());

        let equity = fs::read_to_string(out.join("markowitz_equity.csv")).unwrap();
        let mut lines = equity.lines();
        assert_eq!(lines.next(), Some("date,equity,IDX"));
        assert_eq!(lines.count(), 140);

        let summary = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.lines().nth(1).unwrap().starts_with("markowitz,"));
    }

    #[test]
    fn backtest_with_predictions_writes_both_strategies() {
        let ws = Workspace::new(200, true);
        let target = ws.dir.path().join("custom");
        let exit = run(Command::Backtest {
            config: ws.config(),
            output: Some(target.clone()),
            tickers: None,
            dry_run: false,
        });
        assert_exit(exit, 0);

        assert!(target.join("prediction_weights.csv").exists());
        let summary = fs::read_to_string(target.join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.contains("\nprediction,"));
        assert!(!ws.out().exists());
    }

    #[test]
    fn backtest_with_long_lookback_is_insufficient_data() {
        let ws = Workspace::new(40, false);
        assert_exit(run(backtest(&ws.config())), 5);
    }

    #[test]
    fn backtest_missing_config_file_is_config_error() {
        assert_exit(run(backtest(Path::new("/nonexistent/portopt.ini"))), 2);
    }

    #[test]
    fn backtest_invalid_config_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ini");
        fs::write(&path, "[data]\ndir = data\n[portfolio]\ntickers = AAA\n").unwrap();
        assert_exit(run(backtest(&path)), 2);
    }

    #[test]
    fn dry_run_does_not_write_reports() {
        let ws = Workspace::new(100, false);
        let exit = run(Command::Backtest {
            config: ws.config(),
            output: None,
            tickers: None,
            dry_run: true,
        });
        assert_exit(exit, 0);
        assert!(!ws.out().exists());
    }

    #[test]
    fn optimize_succeeds() {
        let ws = Workspace::new(120, false);
        let exit = run(Command::Optimize {
            config: ws.config(),
            tickers: None,
        });
        assert_exit(exit, 0);
    }

    #[test]
    fn optimize_with_unknown_tickers_is_insufficient() {
        let ws = Workspace::new(120, false);
        let exit = run(Command::Optimize {
            config: ws.config(),
            tickers: Some("AAA,ZZZ".into()),
        });
        assert_exit(exit, 5);
    }

    #[test]
    fn predict_succeeds_with_override_path() {
        let ws = Workspace::new(120, false);
        let exit = run(Command::Predict {
            config: ws.config(),
            predictions: Some(ws.dir.path().join("preds.csv")),
            policy: Some("optimizer".into()),
            tickers: None,
        });
        assert_exit(exit, 0);
    }

    #[test]
    fn predict_without_path_is_config_error() {
        let ws = Workspace::new(120, false);
        let exit = run(Command::Predict {
            config: ws.config(),
            predictions: None,
            policy: None,
            tickers: None,
        });
        assert_exit(exit, 2);
    }

    #[test]
    fn predict_with_unknown_policy_is_config_error() {
        let ws = Workspace::new(120, false);
        let exit = run(Command::Predict {
            config: ws.config(),
            predictions: Some(ws.dir.path().join("preds.csv")),
            policy: Some("kelly".into()),
            tickers: None,
        });
        assert_exit(exit, 2);
    }

    #[test]
    fn validate_accepts_workspace_config() {
        let ws = Workspace::new(10, false);
        assert_exit(run(Command::Validate { config: ws.config() }), 0);
    }

    #[test]
    fn validate_rejects_bad_rebalance() {
        let ws = Workspace::new(10, false);
        let ini = fs::read_to_string(ws.config())
            .unwrap()
            .replace("rebalance = monthly", "rebalance = fortnightly");
        fs::write(ws.config(), ini).unwrap();
        assert_exit(run(Command::Validate { config: ws.config() }), 2);
    }

    #[test]
    fn info_and_list_symbols_succeed() {
        let ws = Workspace::new(10, false);
        assert_exit(
            run(Command::Info {
                ticker: Some("AAA".into()),
                config: ws.config(),
            }),
            0,
        );
        assert_exit(run(Command::ListSymbols { config: ws.config() }), 0);
    }
}
