//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_prediction_adapter::CsvPredictionAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::allocator::{allocate, AllocationPolicy};
use crate::domain::backtest::BacktestConfig;
use crate::domain::config_validation::{
    parse_date, parse_policy, parse_rebalance, validate_backtest_config,
    validate_portfolio_config, validate_prediction_config,
};
use crate::domain::error::PortoptError;
use crate::domain::estimator::{estimate_with, EstimatorSettings};
use crate::domain::metrics::PerformanceReport;
use crate::domain::optimizer::{optimize_markowitz_with, MarkowitzSettings, OptimizerSettings};
use crate::domain::price_table::PriceTable;
use crate::domain::strategy::{
    benchmark, evaluation_window, run_markowitz, run_predictions, Benchmark, StrategyRun,
    StrategySettings,
};
use crate::domain::universe::{parse_tickers, validate_universe};
use crate::domain::weights::WeightVector;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::prediction_port::PredictionPort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_OUTPUT_DIR: &str = "reports";

#[derive(Parser, Debug)]
#[command(name = "portopt", about = "Long-only portfolio optimizer and backtester")]
pub struct Cli {
    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Max-Sharpe weights from the configured price history
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
    },
    /// Weights from a predicted-returns file
    Predict {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        predictions: Option<PathBuf>,
        #[arg(long)]
        policy: Option<String>,
        #[arg(long)]
        tickers: Option<String>,
    },
    /// Backtest the strategies and write reports
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for ticker(s)
    Info {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List tickers available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Installs the global `tracing` subscriber, writing to stderr.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        // Ignored when a subscriber is already installed.
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Optimize { config, tickers } => run_optimize(&config, tickers.as_deref()),
        Command::Predict {
            config,
            predictions,
            policy,
            tickers,
        } => run_predict(
            &config,
            predictions.as_deref(),
            policy.as_deref(),
            tickers.as_deref(),
        ),
        Command::Backtest {
            config,
            output,
            tickers,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, tickers.as_deref())
            } else {
                run_backtest(&config, output.as_deref(), tickers.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { ticker, config } => run_info(ticker.as_deref(), &config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

/// Prints the error and converts it to its exit code.
fn fail(e: PortoptError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

fn to_usize(value: i64, section: &str, key: &str) -> Result<usize, PortoptError> {
    usize::try_from(value).map_err(|_| PortoptError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: format!("{key} must not be negative"),
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, PortoptError> {
    let defaults = BacktestConfig::default();
    Ok(BacktestConfig {
        start_date: parse_date(config, "backtest", "start_date")?,
        end_date: parse_date(config, "backtest", "end_date")?,
        risk_free_rate: config.get_double("portfolio", "risk_free_rate", defaults.risk_free_rate),
        rebalance: parse_rebalance(config)?,
        lookback_days: to_usize(
            config.get_int("backtest", "lookback_days", defaults.lookback_days as i64),
            "backtest",
            "lookback_days",
        )?,
    })
}

pub fn build_markowitz_settings(config: &dyn ConfigPort) -> Result<MarkowitzSettings, PortoptError> {
    let estimator = EstimatorSettings::default();
    let optimizer = OptimizerSettings::default();
    Ok(MarkowitzSettings {
        estimator: EstimatorSettings {
            ridge: config.get_double("optimizer", "ridge", estimator.ridge),
            ..estimator
        },
        optimizer: OptimizerSettings {
            max_iterations: to_usize(
                config.get_int("optimizer", "max_iterations", optimizer.max_iterations as i64),
                "optimizer",
                "max_iterations",
            )?,
            tolerance: config.get_double("optimizer", "tolerance", optimizer.tolerance),
        },
    })
}

pub fn build_strategy_settings(config: &dyn ConfigPort) -> Result<StrategySettings, PortoptError> {
    Ok(StrategySettings {
        backtest: build_backtest_config(config)?,
        markowitz: build_markowitz_settings(config)?,
        policy: parse_policy(config)?,
    })
}

/// Tickers from the `--tickers` override or `[portfolio] tickers`.
pub fn resolve_tickers(
    tickers_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, PortoptError> {
    let list = match tickers_override {
        Some(list) => list.to_string(),
        None => config
            .get_string("portfolio", "tickers")
            .ok_or_else(|| PortoptError::ConfigMissing {
                section: "portfolio".into(),
                key: "tickers".into(),
            })?,
    };
    Ok(parse_tickers(&list)?)
}

pub fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, PortoptError> {
    config
        .get_string("data", "dir")
        .filter(|d| !d.trim().is_empty())
        .map(|d| CsvAdapter::new(PathBuf::from(d.trim())))
        .ok_or_else(|| PortoptError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        })
}

fn benchmark_ticker(config: &dyn ConfigPort) -> Option<String> {
    config
        .get_string("portfolio", "benchmark")
        .map(|b| b.trim().to_uppercase())
        .filter(|b| !b.is_empty())
}

/// `[predictions] path`, trimmed; blank counts as unset.
pub fn predictions_path(config: &dyn ConfigPort) -> Option<PathBuf> {
    config
        .get_string("predictions", "path")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn has_predictions(config: &dyn ConfigPort) -> bool {
    predictions_path(config).is_some()
}

/// Loads every ticker and aligns the survivors on their common dates.
pub fn load_price_table(
    data_port: &dyn DataPort,
    tickers: &[String],
    bt_config: &BacktestConfig,
) -> Result<PriceTable, PortoptError> {
    let start = bt_config.start_date.unwrap_or(NaiveDate::MIN);
    let end = bt_config.end_date.unwrap_or(NaiveDate::MAX);
    let validation = validate_universe(data_port, tickers.to_vec(), start, end)?;
    PriceTable::align(&validation.series)
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

fn print_report(title: &str, report: &PerformanceReport) {
    eprintln!("\n=== {} ===", title);
    eprintln!("Annualized Return: {}", fmt_pct(Some(report.expected_return)));
    eprintln!("Volatility:        {}", fmt_pct(Some(report.volatility)));
    eprintln!("Sharpe Ratio:      {}", fmt_ratio(report.sharpe_ratio));
    if report.max_drawdown.is_some() {
        eprintln!("Max Drawdown:      {}", fmt_pct(report.max_drawdown));
    }
    if let Some(multiplier) = report.total_multiplier {
        eprintln!("Total Multiplier:  {:.4}x", multiplier);
    }
    for degradation in &report.degradations {
        eprintln!("warning: {degradation}");
    }
}

/// Weights go to stdout, one `TICKER WEIGHT` line each.
fn print_weights(weights: &WeightVector) {
    for (ticker, weight) in weights.iter() {
        println!("{:<12} {:.6}", ticker, weight);
    }
}

fn run_optimize(config_path: &Path, tickers_override: Option<&str>) -> ExitCode {
    match optimize_from_config(config_path, tickers_override) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn optimize_from_config(
    config_path: &Path,
    tickers_override: Option<&str>,
) -> Result<(), PortoptError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = FileConfigAdapter::from_file(config_path)?;
    validate_portfolio_config(&config)?;

    let settings = build_strategy_settings(&config)?;
    let tickers = resolve_tickers(tickers_override, &config)?;
    let data_port = data_adapter(&config)?;

    eprintln!("Validating {} tickers...", tickers.len());
    let table = load_price_table(&data_port, &tickers, &settings.backtest)?;
    eprintln!(
        "Optimizing over {} days, {} to {}",
        table.len(),
        table.first_date(),
        table.last_date()
    );

    let (weights, report) =
        optimize_markowitz_with(&table, settings.backtest.risk_free_rate, &settings.markowitz)?;
    print_weights(&weights);
    print_report("Markowitz (theoretical)", &report);
    Ok(())
}

fn run_predict(
    config_path: &Path,
    predictions_override: Option<&Path>,
    policy_override: Option<&str>,
    tickers_override: Option<&str>,
) -> ExitCode {
    match predict_from_config(config_path, predictions_override, policy_override, tickers_override)
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn predict_from_config(
    config_path: &Path,
    predictions_override: Option<&Path>,
    policy_override: Option<&str>,
    tickers_override: Option<&str>,
) -> Result<(), PortoptError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = FileConfigAdapter::from_file(config_path)?;
    validate_portfolio_config(&config)?;

    let path = match predictions_override {
        Some(p) => p.to_path_buf(),
        None => predictions_path(&config).ok_or_else(|| PortoptError::ConfigMissing {
            section: "predictions".into(),
            key: "path".into(),
        })?,
    };
    let policy: AllocationPolicy = match policy_override {
        Some(p) => p.parse().map_err(|reason| PortoptError::ConfigInvalid {
            section: "predictions".into(),
            key: "policy".into(),
            reason,
        })?,
        None => parse_policy(&config)?,
    };

    let settings = build_strategy_settings(&config)?;
    let tickers = resolve_tickers(tickers_override, &config)?;
    let data_port = data_adapter(&config)?;
    let table = load_price_table(&data_port, &tickers, &settings.backtest)?;

    eprintln!("Loading predictions from {}", path.display());
    let prediction_port = CsvPredictionAdapter::new(path);
    let predictions = prediction_port.fetch_predictions(table.tickers())?;
    let last = table.last_date();
    let predicted = predictions.latest_through(last).ok_or_else(|| {
        PortoptError::insufficient(format!("no prediction applies on or before {last}"))
    })?;

    let estimates = estimate_with(&table, &settings.markowitz.estimator)?;
    let (weights, report) = allocate(
        predicted,
        &estimates.covariance,
        settings.backtest.risk_free_rate,
        policy,
        &settings.markowitz.optimizer,
    )?;
    print_weights(&weights);
    print_report(&format!("Prediction, {policy} (theoretical)"), &report);
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    output_override: Option<&Path>,
    tickers_override: Option<&str>,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    // Stage 2: Validate
    if let Err(e) = validate_backtest_config(&config) {
        return fail(e);
    }
    if has_predictions(&config) {
        if let Err(e) = validate_prediction_config(&config) {
            return fail(e);
        }
    }

    // Stage 3: Settings and universe
    let settings = match build_strategy_settings(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let tickers = match resolve_tickers(tickers_override, &config) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let data_port = match data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let prediction_port = predictions_path(&config).map(CsvPredictionAdapter::new);
    let output_dir = output_override
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("report", "output_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    // Stages 4-9: Data port dependent pipeline
    match run_backtest_pipeline(
        &data_port,
        prediction_port.as_ref().map(|p| p as &dyn PredictionPort),
        &CsvReportAdapter::new(),
        &tickers,
        benchmark_ticker(&config).as_deref(),
        &settings,
        &output_dir,
    ) {
        Ok(_) => {
            eprintln!("\nReports written to: {}", output_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Loads prices, runs every configured strategy, prints the summary and
/// persists the results.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    prediction_port: Option<&dyn PredictionPort>,
    report_port: &dyn ReportPort,
    tickers: &[String],
    benchmark_ticker: Option<&str>,
    settings: &StrategySettings,
    output_dir: &Path,
) -> Result<Vec<StrategyRun>, PortoptError> {
    let bt_config = &settings.backtest;

    // Stage 4: Validate universe and align prices
    eprintln!("Validating {} tickers...", tickers.len());
    let table = load_price_table(data_port, tickers, bt_config)?;
    let window = evaluation_window(&table, bt_config.lookback_days)?;
    eprintln!(
        "Running backtest: {} tickers, {} to {} ({} estimation days, rebalance {})",
        table.asset_count(),
        window.first_date(),
        window.last_date(),
        bt_config.lookback_days,
        bt_config.rebalance,
    );

    // Stage 5: Markowitz strategy
    let mut runs = vec![run_markowitz(&table, settings)?];

    // Stage 6: Prediction strategy
    if let Some(port) = prediction_port {
        let predictions = port.fetch_predictions(table.tickers())?;
        runs.push(run_predictions(&table, &predictions, settings)?);
    }

    // Stage 7: Benchmark
    let bench = match benchmark_ticker {
        Some(ticker) => load_benchmark(data_port, ticker, &window, bt_config),
        None => None,
    };

    // Stage 8: Print console summary to stderr
    print_summary(&runs, bench.as_ref());

    // Stage 9: Persist results
    report_port.write_all(&runs, bench.as_ref(), output_dir)?;
    Ok(runs)
}

/// A benchmark that cannot be loaded is reported and left out.
fn load_benchmark(
    data_port: &dyn DataPort,
    ticker: &str,
    window: &PriceTable,
    bt_config: &BacktestConfig,
) -> Option<Benchmark> {
    let result = data_port
        .fetch_prices(ticker, window.first_date(), window.last_date())
        .and_then(|series| benchmark(&series, window, bt_config.risk_free_rate));
    match result {
        Ok(b) => Some(b),
        Err(e) => {
            warn!(%ticker, error = %e, "benchmark unavailable");
            eprintln!("warning: skipping benchmark {} ({})", ticker, e);
            None
        }
    }
}

fn print_summary(runs: &[StrategyRun], bench: Option<&Benchmark>) {
    for run in runs {
        eprintln!("\n=== {} weights (latest) ===", run.kind);
        for (ticker, weight) in run.latest_weights().iter() {
            eprintln!("  {:<12} {:>7.2}%", ticker, weight * 100.0);
        }
        if let Some(theoretical) = run.theoretical() {
            print_report(&format!("{} (theoretical)", run.kind), theoretical);
        }
        print_report(&format!("{} (backtest)", run.kind), &run.report);
    }
    if let Some(b) = bench {
        print_report(&format!("Benchmark {}", b.ticker), &b.report);
    }
}

pub fn run_dry_run(config_path: &Path, tickers_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&config) {
        return fail(e);
    }
    if has_predictions(&config) {
        if let Err(e) = validate_prediction_config(&config) {
            return fail(e);
        }
    }
    eprintln!("Config validated successfully");

    let settings = match build_strategy_settings(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let tickers = match resolve_tickers(tickers_override, &config) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let data_port = match data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let bt = &settings.backtest;

    eprintln!("\nUniverse:");
    eprintln!("  tickers:   {}", tickers.join(", "));
    eprintln!(
        "  benchmark: {}",
        benchmark_ticker(&config).unwrap_or_else(|| "none".into())
    );

    eprintln!("\nBacktest:");
    eprintln!(
        "  dates:     {} to {}",
        bt.start_date.map_or_else(|| String::from("first"), |d| d.to_string()),
        bt.end_date.map_or_else(|| String::from("last"), |d| d.to_string())
    );
    eprintln!("  rebalance: {}", bt.rebalance);
    eprintln!("  lookback:  {} days", bt.lookback_days);
    eprintln!("  risk-free: {:.2}%", bt.risk_free_rate * 100.0);

    eprintln!("\nStrategies:");
    eprintln!(
        "  markowitz (max_iterations {}, tolerance {:e})",
        settings.markowitz.optimizer.max_iterations, settings.markowitz.optimizer.tolerance
    );
    if has_predictions(&config) {
        eprintln!("  prediction (policy {})", settings.policy);
    }

    eprintln!("\nData:");
    for ticker in &tickers {
        match data_port.get_data_range(ticker) {
            Ok(Some((first, last, count))) => {
                eprintln!("  {}: {} prices, {} to {}", ticker, count, first, last)
            }
            Ok(None) => eprintln!("  {}: no data found", ticker),
            Err(e) => eprintln!("  {}: {}", ticker, e),
        }
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&config) {
        return fail(e);
    }
    if has_predictions(&config) {
        if let Err(e) = validate_prediction_config(&config) {
            return fail(e);
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(ticker: Option<&str>, config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let tickers = match resolve_tickers(ticker, &config) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let adapter = match data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    for t in &tickers {
        match adapter.get_data_range(t) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} prices, {} to {}", t, count, first, last);
            }
            Ok(None) => {
                eprintln!("{}: no data found", t);
            }
            Err(e) => {
                eprintln!("error reading {}: {}", t, e);
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let adapter = match data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let symbols = match adapter.list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
