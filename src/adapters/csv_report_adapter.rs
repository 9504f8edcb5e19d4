//! CSV report adapter.
//!
//! Per strategy, writes `<strategy>_weights.csv` (one row per boundary and
//! ticker) and `<strategy>_equity.csv` (one row per trading day, with the
//! benchmark alongside when one is given), then appends a row to
//! `summary.csv`.

use crate::domain::error::PortoptError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::strategy::{Benchmark, StrategyRun};
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use tracing::info;

pub const SUMMARY_FILE: &str = "summary.csv";

const SUMMARY_HEADER: [&str; 13] = [
    "strategy",
    "boundaries",
    "theoretical_return",
    "theoretical_volatility",
    "theoretical_sharpe",
    "annualized_return",
    "volatility",
    "sharpe_ratio",
    "max_drawdown",
    "total_multiplier",
    "benchmark",
    "benchmark_return",
    "degradations",
];

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn fmt_value(value: f64) -> String {
    format!("{:.6}", value)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_value).unwrap_or_default()
}

fn write_weights(run: &StrategyRun, path: &Path) -> Result<(), PortoptError> {
    let mut wtr = csv::Writer::from_path(path).map_err(io::Error::from)?;
    wtr.write_record(["effective_date", "ticker", "weight"])
        .map_err(io::Error::from)?;
    for entry in run.plan.schedule.entries() {
        let date = entry.effective.to_string();
        for (ticker, weight) in entry.weights.iter() {
            wtr.write_record([date.as_str(), ticker, fmt_value(weight).as_str()])
                .map_err(io::Error::from)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn write_equity(
    run: &StrategyRun,
    benchmark: Option<&Benchmark>,
    path: &Path,
) -> Result<(), PortoptError> {
    let bench: HashMap<NaiveDate, f64> = benchmark
        .map(|b| b.equity.points().iter().map(|p| (p.date, p.equity)).collect())
        .unwrap_or_default();

    let mut wtr = csv::Writer::from_path(path).map_err(io::Error::from)?;
    let header = match benchmark {
        Some(b) => wtr.write_record(["date", "equity", b.ticker.as_str()]),
        None => wtr.write_record(["date", "equity"]),
    };
    header.map_err(io::Error::from)?;

    for point in run.equity.points() {
        let mut record = vec![point.date.to_string(), fmt_value(point.equity)];
        if benchmark.is_some() {
            record.push(fmt_opt(bench.get(&point.date).copied()));
        }
        wtr.write_record(&record).map_err(io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

fn summary_row(run: &StrategyRun, benchmark: Option<&Benchmark>) -> Vec<String> {
    let theoretical = run.theoretical();
    let field = |f: fn(&PerformanceReport) -> Option<f64>| fmt_opt(theoretical.and_then(f));
    let report = &run.report;
    vec![
        run.kind.to_string(),
        run.plan.schedule.len().to_string(),
        field(|r| Some(r.expected_return)),
        field(|r| Some(r.volatility)),
        field(|r| r.sharpe_ratio),
        fmt_value(report.expected_return),
        fmt_value(report.volatility),
        fmt_opt(report.sharpe_ratio),
        fmt_opt(report.max_drawdown),
        fmt_opt(report.total_multiplier),
        benchmark.map(|b| b.ticker.clone()).unwrap_or_default(),
        fmt_opt(benchmark.map(|b| b.report.expected_return)),
        report
            .degradations
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; "),
    ]
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        run: &StrategyRun,
        benchmark: Option<&Benchmark>,
        output_dir: &Path,
    ) -> Result<(), PortoptError> {
        fs::create_dir_all(output_dir)?;

        let name = run.kind.name();
        write_weights(run, &output_dir.join(format!("{name}_weights.csv")))?;
        write_equity(run, benchmark, &output_dir.join(format!("{name}_equity.csv")))?;

        let summary_path = output_dir.join(SUMMARY_FILE);
        let needs_header = !summary_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&summary_path)?;
        let mut wtr = csv::Writer::from_writer(file);
        if needs_header {
            wtr.write_record(SUMMARY_HEADER).map_err(io::Error::from)?;
        }
        wtr.write_record(summary_row(run, benchmark))
            .map_err(io::Error::from)?;
        wtr.flush()?;

        info!(strategy = name, dir = %output_dir.display(), "report written");
        Ok(())
    }
}
