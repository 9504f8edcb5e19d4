//! Strategy pipelines: estimation window → weight schedule → backtest.
//!
//! The first `lookback_days` rows of the price table are estimation history.
//! The evaluation window starts at that row, and every allocation inside it
//! is computed from the rows up to its own boundary.

use std::fmt;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::allocator::{allocate, AllocationPolicy};
use super::backtest::{backtest, BacktestConfig};
use super::equity::EquityCurve;
use super::error::PortoptError;
use super::estimator::estimate_with;
use super::metrics::PerformanceReport;
use super::optimizer::{optimize_markowitz_with, MarkowitzSettings};
use super::prediction::PredictionSet;
use super::price::PriceSeries;
use super::price_table::PriceTable;
use super::rebalance::{boundary_dates, build_schedule, RebalancePlan};
use super::weights::{WeightSchedule, WeightVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Markowitz,
    Prediction,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Markowitz => "markowitz",
            StrategyKind::Prediction => "prediction",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategySettings {
    pub backtest: BacktestConfig,
    pub markowitz: MarkowitzSettings,
    pub policy: AllocationPolicy,
}

/// A strategy's allocations and their backtest over the evaluation window.
#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub kind: StrategyKind,
    pub plan: RebalancePlan,
    pub equity: EquityCurve,
    /// Realized metrics, carrying every degradation seen while allocating.
    pub report: PerformanceReport,
}

impl StrategyRun {
    /// Weights of the most recent allocation.
    pub fn latest_weights(&self) -> &WeightVector {
        self.plan.schedule.last()
    }

    /// Theoretical metrics of the most recent allocation.
    pub fn theoretical(&self) -> Option<&PerformanceReport> {
        self.plan.latest_report()
    }
}

/// Buy-and-hold of a single reference asset over the evaluation window.
#[derive(Debug, Clone)]
pub struct Benchmark {
    pub ticker: String,
    pub equity: EquityCurve,
    pub report: PerformanceReport,
}

pub fn evaluation_window(table: &PriceTable, lookback: usize) -> Result<PriceTable, PortoptError> {
    table.tail_from(lookback)
}

/// Max-Sharpe weights at each rebalance boundary.
pub fn plan_markowitz(
    table: &PriceTable,
    settings: &StrategySettings,
) -> Result<RebalancePlan, PortoptError> {
    let boundaries = boundary_dates(
        table,
        settings.backtest.rebalance,
        settings.backtest.lookback_days,
    )?;
    let rf = settings.backtest.risk_free_rate;
    build_schedule(table, &boundaries, |_, history| {
        optimize_markowitz_with(history, rf, &settings.markowitz)
    })
}

/// Prediction-driven weights at each boundary.
///
/// Dated predictions define the boundaries themselves: the evaluation start
/// (when a prediction already applies there) plus every later `as_of` date.
/// Undated predictions follow the configured rebalance calendar, with the
/// covariance re-estimated at each boundary.
pub fn plan_predictions(
    table: &PriceTable,
    predictions: &PredictionSet,
    settings: &StrategySettings,
) -> Result<RebalancePlan, PortoptError> {
    let lookback = settings.backtest.lookback_days;
    let boundaries = if predictions.is_dated() {
        prediction_boundaries(table, predictions, lookback)?
    } else {
        boundary_dates(table, settings.backtest.rebalance, lookback)?
    };

    let rf = settings.backtest.risk_free_rate;
    build_schedule(table, &boundaries, |date, history| {
        let predicted = predictions.latest_through(date).ok_or_else(|| {
            PortoptError::insufficient(format!("no prediction available on {date}"))
        })?;
        let estimates = estimate_with(history, &settings.markowitz.estimator)?;
        allocate(
            predicted,
            &estimates.covariance,
            rf,
            settings.policy,
            &settings.markowitz.optimizer,
        )
    })
}

fn prediction_boundaries(
    table: &PriceTable,
    predictions: &PredictionSet,
    lookback: usize,
) -> Result<Vec<NaiveDate>, PortoptError> {
    let window = evaluation_window(table, lookback)?;
    let (start, end) = (window.first_date(), window.last_date());

    let mut boundaries = Vec::new();
    if predictions.latest_through(start).is_some() {
        boundaries.push(start);
    }
    boundaries.extend(
        predictions
            .as_of_dates()
            .into_iter()
            .filter(|d| *d > start && *d <= end),
    );

    let skipped = predictions
        .as_of_dates()
        .iter()
        .filter(|d| **d > end)
        .count();
    if skipped > 0 {
        warn!(skipped, %end, "predictions dated after the last price ignored");
    }
    if boundaries.is_empty() {
        return Err(PortoptError::insufficient(format!(
            "no prediction applies between {start} and {end}"
        )));
    }
    Ok(boundaries)
}

/// Backtests `plan` over the evaluation window.
pub fn evaluate(
    kind: StrategyKind,
    table: &PriceTable,
    plan: RebalancePlan,
    settings: &StrategySettings,
) -> Result<StrategyRun, PortoptError> {
    let window = evaluation_window(table, settings.backtest.lookback_days)?;
    let (equity, report) = backtest(&plan.schedule, &window, settings.backtest.risk_free_rate)?;

    let report = plan
        .reports
        .iter()
        .flat_map(|(_, r)| r.degradations.iter().copied())
        .fold(report, PerformanceReport::with_degradation);

    let degraded = plan.degraded_boundaries();
    if !degraded.is_empty() {
        warn!(strategy = %kind, count = degraded.len(), "allocations used a fallback");
    }
    info!(
        strategy = %kind,
        boundaries = plan.schedule.len(),
        days = window.len(),
        "backtest complete"
    );

    Ok(StrategyRun {
        kind,
        plan,
        equity,
        report,
    })
}

pub fn run_markowitz(
    table: &PriceTable,
    settings: &StrategySettings,
) -> Result<StrategyRun, PortoptError> {
    let plan = plan_markowitz(table, settings)?;
    evaluate(StrategyKind::Markowitz, table, plan, settings)
}

pub fn run_predictions(
    table: &PriceTable,
    predictions: &PredictionSet,
    settings: &StrategySettings,
) -> Result<StrategyRun, PortoptError> {
    let plan = plan_predictions(table, predictions, settings)?;
    evaluate(StrategyKind::Prediction, table, plan, settings)
}

/// Buy-and-hold of `series` over the dates spanned by `window`.
pub fn benchmark(
    series: &PriceSeries,
    window: &PriceTable,
    risk_free_rate: f64,
) -> Result<Benchmark, PortoptError> {
    let prices = PriceTable::align(std::slice::from_ref(series))?
        .between(window.first_date(), window.last_date())?;
    let schedule = WeightSchedule::buy_and_hold(WeightVector::single(series.ticker()));
    let (equity, report) = backtest(&schedule, &prices, risk_free_rate)?;
    Ok(Benchmark {
        ticker: series.ticker().to_string(),
        equity,
        report,
    })
}
