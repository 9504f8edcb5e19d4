//! Backtest simulator.
//!
//! Replays a [`WeightSchedule`] across a [`PriceTable`]. The portfolio is held
//! at its target weights every day (constant mix), so the return for day `t`
//! is the weighted sum of asset returns from `t - 1` to `t`, using the weights
//! in effect at `t - 1`. Before the first effective date the portfolio sits in
//! cash. Frictionless: no costs, no slippage.

use chrono::NaiveDate;
use tracing::debug;

use super::equity::EquityCurve;
use super::error::PortoptError;
use super::metrics::PerformanceReport;
use super::price::simple_return;
use super::price_table::PriceTable;
use super::rebalance::RebalanceFreq;
use super::weights::WeightSchedule;

/// Run-level settings for a backtest.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Inclusive date bounds applied to the loaded history.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub risk_free_rate: f64,
    pub rebalance: RebalanceFreq,
    /// Rows reserved for estimation before the evaluation window starts.
    pub lookback_days: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            risk_free_rate: 0.02,
            rebalance: RebalanceFreq::Never,
            lookback_days: 252,
        }
    }
}

impl BacktestConfig {
    /// Restricts `table` to the configured date bounds.
    pub fn restrict(&self, table: &PriceTable) -> Result<PriceTable, PortoptError> {
        match (self.start_date, self.end_date) {
            (None, None) => Ok(table.clone()),
            (start, end) => table.between(
                start.unwrap_or(NaiveDate::MIN),
                end.unwrap_or(NaiveDate::MAX),
            ),
        }
    }
}

/// Equity curve of `schedule` over `prices`, one point per row, starting at 1.
pub fn simulate(schedule: &WeightSchedule, prices: &PriceTable) -> Result<EquityCurve, PortoptError> {
    if prices.len() < 2 {
        return Err(PortoptError::insufficient(format!(
            "{} trading days, need at least 2 to simulate",
            prices.len()
        )));
    }

    let aligned = schedule
        .entries()
        .iter()
        .map(|e| e.weights.aligned_to(prices.tickers()))
        .collect::<Result<Vec<_>, _>>()?;

    let dates = prices.dates();
    let mut values = Vec::with_capacity(dates.len());
    let mut equity = 1.0;
    values.push(equity);

    for t in 1..dates.len() {
        let daily = match schedule.index_at(dates[t - 1]) {
            Some(i) => prices
                .row(t - 1)
                .iter()
                .zip(prices.row(t))
                .zip(&aligned[i])
                .map(|((&prev, &curr), w)| w * simple_return(prev, curr))
                .sum(),
            None => 0.0,
        };
        equity *= 1.0 + daily;
        values.push(equity);
    }

    debug!(
        days = dates.len(),
        entries = schedule.len(),
        final_equity = equity,
        "simulated schedule"
    );
    Ok(EquityCurve::from_values(dates, &values))
}

/// Simulates `schedule` and derives realized metrics from the equity curve.
pub fn backtest(
    schedule: &WeightSchedule,
    prices: &PriceTable,
    risk_free_rate: f64,
) -> Result<(EquityCurve, PerformanceReport), PortoptError> {
    let curve = simulate(schedule, prices)?;
    let report = PerformanceReport::compute(&curve, risk_free_rate)?;
    Ok((curve, report))
}
