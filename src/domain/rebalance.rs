//! Rebalance calendar and schedule construction.
//!
//! A schedule entry dated `t` is computed from `PriceTable::history_through(t)`
//! only, so no decision can see a price after its own boundary. Boundaries are
//! independent of each other and are computed in parallel.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, info};

use super::error::PortoptError;
use super::metrics::PerformanceReport;
use super::price_table::PriceTable;
use super::weights::{ScheduleEntry, WeightSchedule, WeightVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFreq {
    /// One allocation at the start of the evaluation window.
    #[default]
    Never,
    /// Every N trading days.
    Days(usize),
    /// First trading day of each month.
    Monthly,
    /// First trading day of each quarter.
    Quarterly,
    /// First trading day of each year.
    Yearly,
}

impl fmt::Display for RebalanceFreq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFreq::Never => write!(f, "none"),
            RebalanceFreq::Days(n) => write!(f, "{n}d"),
            RebalanceFreq::Monthly => write!(f, "monthly"),
            RebalanceFreq::Quarterly => write!(f, "quarterly"),
            RebalanceFreq::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for RebalanceFreq {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "none" | "never" | "buy-and-hold" => Ok(RebalanceFreq::Never),
            "monthly" => Ok(RebalanceFreq::Monthly),
            "quarterly" => Ok(RebalanceFreq::Quarterly),
            "yearly" | "annual" => Ok(RebalanceFreq::Yearly),
            other => {
                let days = other
                    .strip_suffix('d')
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        format!(
                            "unknown rebalance frequency '{other}' \
                             (expected none, monthly, quarterly, yearly or <N>d)"
                        )
                    })?;
                if days == 0 {
                    return Err("rebalance interval must be at least 1 day".into());
                }
                Ok(RebalanceFreq::Days(days))
            }
        }
    }
}

/// Indices into `dates` where a rebalance happens. The first date is always
/// included.
pub fn find_rebalance_indices(dates: &[NaiveDate], freq: RebalanceFreq) -> Vec<usize> {
    if dates.is_empty() {
        return vec![];
    }

    match freq {
        RebalanceFreq::Never => vec![0],
        RebalanceFreq::Days(n) => (0..dates.len()).step_by(n.max(1)).collect(),
        RebalanceFreq::Monthly => find_period_start_indices(dates, |d| (d.year(), d.month())),
        RebalanceFreq::Quarterly => {
            find_period_start_indices(dates, |d| (d.year(), (d.month() - 1) / 3))
        }
        RebalanceFreq::Yearly => find_period_start_indices(dates, |d| d.year()),
    }
}

fn find_period_start_indices<T: PartialEq>(
    dates: &[NaiveDate],
    period_fn: impl Fn(&NaiveDate) -> T,
) -> Vec<usize> {
    let mut indices = vec![0];
    let mut current = period_fn(&dates[0]);

    for (i, date) in dates.iter().enumerate().skip(1) {
        let period = period_fn(date);
        if period != current {
            indices.push(i);
            current = period;
        }
    }

    indices
}

/// Boundary dates for an evaluation window that starts `lookback` rows into
/// `table`. Earlier rows are estimation history only.
pub fn boundary_dates(
    table: &PriceTable,
    freq: RebalanceFreq,
    lookback: usize,
) -> Result<Vec<NaiveDate>, PortoptError> {
    if lookback + 2 > table.len() {
        return Err(PortoptError::insufficient(format!(
            "{} trading days with a {}-day lookback leaves no evaluation window",
            table.len(),
            lookback
        )));
    }

    let evaluation = &table.dates()[lookback..];
    Ok(find_rebalance_indices(evaluation, freq)
        .into_iter()
        .map(|i| evaluation[i])
        .collect())
}

/// Weights per boundary plus the report each allocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePlan {
    pub schedule: WeightSchedule,
    pub reports: Vec<(NaiveDate, PerformanceReport)>,
}

impl RebalancePlan {
    /// Boundaries whose allocation came from a fallback path.
    pub fn degraded_boundaries(&self) -> Vec<NaiveDate> {
        self.reports
            .iter()
            .filter(|(_, r)| r.is_degraded())
            .map(|(d, _)| *d)
            .collect()
    }

    /// Report of the most recent allocation.
    pub fn latest_report(&self) -> Option<&PerformanceReport> {
        self.reports.last().map(|(_, r)| r)
    }
}

/// Runs `allocate` once per boundary on the history up to and including that
/// boundary.
pub fn build_schedule<F>(
    table: &PriceTable,
    boundaries: &[NaiveDate],
    allocate: F,
) -> Result<RebalancePlan, PortoptError>
where
    F: Fn(NaiveDate, &PriceTable) -> Result<(WeightVector, PerformanceReport), PortoptError>
        + Sync,
{
    if boundaries.is_empty() {
        return Err(PortoptError::insufficient("no rebalance boundaries"));
    }
    info!(boundaries = boundaries.len(), "building weight schedule");

    let results: Vec<(NaiveDate, WeightVector, PerformanceReport)> = boundaries
        .par_iter()
        .map(|&date| {
            let history = table.history_through(date).ok_or_else(|| {
                PortoptError::insufficient(format!("no price history on or before {date}"))
            })?;
            let (weights, report) = allocate(date, &history)?;
            debug!(%date, rows = history.len(), "allocated");
            Ok((date, weights, report))
        })
        .collect::<Result<_, PortoptError>>()?;

    let mut entries = Vec::with_capacity(results.len());
    let mut reports = Vec::with_capacity(results.len());
    for (date, weights, report) in results {
        entries.push(ScheduleEntry {
            effective: date,
            weights,
        });
        reports.push((date, report));
    }

    Ok(RebalancePlan {
        schedule: WeightSchedule::new(entries)?,
        reports,
    })
}
