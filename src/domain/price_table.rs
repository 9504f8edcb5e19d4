//! Price histories aligned on a common trading calendar.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use super::error::PortoptError;
use super::price::{simple_return, PricePoint, PriceSeries};

/// Closing prices for several tickers on the dates all of them traded.
///
/// Rows are dates in increasing order, columns follow `tickers`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Aligns the series on the intersection of their dates.
    pub fn align(series: &[PriceSeries]) -> Result<Self, PortoptError> {
        if series.is_empty() {
            return Err(PortoptError::EmptyUniverse);
        }

        let mut seen = BTreeSet::new();
        for s in series {
            if !seen.insert(s.ticker()) {
                return Err(PortoptError::DimensionMismatch {
                    reason: format!("ticker {} appears twice", s.ticker()),
                });
            }
        }

        let lookups: Vec<HashMap<NaiveDate, f64>> = series
            .iter()
            .map(|s| s.points().iter().map(|p| (p.date, p.close)).collect())
            .collect();

        let common: BTreeSet<NaiveDate> = series[0]
            .points()
            .iter()
            .map(|p| p.date)
            .filter(|date| lookups.iter().all(|l| l.contains_key(date)))
            .collect();

        if common.len() < 2 {
            return Err(PortoptError::insufficient(format!(
                "{} overlapping trading days across {} tickers, need at least 2",
                common.len(),
                series.len()
            )));
        }

        let dates: Vec<NaiveDate> = common.into_iter().collect();
        let rows = dates
            .iter()
            .map(|date| lookups.iter().map(|l| l[date]).collect())
            .collect();

        Ok(Self {
            tickers: series.iter().map(|s| s.ticker().to_string()).collect(),
            dates,
            rows,
        })
    }

    /// Builds a table from already-aligned rows.
    pub fn from_rows(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, PortoptError> {
        if tickers.is_empty() {
            return Err(PortoptError::EmptyUniverse);
        }
        if dates.len() != rows.len() {
            return Err(PortoptError::DimensionMismatch {
                reason: format!("{} dates but {} rows", dates.len(), rows.len()),
            });
        }
        // Per-ticker validation gives the same guarantees as `align`.
        let series = tickers
            .iter()
            .enumerate()
            .map(|(j, ticker)| {
                let points = dates
                    .iter()
                    .zip(&rows)
                    .map(|(&date, row)| {
                        row.get(j)
                            .map(|&close| PricePoint::new(date, close))
                            .ok_or_else(|| PortoptError::DimensionMismatch {
                                reason: format!("row for {} has {} columns", date, row.len()),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                PriceSeries::new(ticker.clone(), points)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if rows.iter().any(|r| r.len() != tickers.len()) {
            return Err(PortoptError::DimensionMismatch {
                reason: format!("rows must have {} columns", tickers.len()),
            });
        }
        if series[0].len() < 2 {
            return Err(PortoptError::insufficient(format!(
                "{} trading days, need at least 2",
                series[0].len()
            )));
        }

        Ok(Self {
            tickers,
            dates,
            rows,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.tickers.len()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Daily simple returns, one row per date after the first.
    pub fn returns(&self) -> Vec<Vec<f64>> {
        self.rows
            .windows(2)
            .map(|w| {
                w[0].iter()
                    .zip(&w[1])
                    .map(|(&prev, &curr)| simple_return(prev, curr))
                    .collect()
            })
            .collect()
    }

    /// Rows dated on or before `date`. This is the only history a decision
    /// taken at `date` may see.
    pub fn history_through(&self, date: NaiveDate) -> Option<PriceTable> {
        let end = self.dates.partition_point(|d| *d <= date);
        if end == 0 {
            return None;
        }
        Some(self.slice(0, end))
    }

    /// Rows from `start` to `end` inclusive.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Result<PriceTable, PortoptError> {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end);
        if to <= from + 1 {
            return Err(PortoptError::insufficient(format!(
                "{} trading days between {} and {}, need at least 2",
                to.saturating_sub(from),
                start,
                end
            )));
        }
        Ok(self.slice(from, to))
    }

    /// Rows starting at `index`.
    pub fn tail_from(&self, index: usize) -> Result<PriceTable, PortoptError> {
        if index + 2 > self.len() {
            return Err(PortoptError::insufficient(format!(
                "{} trading days after offset {}, need at least 2",
                self.len().saturating_sub(index),
                index
            )));
        }
        Ok(self.slice(index, self.len()))
    }

    fn slice(&self, from: usize, to: usize) -> PriceTable {
        PriceTable {
            tickers: self.tickers.clone(),
            dates: self.dates[from..to].to_vec(),
            rows: self.rows[from..to].to_vec(),
        }
    }
}
