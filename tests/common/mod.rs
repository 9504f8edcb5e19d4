#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use portopt::domain::error::PortoptError;
use portopt::domain::estimator::ExpectedReturns;
use portopt::domain::prediction::PredictionSet;
pub use portopt::domain::price::{PricePoint, PriceSeries};
use portopt::domain::price_table::PriceTable;
use portopt::ports::data_port::DataPort;
use portopt::ports::prediction_port::PredictionPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, PortoptError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PortoptError::Data {
                reason: reason.clone(),
            });
        }
        let Some(points) = self.data.get(ticker) else {
            return Err(PortoptError::NoData {
                ticker: ticker.to_string(),
            });
        };
        let points = points
            .iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .cloned()
            .collect();
        PriceSeries::new(ticker, points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortoptError> {
        let mut symbols: Vec<_> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortoptError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PortoptError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(ticker) {
            Some(points) if !points.is_empty() => Ok(Some((
                points[0].date,
                points[points.len() - 1].date,
                points.len(),
            ))),
            _ => Ok(None),
        }
    }
}

pub struct MockPredictionPort {
    pub predictions: PredictionSet,
}

impl PredictionPort for MockPredictionPort {
    fn fetch_predictions(&self, _tickers: &[String]) -> Result<PredictionSet, PortoptError> {
        Ok(self.predictions.clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays from `start` (inclusive when it is a weekday).
pub fn trading_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut d = start;
    while dates.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(d);
        }
        d += Duration::days(1);
    }
    dates
}

pub fn points(dates: &[NaiveDate], closes: &[f64]) -> Vec<PricePoint> {
    dates
        .iter()
        .zip(closes)
        .map(|(&d, &c)| PricePoint::new(d, c))
        .collect()
}

/// Deterministic wavy path with drift; distinct `phase` values give
/// imperfectly correlated assets.
pub fn wave_closes(n: usize, base: f64, drift: f64, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            base * (1.0 + drift).powf(t) * (1.0 + 0.02 * (t * (0.7 + 0.11 * phase) + phase).sin())
        })
        .collect()
}

pub fn wave_table(tickers: &[&str], n: usize) -> PriceTable {
    let dates = trading_dates(date(2021, 1, 4), n);
    let columns: Vec<Vec<f64>> = tickers
        .iter()
        .enumerate()
        .map(|(k, _)| wave_closes(n, 50.0 + 25.0 * k as f64, 0.0002 * (k + 1) as f64, 1.3 * k as f64))
        .collect();
    let rows = (0..n).map(|i| columns.iter().map(|c| c[i]).collect()).collect();
    PriceTable::from_rows(tickers.iter().map(|t| t.to_string()).collect(), dates, rows).unwrap()
}

pub fn mock_port_from_table(table: &PriceTable) -> MockDataPort {
    table
        .tickers()
        .iter()
        .enumerate()
        .fold(MockDataPort::new(), |port, (j, ticker)| {
            let closes: Vec<f64> = (0..table.len()).map(|i| table.row(i)[j]).collect();
            port.with_prices(ticker, points(table.dates(), &closes))
        })
}

pub fn expected(pairs: &[(&str, f64)]) -> ExpectedReturns {
    ExpectedReturns::new(
        pairs.iter().map(|(t, _)| t.to_string()).collect(),
        pairs.iter().map(|(_, v)| *v).collect(),
    )
    .unwrap()
}
