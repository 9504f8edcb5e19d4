//! Equity curve produced by a backtest.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Portfolio value per trading day, starting at 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new(points: Vec<EquityPoint>) -> Self {
        Self { points }
    }

    /// Builds a curve from raw values on the given dates.
    pub fn from_values(dates: &[NaiveDate], values: &[f64]) -> Self {
        Self {
            points: dates
                .iter()
                .zip(values)
                .map(|(&date, &equity)| EquityPoint { date, equity })
                .collect(),
        }
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }

    pub fn first(&self) -> Option<&EquityPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }

    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| {
                if w[0].equity > 0.0 {
                    w[1].equity / w[0].equity - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}
