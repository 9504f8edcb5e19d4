//! Per-ticker adjusted-close price history.

use chrono::NaiveDate;

use super::error::PortoptError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// An ordered, validated price history for one ticker.
///
/// Dates are strictly increasing and every close is finite and positive.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, PortoptError> {
        let ticker = ticker.into();

        for point in &points {
            if !point.close.is_finite() || point.close <= 0.0 {
                return Err(PortoptError::InvalidPrice {
                    ticker,
                    date: point.date,
                    price: point.close,
                });
            }
        }

        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(PortoptError::NonMonotonicDates {
                    ticker,
                    previous: pair[0].date,
                    date: pair[1].date,
                });
            }
        }

        Ok(Self { ticker, points })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].close)
    }

    /// `p_t / p_{t-1} - 1`; one element shorter than the series.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| simple_return(w[0].close, w[1].close))
            .collect()
    }
}

pub fn simple_return(prev: f64, curr: f64) -> f64 {
    curr / prev - 1.0
}
