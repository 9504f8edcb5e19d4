//! Long-only weight vectors and dated weight schedules.

use chrono::NaiveDate;

use super::error::PortoptError;

/// Allowed deviation of the weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
/// Solver round-off tolerated below zero or above one before rejecting.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Ticker → weight; weights lie in `[0, 1]` and sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    tickers: Vec<String>,
    weights: Vec<f64>,
}

impl WeightVector {
    pub fn new(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self, PortoptError> {
        if tickers.is_empty() {
            return Err(PortoptError::EmptyUniverse);
        }
        if tickers.len() != weights.len() {
            return Err(PortoptError::DimensionMismatch {
                reason: format!("{} tickers but {} weights", tickers.len(), weights.len()),
            });
        }

        let mut clamped = Vec::with_capacity(weights.len());
        for (ticker, &w) in tickers.iter().zip(&weights) {
            if !w.is_finite() || w < -BOUND_TOLERANCE || w > 1.0 + BOUND_TOLERANCE {
                return Err(PortoptError::InvalidWeights {
                    reason: format!("weight for {ticker} is {w}, must be in [0, 1]"),
                });
            }
            clamped.push(w.clamp(0.0, 1.0));
        }

        let sum: f64 = clamped.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PortoptError::InvalidWeights {
                reason: format!("weights sum to {sum}, expected 1"),
            });
        }

        Ok(Self {
            tickers,
            weights: clamped,
        })
    }

    pub fn equal(tickers: &[String]) -> Result<Self, PortoptError> {
        let n = tickers.len();
        if n == 0 {
            return Err(PortoptError::EmptyUniverse);
        }
        Self::new(tickers.to_vec(), vec![1.0 / n as f64; n])
    }

    /// Everything in `ticker`.
    pub fn single(ticker: &str) -> Self {
        Self {
            tickers: vec![ticker.to_string()],
            weights: vec![1.0],
        }
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Result<Self, PortoptError> {
        Self::new(
            pairs.iter().map(|(t, _)| t.to_string()).collect(),
            pairs.iter().map(|(_, w)| *w).collect(),
        )
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.tickers
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }

    /// Weight of `ticker`, zero when absent.
    pub fn get(&self, ticker: &str) -> f64 {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.weights[i])
            .unwrap_or(0.0)
    }

    /// Weights in the column order of `tickers`. A positive weight on a
    /// ticker missing from `tickers` is an error.
    pub fn aligned_to(&self, tickers: &[String]) -> Result<Vec<f64>, PortoptError> {
        for (ticker, w) in self.iter() {
            if w > 0.0 && !tickers.iter().any(|t| t == ticker) {
                return Err(PortoptError::DimensionMismatch {
                    reason: format!("weighted ticker {ticker} has no price history"),
                });
            }
        }
        Ok(tickers.iter().map(|t| self.get(t)).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub effective: NaiveDate,
    pub weights: WeightVector,
}

/// Weight vectors ordered by the date they take effect.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSchedule {
    entries: Vec<ScheduleEntry>,
}

impl WeightSchedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Result<Self, PortoptError> {
        if entries.is_empty() {
            return Err(PortoptError::InvalidWeights {
                reason: "weight schedule is empty".into(),
            });
        }
        for pair in entries.windows(2) {
            if pair[1].effective <= pair[0].effective {
                return Err(PortoptError::NonMonotonicDates {
                    ticker: "weight schedule".into(),
                    previous: pair[0].effective,
                    date: pair[1].effective,
                });
            }
        }
        Ok(Self { entries })
    }

    /// A single vector in effect for the whole history.
    pub fn buy_and_hold(weights: WeightVector) -> Self {
        Self {
            entries: vec![ScheduleEntry {
                effective: NaiveDate::MIN,
                weights,
            }],
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_buy_and_hold(&self) -> bool {
        self.entries.len() == 1
    }

    /// Index of the entry with the latest effective date on or before `date`.
    pub fn index_at(&self, date: NaiveDate) -> Option<usize> {
        self.entries
            .partition_point(|e| e.effective <= date)
            .checked_sub(1)
    }

    pub fn weights_at(&self, date: NaiveDate) -> Option<&WeightVector> {
        self.index_at(date).map(|i| &self.entries[i].weights)
    }

    pub fn last(&self) -> &WeightVector {
        &self.entries[self.entries.len() - 1].weights
    }
}
