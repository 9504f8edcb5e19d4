//! Performance metrics and statistics.
//!
//! A [`PerformanceReport`] is either *theoretical* (implied by a weight vector,
//! expected returns and covariance) or *realized* (derived from an equity
//! curve). Values that cannot be computed are `None`, never NaN.

use std::fmt;

use super::equity::EquityCurve;
use super::error::PortoptError;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Why a result was produced by a fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// Solver hit its iteration cap; equal weights were substituted.
    NonConvergence { iterations: usize },
    /// Every predicted return was non-positive.
    NonPositivePredictions,
    /// No asset beats the risk-free rate; max-Sharpe may stop at a local optimum.
    NoPositiveExcessReturn,
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::NonConvergence { iterations } => {
                write!(f, "optimizer did not converge in {iterations} iterations")
            }
            Degradation::NonPositivePredictions => {
                write!(f, "all predicted returns are non-positive")
            }
            Degradation::NoPositiveExcessReturn => {
                write!(f, "no expected return exceeds the risk-free rate")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when volatility is zero.
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub total_multiplier: Option<f64>,
    pub degradations: Vec<Degradation>,
}

impl PerformanceReport {
    /// Metrics implied by a weight vector, without a price path.
    pub fn theoretical(expected_return: f64, volatility: f64, risk_free_rate: f64) -> Self {
        Self {
            expected_return,
            volatility,
            sharpe_ratio: sharpe_ratio(expected_return, volatility, risk_free_rate),
            max_drawdown: None,
            total_multiplier: None,
            degradations: Vec::new(),
        }
    }

    /// Realized metrics of an equity curve.
    pub fn compute(curve: &EquityCurve, risk_free_rate: f64) -> Result<Self, PortoptError> {
        let n = curve.len();
        if n < 2 {
            return Err(PortoptError::insufficient(format!(
                "equity curve has {n} points, need at least 2"
            )));
        }

        let values = curve.values();
        let total_multiplier = values[n - 1] / values[0];
        let annualized_return = total_multiplier.powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0;
        let volatility = annualized_volatility(&curve.daily_returns());

        Ok(Self {
            expected_return: annualized_return,
            volatility,
            sharpe_ratio: sharpe_ratio(annualized_return, volatility, risk_free_rate),
            max_drawdown: Some(compute_drawdown(&values)),
            total_multiplier: Some(total_multiplier),
            degradations: Vec::new(),
        })
    }

    pub fn with_degradation(mut self, degradation: Degradation) -> Self {
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
        self
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

pub fn sharpe_ratio(annual_return: f64, annual_volatility: f64, risk_free_rate: f64) -> Option<f64> {
    if annual_volatility > 0.0 && annual_volatility.is_finite() {
        Some((annual_return - risk_free_rate) / annual_volatility)
    } else {
        None
    }
}

/// Sample standard deviation of daily returns, annualized.
pub fn annualized_volatility(daily_returns: &[f64]) -> f64 {
    if daily_returns.len() < 2 {
        return 0.0;
    }
    let n = daily_returns.len() as f64;
    let mean = daily_returns.iter().sum::<f64>() / n;
    let variance = daily_returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Most negative `equity[t] / running_peak - 1`, in `[-1, 0]`.
fn compute_drawdown(values: &[f64]) -> f64 {
    let Some(&first) = values.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &v in values {
        if v > peak {
            peak = v;
        } else if peak > 0.0 {
            let dd = v / peak - 1.0;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd.clamp(-1.0, 0.0)
}
