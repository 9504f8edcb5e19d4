//! Long-only mean-variance optimization.
//!
//! Both solvers run projected gradient ascent on the unit simplex from the
//! equal-weight point, with an Armijo backtracking step search. The path is
//! fully deterministic: identical inputs give identical weights.
//!
//! When the iteration cap is hit the result falls back to equal weights and
//! the report carries [`Degradation::NonConvergence`]. A max-Sharpe result
//! where no asset beats the risk-free rate carries
//! [`Degradation::NoPositiveExcessReturn`].

use tracing::{debug, warn};

use super::error::PortoptError;
use super::estimator::{estimate_with, CovarianceMatrix, EstimatorSettings, ExpectedReturns};
use super::metrics::{Degradation, PerformanceReport};
use super::price_table::PriceTable;
use super::weights::WeightVector;

/// Sufficient-increase constant of the Armijo condition.
const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const MAX_STEP: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }
}

/// Settings for the estimate-then-optimize entry point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarkowitzSettings {
    pub estimator: EstimatorSettings,
    pub optimizer: OptimizerSettings,
}

/// Raw solver output, in the covariance's ticker order.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Estimates returns and covariance from `history`, then maximizes Sharpe.
pub fn optimize_markowitz(
    history: &PriceTable,
    risk_free_rate: f64,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    optimize_markowitz_with(history, risk_free_rate, &MarkowitzSettings::default())
}

pub fn optimize_markowitz_with(
    history: &PriceTable,
    risk_free_rate: f64,
    settings: &MarkowitzSettings,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let estimates = estimate_with(history, &settings.estimator)?;
    optimize(
        &estimates.expected_returns,
        &estimates.covariance,
        risk_free_rate,
        &settings.optimizer,
    )
}

/// Maximum-Sharpe weights and their theoretical metrics.
pub fn optimize(
    expected: &ExpectedReturns,
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
    settings: &OptimizerSettings,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let mu = aligned_returns(expected, covariance)?;
    let solution = max_sharpe(&mu, covariance, risk_free_rate, settings);
    let (weights, report) = finish("max-sharpe", solution, &mu, covariance, risk_free_rate)?;
    // Sharpe is not quasi-concave on the simplex once every excess return is negative.
    if mu.iter().all(|&m| m <= risk_free_rate) {
        warn!(risk_free_rate, "no expected return exceeds the risk-free rate");
        return Ok((
            weights,
            report.with_degradation(Degradation::NoPositiveExcessReturn),
        ));
    }
    Ok((weights, report))
}

/// Minimum-variance weights, reported against `expected`.
pub fn optimize_min_variance(
    expected: &ExpectedReturns,
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
    settings: &OptimizerSettings,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let mu = aligned_returns(expected, covariance)?;
    let solution = min_variance(covariance, settings);
    finish("min-variance", solution, &mu, covariance, risk_free_rate)
}

pub fn max_sharpe(
    mu: &[f64],
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
    settings: &OptimizerSettings,
) -> Solution {
    let objective = |w: &[f64]| {
        let (ret, vol) = portfolio_stats(w, mu, covariance);
        (ret - risk_free_rate) / vol.max(f64::MIN_POSITIVE)
    };
    // d/dw (w·μ - rf)/σ = μ/σ - (w·μ - rf) Σw / σ³
    let gradient = |w: &[f64]| {
        let sigma_w = covariance.mul_vec(w);
        let var: f64 = sigma_w.iter().zip(w).map(|(a, b)| a * b).sum();
        let vol = var.max(f64::MIN_POSITIVE).sqrt();
        let excess = dot(w, mu) - risk_free_rate;
        mu.iter()
            .zip(&sigma_w)
            .map(|(m, s)| m / vol - excess * s / (vol * vol * vol))
            .collect()
    };
    ascend(covariance.dim(), objective, gradient, settings)
}

pub fn min_variance(covariance: &CovarianceMatrix, settings: &OptimizerSettings) -> Solution {
    let objective = |w: &[f64]| -covariance.quadratic_form(w);
    let gradient = |w: &[f64]| covariance.mul_vec(w).iter().map(|s| -2.0 * s).collect();
    ascend(covariance.dim(), objective, gradient, settings)
}

/// Annualized expected return and volatility of `weights`.
pub fn portfolio_stats(weights: &[f64], mu: &[f64], covariance: &CovarianceMatrix) -> (f64, f64) {
    let ret = dot(weights, mu);
    let vol = covariance.quadratic_form(weights).max(0.0).sqrt();
    (ret, vol)
}

/// Euclidean projection onto `{w : w >= 0, sum(w) = 1}`.
pub fn project_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }

    let mut u = v.to_vec();
    u.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut rho = 0;
    let mut theta = 0.0;
    for (i, &ui) in u.iter().enumerate() {
        cumulative += ui;
        let t = (cumulative - 1.0) / (i + 1) as f64;
        if ui - t > 0.0 {
            rho = i + 1;
            theta = t;
        }
    }

    if rho == 0 {
        return equal_weights(v.len());
    }
    normalize_long_only(v.iter().map(|x| (x - theta).max(0.0)).collect())
}

pub fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

fn normalize_long_only(mut w: Vec<f64>) -> Vec<f64> {
    for x in &mut w {
        if !x.is_finite() || *x < 0.0 {
            *x = 0.0;
        }
    }
    let sum: f64 = w.iter().sum();
    if sum <= 0.0 {
        return equal_weights(w.len());
    }
    w.iter().map(|x| x / sum).collect()
}

fn ascend<F, G>(n: usize, objective: F, gradient: G, settings: &OptimizerSettings) -> Solution
where
    F: Fn(&[f64]) -> f64,
    G: Fn(&[f64]) -> Vec<f64>,
{
    let mut w = equal_weights(n);
    let mut f = objective(&w);
    let mut step = 1.0;

    for iteration in 1..=settings.max_iterations {
        let g = gradient(&w);

        let mut t = step;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = w.iter().zip(&g).map(|(wi, gi)| wi + t * gi).collect();
            let candidate = project_simplex(&trial);
            let f_candidate = objective(&candidate);
            let ascent: f64 = g
                .iter()
                .zip(candidate.iter().zip(&w))
                .map(|(gi, (c, wi))| gi * (c - wi))
                .sum();
            if f_candidate >= f + ARMIJO_C * ascent {
                accepted = Some((candidate, f_candidate));
                break;
            }
            t *= 0.5;
        }

        let Some((next, f_next)) = accepted else {
            // No step along the projected gradient improves the objective.
            return Solution {
                weights: w,
                iterations: iteration,
                converged: true,
            };
        };

        let moved = distance(&next, &w);
        let change = (f_next - f).abs();
        w = next;
        f = f_next;

        if moved <= settings.tolerance
            || (change <= settings.tolerance * (1.0 + f.abs()) && moved <= settings.tolerance.sqrt())
        {
            return Solution {
                weights: w,
                iterations: iteration,
                converged: true,
            };
        }
        step = (t * 2.0).min(MAX_STEP);
    }

    Solution {
        weights: w,
        iterations: settings.max_iterations,
        converged: false,
    }
}

fn finish(
    label: &str,
    solution: Solution,
    mu: &[f64],
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let tickers = covariance.tickers().to_vec();

    if !solution.converged {
        warn!(
            solver = label,
            iterations = solution.iterations,
            "optimizer did not converge, falling back to equal weights"
        );
        let weights = equal_weights(tickers.len());
        let (ret, vol) = portfolio_stats(&weights, mu, covariance);
        let report = PerformanceReport::theoretical(ret, vol, risk_free_rate).with_degradation(
            Degradation::NonConvergence {
                iterations: solution.iterations,
            },
        );
        return Ok((WeightVector::new(tickers, weights)?, report));
    }

    debug!(
        solver = label,
        iterations = solution.iterations,
        "optimizer converged"
    );
    let (ret, vol) = portfolio_stats(&solution.weights, mu, covariance);
    let report = PerformanceReport::theoretical(ret, vol, risk_free_rate);
    Ok((WeightVector::new(tickers, solution.weights)?, report))
}

fn aligned_returns(
    expected: &ExpectedReturns,
    covariance: &CovarianceMatrix,
) -> Result<Vec<f64>, PortoptError> {
    if expected.len() != covariance.dim() {
        return Err(PortoptError::DimensionMismatch {
            reason: format!(
                "{} expected returns for a {}x{} covariance",
                expected.len(),
                covariance.dim(),
                covariance.dim()
            ),
        });
    }
    Ok(expected.reindexed(covariance.tickers())?.values().to_vec())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
