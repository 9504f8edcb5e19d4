//! Allocation from externally predicted returns.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use super::error::PortoptError;
use super::estimator::{CovarianceMatrix, ExpectedReturns};
use super::metrics::{Degradation, PerformanceReport};
use super::optimizer::{
    equal_weights, optimize, optimize_min_variance, portfolio_stats, OptimizerSettings,
};
use super::weights::WeightVector;

/// How predicted returns become weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Predicted returns go through the max-Sharpe optimizer. All-non-positive
    /// predictions give the minimum-variance portfolio.
    #[default]
    Optimizer,
    /// Weight proportional to `max(prediction, 0)`; equal weights when no
    /// prediction is positive.
    ProportionalClip,
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::Optimizer => write!(f, "optimizer"),
            AllocationPolicy::ProportionalClip => write!(f, "proportional"),
        }
    }
}

impl FromStr for AllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "optimizer" | "sharpe" => Ok(AllocationPolicy::Optimizer),
            "proportional" | "clip" => Ok(AllocationPolicy::ProportionalClip),
            other => Err(format!(
                "unknown allocation policy '{other}' (expected optimizer or proportional)"
            )),
        }
    }
}

pub fn optimize_from_predictions(
    predicted: &ExpectedReturns,
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    allocate(
        predicted,
        covariance,
        risk_free_rate,
        AllocationPolicy::default(),
        &OptimizerSettings::default(),
    )
}

/// Weights for the covariance's tickers from `predicted`.
///
/// Tickers without a prediction are treated as predicting zero; predictions
/// for tickers outside the covariance are ignored. The report's expected
/// return is the predicted one.
pub fn allocate(
    predicted: &ExpectedReturns,
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
    policy: AllocationPolicy,
    settings: &OptimizerSettings,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let mu = complete_predictions(predicted, covariance.tickers())?;

    if mu.all_non_positive() {
        warn!(%policy, "all predicted returns are non-positive");
    }

    match policy {
        AllocationPolicy::Optimizer if mu.all_non_positive() => {
            let (weights, report) = optimize_min_variance(&mu, covariance, risk_free_rate, settings)?;
            Ok((
                weights,
                report.with_degradation(Degradation::NonPositivePredictions),
            ))
        }
        AllocationPolicy::Optimizer => optimize(&mu, covariance, risk_free_rate, settings),
        AllocationPolicy::ProportionalClip => proportional(&mu, covariance, risk_free_rate),
    }
}

fn proportional(
    mu: &ExpectedReturns,
    covariance: &CovarianceMatrix,
    risk_free_rate: f64,
) -> Result<(WeightVector, PerformanceReport), PortoptError> {
    let clipped: Vec<f64> = mu.values().iter().map(|v| v.max(0.0)).collect();
    let total: f64 = clipped.iter().sum();

    let (weights, degraded) = if total > 0.0 {
        (clipped.iter().map(|v| v / total).collect(), false)
    } else {
        (equal_weights(clipped.len()), true)
    };

    let (ret, vol) = portfolio_stats(&weights, mu.values(), covariance);
    let mut report = PerformanceReport::theoretical(ret, vol, risk_free_rate);
    if degraded {
        report = report.with_degradation(Degradation::NonPositivePredictions);
    }
    Ok((WeightVector::new(mu.tickers().to_vec(), weights)?, report))
}

fn complete_predictions(
    predicted: &ExpectedReturns,
    tickers: &[String],
) -> Result<ExpectedReturns, PortoptError> {
    let values = tickers
        .iter()
        .map(|t| match predicted.get(t) {
            Some(v) => v,
            None => {
                info!(ticker = %t, "no prediction, assuming zero");
                0.0
            }
        })
        .collect();
    ExpectedReturns::new(tickers.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::estimator::EstimatorSettings;
    use approx::assert_relative_eq;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    fn diag_cov() -> CovarianceMatrix {
        CovarianceMatrix::new(
            names(&["A", "B", "C"]),
            vec![
                vec![0.04, 0.0, 0.0],
                vec![0.0, 0.09, 0.0],
                vec![0.0, 0.0, 0.16],
            ],
            &EstimatorSettings::default(),
        )
        .unwrap()
    }

    fn predictions(values: Vec<f64>) -> ExpectedReturns {
        ExpectedReturns::new(names(&["A", "B", "C"]), values).unwrap()
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("optimizer".parse(), Ok(AllocationPolicy::Optimizer));
        assert_eq!(" Proportional ".parse(), Ok(AllocationPolicy::ProportionalClip));
        assert!("kelly".parse::<AllocationPolicy>().is_err());
    }

    #[test]
    fn optimizer_policy_favors_higher_prediction() {
        let (w, report) =
            optimize_from_predictions(&predictions(vec![0.3, 0.05, 0.05]), &diag_cov(), 0.0)
                .unwrap();
        assert!(w.get("A") > w.get("B"));
        assert!(w.get("B") > w.get("C"));
        assert!(!report.is_degraded());
        assert_relative_eq!(w.weights().iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_predictions_give_min_variance() {
        let (w, report) =
            optimize_from_predictions(&predictions(vec![-0.1, 0.0, -0.3]), &diag_cov(), 0.0)
                .unwrap();
        assert_eq!(report.degradations, vec![Degradation::NonPositivePredictions]);

        // Inverse-variance weights for a diagonal covariance.
        let inv = [1.0 / 0.04, 1.0 / 0.09, 1.0 / 0.16];
        let total: f64 = inv.iter().sum();
        assert_relative_eq!(w.get("A"), inv[0] / total, epsilon = 1e-4);
        assert_relative_eq!(w.get("C"), inv[2] / total, epsilon = 1e-4);
    }

    #[test]
    fn proportional_clip() {
        let (w, report) = allocate(
            &predictions(vec![0.3, -0.2, 0.1]),
            &diag_cov(),
            0.0,
            AllocationPolicy::ProportionalClip,
            &OptimizerSettings::default(),
        )
        .unwrap();
        assert_relative_eq!(w.get("A"), 0.75, epsilon = 1e-12);
        assert_eq!(w.get("B"), 0.0);
        assert_relative_eq!(w.get("C"), 0.25, epsilon = 1e-12);
        assert_relative_eq!(report.expected_return, 0.75 * 0.3 + 0.25 * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn proportional_clip_all_negative_is_equal_and_degraded() {
        let (w, report) = allocate(
            &predictions(vec![-0.3, -0.2, -0.1]),
            &diag_cov(),
            0.0,
            AllocationPolicy::ProportionalClip,
            &OptimizerSettings::default(),
        )
        .unwrap();
        assert!(w.weights().iter().all(|&x| (x - 1.0 / 3.0).abs() < 1e-12));
        assert!(report.is_degraded());
    }

    #[test]
    fn missing_predictions_count_as_zero() {
        let partial = ExpectedReturns::new(names(&["A", "Z"]), vec![0.2, 0.9]).unwrap();
        let (w, _) = allocate(
            &partial,
            &diag_cov(),
            0.0,
            AllocationPolicy::ProportionalClip,
            &OptimizerSettings::default(),
        )
        .unwrap();
        assert_eq!(w.get("A"), 1.0);
        assert_eq!(w.get("Z"), 0.0);
        assert_eq!(w.tickers(), &names(&["A", "B", "C"])[..]);
    }
}
