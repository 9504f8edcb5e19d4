//! Historical expected returns and covariance.
//!
//! Both are annualized from daily simple returns with a 252-day year. The
//! covariance is the sample covariance (n - 1 denominator) and is ridge
//! regularized until it admits a well-conditioned Cholesky factorization.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use super::error::PortoptError;
use super::metrics::TRADING_DAYS_PER_YEAR;
use super::price_table::PriceTable;
use super::universe::MIN_ASSETS;

/// Smallest acceptable squared Cholesky pivot, relative to the largest variance.
const CONDITION_FLOOR: f64 = 1e-12;

/// Annualized expected return per ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedReturns {
    tickers: Vec<String>,
    values: Vec<f64>,
}

impl ExpectedReturns {
    pub fn new(tickers: Vec<String>, values: Vec<f64>) -> Result<Self, PortoptError> {
        if tickers.is_empty() {
            return Err(PortoptError::EmptyUniverse);
        }
        if tickers.len() != values.len() {
            return Err(PortoptError::DimensionMismatch {
                reason: format!(
                    "{} tickers but {} expected returns",
                    tickers.len(),
                    values.len()
                ),
            });
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(PortoptError::Data {
                reason: format!("expected return for {} is not finite", tickers[i]),
            });
        }
        Ok(Self { tickers, values })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.values[i])
    }

    pub fn all_non_positive(&self) -> bool {
        self.values.iter().all(|&v| v <= 0.0)
    }

    /// Reorders to `tickers`; every requested ticker must be present.
    pub fn reindexed(&self, tickers: &[String]) -> Result<Self, PortoptError> {
        let values = tickers
            .iter()
            .map(|t| {
                self.get(t).ok_or_else(|| PortoptError::DimensionMismatch {
                    reason: format!("no expected return for {}", t),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tickers.to_vec(), values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorSettings {
    /// First ridge tried when the raw covariance is unusable.
    pub ridge: f64,
    /// Number of ridge escalations (x10 each) before giving up.
    pub max_ridge_attempts: usize,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            ridge: 1e-10,
            max_ridge_attempts: 8,
        }
    }
}

/// Symmetric, annualized, positive definite covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    tickers: Vec<String>,
    matrix: DMatrix<f64>,
    ridge: f64,
}

impl CovarianceMatrix {
    /// Validates a square matrix and regularizes it when needed.
    pub fn new(
        tickers: Vec<String>,
        rows: Vec<Vec<f64>>,
        settings: &EstimatorSettings,
    ) -> Result<Self, PortoptError> {
        let n = tickers.len();
        if n == 0 {
            return Err(PortoptError::EmptyUniverse);
        }
        if rows.len() != n || rows.iter().any(|r| r.len() != n) {
            return Err(PortoptError::DimensionMismatch {
                reason: format!("covariance must be {n}x{n}"),
            });
        }

        let raw = DMatrix::from_fn(n, n, |i, j| rows[i][j]);
        // Symmetrize; estimation noise can leave the triangles a few ulps apart.
        let symmetric = (&raw + raw.transpose()) * 0.5;
        let (matrix, ridge) = regularize(symmetric, settings)?;

        Ok(Self {
            tickers,
            matrix,
            ridge,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dim(&self) -> usize {
        self.tickers.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// Ridge added to the diagonal, zero when none was needed.
    pub fn ridge(&self) -> f64 {
        self.ridge
    }

    /// `Σw`
    pub fn mul_vec(&self, w: &[f64]) -> Vec<f64> {
        let v = DVector::from_column_slice(w);
        (&self.matrix * v).iter().copied().collect()
    }

    /// `wᵗΣw`
    pub fn quadratic_form(&self, w: &[f64]) -> f64 {
        self.mul_vec(w).iter().zip(w).map(|(a, b)| a * b).sum()
    }

    pub fn volatility_of(&self, index: usize) -> f64 {
        self.matrix[(index, index)].max(0.0).sqrt()
    }

    /// Restricts to `tickers`, in that order.
    pub fn reindexed(&self, tickers: &[String]) -> Result<Self, PortoptError> {
        let idx = tickers
            .iter()
            .map(|t| {
                self.tickers
                    .iter()
                    .position(|s| s == t)
                    .ok_or_else(|| PortoptError::DimensionMismatch {
                        reason: format!("no covariance entry for {}", t),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let n = idx.len();
        Ok(Self {
            tickers: tickers.to_vec(),
            matrix: DMatrix::from_fn(n, n, |i, j| self.matrix[(idx[i], idx[j])]),
            ridge: self.ridge,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimates {
    pub expected_returns: ExpectedReturns,
    pub covariance: CovarianceMatrix,
}

pub fn estimate(history: &PriceTable) -> Result<Estimates, PortoptError> {
    estimate_with(history, &EstimatorSettings::default())
}

pub fn estimate_with(
    history: &PriceTable,
    settings: &EstimatorSettings,
) -> Result<Estimates, PortoptError> {
    if history.asset_count() < MIN_ASSETS {
        return Err(PortoptError::insufficient(format!(
            "{} asset(s) in history, need at least {}",
            history.asset_count(),
            MIN_ASSETS
        )));
    }

    let returns = history.returns();
    if returns.len() < 2 {
        return Err(PortoptError::insufficient(format!(
            "{} overlapping return observations, need at least 2",
            returns.len()
        )));
    }

    let tickers = history.tickers().to_vec();
    let n = tickers.len();
    let obs = returns.len() as f64;

    let means: Vec<f64> = (0..n)
        .map(|j| returns.iter().map(|row| row[j]).sum::<f64>() / obs)
        .collect();

    let mut cov = vec![vec![0.0; n]; n];
    for row in &returns {
        for i in 0..n {
            let di = row[i] - means[i];
            for j in i..n {
                cov[i][j] += di * (row[j] - means[j]);
            }
        }
    }
    for i in 0..n {
        for j in i..n {
            let v = cov[i][j] / (obs - 1.0) * TRADING_DAYS_PER_YEAR;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }

    let expected_returns = ExpectedReturns::new(
        tickers.clone(),
        means.iter().map(|m| m * TRADING_DAYS_PER_YEAR).collect(),
    )?;
    let covariance = CovarianceMatrix::new(tickers, cov, settings)?;

    debug!(
        assets = n,
        observations = returns.len(),
        ridge = covariance.ridge(),
        "estimated returns and covariance"
    );

    Ok(Estimates {
        expected_returns,
        covariance,
    })
}

fn regularize(
    matrix: DMatrix<f64>,
    settings: &EstimatorSettings,
) -> Result<(DMatrix<f64>, f64), PortoptError> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(PortoptError::SingularCovariance { ridge: 0.0 });
    }
    if is_usable(&matrix) {
        return Ok((matrix, 0.0));
    }

    let n = matrix.nrows();
    let mut ridge = settings.ridge;
    for _ in 0..settings.max_ridge_attempts {
        let candidate = &matrix + DMatrix::identity(n, n) * ridge;
        if is_usable(&candidate) {
            warn!(ridge, "covariance regularized");
            return Ok((candidate, ridge));
        }
        ridge *= 10.0;
    }

    Err(PortoptError::SingularCovariance { ridge: ridge / 10.0 })
}

fn is_usable(matrix: &DMatrix<f64>) -> bool {
    let scale = matrix.diagonal().max();
    if scale <= 0.0 {
        return false;
    }
    match matrix.clone().cholesky() {
        Some(chol) => {
            let l = chol.l();
            let min_pivot = (0..matrix.nrows())
                .map(|i| l[(i, i)] * l[(i, i)])
                .fold(f64::INFINITY, f64::min);
            min_pivot > scale * CONDITION_FLOOR
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn table(rows: Vec<Vec<f64>>, tickers: &[&str]) -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..rows.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        PriceTable::from_rows(tickers.iter().map(|t| t.to_string()).collect(), dates, rows).unwrap()
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn annualizes_mean_and_variance() {
        // Returns: A = [+10%, -10%, +10%, -10%], B = [+5%, +5%, -10%, 0]
        let t = table(
            vec![
                vec![100.0, 100.0],
                vec![110.0, 105.0],
                vec![99.0, 110.25],
                vec![108.9, 99.225],
                vec![98.01, 99.225],
            ],
            &["A", "B"],
        );
        let est = estimate(&t).unwrap();

        let mean_a = 0.0;
        assert_relative_eq!(
            est.expected_returns.values()[0],
            mean_a * 252.0,
            epsilon = 1e-9
        );

        let var_a = [0.1, -0.1, 0.1, -0.1]
            .iter()
            .map(|r| (r - mean_a) * (r - mean_a))
            .sum::<f64>()
            / 3.0;
        assert_relative_eq!(est.covariance.get(0, 0), var_a * 252.0, epsilon = 1e-9);
        assert_relative_eq!(
            est.covariance.get(0, 1),
            est.covariance.get(1, 0),
            epsilon = 1e-15
        );
        assert!(est.covariance.get(0, 1) < 0.0);
        assert_eq!(est.covariance.ridge(), 0.0);
    }

    #[test]
    fn requires_two_observations() {
        let t = table(vec![vec![100.0, 50.0], vec![101.0, 51.0]], &["A", "B"]);
        assert!(matches!(
            estimate(&t),
            Err(PortoptError::InsufficientData { .. })
        ));
    }

    #[test]
    fn single_asset_is_insufficient() {
        let t = table(
            vec![vec![100.0], vec![101.0], vec![99.0], vec![102.0]],
            &["A"],
        );
        assert!(matches!(
            estimate(&t),
            Err(PortoptError::InsufficientData { .. })
        ));
    }

    #[test]
    fn perfectly_correlated_assets_are_regularized() {
        // B's returns are exactly twice A's: rank-one covariance.
        let a = [100.0, 101.0, 100.0, 102.0, 101.5];
        let mut rows = vec![vec![a[0], 100.0]];
        for i in 1..a.len() {
            let r = a[i] / a[i - 1] - 1.0;
            let prev_b = rows[i - 1][1];
            rows.push(vec![a[i], prev_b * (1.0 + 2.0 * r)]);
        }
        let t = table(rows, &["A", "B"]);
        let est = estimate(&t).unwrap();
        assert!(est.covariance.ridge() > 0.0);
    }

    #[test]
    fn constant_prices_get_ridge() {
        let t = table(
            vec![vec![10.0, 20.0], vec![10.0, 20.0], vec![10.0, 20.0]],
            &["A", "B"],
        );
        let est = estimate(&t).unwrap();
        assert!(est.covariance.ridge() > 0.0);
        assert!(est.covariance.quadratic_form(&[0.5, 0.5]) > 0.0);
    }

    #[test]
    fn singular_after_regularization() {
        let huge = 1e12;
        let result = CovarianceMatrix::new(
            tickers(&["A", "B"]),
            vec![vec![huge, huge], vec![huge, huge]],
            &EstimatorSettings::default(),
        );
        assert!(matches!(
            result,
            Err(PortoptError::SingularCovariance { .. })
        ));
    }

    #[test]
    fn non_finite_covariance_is_singular() {
        let result = CovarianceMatrix::new(
            tickers(&["A"]),
            vec![vec![f64::NAN]],
            &EstimatorSettings::default(),
        );
        assert!(matches!(
            result,
            Err(PortoptError::SingularCovariance { .. })
        ));
    }

    #[test]
    fn covariance_shape_checked() {
        let result = CovarianceMatrix::new(
            tickers(&["A", "B"]),
            vec![vec![1.0, 0.0]],
            &EstimatorSettings::default(),
        );
        assert!(matches!(result, Err(PortoptError::DimensionMismatch { .. })));
    }

    #[test]
    fn quadratic_form_matches_manual() {
        let cov = CovarianceMatrix::new(
            tickers(&["A", "B"]),
            vec![vec![0.04, 0.01], vec![0.01, 0.09]],
            &EstimatorSettings::default(),
        )
        .unwrap();
        let w = [0.3, 0.7];
        let manual = 0.3 * 0.3 * 0.04 + 2.0 * 0.3 * 0.7 * 0.01 + 0.7 * 0.7 * 0.09;
        assert_relative_eq!(cov.quadratic_form(&w), manual, epsilon = 1e-15);
        assert_relative_eq!(cov.volatility_of(1), 0.3, epsilon = 1e-15);
    }

    #[test]
    fn reindex_reorders() {
        let cov = CovarianceMatrix::new(
            tickers(&["A", "B"]),
            vec![vec![0.04, 0.01], vec![0.01, 0.09]],
            &EstimatorSettings::default(),
        )
        .unwrap();
        let swapped = cov.reindexed(&tickers(&["B", "A"])).unwrap();
        assert_eq!(swapped.get(0, 0), 0.09);
        assert!(cov.reindexed(&tickers(&["C"])).is_err());

        let mu = ExpectedReturns::new(tickers(&["A", "B"]), vec![0.1, 0.2]).unwrap();
        assert_eq!(mu.reindexed(&tickers(&["B", "A"])).unwrap().values(), &[0.2, 0.1]);
    }

    #[test]
    fn expected_returns_validation() {
        assert!(matches!(
            ExpectedReturns::new(tickers(&["A"]), vec![0.1, 0.2]),
            Err(PortoptError::DimensionMismatch { .. })
        ));
        assert!(ExpectedReturns::new(tickers(&["A"]), vec![f64::INFINITY]).is_err());
        let mu = ExpectedReturns::new(tickers(&["A", "B"]), vec![-0.1, 0.0]).unwrap();
        assert!(mu.all_non_positive());
        assert_eq!(mu.get("B"), Some(0.0));
    }
}
