//! # Input Validation
//!
//! $$
//! \mathbf{1}^\top\mathbf{w} = 1,\qquad \Sigma = \Sigma^\top,\qquad \lambda_{\min}(\Sigma) \ge 0
//! $$
//!
//! Checks applied before any risk figure or optimization is computed.

use anyhow::Result;
use anyhow::ensure;
use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

/// Allowed deviation of `sum(w)` from one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Rounding slack when checking that the bounds admit `sum(w) = 1`.
pub const BOUNDS_TOLERANCE: f64 = 1e-12;

/// Relative tolerance for covariance symmetry and eigenvalue sign.
pub const COVARIANCE_TOLERANCE: f64 = 1e-10;

/// Weights are non-empty, finite and sum to one within `tol`.
pub fn validate_weights(weights: ArrayView1<f64>, tol: f64) -> Result<()> {
  ensure!(!weights.is_empty(), "weights vector cannot be empty");
  ensure!(
    weights.iter().all(|w| w.is_finite()),
    "weights must be finite"
  );

  let total = weights.sum();
  ensure!(
    (total - 1.0).abs() <= tol,
    "weights must sum to one, got {total}"
  );
  Ok(())
}

pub(crate) fn to_dmatrix(m: ArrayView2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

/// Covariance is square, finite, symmetric and positive semi-definite.
pub fn validate_covariance(cov: ArrayView2<f64>, tol: f64) -> Result<()> {
  let (rows, cols) = cov.dim();
  ensure!(rows > 0, "covariance matrix cannot be empty");
  ensure!(
    rows == cols,
    "covariance matrix must be square, got {rows}x{cols}"
  );
  ensure!(
    cov.iter().all(|v| v.is_finite()),
    "covariance matrix contains non-finite entries"
  );

  let scale = cov.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
  for i in 0..rows {
    for j in (i + 1)..rows {
      ensure!(
        (cov[[i, j]] - cov[[j, i]]).abs() <= tol * scale,
        "covariance matrix must be symmetric (entry ({i}, {j}) = {}, ({j}, {i}) = {})",
        cov[[i, j]],
        cov[[j, i]]
      );
    }
  }

  let eigen = SymmetricEigen::new(to_dmatrix(cov));
  let lambda_min = eigen.eigenvalues.min();
  let lambda_scale = eigen.eigenvalues.amax().max(1.0);
  ensure!(
    lambda_min >= -tol * lambda_scale,
    "covariance matrix must be positive semi-definite (smallest eigenvalue {lambda_min})"
  );
  Ok(())
}

/// `n` weights (or expected returns) against an `n x n` covariance matrix.
pub fn validate_dimensions(n: usize, cov: ArrayView2<f64>) -> Result<()> {
  ensure!(
    cov.dim() == (n, n),
    "covariance matrix is {}x{} but there are {n} assets",
    cov.nrows(),
    cov.ncols()
  );
  Ok(())
}

/// Expected returns are finite and sized to the covariance matrix.
pub fn validate_expected_returns(mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<()> {
  ensure!(!mu.is_empty(), "expected returns cannot be empty");
  ensure!(
    mu.iter().all(|m| m.is_finite()),
    "expected returns must be finite"
  );
  validate_dimensions(mu.len(), cov)
}

/// `1 <= window < len`.
pub fn validate_window(window: usize, len: usize) -> Result<()> {
  ensure!(window >= 1, "window length must be at least 1");
  ensure!(
    window < len,
    "window length ({window}) must be less than the series length ({len})"
  );
  Ok(())
}

/// `lower <= upper` elementwise and `sum(lower) <= 1 <= sum(upper)`.
pub fn validate_bounds(lower: ArrayView1<f64>, upper: ArrayView1<f64>) -> Result<()> {
  ensure!(
    lower.len() == upper.len(),
    "lower and upper bounds differ in length"
  );
  ensure!(
    lower.iter().chain(upper.iter()).all(|b| !b.is_nan()),
    "bounds cannot be NaN"
  );
  for (i, (l, u)) in lower.iter().zip(upper.iter()).enumerate() {
    ensure!(l <= u, "lower bound {l} exceeds upper bound {u} for asset {i}");
  }

  let lo_sum = lower.sum();
  let hi_sum = upper.sum();
  ensure!(
    lo_sum <= 1.0 + BOUNDS_TOLERANCE && hi_sum >= 1.0 - BOUNDS_TOLERANCE,
    "bounds admit no fully invested portfolio (sum of lower = {lo_sum}, sum of upper = {hi_sum})"
  );
  Ok(())
}
