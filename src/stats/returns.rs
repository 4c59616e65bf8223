//! # Returns
//!
//! $$
//! r_t = \frac{P_t}{P_{t-1}} - 1, \qquad \ell_t = \ln\frac{P_t}{P_{t-1}}
//! $$
//!
//! Price to return transforms and annualization helpers.

use std::fmt::Display;

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::Zip;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Return convention.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReturnKind {
  /// Arithmetic return `P_t / P_{t-1} - 1`.
  #[default]
  Simple,
  /// Continuously compounded return `ln(P_t / P_{t-1})`.
  Log,
}

impl Display for ReturnKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReturnKind::Simple => write!(f, "simple"),
      ReturnKind::Log => write!(f, "log"),
    }
  }
}

fn one_period(prev: f64, next: f64, kind: ReturnKind) -> f64 {
  match kind {
    ReturnKind::Simple => next / prev - 1.0,
    ReturnKind::Log => (next / prev).ln(),
  }
}

fn check_prices(prices: ArrayView1<f64>) -> Result<()> {
  ensure!(
    prices.len() >= 2,
    "at least two prices are needed to form a return, got {}",
    prices.len()
  );
  ensure!(
    prices.iter().all(|p| p.is_finite() && *p > 0.0),
    "prices must be finite and strictly positive"
  );
  Ok(())
}

/// Convert a price path into `n - 1` period returns.
pub fn returns_from_prices(prices: ArrayView1<f64>, kind: ReturnKind) -> Result<Array1<f64>> {
  check_prices(prices)?;
  let n = prices.len();
  let prev = prices.slice(ndarray::s![..n - 1]);
  let next = prices.slice(ndarray::s![1..]);

  Ok(Zip::from(&prev).and(&next).map_collect(|&p, &q| one_period(p, q, kind)))
}

/// Column-wise returns of a `T x N` price panel.
pub fn returns_matrix(prices: ArrayView2<f64>, kind: ReturnKind) -> Result<Array2<f64>> {
  let (n_obs, n_assets) = prices.dim();
  ensure!(n_assets > 0, "price panel has no assets");
  ensure!(
    n_obs >= 2,
    "at least two price rows are needed, got {n_obs}"
  );

  let mut out = Array2::<f64>::zeros((n_obs - 1, n_assets));
  for (j, column) in prices.axis_iter(Axis(1)).enumerate() {
    let r = returns_from_prices(column, kind)?;
    out.column_mut(j).assign(&r);
  }
  Ok(out)
}

/// Scale a per-period volatility to an annual figure.
pub fn annualize_volatility(vol: f64, periods_per_year: f64) -> f64 {
  vol * periods_per_year.sqrt()
}

/// Scale a per-period variance to an annual figure.
pub fn annualize_variance(var: f64, periods_per_year: f64) -> f64 {
  var * periods_per_year
}

/// Scale a mean per-period return to an annual figure.
pub fn annualize_return(mean: f64, periods_per_year: f64) -> f64 {
  mean * periods_per_year
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn simple_and_log_returns() {
    let prices = array![100.0, 110.0, 99.0];

    let simple = returns_from_prices(prices.view(), ReturnKind::Simple).unwrap();
    assert_eq!(simple.len(), 2);
    assert_abs_diff_eq!(simple[0], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(simple[1], -0.1, epsilon = 1e-12);

    let log = returns_from_prices(prices.view(), ReturnKind::Log).unwrap();
    assert_abs_diff_eq!(log[0], 1.1_f64.ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(log.sum(), 0.99_f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn rejects_non_positive_prices() {
    let prices = array![100.0, 0.0, 101.0];
    assert!(returns_from_prices(prices.view(), ReturnKind::Simple).is_err());
    assert!(returns_from_prices(array![1.0].view(), ReturnKind::Log).is_err());
  }

  #[test]
  fn returns_matrix_is_column_wise() {
    let prices = array![[100.0, 50.0], [101.0, 49.0], [102.01, 49.98]];
    let r = returns_matrix(prices.view(), ReturnKind::Simple).unwrap();

    assert_eq!(r.dim(), (2, 2));
    assert_abs_diff_eq!(r[[0, 0]], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 0]], 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[0, 1]], -0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(r[[1, 1]], 0.02, epsilon = 1e-12);
  }

  #[test]
  fn annualization_uses_square_root_of_time() {
    assert_abs_diff_eq!(
      annualize_volatility(0.01, TRADING_DAYS_PER_YEAR),
      0.01 * 252.0_f64.sqrt(),
      epsilon = 1e-15
    );
    assert_abs_diff_eq!(annualize_variance(0.0001, 252.0), 0.0252, epsilon = 1e-15);
    assert_abs_diff_eq!(annualize_return(0.001, 252.0), 0.252, epsilon = 1e-15);
  }
}
