//! # Portfolio Risk
//!
//! $$
//! \sigma_p^2 = \sum_i w_i^2\sigma_i^2 + \sum_{i\ne j} w_i w_j \sigma_{ij}
//! $$
//!
//! Closed-form portfolio variance, volatility and risk decomposition.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

use super::validate::COVARIANCE_TOLERANCE;
use super::validate::WEIGHT_SUM_TOLERANCE;
use super::validate::validate_covariance;
use super::validate::validate_dimensions;
use super::validate::validate_weights;

/// Marginal, component and percentage contributions to portfolio volatility.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskContributions {
  /// Portfolio volatility.
  pub volatility: f64,
  /// `d sigma_p / d w_i`.
  pub marginal: Array1<f64>,
  /// `w_i * marginal_i`; sums to `volatility`.
  pub component: Array1<f64>,
  /// `component_i / volatility`; sums to one.
  pub percentage: Array1<f64>,
}

fn check(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<()> {
  validate_weights(weights, WEIGHT_SUM_TOLERANCE)?;
  validate_dimensions(weights.len(), cov)?;
  validate_covariance(cov, COVARIANCE_TOLERANCE)
}

/// `w' S w` without validation; negative rounding noise is clamped to zero.
pub(crate) fn quad_form(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> f64 {
  weights.dot(&cov.dot(&weights)).max(0.0)
}

/// Portfolio variance `w' S w`.
pub fn portfolio_variance(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<f64> {
  check(weights, cov)?;
  Ok(quad_form(weights, cov))
}

/// Portfolio standard deviation.
pub fn portfolio_volatility(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<f64> {
  Ok(portfolio_variance(weights, cov)?.sqrt())
}

/// Portfolio variance as the explicit sum of variance and covariance terms.
pub fn portfolio_variance_by_hand(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<f64> {
  check(weights, cov)?;

  let n = weights.len();
  let mut variance_terms = 0.0;
  let mut covariance_terms = 0.0;
  for i in 0..n {
    variance_terms += weights[i] * weights[i] * cov[[i, i]];
    for j in 0..n {
      if i != j {
        covariance_terms += weights[i] * weights[j] * cov[[i, j]];
      }
    }
  }

  Ok((variance_terms + covariance_terms).max(0.0))
}

/// Expected portfolio return `w' mu`.
pub fn portfolio_return(weights: ArrayView1<f64>, mu: ArrayView1<f64>) -> Result<f64> {
  ensure!(
    weights.len() == mu.len(),
    "weights length ({}) does not match expected returns length ({})",
    weights.len(),
    mu.len()
  );
  Ok(weights.dot(&mu))
}

/// Decompose portfolio volatility into per-asset contributions.
pub fn risk_contributions(
  weights: ArrayView1<f64>,
  cov: ArrayView2<f64>,
) -> Result<RiskContributions> {
  check(weights, cov)?;

  let n = weights.len();
  let sigma_w = cov.dot(&weights);
  let variance = weights.dot(&sigma_w).max(0.0);
  if variance < 1e-24 {
    return Ok(RiskContributions {
      volatility: 0.0,
      marginal: Array1::zeros(n),
      component: Array1::zeros(n),
      percentage: Array1::zeros(n),
    });
  }

  let volatility = variance.sqrt();
  let marginal = sigma_w / volatility;
  let component = &weights * &marginal;
  let percentage = &component / volatility;

  Ok(RiskContributions {
    volatility,
    marginal,
    component,
    percentage,
  })
}

/// `sum |w_i| sigma_i / sigma_p`; above one when diversification lowers risk.
pub fn diversification_ratio(weights: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<f64> {
  check(weights, cov)?;

  let sigma_p = quad_form(weights, cov).sqrt();
  if sigma_p <= 1e-12 {
    return Ok(0.0);
  }

  let weighted: f64 = weights
    .iter()
    .zip(cov.diag().iter())
    .map(|(w, v)| w.abs() * v.max(0.0).sqrt())
    .sum();
  Ok(weighted / sigma_p)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use ndarray::array;

  use super::*;

  fn cov3() -> Array2<f64> {
    array![
      [0.04, 0.006, 0.002],
      [0.006, 0.09, 0.018],
      [0.002, 0.018, 0.16],
    ]
  }

  #[test]
  fn two_asset_textbook_volatility() {
    // sigma = (20%, 30%), rho = 0.5, 60/40.
    let cov = array![[0.04, 0.03], [0.03, 0.09]];
    let w = array![0.6, 0.4];

    let var = portfolio_variance(w.view(), cov.view()).unwrap();
    let expected = 0.36 * 0.04 + 0.16 * 0.09 + 2.0 * 0.24 * 0.03;
    assert_abs_diff_eq!(var, expected, epsilon = 1e-15);
    assert_abs_diff_eq!(
      portfolio_volatility(w.view(), cov.view()).unwrap(),
      expected.sqrt(),
      epsilon = 1e-15
    );
  }

  #[test]
  fn by_hand_matches_matrix_form() {
    let cov = cov3();
    let w = array![0.2, 0.5, 0.3];

    let matrix = portfolio_variance(w.view(), cov.view()).unwrap();
    let by_hand = portfolio_variance_by_hand(w.view(), cov.view()).unwrap();
    assert_abs_diff_eq!(matrix, by_hand, epsilon = 1e-15);
  }

  #[test]
  fn rejects_weights_not_summing_to_one() {
    let cov = cov3();
    let w = array![0.2, 0.5, 0.2];
    assert!(portfolio_variance(w.view(), cov.view()).is_err());
  }

  #[test]
  fn rejects_mismatched_dimensions() {
    let cov = cov3();
    let w = array![0.5, 0.5];
    assert!(portfolio_volatility(w.view(), cov.view()).is_err());
  }

  #[test]
  fn component_contributions_sum_to_volatility() {
    let cov = cov3();
    let w = array![0.5, 0.3, 0.2];
    let rc = risk_contributions(w.view(), cov.view()).unwrap();

    assert_abs_diff_eq!(rc.component.sum(), rc.volatility, epsilon = 1e-14);
    assert_abs_diff_eq!(rc.percentage.sum(), 1.0, epsilon = 1e-14);
  }

  #[test]
  fn perfectly_correlated_assets_have_unit_diversification_ratio() {
    let cov = array![[0.04, 0.06], [0.06, 0.09]];
    let w = array![0.5, 0.5];
    let dr = diversification_ratio(w.view(), cov.view()).unwrap();
    assert_abs_diff_eq!(dr, 1.0, epsilon = 1e-12);

    let diversified = diversification_ratio(w.view(), cov3().slice(ndarray::s![..2, ..2])).unwrap();
    assert!(diversified > 1.0);
  }

  #[test]
  fn portfolio_return_is_weighted_mean() {
    let r = portfolio_return(array![0.25, 0.75].view(), array![0.08, 0.12].view()).unwrap();
    assert_abs_diff_eq!(r, 0.11, epsilon = 1e-15);
    assert!(portfolio_return(array![1.0].view(), array![0.1, 0.2].view()).is_err());
  }
}
