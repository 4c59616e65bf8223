//! # Portfolio Types
//!
//! $$
//! \mathcal{W} = \{\mathbf{w}\in\mathbb{R}^n : \mathbf{1}^\top\mathbf{w} = 1,\ \mathbf{l}\le\mathbf{w}\le\mathbf{u}\}
//! $$
//!
//! Constraints, solver configuration and result containers shared by the optimizers.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use ndarray::Array1;

use super::validate::validate_bounds;

/// Supported allocation methods.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum OptimizerMethod {
  /// Global minimum-variance portfolio.
  #[default]
  MinVariance,
  /// Tangency portfolio (highest Sharpe ratio on the frontier).
  MaxSharpe,
  /// Minimum variance for a given target return.
  TargetReturn,
  /// `1/n` in every asset.
  EqualWeight,
  /// Weights proportional to inverse asset volatility.
  InverseVol,
}

impl FromStr for OptimizerMethod {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    Ok(match s.to_lowercase().as_str() {
      "min-variance" | "minvariance" | "min-var" | "mv" => Self::MinVariance,
      "max-sharpe" | "maxsharpe" | "tangency" => Self::MaxSharpe,
      "target" | "target-return" | "targetreturn" => Self::TargetReturn,
      "equal" | "equal-weight" | "1/n" => Self::EqualWeight,
      "inv-vol" | "inverse-vol" | "invvol" => Self::InverseVol,
      other => bail!("unknown optimizer method '{other}'"),
    })
  }
}

impl Display for OptimizerMethod {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OptimizerMethod::MinVariance => write!(f, "Minimum variance"),
      OptimizerMethod::MaxSharpe => write!(f, "Maximum Sharpe"),
      OptimizerMethod::TargetReturn => write!(f, "Target return"),
      OptimizerMethod::EqualWeight => write!(f, "Equal weight"),
      OptimizerMethod::InverseVol => write!(f, "Inverse volatility"),
    }
  }
}

/// One side of the box constraints.
#[derive(Default, Clone, Debug, PartialEq)]
pub enum Bound {
  /// No bound on this side.
  #[default]
  Free,
  /// Same bound for every asset.
  Scalar(f64),
  /// One bound per asset.
  PerAsset(Array1<f64>),
}

impl Bound {
  fn resolve(&self, n: usize, free: f64) -> Result<Array1<f64>> {
    match self {
      Bound::Free => Ok(Array1::from_elem(n, free)),
      Bound::Scalar(v) => Ok(Array1::from_elem(n, *v)),
      Bound::PerAsset(v) => {
        ensure!(
          v.len() == n,
          "per-asset bound has {} entries for {n} assets",
          v.len()
        );
        Ok(v.clone())
      }
    }
  }
}

/// Box constraints `lower <= w <= upper` on top of the budget `sum(w) = 1`.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct WeightConstraints {
  pub lower: Bound,
  pub upper: Bound,
}

impl WeightConstraints {
  /// Only the budget constraint; shorting allowed.
  pub fn unconstrained() -> Self {
    Self::default()
  }

  /// `w >= 0`.
  pub fn long_only() -> Self {
    Self {
      lower: Bound::Scalar(0.0),
      upper: Bound::Free,
    }
  }

  /// Same `[lower, upper]` interval for every asset.
  pub fn boxed(lower: f64, upper: f64) -> Self {
    Self {
      lower: Bound::Scalar(lower),
      upper: Bound::Scalar(upper),
    }
  }

  /// Individual intervals per asset.
  pub fn per_asset(lower: Array1<f64>, upper: Array1<f64>) -> Self {
    Self {
      lower: Bound::PerAsset(lower),
      upper: Bound::PerAsset(upper),
    }
  }

  pub fn is_unconstrained(&self) -> bool {
    self.lower == Bound::Free && self.upper == Bound::Free
  }

  /// Materialize `(lower, upper)` for `n` assets, with infinities for free sides.
  pub fn resolve(&self, n: usize) -> Result<(Array1<f64>, Array1<f64>)> {
    let lower = self.lower.resolve(n, f64::NEG_INFINITY)?;
    let upper = self.upper.resolve(n, f64::INFINITY)?;
    validate_bounds(lower.view(), upper.view())?;
    Ok((lower, upper))
  }
}

/// Solver and frontier settings.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
  /// Box constraints applied on top of the budget constraint.
  pub constraints: WeightConstraints,
  /// Iteration cap of the projected-gradient solver.
  pub max_iters: u64,
  /// Sup-norm step size at which the projected-gradient solver stops.
  pub tolerance: f64,
  /// Number of portfolios sampled along the efficient frontier.
  pub frontier_points: usize,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      constraints: WeightConstraints::unconstrained(),
      max_iters: 10_000,
      tolerance: 1e-10,
      frontier_points: 25,
    }
  }
}

impl OptimizerConfig {
  pub fn with_constraints(mut self, constraints: WeightConstraints) -> Self {
    self.constraints = constraints;
    self
  }
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioResult {
  /// Final portfolio weights.
  pub weights: Array1<f64>,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

/// A portfolio on the efficient frontier together with the return it was solved for.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierPoint {
  pub target_return: f64,
  pub portfolio: PortfolioResult,
}

/// Sampled efficient frontier, ordered by increasing target return.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EfficientFrontier {
  pub points: Vec<FrontierPoint>,
}

impl EfficientFrontier {
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn returns(&self) -> Vec<f64> {
    self
      .points
      .iter()
      .map(|p| p.portfolio.expected_return)
      .collect()
  }

  pub fn volatilities(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.portfolio.volatility).collect()
  }

  /// Frontier point with the highest Sharpe ratio.
  pub fn best_sharpe(&self) -> Option<&FrontierPoint> {
    self
      .points
      .iter()
      .max_by(|a, b| a.portfolio.sharpe.total_cmp(&b.portfolio.sharpe))
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  #[test]
  fn parses_method_names() {
    assert_eq!(
      "min-variance".parse::<OptimizerMethod>().unwrap(),
      OptimizerMethod::MinVariance
    );
    assert_eq!(
      "Tangency".parse::<OptimizerMethod>().unwrap(),
      OptimizerMethod::MaxSharpe
    );
    assert!("hrp".parse::<OptimizerMethod>().is_err());
  }

  #[test]
  fn long_only_resolves_to_half_open_box() {
    let (lo, hi) = WeightConstraints::long_only().resolve(3).unwrap();
    assert_eq!(lo, array![0.0, 0.0, 0.0]);
    assert!(hi.iter().all(|v| v.is_infinite()));
  }

  #[test]
  fn infeasible_box_is_rejected() {
    // Three assets capped at 20% cannot hold a fully invested portfolio.
    assert!(WeightConstraints::boxed(0.0, 0.2).resolve(3).is_err());
    assert!(WeightConstraints::boxed(0.4, 1.0).resolve(3).is_err());
    assert!(WeightConstraints::boxed(0.0, 0.5).resolve(3).is_ok());
  }

  #[test]
  fn per_asset_bounds_must_match_asset_count() {
    let c = WeightConstraints::per_asset(array![0.0, 0.0], array![1.0, 1.0]);
    assert!(c.resolve(3).is_err());
    assert!(c.resolve(2).is_ok());
  }
}
