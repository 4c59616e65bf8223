//! # Portfolio Engine
//!
//! $$
//! (\hat\mu, \hat\Sigma) = \big(\bar r \cdot P,\ \widehat{\operatorname{Cov}}(r)\cdot P\big) \ \mapsto\ \mathbf{w}^\*
//! $$
//!
//! High-level orchestration: estimate annualized inputs from a return panel,
//! then run the configured optimizer.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::info;

use super::optimizers::efficient_frontier;
use super::optimizers::optimize_with_method;
use super::types::EfficientFrontier;
use super::types::OptimizerConfig;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use crate::stats::moments::covariance_matrix;
use crate::stats::returns::TRADING_DAYS_PER_YEAR;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Allocation method used by [`PortfolioEngine::optimize`].
  pub method: OptimizerMethod,
  /// Target return for [`OptimizerMethod::TargetReturn`].
  pub target_return: Option<f64>,
  /// Risk-free rate used in Sharpe computations.
  pub risk_free: f64,
  /// Periods per year used to annualize estimates from a return panel.
  pub periods_per_year: f64,
  /// Solver settings and box constraints.
  pub optimizer: OptimizerConfig,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      method: OptimizerMethod::MinVariance,
      target_return: None,
      risk_free: 0.0,
      periods_per_year: TRADING_DAYS_PER_YEAR,
      optimizer: OptimizerConfig::default(),
    }
  }
}

/// Annualized expected returns and covariance estimated from a return panel.
#[derive(Clone, Debug)]
pub struct Estimates {
  pub mu: Array1<f64>,
  pub cov: Array2<f64>,
}

/// Result of [`PortfolioEngine::analyze`].
#[derive(Clone, Debug)]
pub struct Analysis {
  pub estimates: Estimates,
  pub portfolio: PortfolioResult,
}

/// Single entry point for estimation and optimization.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Optimize weights for supplied expected returns and covariance.
  pub fn optimize(&self, mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<PortfolioResult> {
    optimize_with_method(
      self.config.method,
      mu,
      cov,
      self.config.target_return,
      self.config.risk_free,
      &self.config.optimizer,
    )
  }

  /// Sample the efficient frontier under the configured constraints.
  pub fn frontier(&self, mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<EfficientFrontier> {
    efficient_frontier(mu, cov, self.config.risk_free, &self.config.optimizer)
  }

  /// Annualized sample mean and covariance of a `T x N` per-period return panel.
  pub fn estimate(&self, returns: ArrayView2<f64>) -> Result<Estimates> {
    ensure!(
      returns.nrows() >= 2,
      "at least two return observations are needed, got {}",
      returns.nrows()
    );
    let ppy = self.config.periods_per_year;
    ensure!(
      ppy.is_finite() && ppy > 0.0,
      "periods per year must be positive, got {ppy}"
    );

    let mu = returns
      .mean_axis(Axis(0))
      .ok_or_else(|| anyhow::anyhow!("return panel is empty"))?
      * ppy;
    let cov = covariance_matrix(returns, 1)? * ppy;
    Ok(Estimates { mu, cov })
  }

  /// Estimate inputs from `returns` and optimize.
  pub fn analyze(&self, returns: ArrayView2<f64>) -> Result<Analysis> {
    let estimates = self.estimate(returns)?;
    let portfolio = self.optimize(estimates.mu.view(), estimates.cov.view())?;
    info!(
      method = %self.config.method,
      assets = estimates.mu.len(),
      volatility = portfolio.volatility,
      "portfolio optimized"
    );
    Ok(Analysis {
      estimates,
      portfolio,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::quant::portfolio::types::WeightConstraints;

  fn returns() -> Array2<f64> {
    array![
      [0.010, 0.004, -0.002],
      [-0.008, 0.006, 0.011],
      [0.004, -0.003, 0.001],
      [0.012, 0.002, -0.009],
      [-0.005, 0.001, 0.004],
      [0.007, -0.004, 0.006],
    ]
  }

  #[test]
  fn optimize_rejects_empty_inputs() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let empty = Array2::<f64>::zeros((0, 0));
    assert!(engine
      .optimize(Array1::<f64>::zeros(0).view(), empty.view())
      .is_err());
  }

  #[test]
  fn estimate_annualizes_mean_and_covariance() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let r = returns();
    let est = engine.estimate(r.view()).unwrap();

    let daily_mean = r.column(0).sum() / 6.0;
    assert_abs_diff_eq!(est.mu[0], daily_mean * 252.0, epsilon = 1e-12);

    let daily_cov = covariance_matrix(r.view(), 1).unwrap();
    assert_abs_diff_eq!(est.cov[[1, 2]], daily_cov[[1, 2]] * 252.0, epsilon = 1e-12);
  }

  #[test]
  fn analyze_runs_long_only_min_variance() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      optimizer: OptimizerConfig::default().with_constraints(WeightConstraints::long_only()),
      ..PortfolioEngineConfig::default()
    });
    let analysis = engine.analyze(returns().view()).unwrap();

    let w = &analysis.portfolio.weights;
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-8);
    assert!(w.iter().all(|x| *x >= -1e-8));
    assert!(analysis.portfolio.volatility > 0.0);
  }

  #[test]
  fn frontier_uses_engine_constraints() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      optimizer: OptimizerConfig {
        frontier_points: 4,
        ..OptimizerConfig::default()
      },
      ..PortfolioEngineConfig::default()
    });
    let mu = array![0.06, 0.09];
    let cov = array![[0.04, 0.01], [0.01, 0.09]];
    let frontier = engine.frontier(mu.view(), cov.view()).unwrap();

    assert_eq!(frontier.len(), 4);
  }
}
