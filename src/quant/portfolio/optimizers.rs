//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top\Sigma\mathbf{w} - \gamma\,\boldsymbol\mu^\top\mathbf{w}
//! \quad \text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \mathbf{l}\le\mathbf{w}\le\mathbf{u}
//! $$
//!
//! Minimum-variance, target-return, efficient-frontier and tangency portfolios.
//!
//! Without box constraints every portfolio has a closed form built from
//! `S^-1 1` and `S^-1 mu` (Cholesky). With box constraints the quadratic
//! program is solved by accelerated projected gradient descent, where the
//! projection onto `{1'w = 1, l <= w <= u}` is exact (bisection on the budget
//! multiplier). Points on the constrained frontier are located by bisection
//! on the risk-aversion parameter `gamma`, and the tangency portfolio by a
//! Brent search over `gamma`.

use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::brent::BrentOpt;
use nalgebra::Cholesky;
use nalgebra::DVector;
use nalgebra::SymmetricEigen;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Zip;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::risk::quad_form;
use super::types::EfficientFrontier;
use super::types::FrontierPoint;
use super::types::OptimizerConfig;
use super::types::OptimizerMethod;
use super::types::PortfolioResult;
use super::validate::COVARIANCE_TOLERANCE;
use super::validate::to_dmatrix;
use super::validate::validate_covariance;
use super::validate::validate_expected_returns;

const BISECTION_ITERS: usize = 200;
const BRACKET_DOUBLINGS: usize = 100;
const GAMMA_SEED: f64 = 1e-4;
const SINGULAR_RATIO: f64 = 1e-12;
const BOUNDS_SLACK: f64 = 1e-12;

/// Expected return, volatility and Sharpe ratio of fixed weights.
pub fn evaluate_portfolio(
  weights: Array1<f64>,
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
) -> PortfolioResult {
  let expected_return = weights.dot(&mu);
  let volatility = quad_form(weights.view(), cov).sqrt();
  let sharpe = if volatility > 1e-15 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  };

  PortfolioResult {
    weights,
    expected_return,
    volatility,
    sharpe,
  }
}

fn check_inputs(mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Result<()> {
  validate_expected_returns(mu, cov)?;
  validate_covariance(cov, COVARIANCE_TOLERANCE)
}

/// Building blocks of the unconstrained frontier.
///
/// `w(gamma) = w_mv + gamma / 2 * d`, with `w_mv = S^-1 1 / 1'S^-1 1` and
/// `d = S^-1 mu - (1'S^-1 mu / 1'S^-1 1) S^-1 1` (a zero-sum direction).
struct ClosedForm {
  w_mv: Array1<f64>,
  d: Array1<f64>,
  /// `S^-1 1`
  a: Array1<f64>,
  /// `S^-1 mu`
  b: Array1<f64>,
}

impl ClosedForm {
  fn new(mu: ArrayView1<f64>, cov: ArrayView2<f64>) -> Option<Self> {
    let n = mu.len();
    let sigma = to_dmatrix(cov);
    let eigenvalues = SymmetricEigen::new(sigma.clone()).eigenvalues;
    if eigenvalues.min() <= SINGULAR_RATIO * eigenvalues.max().max(f64::MIN_POSITIVE) {
      return None;
    }
    let chol = Cholesky::new(sigma)?;
    let a = chol.solve(&DVector::from_element(n, 1.0));
    let b = chol.solve(&DVector::from_iterator(n, mu.iter().copied()));

    let sa = a.sum();
    if !sa.is_finite() || sa <= 0.0 {
      return None;
    }

    let a = Array1::from_iter(a.iter().copied());
    let b = Array1::from_iter(b.iter().copied());
    let w_mv = &a / sa;
    let d = &b - &(&a * (b.sum() / sa));

    Some(Self { w_mv, d, a, b })
  }

  fn at_gamma(&self, gamma: f64) -> Array1<f64> {
    &self.w_mv + &(&self.d * (0.5 * gamma))
  }
}

/// Box-constrained quadratic program `min w'Sw - gamma mu'w` over the budget simplex.
#[derive(Clone)]
struct BoxQp {
  mu: Array1<f64>,
  cov: Array2<f64>,
  lower: Array1<f64>,
  upper: Array1<f64>,
  unbounded: bool,
  step: f64,
  max_iters: u64,
  tolerance: f64,
}

impl BoxQp {
  fn new(mu: ArrayView1<f64>, cov: ArrayView2<f64>, cfg: &OptimizerConfig) -> Result<Self> {
    let (lower, upper) = cfg.constraints.resolve(mu.len())?;
    let unbounded = lower.iter().chain(upper.iter()).all(|b| b.is_infinite());

    let lambda_max = SymmetricEigen::new(to_dmatrix(cov)).eigenvalues.max();
    let lipschitz = (2.0 * lambda_max).max(1e-12);

    Ok(Self {
      mu: mu.to_owned(),
      cov: cov.to_owned(),
      lower,
      upper,
      unbounded,
      step: 1.0 / lipschitz,
      max_iters: cfg.max_iters,
      tolerance: cfg.tolerance,
    })
  }

  /// Euclidean projection onto `{1'w = 1, lower <= w <= upper}`.
  fn project(&self, v: &Array1<f64>) -> Array1<f64> {
    let n = v.len();
    if self.unbounded {
      let shift = (v.sum() - 1.0) / n as f64;
      return v.mapv(|x| x - shift);
    }

    let total = |tau: f64| -> f64 {
      Zip::from(v)
        .and(&self.lower)
        .and(&self.upper)
        .fold(0.0, |acc, &x, &l, &u| acc + (x - tau).clamp(l, u))
    };

    // total(tau) is non-increasing; bracket the root of total(tau) = 1.
    let mut lo = -1.0;
    let mut hi = 1.0;
    for _ in 0..BRACKET_DOUBLINGS {
      if total(lo) >= 1.0 {
        break;
      }
      lo = 2.0 * lo - 1.0;
    }
    for _ in 0..BRACKET_DOUBLINGS {
      if total(hi) <= 1.0 {
        break;
      }
      hi = 2.0 * hi + 1.0;
    }

    for _ in 0..BISECTION_ITERS {
      let mid = 0.5 * (lo + hi);
      if total(mid) > 1.0 {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + mid.abs()) {
        break;
      }
    }

    let tau = 0.5 * (lo + hi);
    let mut w = Zip::from(v)
      .and(&self.lower)
      .and(&self.upper)
      .map_collect(|&x, &l, &u| (x - tau).clamp(l, u));

    // Spread the residual of the bisection over coordinates strictly inside their bounds.
    let residual = 1.0 - w.sum();
    let free: Vec<usize> = (0..n)
      .filter(|&i| w[i] > self.lower[i] && w[i] < self.upper[i])
      .collect();
    if !free.is_empty() {
      let share = residual / free.len() as f64;
      for i in free {
        w[i] += share;
      }
    }
    w
  }

  fn objective(&self, w: &Array1<f64>, gamma: f64) -> f64 {
    w.dot(&self.cov.dot(w)) - gamma * w.dot(&self.mu)
  }

  fn gradient(&self, w: &Array1<f64>, gamma: f64) -> Array1<f64> {
    &self.cov.dot(w) * 2.0 - &(&self.mu * gamma)
  }

  /// Accelerated projected gradient (FISTA with adaptive restart).
  fn solve(&self, gamma: f64, warm_start: Option<&Array1<f64>>) -> Array1<f64> {
    let n = self.mu.len();
    let start = warm_start
      .cloned()
      .unwrap_or_else(|| Array1::from_elem(n, 1.0 / n as f64));

    let mut w = self.project(&start);
    let mut y = w.clone();
    let mut t = 1.0_f64;
    let mut f_prev = self.objective(&w, gamma);

    for iter in 0..self.max_iters {
      let g = self.gradient(&y, gamma);
      let w_next = self.project(&(&y - &(g * self.step)));
      let f_next = self.objective(&w_next, gamma);

      if f_next > f_prev + 1e-15 * f_prev.abs().max(1.0) {
        t = 1.0;
        y = w.clone();
        continue;
      }

      let step_size = (&w_next - &w).fold(0.0_f64, |acc, d| acc.max(d.abs()));
      let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
      let momentum = (t - 1.0) / t_next;
      y = &w_next + &((&w_next - &w) * momentum);
      w = w_next;
      f_prev = f_next;
      t = t_next;

      if step_size <= self.tolerance {
        debug!(iterations = iter + 1, gamma, "projected gradient converged");
        return w;
      }
    }

    warn!(
      max_iters = self.max_iters,
      gamma, "projected gradient reached the iteration cap"
    );
    w
  }

  /// Range of `mu'w` over the feasible set.
  ///
  /// A side is infinite only when one asset can grow without limit while a
  /// worse one can shrink without limit.
  fn return_range(&self) -> (f64, f64) {
    (-self.best_score(-1.0), self.best_score(1.0))
  }

  /// `max sign * mu'w` over `{1'w = 1, lower <= w <= upper}`.
  ///
  /// The linear program has a vertex optimum with at most one asset strictly
  /// inside its box: assets ranked above it sit at their upper bound, those
  /// ranked below at their lower bound.
  fn best_score(&self, sign: f64) -> f64 {
    let n = self.mu.len();
    let score = self.mu.mapv(|m| sign * m);

    let best_uncapped = (0..n)
      .filter(|&i| self.upper[i] == f64::INFINITY)
      .map(|i| score[i])
      .fold(f64::NEG_INFINITY, f64::max);
    let worst_unfloored = (0..n)
      .filter(|&i| self.lower[i] == f64::NEG_INFINITY)
      .map(|i| score[i])
      .fold(f64::INFINITY, f64::min);
    if best_uncapped > worst_unfloored {
      return f64::INFINITY;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| score[j].total_cmp(&score[i]));

    for (k, &pivot) in order.iter().enumerate() {
      let (above, below) = (&order[..k], &order[k + 1..]);
      if above.iter().any(|&i| self.upper[i].is_infinite())
        || below.iter().any(|&i| self.lower[i].is_infinite())
      {
        continue;
      }

      let fixed = above.iter().map(|&i| self.upper[i]).sum::<f64>()
        + below.iter().map(|&i| self.lower[i]).sum::<f64>();
      let rest = 1.0 - fixed;
      let tol = BOUNDS_SLACK * (1.0 + fixed.abs());
      if rest >= self.lower[pivot] - tol && rest <= self.upper[pivot] + tol {
        return above.iter().map(|&i| score[i] * self.upper[i]).sum::<f64>()
          + below.iter().map(|&i| score[i] * self.lower[i]).sum::<f64>()
          + score[pivot] * rest;
      }
    }

    // Unreachable for bounds accepted by `validate_bounds`.
    f64::INFINITY
  }
}

/// Global minimum-variance portfolio under `cfg.constraints`.
pub fn min_variance(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<PortfolioResult> {
  mean_variance(mu, cov, 0.0, risk_free, cfg)
}

/// Minimize `w'Sw - gamma mu'w`; `gamma = 0` is the minimum-variance portfolio.
pub fn mean_variance(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  gamma: f64,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<PortfolioResult> {
  check_inputs(mu, cov)?;
  ensure!(gamma.is_finite(), "risk-aversion parameter must be finite");

  if cfg.constraints.is_unconstrained() {
    if let Some(cf) = ClosedForm::new(mu, cov) {
      return Ok(evaluate_portfolio(cf.at_gamma(gamma), mu, cov, risk_free));
    }
    warn!("covariance matrix is singular, falling back to projected gradient");
  }

  let qp = BoxQp::new(mu, cov, cfg)?;
  let w = qp.solve(gamma, None);
  Ok(evaluate_portfolio(w, mu, cov, risk_free))
}

/// Minimum-variance portfolio whose expected return equals `target`.
pub fn min_variance_for_target(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  target: f64,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<PortfolioResult> {
  check_inputs(mu, cov)?;
  ensure!(target.is_finite(), "target return must be finite");
  let return_tol = 1e-9 * target.abs().max(1.0);

  if cfg.constraints.is_unconstrained() {
    if let Some(cf) = ClosedForm::new(mu, cov) {
      let r_mv = cf.w_mv.dot(&mu);
      let slope = cf.d.dot(&mu);
      if slope <= 1e-14 {
        ensure!(
          (target - r_mv).abs() <= return_tol,
          "all assets share the same expected return {r_mv}; target {target} is unattainable"
        );
        return Ok(evaluate_portfolio(cf.w_mv, mu, cov, risk_free));
      }
      let gamma = 2.0 * (target - r_mv) / slope;
      return Ok(evaluate_portfolio(cf.at_gamma(gamma), mu, cov, risk_free));
    }
    warn!("covariance matrix is singular, falling back to projected gradient");
  }

  let qp = BoxQp::new(mu, cov, cfg)?;
  let (r_low, r_high) = qp.return_range();
  ensure!(
    target >= r_low - return_tol && target <= r_high + return_tol,
    "target return {target} is outside the attainable range [{r_low}, {r_high}]"
  );

  let mut w = qp.solve(0.0, None);
  let mut r = w.dot(&mu);
  if (r - target).abs() <= return_tol {
    return Ok(evaluate_portfolio(w, mu, cov, risk_free));
  }

  // Portfolio return is non-decreasing in gamma.
  let direction = if target > r { 1.0 } else { -1.0 };
  let mut inner = 0.0;
  let mut outer = direction * GAMMA_SEED;
  let mut bracketed = false;
  for _ in 0..BRACKET_DOUBLINGS {
    w = qp.solve(outer, Some(&w));
    r = w.dot(&mu);
    if direction * (r - target) >= -return_tol {
      bracketed = true;
      break;
    }
    inner = outer;
    outer *= 2.0;
  }
  ensure!(
    bracketed,
    "target return {target} could not be reached (closest {r})"
  );

  for _ in 0..BISECTION_ITERS {
    if (r - target).abs() <= return_tol {
      break;
    }
    let mid = 0.5 * (inner + outer);
    w = qp.solve(mid, Some(&w));
    r = w.dot(&mu);
    if direction * (r - target) < 0.0 {
      inner = mid;
    } else {
      outer = mid;
    }
  }

  ensure!(
    (r - target).abs() <= 1e-6 * target.abs().max(1.0),
    "target return {target} not reached (closest {r})"
  );
  debug!(target, achieved = r, "frontier portfolio located");
  Ok(evaluate_portfolio(w, mu, cov, risk_free))
}

/// Sample the upper branch of the efficient frontier.
///
/// Targets run evenly from the minimum-variance return to the highest
/// attainable return (the best single asset when shorting is unrestricted).
pub fn efficient_frontier(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<EfficientFrontier> {
  ensure!(
    cfg.frontier_points >= 2,
    "frontier needs at least two points, got {}",
    cfg.frontier_points
  );
  let mv = min_variance(mu, cov, risk_free, cfg)?;
  let r_mv = mv.expected_return;

  let best_asset = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let r_top = if cfg.constraints.is_unconstrained() {
    best_asset
  } else {
    let (_, r_high) = BoxQp::new(mu, cov, cfg)?.return_range();
    if r_high.is_finite() {
      r_high
    } else {
      best_asset
    }
  };

  if r_top <= r_mv + 1e-12 {
    debug!(r_mv, r_top, "frontier collapses to the minimum-variance portfolio");
    return Ok(EfficientFrontier {
      points: vec![FrontierPoint {
        target_return: r_mv,
        portfolio: mv,
      }],
    });
  }

  let k = cfg.frontier_points;
  let targets: Vec<f64> = (1..k)
    .map(|i| r_mv + (r_top - r_mv) * i as f64 / (k - 1) as f64)
    .collect();

  let rest = targets
    .par_iter()
    .map(|&target| {
      min_variance_for_target(mu, cov, target, risk_free, cfg).map(|portfolio| FrontierPoint {
        target_return: target,
        portfolio,
      })
    })
    .collect::<Result<Vec<_>>>()?;

  let mut points = Vec::with_capacity(k);
  points.push(FrontierPoint {
    target_return: r_mv,
    portfolio: mv,
  });
  points.extend(rest);

  debug!(points = points.len(), r_mv, r_top, "efficient frontier sampled");
  Ok(EfficientFrontier { points })
}

struct NegativeSharpe {
  qp: BoxQp,
  risk_free: f64,
}

impl NegativeSharpe {
  /// Sharpe ratio and expected return of the frontier portfolio at `gamma`.
  fn evaluate(&self, gamma: f64) -> (f64, f64) {
    let w = self.qp.solve(gamma, None);
    let expected_return = w.dot(&self.qp.mu);
    let volatility = quad_form(w.view(), self.qp.cov.view()).sqrt();
    let sharpe = if volatility > 1e-15 {
      (expected_return - self.risk_free) / volatility
    } else {
      0.0
    };
    (sharpe, expected_return)
  }
}

impl CostFunction for NegativeSharpe {
  type Param = f64;
  type Output = f64;

  fn cost(&self, gamma: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(-self.evaluate(*gamma).0)
  }
}

/// Tangency portfolio: the frontier portfolio with the highest Sharpe ratio.
pub fn max_sharpe(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<PortfolioResult> {
  check_inputs(mu, cov)?;

  if cfg.constraints.is_unconstrained() {
    if let Some(cf) = ClosedForm::new(mu, cov) {
      // S^-1 (mu - rf 1)
      let x = &cf.b - &(&cf.a * risk_free);
      let total = x.sum();
      ensure!(
        total > 1e-14,
        "tangency portfolio is undefined: risk-free rate {risk_free} is not below the minimum-variance return {}",
        cf.w_mv.dot(&mu)
      );
      return Ok(evaluate_portfolio(x / total, mu, cov, risk_free));
    }
    warn!("covariance matrix is singular, falling back to projected gradient");
  }

  let qp = BoxQp::new(mu, cov, cfg)?;
  let (_, r_high) = qp.return_range();
  ensure!(
    r_high > risk_free,
    "no feasible portfolio earns more than the risk-free rate {risk_free}"
  );

  let problem = NegativeSharpe {
    qp: qp.clone(),
    risk_free,
  };

  // Walk gamma up until the Sharpe ratio falls or the return range is exhausted;
  // the peak then lies in [before, gamma].
  let mut before = 0.0;
  let mut prev = 0.0;
  let mut best = (0.0, problem.evaluate(0.0).0);
  let mut gamma = GAMMA_SEED;
  for _ in 0..BRACKET_DOUBLINGS {
    let (sharpe, expected_return) = problem.evaluate(gamma);
    if sharpe > best.1 {
      best = (gamma, sharpe);
    }
    if sharpe < best.1 || expected_return >= r_high - 1e-12 {
      break;
    }
    before = prev;
    prev = gamma;
    gamma *= 2.0;
  }

  let solver = BrentOpt::new(before, gamma);
  let refined = Executor::new(problem, solver)
    .configure(|state| state.max_iters(200))
    .run()
    .ok()
    .and_then(|res| res.state.best_param);

  let probe = NegativeSharpe {
    qp: qp.clone(),
    risk_free,
  };
  let gamma_star = match refined {
    Some(g) if probe.evaluate(g).0 >= best.1 => g,
    Some(_) => best.0,
    None => {
      warn!("Brent search failed, keeping the best bracketed point");
      best.0
    }
  };

  debug!(gamma = gamma_star, sharpe = best.1, "tangency portfolio located");
  let w = qp.solve(gamma_star, None);
  Ok(evaluate_portfolio(w, mu, cov, risk_free))
}

/// `1/n` allocation.
pub fn equal_weight(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
) -> Result<PortfolioResult> {
  check_inputs(mu, cov)?;
  let n = mu.len();
  Ok(evaluate_portfolio(
    Array1::from_elem(n, 1.0 / n as f64),
    mu,
    cov,
    risk_free,
  ))
}

/// Inverse-volatility heuristic allocation.
pub fn inverse_volatility(
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  risk_free: f64,
) -> Result<PortfolioResult> {
  check_inputs(mu, cov)?;
  let n = mu.len();

  let inv_vols = cov.diag().mapv(|v| {
    let sigma = v.max(0.0).sqrt();
    if sigma > 1e-15 {
      1.0 / sigma
    } else {
      0.0
    }
  });

  let total = inv_vols.sum();
  let w = if total > 1e-15 {
    inv_vols / total
  } else {
    Array1::from_elem(n, 1.0 / n as f64)
  };

  Ok(evaluate_portfolio(w, mu, cov, risk_free))
}

/// Dispatch to the selected allocation method.
pub fn optimize_with_method(
  method: OptimizerMethod,
  mu: ArrayView1<f64>,
  cov: ArrayView2<f64>,
  target_return: Option<f64>,
  risk_free: f64,
  cfg: &OptimizerConfig,
) -> Result<PortfolioResult> {
  match method {
    OptimizerMethod::MinVariance => min_variance(mu, cov, risk_free, cfg),
    OptimizerMethod::MaxSharpe => max_sharpe(mu, cov, risk_free, cfg),
    OptimizerMethod::TargetReturn => match target_return {
      Some(target) => min_variance_for_target(mu, cov, target, risk_free, cfg),
      None => bail!("target-return optimization needs a target return"),
    },
    OptimizerMethod::EqualWeight => equal_weight(mu, cov, risk_free),
    OptimizerMethod::InverseVol => inverse_volatility(mu, cov, risk_free),
  }
}
