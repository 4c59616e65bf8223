//! # Dashboard
//!
//! $$
//! (\text{tickers}, \mathbf{w}, w) \xrightarrow{\ \text{recompute}\ } \big(\sigma_p,\ \{\hat\sigma_{i,t}\},\ \{\hat\sigma_{p,t}\},\ \mathbf{w}_{mv}\big)
//! $$
//!
//! Interactive-style state: inputs are edited freely and only a
//! [`Dashboard::recompute`] call turns them into new figures and charts.

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use ndarray::Array1;
use plotly::Plot;
use tracing::info;
use tracing::warn;

use crate::data::PriceFrame;
use crate::quant::portfolio::EfficientFrontier;
use crate::quant::portfolio::OptimizerConfig;
use crate::quant::portfolio::OptimizerMethod;
use crate::quant::portfolio::PortfolioEngine;
use crate::quant::portfolio::PortfolioEngineConfig;
use crate::quant::portfolio::PortfolioResult;
use crate::quant::portfolio::RiskContributions;
use crate::quant::portfolio::WeightConstraints;
use crate::quant::portfolio::diversification_ratio;
use crate::quant::portfolio::efficient_frontier;
use crate::quant::portfolio::optimizers::evaluate_portfolio;
use crate::quant::portfolio::risk_contributions;
use crate::quant::portfolio::validate::WEIGHT_SUM_TOLERANCE;
use crate::quant::portfolio::validate::validate_weights;
use crate::stats::returns::ReturnKind;
use crate::stats::returns::TRADING_DAYS_PER_YEAR;
use crate::stats::rolling::TimeSeries;
use crate::stats::rolling::rolling_portfolio_volatility;
use crate::visualization::GridReport;
use crate::visualization::RiskReturnPoint;

/// Values currently entered in the dashboard controls.
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardInputs {
  /// Selected tickers, upper-cased.
  pub tickers: Vec<String>,
  /// One weight per ticker. Empty means equal weights.
  pub weights: Vec<f64>,
  /// Rolling window length in observations.
  pub window: usize,
  pub periods_per_year: f64,
  /// Restrict the minimum-variance portfolio to `w >= 0`. Off by default,
  /// so shorting is allowed unless asked otherwise.
  pub long_only: bool,
}

impl Default for DashboardInputs {
  fn default() -> Self {
    Self {
      tickers: Vec::new(),
      weights: Vec::new(),
      window: 21,
      periods_per_year: TRADING_DAYS_PER_YEAR,
      long_only: false,
    }
  }
}

/// Figures produced by one recompute.
#[derive(Clone, Debug)]
pub struct DashboardSnapshot {
  /// Inputs the snapshot was computed from.
  pub inputs: DashboardInputs,
  /// The entered portfolio, annualized.
  pub portfolio: PortfolioResult,
  pub risk: RiskContributions,
  pub diversification_ratio: f64,
  /// Rolling annualized volatility of each selected asset.
  pub asset_volatility: Vec<TimeSeries>,
  /// Rolling annualized volatility of the entered portfolio.
  pub portfolio_volatility: TimeSeries,
  pub min_variance: PortfolioResult,
  pub frontier: EfficientFrontier,
  /// Per-asset annualized (volatility, return).
  pub assets: Vec<RiskReturnPoint>,
}

/// Dashboard state over a loaded price panel.
pub struct Dashboard {
  prices: PriceFrame,
  inputs: DashboardInputs,
  stale: bool,
  snapshot: Option<DashboardSnapshot>,
}

impl Dashboard {
  pub fn new(prices: PriceFrame) -> Self {
    Self {
      prices,
      inputs: DashboardInputs::default(),
      stale: true,
      snapshot: None,
    }
  }

  pub fn prices(&self) -> &PriceFrame {
    &self.prices
  }

  pub fn inputs(&self) -> &DashboardInputs {
    &self.inputs
  }

  /// Last successful snapshot.
  pub fn snapshot(&self) -> Option<&DashboardSnapshot> {
    self.snapshot.as_ref()
  }

  /// Whether the inputs changed since the last successful recompute.
  pub fn is_stale(&self) -> bool {
    self.stale
  }

  /// Comma separated ticker text box.
  pub fn set_tickers(&mut self, text: &str) {
    self.inputs.tickers = text
      .split(',')
      .map(|t| t.trim().to_uppercase())
      .filter(|t| !t.is_empty())
      .collect();
    self.stale = true;
  }

  /// Comma separated weights text box. Values are checked on recompute;
  /// text that is not a number is rejected here and leaves the inputs unchanged.
  pub fn set_weights(&mut self, text: &str) -> Result<()> {
    let weights = text
      .split(',')
      .map(str::trim)
      .filter(|w| !w.is_empty())
      .map(|w| {
        w.parse::<f64>()
          .with_context(|| format!("invalid weight '{w}'"))
      })
      .collect::<Result<Vec<_>>>()?;
    self.inputs.weights = weights;
    self.stale = true;
    Ok(())
  }

  pub fn set_window(&mut self, window: usize) {
    self.inputs.window = window;
    self.stale = true;
  }

  pub fn set_periods_per_year(&mut self, periods_per_year: f64) {
    self.inputs.periods_per_year = periods_per_year;
    self.stale = true;
  }

  pub fn set_long_only(&mut self, long_only: bool) {
    self.inputs.long_only = long_only;
    self.stale = true;
  }

  /// Recompute every figure from the current inputs.
  ///
  /// On error the previous snapshot is kept and the state stays stale.
  pub fn recompute(&mut self) -> Result<&DashboardSnapshot> {
    match self.compute() {
      Ok(snapshot) => {
        info!(
          tickers = ?snapshot.inputs.tickers,
          window = snapshot.inputs.window,
          volatility = snapshot.portfolio.volatility,
          "dashboard recomputed"
        );
        self.stale = false;
        Ok(self.snapshot.insert(snapshot))
      }
      Err(err) => {
        warn!(error = %err, "dashboard inputs rejected");
        Err(err)
      }
    }
  }

  fn compute(&self) -> Result<DashboardSnapshot> {
    let inputs = self.inputs.clone();
    ensure!(!inputs.tickers.is_empty(), "no tickers entered");
    let tickers: Vec<&str> = inputs.tickers.iter().map(String::as_str).collect();
    let n = tickers.len();

    let weights = match inputs.weights.len() {
      0 => Array1::from_elem(n, 1.0 / n as f64),
      k if k == n => Array1::from(inputs.weights.clone()),
      k => bail!("{k} weights entered for {n} tickers"),
    };
    validate_weights(weights.view(), WEIGHT_SUM_TOLERANCE)?;

    let returns = self.prices.select(&tickers)?.returns(ReturnKind::Simple)?;
    let series = returns.all_series()?;
    let asset_volatility = series
      .iter()
      .map(|s| s.rolling_volatility(inputs.window, inputs.periods_per_year))
      .collect::<Result<Vec<_>>>()?;
    let portfolio_volatility = rolling_portfolio_volatility(
      &series,
      weights.view(),
      inputs.window,
      inputs.periods_per_year,
    )?
    .rename("portfolio");

    let constraints = if inputs.long_only {
      WeightConstraints::long_only()
    } else {
      WeightConstraints::unconstrained()
    };
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      method: OptimizerMethod::MinVariance,
      periods_per_year: inputs.periods_per_year,
      optimizer: OptimizerConfig::default().with_constraints(constraints),
      ..PortfolioEngineConfig::default()
    });
    let analysis = engine.analyze(returns.returns())?;
    let (mu, cov) = (&analysis.estimates.mu, &analysis.estimates.cov);

    let risk = risk_contributions(weights.view(), cov.view())?;
    let diversification_ratio = diversification_ratio(weights.view(), cov.view())?;
    let portfolio = evaluate_portfolio(weights, mu.view(), cov.view(), 0.0);
    let frontier = efficient_frontier(mu.view(), cov.view(), 0.0, &engine.config().optimizer)?;
    let assets = inputs
      .tickers
      .iter()
      .enumerate()
      .map(|(i, t)| RiskReturnPoint {
        label: t.clone(),
        volatility: cov[[i, i]].max(0.0).sqrt(),
        expected_return: mu[i],
      })
      .collect();

    Ok(DashboardSnapshot {
      inputs,
      portfolio,
      risk,
      diversification_ratio,
      asset_volatility,
      portfolio_volatility,
      min_variance: analysis.portfolio,
      frontier,
      assets,
    })
  }

  /// Report of the last snapshot, `None` before the first successful recompute.
  pub fn report(&self) -> Option<GridReport> {
    let snap = self.snapshot.as_ref()?;
    let mut lines = snap.asset_volatility.clone();
    lines.push(snap.portfolio_volatility.clone());
    let tickers = &snap.inputs.tickers;

    Some(
      GridReport::new()
        .title("Portfolio volatility")
        .rolling_volatility(
          &lines,
          &format!("rolling volatility ({} obs)", snap.inputs.window),
        )
        .efficient_frontier(&snap.frontier, &snap.assets, "efficient frontier")
        .weights(tickers, snap.portfolio.weights.view(), "entered weights")
        .weights(
          tickers,
          snap.min_variance.weights.view(),
          "minimum-variance weights",
        ),
    )
  }

  /// Chart of the last snapshot.
  pub fn render(&self) -> Option<Plot> {
    self.report().map(GridReport::plot)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::portfolio_volatility;

  fn prices() -> PriceFrame {
    let n = 80;
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates = (0..n)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect();
    let prices = Array2::from_shape_fn((n, 3), |(t, j)| {
      let t = t as f64;
      match j {
        0 => 100.0 * (1.0 + 0.02 * (0.7 * t).sin() + 0.001 * t),
        1 => 50.0 * (1.0 + 0.01 * (1.3 * t).cos() + 0.0005 * t),
        _ => 20.0 * (1.0 + 0.04 * (0.4 * t).sin() * (0.9 * t).cos()),
      }
    });
    PriceFrame::new(
      dates,
      vec!["AAA".into(), "BBB".into(), "CCC".into()],
      prices,
    )
    .unwrap()
  }

  #[test]
  fn setters_only_mark_state_dirty() {
    let mut dash = Dashboard::new(prices());
    dash.set_tickers(" aaa, bbb ,");
    dash.set_weights("0.5, 0.5").unwrap();

    assert_eq!(dash.inputs().tickers, vec!["AAA", "BBB"]);
    assert!(dash.is_stale());
    assert!(dash.snapshot().is_none());
    assert!(dash.render().is_none());
  }

  #[test]
  fn recompute_clears_stale_flag_and_renders() {
    let mut dash = Dashboard::new(prices());
    dash.set_tickers("AAA,BBB,CCC");
    dash.set_weights("0.5,0.3,0.2").unwrap();
    dash.set_window(10);

    let snap = dash.recompute().unwrap();
    assert_eq!(snap.asset_volatility.len(), 3);
    // 80 prices -> 79 returns -> 70 full windows.
    assert_eq!(snap.portfolio_volatility.len(), 70);
    assert_abs_diff_eq!(snap.risk.volatility, snap.portfolio.volatility, epsilon = 1e-12);
    assert_abs_diff_eq!(snap.min_variance.weights.sum(), 1.0, epsilon = 1e-8);
    assert!(snap.diversification_ratio >= 1.0 - 1e-12);
    assert!(snap.min_variance.volatility <= snap.portfolio.volatility + 1e-10);
    assert!(!dash.is_stale());
    assert!(dash.render().is_some());
  }

  #[test]
  fn snapshot_volatility_matches_closed_form() {
    let mut dash = Dashboard::new(prices());
    dash.set_tickers("AAA,CCC");
    dash.set_weights("0.6,0.4").unwrap();
    dash.set_window(5);
    let snap = dash.recompute().unwrap().clone();

    let returns = dash
      .prices()
      .select(&["AAA", "CCC"])
      .unwrap()
      .returns(ReturnKind::Simple)
      .unwrap();
    let est = PortfolioEngine::new(PortfolioEngineConfig::default())
      .estimate(returns.returns())
      .unwrap();
    let expected = portfolio_volatility(snap.portfolio.weights.view(), est.cov.view()).unwrap();
    assert_abs_diff_eq!(snap.portfolio.volatility, expected, epsilon = 1e-12);
  }

  #[test]
  #[traced_test]
  fn failed_recompute_keeps_previous_snapshot() {
    let mut dash = Dashboard::new(prices());
    dash.set_tickers("AAA,BBB");
    dash.recompute().unwrap();
    let before = dash.snapshot().unwrap().portfolio.clone();

    dash.set_weights("0.9,0.3").unwrap();
    assert!(dash.recompute().is_err());
    assert!(dash.is_stale());
    assert_eq!(dash.snapshot().unwrap().portfolio, before);
    assert!(logs_contain("dashboard inputs rejected"));

    dash.set_window(500);
    dash.set_weights("0.5,0.5").unwrap();
    assert!(dash.recompute().is_err());

    dash.set_tickers("AAA,ZZZ");
    assert!(dash.recompute().is_err());
  }

  #[test]
  fn invalid_weight_text_is_rejected_immediately() {
    let mut dash = Dashboard::new(prices());
    dash.set_weights("0.5,0.5").unwrap();
    assert!(dash.set_weights("0.5,abc").is_err());
    assert_eq!(dash.inputs().weights, vec![0.5, 0.5]);
  }

  #[test]
  fn long_only_is_opt_in() {
    let mut dash = Dashboard::new(prices());
    assert!(!dash.inputs().long_only);

    dash.set_tickers("AAA,BBB,CCC");
    dash.set_long_only(true);
    let snap = dash.recompute().unwrap();
    assert!(snap.inputs.long_only);
    assert!(snap.min_variance.weights.iter().all(|w| *w >= -1e-12));
    assert_abs_diff_eq!(snap.min_variance.weights.sum(), 1.0, epsilon = 1e-8);
  }
}
