//! # Rolling Windows
//!
//! $$
//! y_k = \mathcal{R}\big(x_{k}, \dots, x_{k+w-1}\big), \qquad k = 0,\dots,n-w
//! $$
//!
//! Dated series and a rolling-window aggregator parameterized by the window
//! length and an arbitrary reducer.

use anyhow::Result;
use anyhow::ensure;
use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::s;
use rayon::prelude::*;
use tracing::debug;

use super::moments::mean;
use super::moments::std_dev;
use super::moments::variance;
use super::returns::annualize_volatility;
use crate::quant::portfolio::validate::WEIGHT_SUM_TOLERANCE;
use crate::quant::portfolio::validate::validate_weights;
use crate::quant::portfolio::validate::validate_window;
use crate::traits::Reducer;

/// Dated observations, e.g. daily returns of one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
  name: String,
  index: Vec<NaiveDate>,
  values: Array1<f64>,
}

/// Options for [`TimeSeries::rolling_with`].
#[derive(Clone, Copy, Debug)]
pub struct RollingConfig {
  /// Window length in observations.
  pub window: usize,
  /// Observations required before a point is emitted. Defaults to `window`.
  pub min_periods: Option<usize>,
  /// Keep the full index and emit `NaN` where too few observations exist.
  pub pad: bool,
}

impl RollingConfig {
  pub fn new(window: usize) -> Self {
    Self {
      window,
      min_periods: None,
      pad: false,
    }
  }

  pub fn min_periods(mut self, min_periods: usize) -> Self {
    self.min_periods = Some(min_periods);
    self
  }

  pub fn pad(mut self, pad: bool) -> Self {
    self.pad = pad;
    self
  }
}

impl Default for RollingConfig {
  fn default() -> Self {
    Self::new(21)
  }
}

/// Window mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mean;

/// Window variance with `ddof` delta degrees of freedom.
#[derive(Clone, Copy, Debug)]
pub struct Variance {
  pub ddof: usize,
}

/// Window standard deviation with `ddof` delta degrees of freedom.
#[derive(Clone, Copy, Debug)]
pub struct StdDev {
  pub ddof: usize,
}

/// Window standard deviation scaled by `sqrt(periods_per_year)`.
#[derive(Clone, Copy, Debug)]
pub struct AnnualizedVolatility {
  pub ddof: usize,
  pub periods_per_year: f64,
}

impl Reducer for Mean {
  fn reduce(&self, window: ArrayView1<f64>) -> f64 {
    mean(window).unwrap_or(f64::NAN)
  }

  fn label(&self) -> &'static str {
    "mean"
  }
}

impl Reducer for Variance {
  fn reduce(&self, window: ArrayView1<f64>) -> f64 {
    variance(window, self.ddof).unwrap_or(f64::NAN)
  }

  fn min_window(&self) -> usize {
    self.ddof + 1
  }

  fn label(&self) -> &'static str {
    "variance"
  }
}

impl Reducer for StdDev {
  fn reduce(&self, window: ArrayView1<f64>) -> f64 {
    std_dev(window, self.ddof).unwrap_or(f64::NAN)
  }

  fn min_window(&self) -> usize {
    self.ddof + 1
  }

  fn label(&self) -> &'static str {
    "std"
  }
}

impl Reducer for AnnualizedVolatility {
  fn reduce(&self, window: ArrayView1<f64>) -> f64 {
    std_dev(window, self.ddof)
      .map(|s| annualize_volatility(s, self.periods_per_year))
      .unwrap_or(f64::NAN)
  }

  fn min_window(&self) -> usize {
    self.ddof + 1
  }

  fn label(&self) -> &'static str {
    "volatility"
  }
}

impl TimeSeries {
  /// Build a series. The index must be strictly increasing and as long as `values`.
  pub fn new(name: impl Into<String>, index: Vec<NaiveDate>, values: Array1<f64>) -> Result<Self> {
    ensure!(
      index.len() == values.len(),
      "index has {} dates but there are {} values",
      index.len(),
      values.len()
    );
    ensure!(
      index.windows(2).all(|w| w[0] < w[1]),
      "index must be strictly increasing"
    );

    Ok(Self {
      name: name.into(),
      index,
      values,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn index(&self) -> &[NaiveDate] {
    &self.index
  }

  pub fn values(&self) -> ArrayView1<'_, f64> {
    self.values.view()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn rename(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Values paired with their dates.
  pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
    self.index.iter().copied().zip(self.values.iter().copied())
  }

  /// Roll `f` over every full window of `window` observations.
  ///
  /// Point `k` is labelled with the date of the window's last observation.
  pub fn rolling<F>(&self, window: usize, f: F) -> Result<TimeSeries>
  where
    F: Fn(ArrayView1<f64>) -> f64,
  {
    self.rolling_with(&RollingConfig::new(window), f)
  }

  /// Roll a built-in [`Reducer`] over full windows.
  pub fn rolling_reduce<R: Reducer>(&self, window: usize, reducer: &R) -> Result<TimeSeries> {
    ensure!(
      window >= reducer.min_window(),
      "{} needs a window of at least {} observations, got {window}",
      reducer.label(),
      reducer.min_window()
    );
    let out = self.rolling(window, |w| reducer.reduce(w))?;
    Ok(out.rename(format!("{} rolling {}({window})", self.name, reducer.label())))
  }

  /// Roll `f` with explicit `min_periods` / padding behaviour.
  pub fn rolling_with<F>(&self, cfg: &RollingConfig, f: F) -> Result<TimeSeries>
  where
    F: Fn(ArrayView1<f64>) -> f64,
  {
    let window = cfg.window;
    validate_window(window, self.len())?;
    let min_periods = cfg.min_periods.unwrap_or(window);
    ensure!(
      (1..=window).contains(&min_periods),
      "min_periods must lie in 1..={window}, got {min_periods}"
    );

    // First position whose partial window holds `min_periods` observations.
    let first = min_periods - 1;
    let n = self.len();
    let mut index = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);

    for t in 0..n {
      if t < first {
        if cfg.pad {
          index.push(self.index[t]);
          values.push(f64::NAN);
        }
        continue;
      }
      let start = (t + 1).saturating_sub(window);
      index.push(self.index[t]);
      values.push(f(self.values.slice(s![start..=t])));
    }

    debug!(
      series = %self.name,
      window,
      min_periods,
      points = values.len(),
      "rolling window evaluated"
    );

    Ok(TimeSeries {
      name: format!("{} rolling({window})", self.name),
      index,
      values: Array1::from(values),
    })
  }

  /// Parallel variant of [`TimeSeries::rolling`]; output is identical.
  pub fn par_rolling<F>(&self, window: usize, f: F) -> Result<TimeSeries>
  where
    F: Fn(ArrayView1<f64>) -> f64 + Sync + Send,
  {
    validate_window(window, self.len())?;
    let n_out = self.len() - window + 1;
    let values: Vec<f64> = (0..n_out)
      .into_par_iter()
      .map(|k| f(self.values.slice(s![k..k + window])))
      .collect();

    Ok(TimeSeries {
      name: format!("{} rolling({window})", self.name),
      index: self.index[window - 1..].to_vec(),
      values: Array1::from(values),
    })
  }

  /// Annualized rolling volatility using the sample standard deviation.
  pub fn rolling_volatility(&self, window: usize, periods_per_year: f64) -> Result<TimeSeries> {
    let reducer = AnnualizedVolatility {
      ddof: 1,
      periods_per_year,
    };
    self.rolling_reduce(window, &reducer)
  }
}

/// Weighted sum of asset return series sharing one index.
pub fn weighted_sum(series: &[TimeSeries], weights: ArrayView1<f64>) -> Result<TimeSeries> {
  ensure!(!series.is_empty(), "no series supplied");
  ensure!(
    series.len() == weights.len(),
    "{} series but {} weights",
    series.len(),
    weights.len()
  );

  let first = &series[0];
  for s in &series[1..] {
    ensure!(
      s.index == first.index,
      "series '{}' and '{}' do not share an index",
      first.name,
      s.name
    );
  }

  let mut combined = Array1::<f64>::zeros(first.len());
  for (s, &w) in series.iter().zip(weights.iter()) {
    combined.scaled_add(w, &s.values);
  }

  TimeSeries::new("portfolio", first.index.clone(), combined)
}

/// Rolling annualized volatility of the weighted portfolio return series.
pub fn rolling_portfolio_volatility(
  series: &[TimeSeries],
  weights: ArrayView1<f64>,
  window: usize,
  periods_per_year: f64,
) -> Result<TimeSeries> {
  validate_weights(weights, WEIGHT_SUM_TOLERANCE)?;
  let portfolio = weighted_sum(series, weights)?;
  portfolio.rolling_volatility(window, periods_per_year)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect()
  }

  fn series(name: &str, values: Array1<f64>) -> TimeSeries {
    TimeSeries::new(name, dates(values.len()), values).unwrap()
  }

  #[test]
  fn rolling_sum_labels_window_end() {
    let ts = series("x", array![1.0, 2.0, 3.0, 4.0, 5.0]);
    let out = ts.rolling(3, |w| w.sum()).unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(out.values().to_vec(), vec![6.0, 9.0, 12.0]);
    assert_eq!(out.index()[0], ts.index()[2]);
    assert_eq!(out.index()[2], ts.index()[4]);
  }

  #[test]
  fn window_must_be_shorter_than_series() {
    let ts = series("x", array![1.0, 2.0, 3.0]);
    assert!(ts.rolling(3, |w| w.sum()).is_err());
    assert!(ts.rolling(0, |w| w.sum()).is_err());
    assert!(ts.rolling(2, |w| w.sum()).is_ok());
  }

  #[test]
  fn rolling_std_matches_by_hand_formula() {
    let ts = series("x", array![0.01, -0.02, 0.015, 0.0, 0.03, -0.01]);
    let out = ts.rolling_reduce(4, &StdDev { ddof: 1 }).unwrap();

    for (k, v) in out.values().iter().enumerate() {
      let expected = std_dev(ts.values().slice(s![k..k + 4]), 1).unwrap();
      assert_abs_diff_eq!(*v, expected, epsilon = 1e-15);
    }
  }

  #[test]
  fn sample_std_rejects_single_observation_window() {
    let ts = series("x", array![1.0, 2.0, 3.0]);
    assert!(ts.rolling_reduce(1, &StdDev { ddof: 1 }).is_err());
    assert!(ts.rolling_reduce(1, &Mean).is_ok());
  }

  #[test]
  fn padded_rolling_keeps_full_index() {
    let ts = series("x", array![1.0, 2.0, 3.0, 4.0]);
    let cfg = RollingConfig::new(2).pad(true);
    let out = ts.rolling_with(&cfg, |w| w.sum()).unwrap();

    assert_eq!(out.len(), 4);
    assert!(out.values()[0].is_nan());
    assert_eq!(out.values()[1], 3.0);
    assert_eq!(out.index(), ts.index());
  }

  #[test]
  fn min_periods_emits_partial_windows() {
    let ts = series("x", array![1.0, 2.0, 3.0, 4.0]);
    let cfg = RollingConfig::new(3).min_periods(1);
    let out = ts.rolling_with(&cfg, |w| w.len() as f64).unwrap();

    assert_eq!(out.values().to_vec(), vec![1.0, 2.0, 3.0, 3.0]);
  }

  #[test]
  fn par_rolling_matches_sequential() {
    let values = Array1::from_iter((0..200).map(|i| ((i as f64) * 0.37).sin() * 0.01));
    let ts = series("x", values);
    let seq = ts.rolling(20, |w| w.sum()).unwrap();
    let par = ts.par_rolling(20, |w| w.sum()).unwrap();

    assert_eq!(seq.index(), par.index());
    for (a, b) in seq.values().iter().zip(par.values().iter()) {
      assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
    }
  }

  #[test]
  fn nan_inside_window_propagates() {
    let ts = series("x", array![1.0, f64::NAN, 3.0, 4.0, 5.0]);
    let out = ts.rolling(2, |w| w.sum()).unwrap();

    assert!(out.values()[0].is_nan());
    assert!(out.values()[1].is_nan());
    assert_eq!(out.values()[2], 7.0);
  }

  #[test]
  fn rejects_unsorted_index() {
    let mut idx = dates(3);
    idx.swap(0, 1);
    assert!(TimeSeries::new("x", idx, array![1.0, 2.0, 3.0]).is_err());
  }

  #[test]
  fn portfolio_rolling_volatility_of_identical_assets_equals_asset_volatility() {
    let values = array![0.01, -0.02, 0.015, 0.0, 0.03, -0.01, 0.005];
    let a = series("a", values.clone());
    let b = series("b", values);

    let port = rolling_portfolio_volatility(&[a.clone(), b], array![0.4, 0.6].view(), 5, 252.0)
      .unwrap();
    let single = a.rolling_volatility(5, 252.0).unwrap();

    for (p, s) in port.values().iter().zip(single.values().iter()) {
      assert_abs_diff_eq!(*p, *s, epsilon = 1e-14);
    }
  }

  #[test]
  fn portfolio_rolling_volatility_validates_weights() {
    let a = series("a", array![0.01, 0.02, 0.03]);
    let b = series("b", array![0.01, 0.02, 0.03]);
    assert!(rolling_portfolio_volatility(&[a, b], array![0.5, 0.6].view(), 2, 252.0).is_err());
  }
}
