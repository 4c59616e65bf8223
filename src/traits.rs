//! # Traits
//!
//! $$
//! \mathcal{R}: \mathbb{R}^{w} \to \mathbb{R}
//! $$
//!
use ndarray::ArrayView1;

/// Aggregates one window of observations into a single value.
///
/// Built-in reducers live in [`crate::stats::rolling`]; arbitrary closures go
/// through [`crate::stats::rolling::TimeSeries::rolling`] directly.
pub trait Reducer {
  /// Reduce the window to a scalar.
  fn reduce(&self, window: ArrayView1<f64>) -> f64;

  /// Smallest window length for which [`Reducer::reduce`] is defined.
  fn min_window(&self) -> usize {
    1
  }

  /// Label used when naming derived series.
  fn label(&self) -> &'static str {
    "reduced"
  }
}
