//! # Moments
//!
//! $$
//! \sigma_{xy} = \frac{1}{n-\delta}\sum_{t=1}^{n}(x_t-\bar x)(y_t-\bar y)
//! $$
//!
//! Sample mean, variance, standard deviation and covariance written out term
//! by term, plus covariance / correlation matrices over `T x N` return panels.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

const ZERO_DISPERSION: f64 = 1e-15;

/// Arithmetic mean.
pub fn mean(xs: ArrayView1<f64>) -> Result<f64> {
  ensure!(!xs.is_empty(), "mean of an empty series is undefined");
  Ok(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Variance with `ddof` delta degrees of freedom (`ddof = 1` is the sample variance).
pub fn variance(xs: ArrayView1<f64>, ddof: usize) -> Result<f64> {
  let n = xs.len();
  ensure!(
    n > ddof,
    "variance needs more than {ddof} observations, got {n}"
  );

  let m = mean(xs)?;
  let mut acc = 0.0;
  for &x in xs.iter() {
    let d = x - m;
    acc += d * d;
  }
  Ok(acc / (n - ddof) as f64)
}

/// Standard deviation, the square root of [`variance`].
pub fn std_dev(xs: ArrayView1<f64>, ddof: usize) -> Result<f64> {
  Ok(variance(xs, ddof)?.sqrt())
}

/// Pairwise covariance of two equally long series.
pub fn covariance(x: ArrayView1<f64>, y: ArrayView1<f64>, ddof: usize) -> Result<f64> {
  ensure!(
    x.len() == y.len(),
    "series lengths differ ({} vs {})",
    x.len(),
    y.len()
  );
  let n = x.len();
  ensure!(
    n > ddof,
    "covariance needs more than {ddof} observations, got {n}"
  );

  let mx = mean(x)?;
  let my = mean(y)?;
  let acc: f64 = x
    .iter()
    .zip(y.iter())
    .map(|(&a, &b)| (a - mx) * (b - my))
    .sum();
  Ok(acc / (n - ddof) as f64)
}

/// Pearson correlation clamped to `[-1, 1]`.
///
/// Returns `0.0` when either series has no dispersion.
pub fn correlation(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<f64> {
  let cxy = covariance(x, y, 1)?;
  let sx = variance(x, 1)?.sqrt();
  let sy = variance(y, 1)?.sqrt();

  let denom = sx * sy;
  if denom < ZERO_DISPERSION {
    Ok(0.0)
  } else {
    Ok((cxy / denom).clamp(-1.0, 1.0))
  }
}

/// Covariance matrix of a `T x N` return panel (rows are observations, columns assets).
pub fn covariance_matrix(returns: ArrayView2<f64>, ddof: usize) -> Result<Array2<f64>> {
  let (n_obs, n_assets) = returns.dim();
  ensure!(n_assets > 0, "return panel has no assets");
  ensure!(
    n_obs > ddof,
    "covariance matrix needs more than {ddof} observations, got {n_obs}"
  );
  ensure!(
    returns.iter().all(|v| v.is_finite()),
    "return panel contains non-finite values"
  );

  // `cov` treats rows as variables, hence the transpose.
  let cov = returns
    .t()
    .cov(ddof as f64)
    .map_err(|e| anyhow::anyhow!("covariance estimation failed: {e}"))?;

  Ok(symmetrize(cov))
}

/// Correlation matrix of a `T x N` return panel.
pub fn correlation_matrix(returns: ArrayView2<f64>) -> Result<Array2<f64>> {
  let cov = covariance_matrix(returns, 1)?;
  Ok(cov_to_corr(cov.view()))
}

/// Per-column volatilities (square roots of the covariance diagonal).
pub fn volatilities(cov: ArrayView2<f64>) -> Array1<f64> {
  cov.diag().mapv(|v| v.max(0.0).sqrt())
}

/// Rescale a covariance matrix to a correlation matrix.
pub fn cov_to_corr(cov: ArrayView2<f64>) -> Array2<f64> {
  let n = cov.nrows();
  let sigmas = volatilities(cov);
  let mut corr = Array2::<f64>::zeros((n, n));

  for i in 0..n {
    for j in 0..n {
      let denom = sigmas[i] * sigmas[j];
      corr[[i, j]] = if i == j {
        1.0
      } else if denom > ZERO_DISPERSION {
        (cov[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      };
    }
  }

  corr
}

/// Build a covariance matrix from volatilities and a correlation matrix.
pub fn corr_to_cov(sigmas: ArrayView1<f64>, corr: ArrayView2<f64>) -> Result<Array2<f64>> {
  let n = sigmas.len();
  ensure!(
    corr.dim() == (n, n),
    "correlation matrix is {:?}, expected {n}x{n}",
    corr.dim()
  );

  let outer = sigmas
    .view()
    .insert_axis(Axis(1))
    .dot(&sigmas.view().insert_axis(Axis(0)));
  Ok(outer * &corr)
}

fn symmetrize(mut m: Array2<f64>) -> Array2<f64> {
  let n = m.nrows();
  for i in 0..n {
    for j in (i + 1)..n {
      let avg = 0.5 * (m[[i, j]] + m[[j, i]]);
      m[[i, j]] = avg;
      m[[j, i]] = avg;
    }
  }
  m
}
