//! # Price Data
//!
//! $$
//! \{(t_k, P_{k,1},\dots,P_{k,N})\}_{k=1}^T \ \mapsto\ P\in\mathbb{R}^{T\times N}
//! $$
//!
//! Wide CSV price panels: first column a `%Y-%m-%d` date, one column per ticker.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;

use crate::stats::returns::ReturnKind;
use crate::stats::returns::returns_matrix;
use crate::stats::rolling::TimeSeries;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn column_of(tickers: &[String], ticker: &str) -> Result<usize> {
  tickers
    .iter()
    .position(|t| t.eq_ignore_ascii_case(ticker))
    .with_context(|| format!("unknown ticker '{ticker}'"))
}

/// Dated price panel, rows sorted by date.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceFrame {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  prices: Array2<f64>,
}

impl PriceFrame {
  /// Build a frame from parts. Rows are reordered by date; duplicate dates are rejected.
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    ensure!(!tickers.is_empty(), "price frame has no tickers");
    ensure!(
      prices.dim() == (dates.len(), tickers.len()),
      "price matrix is {}x{} but there are {} dates and {} tickers",
      prices.nrows(),
      prices.ncols(),
      dates.len(),
      tickers.len()
    );

    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| dates[i]);
    let dates: Vec<NaiveDate> = order.iter().map(|&i| dates[i]).collect();
    if let Some(w) = dates.windows(2).find(|w| w[0] == w[1]) {
      bail!("duplicate date {}", w[0]);
    }
    let prices = prices.select(Axis(0), &order);

    Ok(Self {
      dates,
      tickers,
      prices,
    })
  }

  /// Parse a wide CSV with a header row `date,TICKER1,TICKER2,...`.
  pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = reader.headers().context("missing CSV header row")?.clone();
    ensure!(
      headers.len() >= 2,
      "expected a date column followed by at least one ticker column"
    );
    let tickers: Vec<String> = headers.iter().skip(1).map(|h| h.to_uppercase()).collect();

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for (row, result) in reader.records().enumerate() {
      // Header is line 1.
      let line = row + 2;
      let record = result.with_context(|| format!("invalid CSV row at line {line}"))?;
      ensure!(
        record.len() == headers.len(),
        "line {line} has {} fields, expected {}",
        record.len(),
        headers.len()
      );

      let raw_date = record.get(0).unwrap_or_default();
      let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
        .with_context(|| format!("unparsable date '{raw_date}' at line {line}"))?;
      dates.push(date);

      for (ticker, cell) in tickers.iter().zip(record.iter().skip(1)) {
        ensure!(
          !cell.is_empty(),
          "missing price for {ticker} at line {line}"
        );
        let price = cell
          .parse::<f64>()
          .with_context(|| format!("invalid price '{cell}' for {ticker} at line {line}"))?;
        values.push(price);
      }
    }

    ensure!(!dates.is_empty(), "price file has no data rows");
    let prices = Array2::from_shape_vec((dates.len(), tickers.len()), values)
      .context("price rows do not form a rectangular panel")?;

    debug!(
      rows = dates.len(),
      tickers = tickers.len(),
      "price frame loaded"
    );
    Self::new(dates, tickers, prices)
  }

  pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
      .with_context(|| format!("failed to open price file {}", path.display()))?;
    Self::from_csv_reader(file).with_context(|| format!("failed to read {}", path.display()))
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn prices(&self) -> ArrayView2<'_, f64> {
    self.prices.view()
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Price column of one ticker (case-insensitive).
  pub fn column(&self, ticker: &str) -> Result<ArrayView1<'_, f64>> {
    Ok(self.prices.column(column_of(&self.tickers, ticker)?))
  }

  /// Subset of columns in the order given.
  pub fn select(&self, tickers: &[&str]) -> Result<PriceFrame> {
    ensure!(!tickers.is_empty(), "no tickers selected");
    let idx = tickers
      .iter()
      .map(|t| column_of(&self.tickers, t))
      .collect::<Result<Vec<_>>>()?;

    Ok(PriceFrame {
      dates: self.dates.clone(),
      tickers: idx.iter().map(|&i| self.tickers[i].clone()).collect(),
      prices: self.prices.select(Axis(1), &idx),
    })
  }

  /// Period returns; each row is dated with the later of its two prices.
  pub fn returns(&self, kind: ReturnKind) -> Result<ReturnFrame> {
    let returns = returns_matrix(self.prices.view(), kind)
      .context("failed to convert prices to returns")?;
    Ok(ReturnFrame {
      dates: self.dates[1..].to_vec(),
      tickers: self.tickers.clone(),
      returns,
      kind,
    })
  }
}

/// Dated `T x N` return panel derived from a [`PriceFrame`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnFrame {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  returns: Array2<f64>,
  kind: ReturnKind,
}

impl ReturnFrame {
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  pub fn kind(&self) -> ReturnKind {
    self.kind
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Return series of one ticker.
  pub fn series(&self, ticker: &str) -> Result<TimeSeries> {
    let j = column_of(&self.tickers, ticker)?;
    TimeSeries::new(
      self.tickers[j].clone(),
      self.dates.clone(),
      self.returns.column(j).to_owned(),
    )
  }

  /// One [`TimeSeries`] per ticker, in column order.
  pub fn all_series(&self) -> Result<Vec<TimeSeries>> {
    self.tickers.iter().map(|t| self.series(t)).collect()
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use approx::assert_abs_diff_eq;

  use super::*;

  const CSV: &str = "\
date,aapl,MSFT
2024-01-03,102.0,201.0
2024-01-02,100.0,200.0
2024-01-04,101.0,204.0
";

  #[test]
  fn new_rejects_mismatched_price_matrix() {
    let dates = vec![
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
      NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
    ];
    let tickers = vec!["AAA".to_string(), "BBB".to_string()];

    let err = PriceFrame::new(dates.clone(), tickers.clone(), Array2::ones((3, 2))).unwrap_err();
    assert!(err.to_string().contains("3x2"));
    assert!(PriceFrame::new(dates.clone(), tickers, Array2::ones((2, 1))).is_err());
    assert!(PriceFrame::new(dates, Vec::new(), Array2::ones((2, 0))).is_err());
  }

  #[test]
  fn parses_and_sorts_rows() {
    let frame = PriceFrame::from_csv_reader(CSV.as_bytes()).unwrap();

    assert_eq!(frame.tickers(), &["AAPL".to_string(), "MSFT".to_string()]);
    assert_eq!(
      frame.dates()[0],
      NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    );
    assert_eq!(frame.column("aapl").unwrap().to_vec(), vec![100.0, 102.0, 101.0]);
  }

  #[test]
  fn returns_are_dated_by_the_later_price() {
    let frame = PriceFrame::from_csv_reader(CSV.as_bytes()).unwrap();
    let returns = frame.returns(ReturnKind::Simple).unwrap();

    assert_eq!(returns.len(), 2);
    assert_eq!(
      returns.dates()[0],
      NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    );
    let msft = returns.series("MSFT").unwrap();
    assert_abs_diff_eq!(msft.values()[0], 0.005, epsilon = 1e-12);
    assert_abs_diff_eq!(msft.values()[1], 204.0 / 201.0 - 1.0, epsilon = 1e-12);
  }

  #[test]
  fn select_keeps_requested_order() {
    let frame = PriceFrame::from_csv_reader(CSV.as_bytes()).unwrap();
    let sub = frame.select(&["MSFT", "AAPL"]).unwrap();

    assert_eq!(sub.tickers()[0], "MSFT");
    assert_eq!(sub.prices()[[0, 1]], 100.0);
    assert!(frame.select(&["GOOG"]).is_err());
  }

  #[test]
  fn rejects_bad_dates_and_empty_cells() {
    let bad_date = "date,A\n2024-13-01,1.0\n";
    let err = PriceFrame::from_csv_reader(bad_date.as_bytes()).unwrap_err();
    assert!(format!("{err:#}").contains("unparsable date"));

    let empty = "date,A,B\n2024-01-02,1.0,\n";
    let err = PriceFrame::from_csv_reader(empty.as_bytes()).unwrap_err();
    assert!(format!("{err:#}").contains("missing price"));
  }

  #[test]
  fn rejects_duplicate_dates() {
    let dup = "date,A\n2024-01-02,1.0\n2024-01-02,1.1\n";
    assert!(PriceFrame::from_csv_reader(dup.as_bytes()).is_err());
  }

  #[test]
  fn loads_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CSV.as_bytes()).unwrap();

    let frame = PriceFrame::from_csv_path(file.path()).unwrap();
    assert_eq!(frame.len(), 3);
    assert!(PriceFrame::from_csv_path("/definitely/not/here.csv").is_err());
  }
}
