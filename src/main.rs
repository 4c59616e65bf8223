use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use prettytable::Table;
use prettytable::row;
use tracing_subscriber::EnvFilter;
use volfolio::dashboard::Dashboard;
use volfolio::data::PriceFrame;
use volfolio::stats::returns::TRADING_DAYS_PER_YEAR;

/// Portfolio volatility report from a CSV price panel.
#[derive(Parser, Debug)]
#[command(name = "volfolio", version, about)]
struct Cli {
  /// CSV with a `date` column followed by one price column per ticker.
  #[arg(long)]
  prices: PathBuf,

  /// Comma separated tickers; defaults to every column in the file.
  #[arg(long)]
  tickers: Option<String>,

  /// Comma separated weights, one per ticker; defaults to equal weights.
  #[arg(long)]
  weights: Option<String>,

  /// Rolling window length in observations.
  #[arg(long, default_value_t = 21)]
  window: usize,

  #[arg(long, default_value_t = TRADING_DAYS_PER_YEAR)]
  periods_per_year: f64,

  /// Forbid short positions in the minimum-variance portfolio.
  #[arg(long)]
  long_only: bool,

  /// Where to write the HTML chart report.
  #[arg(long, default_value = "volfolio-report.html")]
  output: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let prices = PriceFrame::from_csv_path(&cli.prices)?;

  let mut dashboard = Dashboard::new(prices);
  let tickers = cli
    .tickers
    .clone()
    .unwrap_or_else(|| dashboard.prices().tickers().join(","));
  dashboard.set_tickers(&tickers);
  if let Some(weights) = &cli.weights {
    dashboard.set_weights(weights)?;
  }
  dashboard.set_window(cli.window);
  dashboard.set_periods_per_year(cli.periods_per_year);
  dashboard.set_long_only(cli.long_only);

  let snap = dashboard.recompute()?.clone();

  let mut summary = Table::new();
  summary.add_row(row!["metric", "value"]);
  summary.add_row(row!["expected return", format!("{:.4}", snap.portfolio.expected_return)]);
  summary.add_row(row!["volatility", format!("{:.4}", snap.portfolio.volatility)]);
  summary.add_row(row!["sharpe (rf = 0)", format!("{:.4}", snap.portfolio.sharpe)]);
  if let Some(last) = snap.portfolio_volatility.values().iter().last() {
    summary.add_row(row![
      format!("latest rolling vol ({})", snap.inputs.window),
      format!("{last:.4}")
    ]);
  }
  summary.add_row(row![
    "diversification ratio",
    format!("{:.4}", snap.diversification_ratio)
  ]);
  summary.add_row(row!["min-variance volatility", format!("{:.4}", snap.min_variance.volatility)]);
  summary.printstd();

  let mut weights = Table::new();
  weights.add_row(row!["ticker", "weight", "risk share", "min-variance weight"]);
  for (i, ticker) in snap.inputs.tickers.iter().enumerate() {
    weights.add_row(row![
      ticker,
      format!("{:.4}", snap.portfolio.weights[i]),
      format!("{:.2}%", 100.0 * snap.risk.percentage[i]),
      format!("{:.4}", snap.min_variance.weights[i])
    ]);
  }
  weights.printstd();

  if let Some(report) = dashboard.report() {
    report.write_html(&cli.output)?;
    println!("report written to {}", cli.output.display());
  }

  Ok(())
}

