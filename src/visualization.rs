//! # Visualization
//!
//! $$
//! \{\hat\sigma_t\},\ \{(\sigma_p, \mu_p)\},\ \mathbf{w} \ \mapsto\ \text{charts on a common grid}
//! $$
//!
//! plotly charts for rolling volatility, the efficient frontier and weights.
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use ndarray::ArrayView1;
use plotly::Bar;
use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;
use plotly::common::Anchor;
use plotly::common::Font;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::Mode;
use plotly::layout::Annotation;
use plotly::layout::GridPattern;
use plotly::layout::LayoutGrid;
use plotly::layout::Margin;

use crate::quant::portfolio::EfficientFrontier;
use crate::stats::rolling::TimeSeries;

/// A labelled point drawn on the risk/return plane, e.g. a single asset.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskReturnPoint {
  pub label: String,
  pub volatility: f64,
  pub expected_return: f64,
}

enum PanelTrace {
  Line {
    name: String,
    x: Vec<String>,
    y: Vec<f64>,
  },
  Curve {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
  },
  Points {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    text: Vec<String>,
  },
  Bars {
    name: String,
    x: Vec<String>,
    y: Vec<f64>,
  },
}

struct Panel {
  title: String,
  traces: Vec<PanelTrace>,
}

/// Several charts laid out on one page.
pub struct GridReport {
  panels: Vec<Panel>,
  cols: usize,
  line_width: f64,
  title: String,
}

impl Default for GridReport {
  fn default() -> Self {
    Self::new()
  }
}

impl GridReport {
  pub fn new() -> Self {
    Self {
      panels: Vec::new(),
      cols: 2,
      line_width: 1.5,
      title: String::new(),
    }
  }

  pub fn title(mut self, title: &str) -> Self {
    self.title = title.into();
    self
  }

  pub fn cols(mut self, n: usize) -> Self {
    self.cols = n.max(1);
    self
  }

  pub fn line_width(mut self, w: f64) -> Self {
    self.line_width = w;
    self
  }

  pub fn len(&self) -> usize {
    self.panels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.panels.is_empty()
  }

  /// One line per series, dated on the x axis.
  pub fn rolling_volatility(mut self, series: &[TimeSeries], title: &str) -> Self {
    let traces = series
      .iter()
      .map(|s| PanelTrace::Line {
        name: s.name().to_string(),
        x: s.index().iter().map(|d| d.to_string()).collect(),
        y: s.values().to_vec(),
      })
      .collect();
    self.panels.push(Panel {
      title: title.into(),
      traces,
    });
    self
  }

  /// Frontier curve in (volatility, return) space plus optional labelled points.
  pub fn efficient_frontier(
    mut self,
    frontier: &EfficientFrontier,
    points: &[RiskReturnPoint],
    title: &str,
  ) -> Self {
    let mut traces = vec![PanelTrace::Curve {
      name: "efficient frontier".into(),
      x: frontier.volatilities(),
      y: frontier.returns(),
    }];
    if !points.is_empty() {
      traces.push(PanelTrace::Points {
        name: "assets".into(),
        x: points.iter().map(|p| p.volatility).collect(),
        y: points.iter().map(|p| p.expected_return).collect(),
        text: points.iter().map(|p| p.label.clone()).collect(),
      });
    }
    self.panels.push(Panel {
      title: title.into(),
      traces,
    });
    self
  }

  /// Bar chart of weights by ticker.
  pub fn weights(mut self, tickers: &[String], weights: ArrayView1<f64>, title: &str) -> Self {
    self.panels.push(Panel {
      title: title.into(),
      traces: vec![PanelTrace::Bars {
        name: title.into(),
        x: tickers.to_vec(),
        y: weights.to_vec(),
      }],
    });
    self
  }

  pub fn plot(self) -> Plot {
    let n = self.panels.len().max(1);
    let cols = self.cols.min(n);
    let rows = n.div_ceil(cols);
    let plot_height = rows * 420 + 120;

    let axis_name = |subplot_idx: usize, axis: &str| -> String {
      if subplot_idx == 1 {
        axis.to_string()
      } else {
        format!("{axis}{subplot_idx}")
      }
    };

    let annotations = self
      .panels
      .iter()
      .enumerate()
      .map(|(idx, panel)| {
        let subplot_idx = idx + 1;
        Annotation::new()
          .text(format!("<b>{}</b>", panel.title))
          .x_ref(format!("{} domain", axis_name(subplot_idx, "x")))
          .y_ref(format!("{} domain", axis_name(subplot_idx, "y")))
          .x(0.5)
          .y(1.0)
          .x_anchor(Anchor::Center)
          .y_anchor(Anchor::Bottom)
          .font(Font::new().size(12))
          .show_arrow(false)
      })
      .collect::<Vec<_>>();

    let mut plot = Plot::new();
    plot.set_layout(
      Layout::new()
        .title(self.title.as_str())
        .auto_size(true)
        .height(plot_height)
        .margin(Margin::new().left(56).right(24).top(84).bottom(44))
        .annotations(annotations)
        .grid(
          LayoutGrid::new()
            .rows(rows)
            .columns(cols)
            .x_gap(0.08)
            .y_gap(0.16)
            .pattern(GridPattern::Independent),
        ),
    );

    for (idx, panel) in self.panels.into_iter().enumerate() {
      let xa = axis_name(idx + 1, "x");
      let ya = axis_name(idx + 1, "y");
      for trace in panel.traces {
        match trace {
          PanelTrace::Line { name, x, y } => plot.add_trace(
            Scatter::new(x, y)
              .mode(Mode::Lines)
              .line(Line::new().width(self.line_width))
              .name(name.as_str())
              .x_axis(xa.as_str())
              .y_axis(ya.as_str()),
          ),
          PanelTrace::Curve { name, x, y } => plot.add_trace(
            Scatter::new(x, y)
              .mode(Mode::LinesMarkers)
              .line(Line::new().width(self.line_width))
              .name(name.as_str())
              .x_axis(xa.as_str())
              .y_axis(ya.as_str()),
          ),
          PanelTrace::Points { name, x, y, text } => plot.add_trace(
            Scatter::new(x, y)
              .mode(Mode::MarkersText)
              .marker(Marker::new().size(9))
              .text_array(text)
              .name(name.as_str())
              .x_axis(xa.as_str())
              .y_axis(ya.as_str()),
          ),
          PanelTrace::Bars { name, x, y } => plot.add_trace(
            Bar::new(x, y)
              .name(name.as_str())
              .x_axis(xa.as_str())
              .y_axis(ya.as_str()),
          ),
        }
      }
    }

    plot
  }

  /// Render the report to a standalone HTML file.
  pub fn write_html(self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let html = self.plot().to_html();
    std::fs::write(path, html).with_context(|| format!("failed to write {}", path.display()))
  }
}

/// Rolling volatility lines, one per series.
pub fn rolling_volatility_plot(series: &[TimeSeries]) -> Plot {
  GridReport::new()
    .cols(1)
    .title("Rolling volatility")
    .rolling_volatility(series, "annualized volatility")
    .plot()
}

/// Efficient frontier with labelled reference points.
pub fn efficient_frontier_plot(frontier: &EfficientFrontier, points: &[RiskReturnPoint]) -> Plot {
  GridReport::new()
    .cols(1)
    .title("Efficient frontier")
    .efficient_frontier(frontier, points, "return vs volatility")
    .plot()
}

pub fn weights_plot(tickers: &[String], weights: ArrayView1<f64>) -> Plot {
  GridReport::new()
    .cols(1)
    .title("Portfolio weights")
    .weights(tickers, weights, "weights")
    .plot()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use ndarray::array;

  use super::*;
  use crate::quant::portfolio::OptimizerConfig;
  use crate::quant::portfolio::efficient_frontier;

  fn vol_series() -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let index = (0..4)
      .map(|i| start + chrono::Duration::days(i))
      .collect();
    TimeSeries::new("AAPL", index, array![0.21, 0.22, 0.19, 0.25]).unwrap()
  }

  #[test]
  fn rolling_plot_carries_dates_and_names() {
    let json = rolling_volatility_plot(&[vol_series()]).to_json();
    assert!(json.contains("2024-03-01"));
    assert!(json.contains("AAPL"));
  }

  #[test]
  fn grid_assigns_independent_axes() {
    let mu = array![0.06, 0.1];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];
    let cfg = OptimizerConfig {
      frontier_points: 5,
      ..OptimizerConfig::default()
    };
    let frontier = efficient_frontier(mu.view(), cov.view(), 0.0, &cfg).unwrap();
    let tickers = vec!["A".to_string(), "B".to_string()];

    let report = GridReport::new()
      .rolling_volatility(&[vol_series()], "vol")
      .efficient_frontier(&frontier, &[], "frontier")
      .weights(&tickers, array![0.7, 0.3].view(), "weights");
    assert_eq!(report.len(), 3);

    let json = report.plot().to_json();
    assert!(json.contains("\"x3\""));
    assert!(json.contains("\"y2\""));
  }

  #[test]
  fn writes_html_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.html");
    let tickers = vec!["A".to_string()];

    GridReport::new()
      .weights(&tickers, array![1.0].view(), "weights")
      .write_html(&path)
      .unwrap();

    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.contains("plotly"));
  }
}
