//! # Visualization
//!
//! $$
//! \{(r_k,\sigma_k)\}_{k=1}^{K} \mapsto \text{efficient frontier chart}
//! $$
//!
//! Plotly rendering of the efficient frontier with its two anchor portfolios.
//! Returns and volatilities are shown in annualised percent.

use std::fs;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use plotly::Layout;
use plotly::Plot;
use plotly::Scatter;
use plotly::common::DashType;
use plotly::common::Line;
use plotly::common::Marker;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::layout::Legend;

use crate::quant::portfolio::EfficientFrontier;
use crate::quant::portfolio::FrontierPoint;
use crate::quant::portfolio::PortfolioMetrics;

pub const FRONTIER_TITLE: &str = "Portfolio Optimisation with the Efficient Frontier";

/// Chart settings for the efficient frontier.
#[derive(Clone, Debug)]
pub struct FrontierPlotter {
  title: String,
  width: usize,
  height: usize,
  marker_size: usize,
  line_width: f64,
}

impl Default for FrontierPlotter {
  fn default() -> Self {
    Self::new()
  }
}

impl FrontierPlotter {
  pub fn new() -> Self {
    Self {
      title: FRONTIER_TITLE.to_string(),
      width: 800,
      height: 600,
      marker_size: 14,
      line_width: 4.0,
    }
  }

  pub fn title(mut self, title: &str) -> Self {
    self.title = title.into();
    self
  }

  pub fn size(mut self, width: usize, height: usize) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn marker_size(mut self, size: usize) -> Self {
    self.marker_size = size;
    self
  }

  pub fn line_width(mut self, w: f64) -> Self {
    self.line_width = w.max(0.0);
    self
  }

  /// Anchors as markers, feasible frontier points as a dash-dot line.
  pub fn plot(
    &self,
    max_sharpe: &PortfolioMetrics,
    min_volatility: &PortfolioMetrics,
    points: &[FrontierPoint],
  ) -> Plot {
    let anchor = |metrics: &PortfolioMetrics, name: &str, color: &str| {
      Scatter::new(
        vec![pct(metrics.annualized_volatility)],
        vec![pct(metrics.annualized_return)],
      )
      .name(name)
      .mode(Mode::Markers)
      .marker(
        Marker::new()
          .color(color.to_string())
          .size(self.marker_size)
          .line(Line::new().color("black").width(3.0)),
      )
    };

    let (vols, rets): (Vec<f64>, Vec<f64>) = points
      .iter()
      .filter(|p| p.is_feasible())
      .map(|p| (pct(p.volatility), pct(p.target_return)))
      .unzip();
    let frontier = Scatter::new(vols, rets)
      .name("Efficient Frontier")
      .mode(Mode::Lines)
      .line(
        Line::new()
          .color("black")
          .width(self.line_width)
          .dash(DashType::DashDot),
      );

    let mut plot = Plot::new();
    plot.add_trace(anchor(max_sharpe, "Maximum Sharpe Ratio", "red"));
    plot.add_trace(anchor(min_volatility, "Minimum Volatility", "green"));
    plot.add_trace(frontier);
    plot.set_layout(
      Layout::new()
        .title(self.title.as_str())
        .x_axis(Axis::new().title("Annualised Volatility (%)"))
        .y_axis(Axis::new().title("Annualised Return (%)"))
        .show_legend(true)
        .legend(Legend::new().x(0.75).y(0.0))
        .width(self.width)
        .height(self.height),
    );
    plot
  }

  pub fn plot_frontier(&self, frontier: &EfficientFrontier) -> Plot {
    self.plot(
      &frontier.max_sharpe.metrics,
      &frontier.min_volatility.metrics,
      &frontier.points,
    )
  }
}

fn pct(x: f64) -> f64 {
  (x * 100.0 * 100.0).round() / 100.0
}

/// Efficient frontier chart with default settings.
pub fn frontier_plot(
  max_sharpe: &PortfolioMetrics,
  min_volatility: &PortfolioMetrics,
  points: &[FrontierPoint],
) -> Plot {
  FrontierPlotter::new().plot(max_sharpe, min_volatility, points)
}

/// Render `frontier` and write it as a standalone HTML page.
pub fn write_frontier_html(frontier: &EfficientFrontier, path: impl AsRef<Path>) -> Result<()> {
  let path = path.as_ref();
  let html = FrontierPlotter::new().plot_frontier(frontier).to_html();
  fs::write(path, html).with_context(|| format!("failed to write {}", path.display()))
}
