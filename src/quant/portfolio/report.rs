//! # Allocation Reports
//!
//! Display-ready view of an optimization result: per-asset allocations in
//! whole percent, annualized return and volatility in percent to two
//! decimals, and the Sharpe ratio.

use std::fmt;

use prettytable::Table;
use prettytable::row;

use super::error::PortfolioError;
use super::types::OptimizationResult;
use super::types::Termination;

/// Allocation of one asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetAllocation {
  pub asset: String,
  /// Raw optimizer weight.
  pub weight: f64,
  /// `weight * 100` rounded to the nearest integer.
  pub percent: f64,
}

/// Formatted summary of one optimized portfolio.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationReport {
  pub label: String,
  pub annualized_return_pct: f64,
  pub annualized_volatility_pct: f64,
  pub sharpe: f64,
  pub allocations: Vec<AssetAllocation>,
  pub termination: Termination,
}

impl AllocationReport {
  pub fn from_result(
    label: impl Into<String>,
    assets: &[String],
    result: &OptimizationResult,
  ) -> Result<Self, PortfolioError> {
    if result.weights.len() != assets.len() {
      return Err(PortfolioError::dimension(
        "report weights",
        assets.len(),
        result.weights.len(),
      ));
    }

    let allocations = assets
      .iter()
      .zip(result.weights.iter())
      .map(|(asset, &weight)| AssetAllocation {
        asset: asset.clone(),
        weight,
        percent: (weight * 100.0).round(),
      })
      .collect();

    Ok(Self {
      label: label.into(),
      annualized_return_pct: round_to(result.metrics.annualized_return * 100.0, 2),
      annualized_volatility_pct: round_to(result.metrics.annualized_volatility * 100.0, 2),
      sharpe: result.sharpe,
      allocations,
      termination: result.termination,
    })
  }

  pub fn table(&self) -> Table {
    let mut table = Table::new();
    table.set_titles(row![bc => &self.label, ""]);
    for a in &self.allocations {
      table.add_row(row![a.asset, r -> format!("{:.0}%", a.percent)]);
    }
    table.add_row(row!["Return", r -> format!("{:.2}%", self.annualized_return_pct)]);
    table.add_row(row!["Volatility", r -> format!("{:.2}%", self.annualized_volatility_pct)]);
    table.add_row(row!["Sharpe", r -> format!("{:.4}", self.sharpe)]);
    if !self.termination.is_converged() {
      table.add_row(row!["Status", r -> self.termination]);
    }
    table
  }
}

impl fmt::Display for AllocationReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.table())
  }
}

fn round_to(x: f64, decimals: i32) -> f64 {
  let scale = 10f64.powi(decimals);
  (x * scale).round() / scale
}
