//! # Portfolio Performance
//!
//! $$
//! \mu_p = 252\,\boldsymbol\mu^\top\mathbf{w},\qquad
//! \sigma_p = \sqrt{252}\,\sqrt{\max(0,\ \mathbf{w}^\top\Sigma\mathbf{w})}
//! $$
//!
//! Annualized return and volatility of a weight vector from daily statistics.

use nalgebra::DMatrix;
use nalgebra::DVector;

use super::error::PortfolioError;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Annualized return/volatility pair of a portfolio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioMetrics {
  pub annualized_return: f64,
  pub annualized_volatility: f64,
}

impl PortfolioMetrics {
  /// Sharpe ratio `(return - risk_free) / volatility`, `0.0` for a riskless portfolio.
  pub fn sharpe_ratio(&self, risk_free: f64) -> f64 {
    if self.annualized_volatility > 1e-15 {
      (self.annualized_return - risk_free) / self.annualized_volatility
    } else {
      0.0
    }
  }
}

/// Evaluate annualized performance of `weights`.
///
/// All inputs must share the same asset dimension.
pub fn evaluate(
  weights: &[f64],
  mean_returns: &DVector<f64>,
  cov: &DMatrix<f64>,
) -> Result<PortfolioMetrics, PortfolioError> {
  check_dimensions(weights.len(), mean_returns, cov)?;
  let w = DVector::from_column_slice(weights);
  Ok(evaluate_unchecked(&w, mean_returns, cov))
}

pub(crate) fn check_dimensions(
  n: usize,
  mean_returns: &DVector<f64>,
  cov: &DMatrix<f64>,
) -> Result<(), PortfolioError> {
  if mean_returns.len() != n {
    return Err(PortfolioError::dimension("mean returns", n, mean_returns.len()));
  }
  if cov.nrows() != n {
    return Err(PortfolioError::dimension("covariance rows", n, cov.nrows()));
  }
  if cov.ncols() != n {
    return Err(PortfolioError::dimension("covariance columns", n, cov.ncols()));
  }
  Ok(())
}

pub(crate) fn annualized_return(w: &DVector<f64>, mean_returns: &DVector<f64>) -> f64 {
  mean_returns.dot(w) * TRADING_DAYS
}

/// Daily variance `wᵀΣw`, clamped at zero.
pub(crate) fn daily_variance(w: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
  w.dot(&(cov * w)).max(0.0)
}

pub(crate) fn annualized_volatility(w: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
  (daily_variance(w, cov) * TRADING_DAYS).sqrt()
}

pub(crate) fn evaluate_unchecked(
  w: &DVector<f64>,
  mean_returns: &DVector<f64>,
  cov: &DMatrix<f64>,
) -> PortfolioMetrics {
  PortfolioMetrics {
    annualized_return: annualized_return(w, mean_returns),
    annualized_volatility: annualized_volatility(w, cov),
  }
}
