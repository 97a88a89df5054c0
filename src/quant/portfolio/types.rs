//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}\in\mathcal W} f(\mathbf{w}),\quad
//! \mathcal W=\{\mathbf{w}: \mathbf 1^\top\mathbf{w}=1,\ \ell\le\mathbf{w}\le u\}
//! $$
//!
//! Shared bounds, termination codes and result containers.

use std::fmt::Display;

use impl_new_derive::ImplNew;
use nalgebra::DVector;

use super::error::PortfolioError;
use super::performance::PortfolioMetrics;

/// Box bounds applied to every asset weight.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightBounds {
  /// Same `(low, high)` interval for every asset.
  Uniform(f64, f64),
  /// One `(low, high)` interval per asset, in universe order.
  PerAsset(Vec<(f64, f64)>),
}

impl Default for WeightBounds {
  /// Long-only, no leverage.
  fn default() -> Self {
    Self::Uniform(0.0, 1.0)
  }
}

impl WeightBounds {
  /// Expand into lower and upper bound vectors for `n` assets.
  ///
  /// Fails when the bounds are malformed or when no fully invested portfolio
  /// fits inside them.
  pub fn resolve(&self, n: usize) -> Result<(DVector<f64>, DVector<f64>), PortfolioError> {
    let pairs: Vec<(f64, f64)> = match self {
      Self::Uniform(lo, hi) => vec![(*lo, *hi); n],
      Self::PerAsset(pairs) => {
        if pairs.len() != n {
          return Err(PortfolioError::dimension("weight bounds", n, pairs.len()));
        }
        pairs.clone()
      }
    };

    for (i, &(lo, hi)) in pairs.iter().enumerate() {
      if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(PortfolioError::InvalidBounds(format!(
          "asset {i}: [{lo}, {hi}]"
        )));
      }
    }

    let lo = DVector::from_iterator(n, pairs.iter().map(|p| p.0));
    let hi = DVector::from_iterator(n, pairs.iter().map(|p| p.1));

    if lo.sum() > 1.0 + 1e-12 || hi.sum() < 1.0 - 1e-12 {
      return Err(PortfolioError::InvalidBounds(format!(
        "weights cannot sum to 1 (lower sum {:.4}, upper sum {:.4})",
        lo.sum(),
        hi.sum()
      )));
    }

    Ok((lo, hi))
  }
}

/// Why a solver call stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
  /// KKT step and constraint residuals within tolerance.
  Converged,
  /// Iteration budget exhausted.
  MaxIterations,
  /// The merit function could not be decreased along the search direction.
  LineSearchFailed,
  /// The objective is not finite at the current iterate (zero volatility).
  DegenerateObjective,
  /// The requested target return is outside the reachable range.
  InfeasibleTarget,
}

impl Termination {
  pub fn is_converged(&self) -> bool {
    matches!(self, Self::Converged)
  }
}

impl Display for Termination {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Termination::Converged => write!(f, "converged"),
      Termination::MaxIterations => write!(f, "iteration limit reached"),
      Termination::LineSearchFailed => write!(f, "line search failed"),
      Termination::DegenerateObjective => write!(f, "degenerate objective"),
      Termination::InfeasibleTarget => write!(f, "infeasible target"),
    }
  }
}

/// Output of one constrained optimization call.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Portfolio weights, in universe order.
  pub weights: Vec<f64>,
  /// Objective value at `weights`.
  pub objective: f64,
  /// Annualized return and volatility of `weights`.
  pub metrics: PortfolioMetrics,
  /// Sharpe ratio at the optimizer's risk-free rate.
  pub sharpe: f64,
  /// Solver iterations spent.
  pub iterations: usize,
  /// Largest absolute equality-constraint residual.
  pub constraint_violation: f64,
  pub termination: Termination,
  /// Target return for return-constrained solves.
  pub target_return: Option<f64>,
}

impl OptimizationResult {
  pub fn converged(&self) -> bool {
    self.termination.is_converged()
  }

  /// Turn a non-converged result into the matching [`PortfolioError`].
  pub fn ensure_converged(self) -> Result<Self, PortfolioError> {
    match self.termination {
      Termination::Converged => Ok(self),
      Termination::MaxIterations | Termination::LineSearchFailed => {
        Err(PortfolioError::NonConvergence {
          iterations: self.iterations,
          constraint_violation: self.constraint_violation,
        })
      }
      Termination::DegenerateObjective => Err(PortfolioError::DegenerateObjective(
        "zero-volatility portfolio cannot be Sharpe-ranked".into(),
      )),
      Termination::InfeasibleTarget => Err(PortfolioError::InfeasibleTarget {
        target: self.target_return.unwrap_or(f64::NAN),
        reason: "outside the attainable return range".into(),
      }),
    }
  }
}

/// One sample of the efficient frontier.
#[derive(ImplNew, Clone, Debug)]
pub struct FrontierPoint {
  /// Requested annualized return.
  pub target_return: f64,
  /// Annualized volatility achieved for the target.
  pub volatility: f64,
  pub weights: Vec<f64>,
  pub termination: Termination,
}

impl FrontierPoint {
  /// Whether the point holds a converged solve.
  pub fn is_feasible(&self) -> bool {
    self.termination.is_converged()
  }
}
