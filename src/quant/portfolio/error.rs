//! # Portfolio Errors
//!
//! Failure kinds surfaced by the optimizer, the frontier sweep and the
//! statistics providers.

use thiserror::Error;

/// Errors produced by the Markowitz pipeline.
///
/// Dimension and bound errors are programming/configuration errors and are
/// returned as soon as they are detected. Solver failures are first recorded
/// as a [`Termination`](super::types::Termination) on the result and only
/// become errors through
/// [`OptimizationResult::ensure_converged`](super::types::OptimizationResult::ensure_converged).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
  #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
  DimensionMismatch {
    context: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("invalid weight bounds: {0}")]
  InvalidBounds(String),

  #[error("target return {target:.6} is not reachable: {reason}")]
  InfeasibleTarget { target: f64, reason: String },

  #[error("objective is degenerate: {0}")]
  DegenerateObjective(String),

  #[error(
    "solver did not converge after {iterations} iterations (constraint violation {constraint_violation:.3e})"
  )]
  NonConvergence {
    iterations: usize,
    constraint_violation: f64,
  },

  #[error("market data unavailable: {0}")]
  DataUnavailable(String),
}

impl PortfolioError {
  pub(crate) fn dimension(context: &'static str, expected: usize, actual: usize) -> Self {
    Self::DimensionMismatch {
      context,
      expected,
      actual,
    }
  }
}
