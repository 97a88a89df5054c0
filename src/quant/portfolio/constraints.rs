//! # Constraints
//!
//! $$
//! c_j(\mathbf{w}) = 0,\qquad \nabla c_j(\mathbf{w})
//! $$
//!
//! Constraints passed to the SQP solver. Each one carries its kind and the
//! residual/gradient evaluators captured when it is built.

use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;

use super::performance::TRADING_DAYS;

type ResidualFn = Arc<dyn Fn(&DVector<f64>) -> f64 + Send + Sync>;
type GradientFn = Arc<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;

/// Constraint kind understood by the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConstraintKind {
  /// `c(w) = 0`.
  Equality,
}

/// A constraint on the weight vector.
#[derive(Clone)]
pub struct Constraint {
  kind: ConstraintKind,
  name: String,
  residual: ResidualFn,
  gradient: GradientFn,
}

impl Constraint {
  /// Equality constraint `residual(w) = 0` with its gradient.
  pub fn equality<R, G>(name: impl Into<String>, residual: R, gradient: G) -> Self
  where
    R: Fn(&DVector<f64>) -> f64 + Send + Sync + 'static,
    G: Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
  {
    Self {
      kind: ConstraintKind::Equality,
      name: name.into(),
      residual: Arc::new(residual),
      gradient: Arc::new(gradient),
    }
  }

  /// Linear equality `aᵀw = b`.
  pub fn linear_equality(name: impl Into<String>, a: DVector<f64>, b: f64) -> Self {
    let grad = a.clone();
    Self::equality(name, move |w| a.dot(w) - b, move |_| grad.clone())
  }

  /// Fully invested portfolio, `sum(w) = 1`.
  pub fn budget(n: usize) -> Self {
    Self::linear_equality("budget", DVector::from_element(n, 1.0), 1.0)
  }

  /// Annualized portfolio return equal to `target`.
  pub fn target_return(mean_returns: &DVector<f64>, target: f64) -> Self {
    Self::linear_equality("target return", mean_returns * TRADING_DAYS, target)
  }

  pub fn kind(&self) -> ConstraintKind {
    self.kind
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn residual(&self, w: &DVector<f64>) -> f64 {
    (self.residual)(w)
  }

  pub fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
    (self.gradient)(w)
  }
}

impl fmt::Debug for Constraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Constraint")
      .field("kind", &self.kind)
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}
