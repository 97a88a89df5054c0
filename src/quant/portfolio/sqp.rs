//! # Sequential Quadratic Programming
//!
//! $$
//! \min_{\mathbf d}\ \tfrac12\mathbf d^\top B_k\mathbf d+\nabla f_k^\top\mathbf d
//! \quad\text{s.t.}\quad A_k\mathbf d+\mathbf c_k=0,\ \ \ell-\mathbf x_k\le\mathbf d\le u-\mathbf x_k
//! $$
//!
//! General nonlinear minimizer with equality constraints and box bounds.
//!
//! Each iteration solves the quadratic subproblem above with an active-set
//! method over the bounds (the linearized equalities are always active), then
//! backtracks along the step on the L1 exact-penalty merit function
//! $\phi(\mathbf x)=f(\mathbf x)+\nu\lVert\mathbf c(\mathbf x)\rVert_1$.
//! $B_k$ is a damped BFGS approximation of the Lagrangian Hessian.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;
use tracing::trace;

use super::constraints::Constraint;
use super::constraints::ConstraintKind;
use super::objectives::Objective;
use super::types::Termination;

/// Solver settings.
#[derive(Clone, Debug)]
pub struct SqpConfig {
  /// Maximum number of SQP iterations.
  pub max_iters: usize,
  /// Tolerance on the largest constraint residual.
  pub tolerance: f64,
  /// Step length (infinity norm) below which the iterate is stationary.
  pub step_tolerance: f64,
  /// Relative objective change below which a feasible iterate is accepted.
  pub ftol: f64,
  /// Maximum backtracking halvings per line search.
  pub max_line_search: usize,
}

impl Default for SqpConfig {
  fn default() -> Self {
    Self {
      max_iters: 200,
      tolerance: 1e-6,
      step_tolerance: 1e-9,
      ftol: 1e-12,
      max_line_search: 40,
    }
  }
}

/// Raw solver output.
#[derive(Clone, Debug)]
pub struct SqpOutcome {
  pub x: DVector<f64>,
  pub fun: f64,
  pub iterations: usize,
  pub constraint_violation: f64,
  pub termination: Termination,
}

/// SQP minimizer.
#[derive(Clone, Debug, Default)]
pub struct Sqp {
  config: SqpConfig,
}

struct Iterate {
  x: DVector<f64>,
  f: f64,
  g: DVector<f64>,
  c: DVector<f64>,
  a: DMatrix<f64>,
}

impl Sqp {
  pub fn new(config: SqpConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SqpConfig {
    &self.config
  }

  /// Minimize `objective` from `x0` subject to `constraints` and `lower <= x <= upper`.
  ///
  /// Never fails: every way the iteration can stop is reported through
  /// [`SqpOutcome::termination`].
  pub fn minimize<O: Objective>(
    &self,
    objective: &O,
    x0: DVector<f64>,
    constraints: &[Constraint],
    lower: &DVector<f64>,
    upper: &DVector<f64>,
  ) -> SqpOutcome {
    let n = x0.len();
    let x0 = clamp(&x0, lower, upper);

    let mut it = match evaluate(objective, constraints, x0.clone()) {
      Some(it) => it,
      None => {
        let c = residuals(constraints, &x0);
        return SqpOutcome {
          fun: objective.cost(&x0).unwrap_or(f64::NAN),
          constraint_violation: max_abs(&c),
          x: x0,
          iterations: 0,
          termination: Termination::DegenerateObjective,
        };
      }
    };

    let mut hessian = DMatrix::<f64>::identity(n, n);
    let mut penalty = 0.0_f64;
    let mut fresh_hessian = true;

    for iter in 1..=self.config.max_iters {
      let lo = lower - &it.x;
      let hi = upper - &it.x;
      let violation = max_abs(&it.c);

      let (d, lambda) = match solve_qp(&hessian, &it.g, &it.a, &it.c, &lo, &hi) {
        Some(sol) => sol,
        None if !fresh_hessian => {
          trace!(iter, "QP subproblem failed, resetting Hessian approximation");
          hessian = DMatrix::identity(n, n);
          fresh_hessian = true;
          continue;
        }
        None => return self.finish(it, iter, Termination::LineSearchFailed),
      };

      if max_abs(&d) <= self.config.step_tolerance && violation <= self.config.tolerance {
        return self.finish(it, iter, Termination::Converged);
      }

      penalty = penalty.max(1.5 * max_abs(&lambda) + 1e-8);
      let c_norm = it.c.abs().sum();
      let merit0 = it.f + penalty * c_norm;
      let slope = (it.g.dot(&d) - penalty * c_norm).min(0.0);

      let mut alpha = 1.0;
      let mut accepted = None;
      for _ in 0..self.config.max_line_search {
        let xt = clamp(&(&it.x + &d * alpha), lower, upper);
        if let Ok(ft) = objective.cost(&xt) {
          if ft.is_finite() {
            let ct = residuals(constraints, &xt);
            let merit = ft + penalty * ct.abs().sum();
            if merit <= merit0 + 1e-4 * alpha * slope {
              accepted = Some(xt);
              break;
            }
          }
        }
        alpha *= 0.5;
      }

      let Some(x_new) = accepted else {
        let predicted = it.g.dot(&d).abs();
        if violation <= self.config.tolerance && predicted <= self.config.tolerance * (1.0 + it.f.abs()) {
          return self.finish(it, iter, Termination::Converged);
        }
        if fresh_hessian {
          return self.finish(it, iter, Termination::LineSearchFailed);
        }
        trace!(iter, "line search failed, resetting Hessian approximation");
        hessian = DMatrix::identity(n, n);
        fresh_hessian = true;
        continue;
      };

      let Some(next) = evaluate(objective, constraints, x_new) else {
        return self.finish(it, iter, Termination::DegenerateObjective);
      };

      let s = &next.x - &it.x;
      let y = (&next.g - next.a.transpose() * &lambda) - (&it.g - it.a.transpose() * &lambda);
      fresh_hessian = !damped_bfgs_update(&mut hessian, &s, &y) && fresh_hessian;

      let df = (next.f - it.f).abs();
      trace!(iter, f = next.f, alpha, violation = max_abs(&next.c), "SQP step");
      it = next;

      let violation = max_abs(&it.c);
      if violation <= self.config.tolerance
        && (max_abs(&s) <= self.config.step_tolerance || df <= self.config.ftol * (1.0 + it.f.abs()))
      {
        return self.finish(it, iter, Termination::Converged);
      }
    }

    let iters = self.config.max_iters;
    self.finish(it, iters, Termination::MaxIterations)
  }

  fn finish(&self, it: Iterate, iterations: usize, termination: Termination) -> SqpOutcome {
    let constraint_violation = max_abs(&it.c);
    debug!(
      iterations,
      fun = it.f,
      constraint_violation,
      %termination,
      "SQP finished"
    );
    SqpOutcome {
      x: it.x,
      fun: it.f,
      iterations,
      constraint_violation,
      termination,
    }
  }
}

fn evaluate<O: Objective>(objective: &O, constraints: &[Constraint], x: DVector<f64>) -> Option<Iterate> {
  let f = objective.cost(&x).ok().filter(|f| f.is_finite())?;
  let g = objective
    .gradient(&x)
    .ok()
    .filter(|g| g.iter().all(|v| v.is_finite()))?;
  let c = residuals(constraints, &x);
  let a = jacobian(constraints, &x);
  Some(Iterate { x, f, g, c, a })
}

fn residuals(constraints: &[Constraint], x: &DVector<f64>) -> DVector<f64> {
  DVector::from_iterator(
    constraints.len(),
    constraints.iter().map(|c| match c.kind() {
      ConstraintKind::Equality => c.residual(x),
    }),
  )
}

fn jacobian(constraints: &[Constraint], x: &DVector<f64>) -> DMatrix<f64> {
  let mut a = DMatrix::zeros(constraints.len(), x.len());
  for (j, c) in constraints.iter().enumerate() {
    a.set_row(j, &c.gradient(x).transpose());
  }
  a
}

fn clamp(x: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
  DVector::from_iterator(
    x.len(),
    x.iter()
      .zip(lower.iter().zip(upper.iter()))
      .map(|(&v, (&lo, &hi))| v.max(lo).min(hi)),
  )
}

fn max_abs(v: &DVector<f64>) -> f64 {
  v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Powell-damped BFGS update. Returns `false` when the pair `(s, y)` was skipped.
fn damped_bfgs_update(b: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) -> bool {
  let bs = &*b * s;
  let sbs = s.dot(&bs);
  if sbs <= 1e-300 {
    return false;
  }

  let sy = s.dot(y);
  let y = if sy < 0.2 * sbs {
    let theta = 0.8 * sbs / (sbs - sy);
    y * theta + &bs * (1.0 - theta)
  } else {
    y.clone()
  };

  let sy = s.dot(&y);
  if sy <= 1e-300 {
    return false;
  }

  *b -= &bs * bs.transpose() / sbs;
  *b += &y * y.transpose() / sy;
  true
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Active {
  Free,
  Lower,
  Upper,
  Fixed,
}

/// Solve the bound-constrained equality QP
/// `min ½dᵀBd + gᵀd  s.t.  Ad + c = 0, lo <= d <= hi`.
///
/// Returns the step and the equality multipliers `λ` with `Bd + g = Aᵀλ` on
/// the free variables.
fn solve_qp(
  b: &DMatrix<f64>,
  g: &DVector<f64>,
  a: &DMatrix<f64>,
  c: &DVector<f64>,
  lo: &DVector<f64>,
  hi: &DVector<f64>,
) -> Option<(DVector<f64>, DVector<f64>)> {
  let n = g.len();
  let m = c.len();
  let mut state: Vec<Active> = (0..n)
    .map(|i| {
      if hi[i] - lo[i] <= 1e-14 {
        Active::Fixed
      } else {
        Active::Free
      }
    })
    .collect();

  let dual_tol = 1e-12 * (1.0 + max_abs(g));
  let max_iter = 5 * (n + m) + 20;

  for _ in 0..max_iter {
    let free: Vec<usize> = (0..n).filter(|&i| state[i] == Active::Free).collect();
    let mut d = DVector::zeros(n);
    for i in 0..n {
      d[i] = match state[i] {
        Active::Lower | Active::Fixed => lo[i],
        Active::Upper => hi[i],
        Active::Free => 0.0,
      };
    }

    let nf = free.len();
    let k = nf + m;
    let mut kkt = DMatrix::zeros(k, k);
    let mut rhs = DVector::zeros(k);
    let bd = b * &d;
    let ad = a * &d;

    for (r, &i) in free.iter().enumerate() {
      for (s, &j) in free.iter().enumerate() {
        kkt[(r, s)] = b[(i, j)];
      }
      for jc in 0..m {
        kkt[(r, nf + jc)] = a[(jc, i)];
        kkt[(nf + jc, r)] = a[(jc, i)];
      }
      rhs[r] = -(g[i] + bd[i]);
    }
    for jc in 0..m {
      rhs[nf + jc] = -(c[jc] + ad[jc]);
    }

    let sol = match kkt.clone().lu().solve(&rhs) {
      Some(sol) if sol.iter().all(|v| v.is_finite()) => sol,
      _ => {
        // Over-determined working set: regularize the constraint block.
        for jc in 0..m {
          kkt[(nf + jc, nf + jc)] = -1e-10;
        }
        kkt.lu().solve(&rhs).filter(|s| s.iter().all(|v| v.is_finite()))?
      }
    };

    for (r, &i) in free.iter().enumerate() {
      d[i] = sol[r];
    }
    let z = sol.rows(nf, m).into_owned();

    let mut worst = None;
    let mut worst_gap = 1e-12;
    for &i in &free {
      if lo[i] - d[i] > worst_gap {
        worst_gap = lo[i] - d[i];
        worst = Some((i, Active::Lower));
      }
      if d[i] - hi[i] > worst_gap {
        worst_gap = d[i] - hi[i];
        worst = Some((i, Active::Upper));
      }
    }
    if let Some((i, side)) = worst {
      state[i] = side;
      continue;
    }

    let grad = b * &d + g + a.transpose() * &z;
    let mut release = None;
    let mut worst_mult = dual_tol;
    for i in 0..n {
      let wrong_sign = match state[i] {
        Active::Lower => -grad[i],
        Active::Upper => grad[i],
        Active::Free | Active::Fixed => continue,
      };
      if wrong_sign > worst_mult {
        worst_mult = wrong_sign;
        release = Some(i);
      }
    }
    if let Some(i) = release {
      state[i] = Active::Free;
      continue;
    }

    return Some((d, -z));
  }

  None
}

#[cfg(test)]
mod tests {
  use anyhow::Result;
  use approx::assert_abs_diff_eq;
  use argmin::core::Error;

  use super::*;

  /// `½‖x − p‖²`, separable quadratic with known projections.
  struct Distance {
    p: DVector<f64>,
  }

  impl CostFunction for Distance {
    type Param = DVector<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
      Ok(0.5 * (x - &self.p).norm_squared())
    }
  }

  impl Gradient for Distance {
    type Param = DVector<f64>;
    type Gradient = DVector<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, Error> {
      Ok(x - &self.p)
    }
  }

  fn unit_box(n: usize) -> (DVector<f64>, DVector<f64>) {
    (DVector::zeros(n), DVector::from_element(n, 1.0))
  }

  #[test]
  fn qp_projects_onto_simplex() {
    let b = DMatrix::identity(3, 3);
    let g = DVector::from_vec(vec![-0.9, -0.1, 0.5]);
    let a = DMatrix::from_element(1, 3, 1.0);
    let c = DVector::from_vec(vec![0.0]);
    let x = DVector::from_element(3, 1.0 / 3.0);
    let lo = x.map(|v| -v);
    let hi = DVector::from_element(3, 1.0) - &x;

    // Step from the uniform portfolio towards (0.9, 0.1, 0.0), the simplex
    // projection of x - g.
    let (d, lambda) = solve_qp(&b, &g, &a, &c, &lo, &hi).unwrap();
    assert_abs_diff_eq!(d.sum(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(d[0], 0.9 - 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(d[1], 0.1 - 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(d[2], -1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(lambda[0], -1.0 / 3.0, epsilon = 1e-12);
  }

  #[test]
  fn projects_point_onto_simplex() {
    let target = DVector::from_vec(vec![0.9, 0.6, -0.3]);
    let objective = Distance { p: target };
    let (lo, hi) = unit_box(3);
    let sqp = Sqp::default();

    let out = sqp.minimize(
      &objective,
      DVector::from_element(3, 1.0 / 3.0),
      &[Constraint::budget(3)],
      &lo,
      &hi,
    );

    assert_eq!(out.termination, Termination::Converged);
    // Euclidean projection of (0.9, 0.6, -0.3) onto the simplex: shift by -0.25.
    assert_abs_diff_eq!(out.x[0], 0.65, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[1], 0.35, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[2], 0.0, epsilon = 1e-6);
    assert!(out.constraint_violation <= 1e-6);
  }

  #[test]
  fn respects_upper_bounds() {
    let objective = Distance {
      p: DVector::from_vec(vec![1.0, 0.0, 0.0]),
    };
    let lo = DVector::zeros(3);
    let hi = DVector::from_element(3, 0.5);

    let out = Sqp::default().minimize(
      &objective,
      DVector::from_element(3, 1.0 / 3.0),
      &[Constraint::budget(3)],
      &lo,
      &hi,
    );

    assert!(out.termination.is_converged());
    assert_abs_diff_eq!(out.x[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[1], 0.25, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[2], 0.25, epsilon = 1e-6);
  }

  #[test]
  fn unsatisfiable_constraints_are_reported() {
    let objective = Distance {
      p: DVector::from_vec(vec![0.5, 0.5]),
    };
    let (lo, hi) = unit_box(2);
    // Weights in [0, 1] summing to 1 cannot have x0 + x1 = 3.
    let out = Sqp::default().minimize(
      &objective,
      DVector::from_element(2, 0.5),
      &[
        Constraint::budget(2),
        Constraint::linear_equality("impossible", DVector::from_element(2, 1.0), 3.0),
      ],
      &lo,
      &hi,
    );

    assert!(!out.termination.is_converged());
  }

  #[test]
  fn non_finite_start_is_degenerate() -> Result<()> {
    struct Infinite;

    impl CostFunction for Infinite {
      type Param = DVector<f64>;
      type Output = f64;

      fn cost(&self, _x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(f64::INFINITY)
      }
    }

    impl Gradient for Infinite {
      type Param = DVector<f64>;
      type Gradient = DVector<f64>;

      fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(DVector::zeros(x.len()))
      }
    }

    let (lo, hi) = unit_box(2);
    let out = Sqp::default().minimize(
      &Infinite,
      DVector::from_element(2, 0.5),
      &[Constraint::budget(2)],
      &lo,
      &hi,
    );
    assert_eq!(out.termination, Termination::DegenerateObjective);
    assert_eq!(out.iterations, 0);
    Ok(())
  }

  #[test]
  fn damped_update_keeps_hessian_positive_definite() {
    let mut b = DMatrix::identity(2, 2);
    let s = DVector::from_vec(vec![1.0, 0.0]);
    // Negative curvature pair would break plain BFGS.
    let y = DVector::from_vec(vec![-1.0, 0.5]);
    assert!(damped_bfgs_update(&mut b, &s, &y));
    assert!(b.clone().cholesky().is_some());
  }
}
