//! # Efficient Frontier
//!
//! $$
//! \sigma^\*(r)=\min_{\mathbf w}\ \sigma_p(\mathbf w)\quad\text{s.t.}\quad \mu_p(\mathbf w)=r,
//! \qquad r\in[r_{\min},r_{\max}]
//! $$
//!
//! Sweep of target returns between the minimum-volatility and the
//! maximum-Sharpe portfolios.

use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::error::PortfolioError;
use super::optimizers::MarkowitzOptimizer;
use super::types::FrontierPoint;
use super::types::OptimizationResult;

/// Default number of frontier samples.
pub const DEFAULT_FRONTIER_STEPS: usize = 20;

/// Anchors and sampled points of the efficient frontier.
#[derive(Clone, Debug)]
pub struct EfficientFrontier {
  pub min_volatility: OptimizationResult,
  pub max_sharpe: OptimizationResult,
  /// Points ordered by ascending target return.
  pub points: Vec<FrontierPoint>,
}

impl EfficientFrontier {
  /// Solve both anchors and sweep `steps` targets between their returns.
  ///
  /// Fails only when an anchor does not converge. Targets inside the sweep
  /// that fail are kept with their termination status.
  pub fn build(
    optimizer: &MarkowitzOptimizer<'_>,
    steps: usize,
    parallel: bool,
  ) -> Result<Self, PortfolioError> {
    let min_volatility = optimizer.min_variance().ensure_converged()?;
    let max_sharpe = optimizer.max_sharpe().ensure_converged()?;

    let r_min = min_volatility.metrics.annualized_return;
    let r_max = max_sharpe.metrics.annualized_return;
    let targets = target_grid(r_min, r_max, steps);

    let solve = |&target: &f64| point(optimizer.efficient_return(target), target);
    let points: Vec<FrontierPoint> = if parallel {
      targets.par_iter().map(solve).collect()
    } else {
      targets.iter().map(solve).collect()
    };

    let rejected = points.iter().filter(|p| !p.is_feasible()).count();
    debug!(steps, rejected, r_min, r_max, "efficient frontier built");

    Ok(Self {
      min_volatility,
      max_sharpe,
      points,
    })
  }

  /// Requested target returns, ascending.
  pub fn target_returns(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.target_return).collect()
  }

  /// Points whose solve converged.
  pub fn feasible_points(&self) -> impl Iterator<Item = &FrontierPoint> {
    self.points.iter().filter(|p| p.is_feasible())
  }

  /// Return interval spanned by the two anchors, low end first.
  pub fn return_bounds(&self) -> (f64, f64) {
    let a = self.min_volatility.metrics.annualized_return;
    let b = self.max_sharpe.metrics.annualized_return;
    (a.min(b), a.max(b))
  }

  /// Efficient portfolio for a target on this frontier's segment.
  pub fn efficient_opt(
    &self,
    optimizer: &MarkowitzOptimizer<'_>,
    target_return: f64,
  ) -> Result<OptimizationResult, PortfolioError> {
    let (lo, hi) = self.return_bounds();
    let slack = optimizer.tolerance();
    if !(lo - slack..=hi + slack).contains(&target_return) {
      return Err(PortfolioError::InfeasibleTarget {
        target: target_return,
        reason: format!("outside the frontier segment [{lo:.6}, {hi:.6}]"),
      });
    }
    Ok(optimizer.efficient_return(target_return))
  }
}

fn point(res: OptimizationResult, target: f64) -> FrontierPoint {
  if !res.converged() {
    warn!(target, termination = %res.termination, "frontier target rejected");
    return FrontierPoint::new(target, f64::NAN, res.weights, res.termination);
  }
  FrontierPoint::new(
    target,
    res.metrics.annualized_volatility,
    res.weights,
    res.termination,
  )
}

/// Ascending sweep targets between the anchor returns, in either order.
pub fn target_grid(r_min: f64, r_max: f64, steps: usize) -> Vec<f64> {
  linspace(r_min.min(r_max), r_min.max(r_max), steps)
}

/// `steps` evenly spaced values over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
  match steps {
    0 => Vec::new(),
    1 => vec![start],
    _ => {
      let dx = (end - start) / (steps - 1) as f64;
      (0..steps)
        .map(|i| if i == steps - 1 { end } else { start + dx * i as f64 })
        .collect()
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::data::MarketStatistics;
  use crate::quant::portfolio::performance::TRADING_DAYS;
  use crate::quant::portfolio::sqp::SqpConfig;
  use crate::quant::portfolio::types::WeightBounds;

  const MEAN: [f64; 2] = [0.001, 0.002];
  const COV: [[f64; 2]; 2] = [[0.0004, 0.0001], [0.0001, 0.0009]];

  fn two_asset() -> MarketStatistics {
    MarketStatistics::new(
      vec!["LOW".into(), "HIGH".into()],
      MEAN.to_vec(),
      COV.iter().map(|r| r.to_vec()).collect(),
    )
    .unwrap()
  }

  fn three_asset() -> MarketStatistics {
    MarketStatistics::new(
      vec!["CBA".into(), "BHP".into(), "TLS".into()],
      vec![0.0006, 0.0009, 0.0003],
      vec![
        vec![0.00020, 0.00006, 0.00004],
        vec![0.00006, 0.00035, 0.00003],
        vec![0.00004, 0.00003, 0.00012],
      ],
    )
    .unwrap()
  }

  fn optimizer(stats: &MarketStatistics) -> MarkowitzOptimizer<'_> {
    MarkowitzOptimizer::new(stats, &WeightBounds::default(), 0.0, SqpConfig::default()).unwrap()
  }

  /// With two assets the target alone fixes the weights.
  fn closed_form_volatility(target: f64) -> f64 {
    let (r0, r1) = (MEAN[0] * TRADING_DAYS, MEAN[1] * TRADING_DAYS);
    let w0 = (r1 - target) / (r1 - r0);
    let w1 = 1.0 - w0;
    let var = w0 * w0 * COV[0][0] + w1 * w1 * COV[1][1] + 2.0 * w0 * w1 * COV[0][1];
    (var * TRADING_DAYS).sqrt()
  }

  #[test]
  fn linspace_includes_both_ends() {
    assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    assert_eq!(linspace(0.3, 0.9, 1), vec![0.3]);
    assert!(linspace(0.0, 1.0, 0).is_empty());
  }

  #[test]
  fn reversed_anchors_still_give_ascending_targets() {
    let targets = target_grid(0.30, 0.20, 5);

    assert_eq!(targets.len(), 5);
    assert_eq!(targets[0], 0.20);
    assert_eq!(targets[4], 0.30);
    assert!(targets.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(targets, target_grid(0.20, 0.30, 5));
  }

  #[test]
  fn two_asset_frontier_matches_closed_form() {
    let stats = two_asset();
    let opt = optimizer(&stats);
    let frontier = EfficientFrontier::build(&opt, 10, false).unwrap();

    assert_eq!(frontier.points.len(), 10);
    for p in &frontier.points {
      assert!(p.is_feasible());
      assert_abs_diff_eq!(p.volatility, closed_form_volatility(p.target_return), epsilon = 1e-6);
    }
  }

  #[test]
  fn frontier_spans_anchor_returns_in_ascending_order() {
    let stats = three_asset();
    let opt = optimizer(&stats);
    let frontier = EfficientFrontier::build(&opt, DEFAULT_FRONTIER_STEPS, true).unwrap();

    let targets = frontier.target_returns();
    assert_eq!(targets.len(), DEFAULT_FRONTIER_STEPS);
    assert!(targets.windows(2).all(|w| w[0] < w[1]));

    let (lo, hi) = frontier.return_bounds();
    assert_abs_diff_eq!(targets[0], lo, epsilon = 1e-15);
    assert_abs_diff_eq!(*targets.last().unwrap(), hi, epsilon = 1e-15);
    assert_abs_diff_eq!(lo, frontier.min_volatility.metrics.annualized_return, epsilon = 1e-15);
  }

  #[test]
  fn volatility_is_non_decreasing_beyond_min_variance() {
    let stats = three_asset();
    let opt = optimizer(&stats);
    let frontier = EfficientFrontier::build(&opt, 15, false).unwrap();

    let vols: Vec<f64> = frontier.feasible_points().map(|p| p.volatility).collect();
    assert_eq!(vols.len(), 15);
    assert!(vols.windows(2).all(|w| w[1] >= w[0] - 1e-9));
    assert_abs_diff_eq!(
      vols[0],
      frontier.min_volatility.metrics.annualized_volatility,
      epsilon = 1e-6
    );
  }

  #[test]
  fn parallel_and_sequential_sweeps_agree() {
    let stats = three_asset();
    let opt = optimizer(&stats);
    let seq = EfficientFrontier::build(&opt, 8, false).unwrap();
    let par = EfficientFrontier::build(&opt, 8, true).unwrap();

    for (a, b) in seq.points.iter().zip(par.points.iter()) {
      assert_eq!(a.target_return, b.target_return);
      assert_eq!(a.volatility, b.volatility);
    }
  }

  #[test]
  fn efficient_opt_rejects_targets_off_the_segment() {
    let stats = three_asset();
    let opt = optimizer(&stats);
    let frontier = EfficientFrontier::build(&opt, 5, false).unwrap();
    let (lo, hi) = frontier.return_bounds();

    let inside = frontier.efficient_opt(&opt, (lo + hi) / 2.0).unwrap();
    assert!(inside.converged());

    let err = frontier.efficient_opt(&opt, hi + 0.05).unwrap_err();
    assert!(matches!(err, PortfolioError::InfeasibleTarget { .. }));
    assert!(frontier.efficient_opt(&opt, lo - 0.05).is_err());
  }

  #[test]
  fn rejected_target_keeps_no_made_up_volatility() {
    let res = optimizer(&two_asset()).efficient_return(5.0);
    let p = point(res, 5.0);
    assert!(!p.is_feasible());
    assert!(p.volatility.is_nan());
  }

  #[test]
  #[traced_test]
  fn sweep_is_logged() {
    let stats = two_asset();
    let opt = optimizer(&stats);
    EfficientFrontier::build(&opt, 3, false).unwrap();
    assert!(logs_contain("efficient frontier built"));
  }
}
