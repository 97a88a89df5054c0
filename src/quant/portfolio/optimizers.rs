//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} f(\mathbf{w})\quad\text{s.t.}\quad
//! \mathbf 1^\top\mathbf{w}=1,\ \ \ell\le\mathbf{w}\le u,\ \ [\,252\,\boldsymbol\mu^\top\mathbf{w}=r^\*\,]
//! $$
//!
//! Maximum Sharpe, minimum variance and target-return allocations. All three
//! share one constrained SQP solve and differ only in objective and
//! constraint set.

use nalgebra::DVector;
use tracing::debug;

use super::constraints::Constraint;
use super::data::MarketStatistics;
use super::error::PortfolioError;
use super::objectives::NegativeSharpe;
use super::objectives::Objective;
use super::objectives::Volatility;
use super::performance::PortfolioMetrics;
use super::performance::TRADING_DAYS;
use super::performance::evaluate_unchecked;
use super::sqp::Sqp;
use super::sqp::SqpConfig;
use super::types::OptimizationResult;
use super::types::Termination;
use super::types::WeightBounds;

/// Mean-variance optimizer bound to one set of market statistics.
#[derive(Clone, Debug)]
pub struct MarkowitzOptimizer<'a> {
  stats: &'a MarketStatistics,
  risk_free: f64,
  lower: DVector<f64>,
  upper: DVector<f64>,
  solver: Sqp,
}

impl<'a> MarkowitzOptimizer<'a> {
  /// Validate `bounds` against the universe and prepare the solver.
  pub fn new(
    stats: &'a MarketStatistics,
    bounds: &WeightBounds,
    risk_free: f64,
    solver: SqpConfig,
  ) -> Result<Self, PortfolioError> {
    if stats.n_assets() == 0 {
      return Err(PortfolioError::dimension("asset universe", 1, 0));
    }
    let (lower, upper) = bounds.resolve(stats.n_assets())?;

    Ok(Self {
      stats,
      risk_free,
      lower,
      upper,
      solver: Sqp::new(solver),
    })
  }

  pub fn stats(&self) -> &MarketStatistics {
    self.stats
  }

  pub fn risk_free(&self) -> f64 {
    self.risk_free
  }

  /// Constraint tolerance of the underlying solver.
  pub fn tolerance(&self) -> f64 {
    self.solver.config().tolerance
  }

  /// Portfolio with the highest Sharpe ratio.
  ///
  /// When the Sharpe ratio grows without bound towards a riskless corner the
  /// result is reported as [`Termination::DegenerateObjective`].
  pub fn max_sharpe(&self) -> OptimizationResult {
    let objective = NegativeSharpe::new(self.stats.mean_returns(), self.stats.cov(), self.risk_free);
    let mut res = self.solve("max sharpe", &objective, vec![self.budget()], None);

    let floor = self.riskless_volatility();
    if !res.weights.is_empty() && res.metrics.annualized_volatility < floor {
      debug!(
        volatility = res.metrics.annualized_volatility,
        floor, "max sharpe collapsed onto a riskless portfolio"
      );
      res.termination = Termination::DegenerateObjective;
    }
    res
  }

  /// Portfolio with the lowest volatility.
  pub fn min_variance(&self) -> OptimizationResult {
    let objective = Volatility::new(self.stats.cov());
    self.solve("min variance", &objective, vec![self.budget()], None)
  }

  /// Lowest-volatility portfolio earning the annualized `target_return`.
  ///
  /// Targets the bounds cannot reach are reported as
  /// [`Termination::InfeasibleTarget`] with no weights.
  pub fn efficient_return(&self, target_return: f64) -> OptimizationResult {
    let (lo, hi) = self.return_range();
    let slack = self.tolerance();
    if !target_return.is_finite() || target_return < lo - slack || target_return > hi + slack {
      debug!(target_return, lo, hi, "target return outside attainable range");
      return self.infeasible(target_return);
    }

    let objective = Volatility::new(self.stats.cov());
    let constraints = vec![
      self.budget(),
      Constraint::target_return(self.stats.mean_returns(), target_return),
    ];
    self.solve("efficient return", &objective, constraints, Some(target_return))
  }

  /// Lowest and highest annualized return any admissible portfolio can earn.
  ///
  /// Fills assets greedily from the lower bounds, which solves the linear
  /// program exactly for box and budget constraints.
  pub fn return_range(&self) -> (f64, f64) {
    let mu = self.stats.mean_returns();
    let mut order: Vec<usize> = (0..mu.len()).collect();
    order.sort_by(|&a, &b| mu[a].total_cmp(&mu[b]));

    let lo = self.fill_in_order(order.iter().copied());
    let hi = self.fill_in_order(order.iter().rev().copied());
    (lo, hi)
  }

  /// Performance of arbitrary weights under these statistics.
  pub fn performance(&self, weights: &[f64]) -> Result<PortfolioMetrics, PortfolioError> {
    super::performance::evaluate(weights, self.stats.mean_returns(), self.stats.cov())
  }

  fn fill_in_order(&self, order: impl Iterator<Item = usize>) -> f64 {
    let mut w = self.lower.clone();
    let mut remaining = 1.0 - w.sum();
    for i in order {
      if remaining <= 0.0 {
        break;
      }
      let add = (self.upper[i] - self.lower[i]).min(remaining);
      w[i] += add;
      remaining -= add;
    }
    self.stats.mean_returns().dot(&w) * TRADING_DAYS
  }

  /// Volatility below which a portfolio counts as riskless, relative to the
  /// riskiest single asset.
  fn riskless_volatility(&self) -> f64 {
    let max_var = self
      .stats
      .cov()
      .diagonal()
      .iter()
      .fold(0.0_f64, |acc, &v| acc.max(v));
    self.tolerance().sqrt() * (max_var * TRADING_DAYS).sqrt()
  }

  fn budget(&self) -> Constraint {
    Constraint::budget(self.stats.n_assets())
  }

  fn initial_guess(&self) -> DVector<f64> {
    let n = self.stats.n_assets();
    DVector::from_element(n, 1.0 / n as f64)
  }

  fn solve<O: Objective>(
    &self,
    label: &'static str,
    objective: &O,
    constraints: Vec<Constraint>,
    target_return: Option<f64>,
  ) -> OptimizationResult {
    if self.stats.n_assets() == 1 {
      return self.single_asset(objective, &constraints, target_return);
    }

    let outcome = self.solver.minimize(
      objective,
      self.initial_guess(),
      &constraints,
      &self.lower,
      &self.upper,
    );
    debug!(
      label,
      iterations = outcome.iterations,
      termination = %outcome.termination,
      "portfolio optimization finished"
    );

    self.result(
      outcome.x,
      outcome.fun,
      outcome.iterations,
      outcome.constraint_violation,
      outcome.termination,
      target_return,
    )
  }

  /// With one asset the budget constraint pins the only weight to 1.
  fn single_asset<O: Objective>(
    &self,
    objective: &O,
    constraints: &[Constraint],
    target_return: Option<f64>,
  ) -> OptimizationResult {
    let w = DVector::from_element(1, 1.0);
    let violation = constraints
      .iter()
      .map(|c| c.residual(&w).abs())
      .fold(0.0_f64, f64::max);
    let fun = objective.cost(&w).unwrap_or(f64::NAN);

    let termination = if violation > self.tolerance() {
      Termination::InfeasibleTarget
    } else if !fun.is_finite() {
      Termination::DegenerateObjective
    } else {
      Termination::Converged
    };

    if termination == Termination::InfeasibleTarget {
      return self.infeasible(target_return.unwrap_or(f64::NAN));
    }
    self.result(w, fun, 0, violation, termination, target_return)
  }

  fn result(
    &self,
    w: DVector<f64>,
    objective: f64,
    iterations: usize,
    constraint_violation: f64,
    termination: Termination,
    target_return: Option<f64>,
  ) -> OptimizationResult {
    let metrics = evaluate_unchecked(&w, self.stats.mean_returns(), self.stats.cov());
    OptimizationResult {
      weights: w.iter().copied().collect(),
      objective,
      sharpe: metrics.sharpe_ratio(self.risk_free),
      metrics,
      iterations,
      constraint_violation,
      termination,
      target_return,
    }
  }

  fn infeasible(&self, target_return: f64) -> OptimizationResult {
    OptimizationResult {
      weights: Vec::new(),
      objective: f64::NAN,
      metrics: PortfolioMetrics::default(),
      sharpe: 0.0,
      iterations: 0,
      constraint_violation: f64::NAN,
      termination: Termination::InfeasibleTarget,
      target_return: Some(target_return),
    }
  }
}

/// Maximum Sharpe ratio portfolio.
pub fn optimize_max_sharpe(
  stats: &MarketStatistics,
  risk_free: f64,
  bounds: &WeightBounds,
) -> Result<OptimizationResult, PortfolioError> {
  MarkowitzOptimizer::new(stats, bounds, risk_free, SqpConfig::default()).map(|o| o.max_sharpe())
}

/// Minimum volatility portfolio.
pub fn optimize_min_variance(
  stats: &MarketStatistics,
  bounds: &WeightBounds,
) -> Result<OptimizationResult, PortfolioError> {
  MarkowitzOptimizer::new(stats, bounds, 0.0, SqpConfig::default()).map(|o| o.min_variance())
}

/// Minimum volatility portfolio for an annualized target return.
pub fn optimize_efficient_return(
  stats: &MarketStatistics,
  target_return: f64,
  bounds: &WeightBounds,
) -> Result<OptimizationResult, PortfolioError> {
  MarkowitzOptimizer::new(stats, bounds, 0.0, SqpConfig::default())
    .map(|o| o.efficient_return(target_return))
}
