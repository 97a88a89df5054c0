//! # Portfolio Engine
//!
//! $$
//! (\mu,\Sigma)\ \mapsto\ \bigl(\mathbf w_{\mathrm{SR}},\ \mathbf w_{\sigma},\ \{(r_k,\sigma_k)\}\bigr)
//! $$
//!
//! High-level orchestration API: statistics in, allocation reports and the
//! efficient frontier out.

use chrono::NaiveDate;
use tracing::info;

use super::data::MarketStatistics;
use super::data::StatisticsProvider;
use super::error::PortfolioError;
use super::frontier::DEFAULT_FRONTIER_STEPS;
use super::frontier::EfficientFrontier;
use super::optimizers::MarkowitzOptimizer;
use super::performance::PortfolioMetrics;
use super::report::AllocationReport;
use super::sqp::SqpConfig;
use super::types::WeightBounds;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Annualized risk-free rate used in Sharpe computations.
  pub risk_free_rate: f64,
  /// Per-asset weight bounds.
  pub bounds: WeightBounds,
  /// Number of efficient frontier samples.
  pub frontier_steps: usize,
  /// Sweep frontier targets on the rayon pool.
  pub parallel: bool,
  pub solver: SqpConfig,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0,
      bounds: WeightBounds::default(),
      frontier_steps: DEFAULT_FRONTIER_STEPS,
      parallel: true,
      solver: SqpConfig::default(),
    }
  }
}

/// Everything computed for one asset universe.
#[derive(Clone, Debug)]
pub struct MarkowitzResults {
  pub max_sharpe: AllocationReport,
  pub min_volatility: AllocationReport,
  pub frontier: EfficientFrontier,
}

/// Single entry point for mean-variance workflows.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Optimizer over `stats` with this engine's bounds, rate and solver settings.
  pub fn optimizer<'a>(
    &self,
    stats: &'a MarketStatistics,
  ) -> Result<MarkowitzOptimizer<'a>, PortfolioError> {
    MarkowitzOptimizer::new(
      stats,
      &self.config.bounds,
      self.config.risk_free_rate,
      self.config.solver.clone(),
    )
  }

  /// Max-Sharpe and min-volatility reports plus the efficient frontier.
  pub fn calculated_results(
    &self,
    stats: &MarketStatistics,
  ) -> Result<MarkowitzResults, PortfolioError> {
    let optimizer = self.optimizer(stats)?;
    let frontier =
      EfficientFrontier::build(&optimizer, self.config.frontier_steps, self.config.parallel)?;

    let max_sharpe =
      AllocationReport::from_result("Maximum Sharpe Ratio", stats.assets(), &frontier.max_sharpe)?;
    let min_volatility =
      AllocationReport::from_result("Minimum Volatility", stats.assets(), &frontier.min_volatility)?;

    info!(
      assets = stats.n_assets(),
      max_sharpe_return = frontier.max_sharpe.metrics.annualized_return,
      min_volatility = frontier.min_volatility.metrics.annualized_volatility,
      "markowitz results computed"
    );

    Ok(MarkowitzResults {
      max_sharpe,
      min_volatility,
      frontier,
    })
  }

  /// Fetch statistics from `provider` and compute [`Self::calculated_results`].
  pub fn run_with_provider<P: StatisticsProvider + ?Sized>(
    &self,
    provider: &P,
    assets: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<(MarketStatistics, MarkowitzResults), PortfolioError> {
    let stats = provider.statistics(assets, start, end)?;
    let results = self.calculated_results(&stats)?;
    Ok((stats, results))
  }

  /// Annualized performance of user-supplied weights.
  pub fn performance(
    &self,
    stats: &MarketStatistics,
    weights: &[f64],
  ) -> Result<PortfolioMetrics, PortfolioError> {
    super::performance::evaluate(weights, stats.mean_returns(), stats.cov())
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::quant::portfolio::data::InMemoryProvider;
  use crate::quant::portfolio::data::PriceHistory;

  fn stats() -> MarketStatistics {
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

  #[test]
  fn calculated_results_pair_targets_with_volatilities() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      frontier_steps: 6,
      ..Default::default()
    });
    let results = engine.calculated_results(&stats()).unwrap();

    assert_eq!(results.frontier.points.len(), 6);
    assert_eq!(results.max_sharpe.allocations.len(), 3);
    assert!(results.max_sharpe.sharpe >= results.min_volatility.sharpe);

    let total: f64 = results.min_volatility.allocations.iter().map(|a| a.weight).sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-6);
  }

  #[test]
  fn performance_of_user_weights() {
    let engine = PortfolioEngine::default();
    let m = engine.performance(&stats(), &[0.3, 0.3, 0.4]).unwrap();

    assert_abs_diff_eq!(m.annualized_return, (0.00018 + 0.00027 + 0.00012) * 252.0, epsilon = 1e-12);
    assert!(engine.performance(&stats(), &[0.5, 0.5]).is_err());
  }

  #[test]
  fn invalid_bounds_fail_before_solving() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      bounds: WeightBounds::Uniform(0.0, 0.2),
      ..Default::default()
    });
    let err = engine.calculated_results(&stats()).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidBounds(_)));
  }

  #[test]
  fn provider_errors_propagate_unchanged() {
    let engine = PortfolioEngine::default();
    let provider = InMemoryProvider::new().with_history("CBA", PriceHistory::new());
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

    let err = engine
      .run_with_provider(&provider, &["CBA".to_string()], start, end)
      .unwrap_err();
    assert!(matches!(err, PortfolioError::DataUnavailable(_)));
  }
}
