//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Mean-variance portfolio optimization: performance evaluation, constrained
//! optimizers, the efficient frontier and allocation reports.

pub mod constraints;
pub mod data;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod objectives;
pub mod optimizers;
pub mod performance;
pub mod report;
pub mod sqp;
pub mod types;

pub use constraints::Constraint;
pub use constraints::ConstraintKind;
pub use data::InMemoryProvider;
pub use data::MarketStatistics;
pub use data::PriceHistory;
pub use data::StatisticsProvider;
pub use data::align_price_histories;
pub use data::simple_returns;
pub use engine::MarkowitzResults;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use error::PortfolioError;
pub use frontier::EfficientFrontier;
pub use objectives::NegativeSharpe;
pub use objectives::Objective;
pub use objectives::Volatility;
pub use optimizers::MarkowitzOptimizer;
pub use optimizers::optimize_efficient_return;
pub use optimizers::optimize_max_sharpe;
pub use optimizers::optimize_min_variance;
pub use performance::PortfolioMetrics;
pub use performance::TRADING_DAYS;
pub use performance::evaluate;
pub use report::AllocationReport;
pub use report::AssetAllocation;
pub use sqp::Sqp;
pub use sqp::SqpConfig;
pub use sqp::SqpOutcome;
pub use types::FrontierPoint;
pub use types::OptimizationResult;
pub use types::Termination;
pub use types::WeightBounds;
