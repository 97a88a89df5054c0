//! # markowitz-rs
//!
//! Single-period mean-variance (Markowitz) portfolio optimization.
//!
//! ## Modules
//!
//! | Module              | Description                                                                 |
//! |---------------------|-----------------------------------------------------------------------------|
//! | [`quant::portfolio`] | Performance evaluation, SQP optimizers, efficient frontier and reports.     |
//! | [`quant::yahoo`]     | Yahoo Finance statistics provider. Optional feature `yahoo`.                |
//! | [`visualization`]    | Plotly rendering of the efficient frontier.                                 |
//!
//! ## Example Usage
//!
//! ```rust
//! use markowitz_rs::quant::portfolio::MarketStatistics;
//! use markowitz_rs::quant::portfolio::PortfolioEngine;
//!
//! let stats = MarketStatistics::new(
//!   vec!["A".into(), "B".into()],
//!   vec![0.001, 0.002],
//!   vec![vec![0.0004, 0.0001], vec![0.0001, 0.0009]],
//! )?;
//! let results = PortfolioEngine::default().calculated_results(&stats)?;
//! println!("{}", results.max_sharpe);
//! ```

pub mod quant;
pub mod visualization;
