//! Markowitz CLI
//!
//! Computes the maximum Sharpe, minimum volatility and efficient frontier
//! portfolios for a set of tickers and writes the frontier chart to HTML.

use anyhow::Context;
use anyhow::Result;
use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;
use chrono::Weekday;
use clap::Parser;
use clap::ValueEnum;
use markowitz_rs::quant::portfolio::InMemoryProvider;
use markowitz_rs::quant::portfolio::PortfolioEngine;
use markowitz_rs::quant::portfolio::PortfolioEngineConfig;
use markowitz_rs::quant::portfolio::PriceHistory;
use markowitz_rs::quant::portfolio::SqpConfig;
use markowitz_rs::quant::portfolio::StatisticsProvider;
use markowitz_rs::quant::portfolio::WeightBounds;
use markowitz_rs::visualization::write_frontier_html;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing::Level;
use tracing::info;
use tracing::warn;
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Source {
  /// Deterministic synthetic prices.
  Sample,
  /// Daily closes from Yahoo Finance (feature `yahoo`).
  Yahoo,
}

#[derive(Parser)]
#[command(name = "markowitz")]
#[command(about = "Mean-variance portfolio optimisation", long_about = None)]
struct Cli {
  /// Tickers, in universe order
  #[arg(short, long, value_delimiter = ',', default_value = "CBA.AX,BHP.AX,TLS.AX")]
  tickers: Vec<String>,

  /// Lookback window in calendar days
  #[arg(short, long, default_value = "365")]
  days: i64,

  /// Annualized risk-free rate
  #[arg(long, default_value = "0.0")]
  risk_free: f64,

  /// Lower weight bound per asset
  #[arg(long, default_value = "0.0")]
  lower: f64,

  /// Upper weight bound per asset
  #[arg(long, default_value = "1.0")]
  upper: f64,

  /// Number of efficient frontier samples
  #[arg(long, default_value = "20")]
  steps: usize,

  /// Solve frontier targets one after another
  #[arg(long)]
  sequential: bool,

  /// Evaluate these weights as well
  #[arg(short, long, value_delimiter = ',')]
  weights: Option<Vec<f64>>,

  /// Output path of the frontier chart
  #[arg(short, long, default_value = "efficient_frontier.html")]
  output: String,

  /// Price source
  #[arg(long, value_enum, default_value = "sample")]
  source: Source,

  /// Verbosity level
  #[arg(short, long, default_value = "info")]
  log_level: String,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let level = match cli.log_level.as_str() {
    "trace" => Level::TRACE,
    "debug" => Level::DEBUG,
    "info" => Level::INFO,
    "warn" => Level::WARN,
    "error" => Level::ERROR,
    _ => Level::INFO,
  };
  let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
  tracing::subscriber::set_global_default(subscriber)?;

  let end = Utc::now().date_naive();
  let start = end - Duration::days(cli.days);
  info!(tickers = ?cli.tickers, %start, %end, source = ?cli.source, "loading prices");

  let provider = provider(cli.source, &cli.tickers, start, end)?;
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    risk_free_rate: cli.risk_free,
    bounds: WeightBounds::Uniform(cli.lower, cli.upper),
    frontier_steps: cli.steps,
    parallel: !cli.sequential,
    solver: SqpConfig::default(),
  });

  let (stats, results) = engine
    .run_with_provider(provider.as_ref(), &cli.tickers, start, end)
    .context("portfolio optimisation failed")?;

  println!("{}", results.max_sharpe);
  println!("{}", results.min_volatility);

  let rejected = results.frontier.points.len() - results.frontier.feasible_points().count();
  if rejected > 0 {
    warn!(rejected, "some frontier targets did not converge");
  }
  println!("Efficient frontier ({} points)", results.frontier.points.len());
  for p in results.frontier.feasible_points() {
    println!(
      "  return {:>7.2}%  volatility {:>7.2}%",
      p.target_return * 100.0,
      p.volatility * 100.0
    );
  }

  if let Some(weights) = cli.weights {
    let m = engine.performance(&stats, &weights)?;
    println!(
      "Weights {:?}: return {:.2}%, volatility {:.2}%",
      weights,
      m.annualized_return * 100.0,
      m.annualized_volatility * 100.0
    );
  }

  write_frontier_html(&results.frontier, &cli.output)?;
  info!(path = %cli.output, "frontier chart written");

  Ok(())
}

fn provider(
  source: Source,
  tickers: &[String],
  start: NaiveDate,
  end: NaiveDate,
) -> Result<Box<dyn StatisticsProvider>> {
  match source {
    Source::Sample => Ok(Box::new(sample_provider(tickers, start, end)?)),
    #[cfg(feature = "yahoo")]
    Source::Yahoo => Ok(Box::new(markowitz_rs::quant::yahoo::YahooProvider::new()?)),
    #[cfg(not(feature = "yahoo"))]
    Source::Yahoo => anyhow::bail!("built without the `yahoo` feature"),
  }
}

/// One-factor synthetic market over business days, seeded so every run matches.
fn sample_provider(tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<InMemoryProvider> {
  let mut rng = StdRng::seed_from_u64(252);
  let market = Normal::new(0.0004, 0.008)?;
  let noise = Normal::new(0.0, 1.0)?;

  let params: Vec<(f64, f64, f64)> = (0..tickers.len())
    .map(|i| {
      let k = i as f64;
      // (drift, beta, idiosyncratic vol)
      (0.0001 * (k % 4.0), 0.6 + 0.25 * (k % 3.0), 0.006 + 0.002 * (k % 5.0))
    })
    .collect();

  let mut prices = vec![100.0_f64; tickers.len()];
  let mut histories = vec![PriceHistory::new(); tickers.len()];
  let mut day = start;
  while day <= end {
    if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
      let m = market.sample(&mut rng);
      for (i, &(drift, beta, vol)) in params.iter().enumerate() {
        let r = drift + beta * m + vol * noise.sample(&mut rng);
        prices[i] *= 1.0 + r;
        histories[i].insert(day, prices[i]);
      }
    }
    day += Duration::days(1);
  }

  Ok(
    tickers
      .iter()
      .cloned()
      .zip(histories)
      .fold(InMemoryProvider::new(), |p, (t, h)| p.with_history(t, h)),
  )
}
