//! # Portfolio Data Utilities
//!
//! $$
//! r_{t}=\frac{P_t}{P_{t-1}}-1,\qquad
//! \hat\Sigma_{ij}=\frac{1}{T-1}\sum_t (r_{it}-\bar r_i)(r_{jt}-\bar r_j)
//! $$
//!
//! Daily return statistics and the providers that produce them.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::NaiveDate;
use nalgebra::DMatrix;
use nalgebra::DVector;
use statrs::statistics::Statistics;
use tracing::debug;

use super::error::PortfolioError;

/// Mean daily returns and their covariance for an ordered asset universe.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketStatistics {
  assets: Vec<String>,
  mean_returns: DVector<f64>,
  cov: DMatrix<f64>,
}

impl MarketStatistics {
  /// Build statistics from precomputed daily means and covariance rows.
  pub fn new(
    assets: Vec<String>,
    mean_returns: Vec<f64>,
    cov: Vec<Vec<f64>>,
  ) -> Result<Self, PortfolioError> {
    let n = assets.len();
    if mean_returns.len() != n {
      return Err(PortfolioError::dimension("mean returns", n, mean_returns.len()));
    }
    if cov.len() != n {
      return Err(PortfolioError::dimension("covariance rows", n, cov.len()));
    }
    if let Some(row) = cov.iter().find(|row| row.len() != n) {
      return Err(PortfolioError::dimension("covariance columns", n, row.len()));
    }

    let flat: Vec<f64> = cov.into_iter().flatten().collect();
    Ok(Self {
      assets,
      mean_returns: DVector::from_vec(mean_returns),
      cov: DMatrix::from_row_slice(n, n, &flat),
    })
  }

  /// Sample mean and unbiased covariance of aligned per-asset return series.
  pub fn from_returns(assets: Vec<String>, returns: &[Vec<f64>]) -> Result<Self, PortfolioError> {
    let n = assets.len();
    if returns.len() != n {
      return Err(PortfolioError::dimension("return series", n, returns.len()));
    }

    let periods = returns.first().map(|r| r.len()).unwrap_or(0);
    if let Some(r) = returns.iter().find(|r| r.len() != periods) {
      return Err(PortfolioError::dimension("return periods", periods, r.len()));
    }
    if periods < 2 {
      return Err(PortfolioError::DataUnavailable(format!(
        "need at least 2 return observations, got {periods}"
      )));
    }

    let mean_returns = DVector::from_iterator(n, returns.iter().map(|r| r.iter().mean()));
    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
      for j in i..n {
        let c = returns[i].iter().covariance(returns[j].iter());
        cov[(i, j)] = c;
        cov[(j, i)] = c;
      }
    }

    Ok(Self {
      assets,
      mean_returns,
      cov,
    })
  }

  /// Statistics of simple daily returns computed from aligned close prices.
  pub fn from_prices(assets: Vec<String>, closes: &[Vec<f64>]) -> Result<Self, PortfolioError> {
    let returns = closes
      .iter()
      .zip(assets.iter())
      .map(|(series, asset)| simple_returns(series).map_err(|e| with_asset(e, asset)))
      .collect::<Result<Vec<_>, _>>()?;
    Self::from_returns(assets, &returns)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn mean_returns(&self) -> &DVector<f64> {
    &self.mean_returns
  }

  pub fn cov(&self) -> &DMatrix<f64> {
    &self.cov
  }
}

fn with_asset(err: PortfolioError, asset: &str) -> PortfolioError {
  match err {
    PortfolioError::DataUnavailable(msg) => PortfolioError::DataUnavailable(format!("{asset}: {msg}")),
    other => other,
  }
}

/// Convert close prices to simple (percent-change) return series.
pub fn simple_returns(closes: &[f64]) -> Result<Vec<f64>, PortfolioError> {
  closes
    .windows(2)
    .map(|w| {
      if w[0] > 0.0 && w[0].is_finite() && w[1].is_finite() {
        Ok(w[1] / w[0] - 1.0)
      } else {
        Err(PortfolioError::DataUnavailable(format!(
          "invalid price pair ({}, {})",
          w[0], w[1]
        )))
      }
    })
    .collect()
}

/// Source of return statistics for an asset universe over a date range.
pub trait StatisticsProvider {
  fn statistics(
    &self,
    assets: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<MarketStatistics, PortfolioError>;
}

/// Daily close prices keyed by date.
pub type PriceHistory = BTreeMap<NaiveDate, f64>;

/// Close prices restricted to `[start, end]` on the dates shared by every series.
pub fn align_price_histories(
  histories: &[&PriceHistory],
  start: NaiveDate,
  end: NaiveDate,
) -> Vec<Vec<f64>> {
  let mut common: Option<BTreeSet<NaiveDate>> = None;
  for history in histories {
    let dates: BTreeSet<NaiveDate> = history.range(start..=end).map(|(d, _)| *d).collect();
    common = Some(match common {
      Some(acc) => acc.intersection(&dates).copied().collect(),
      None => dates,
    });
  }
  let common = common.unwrap_or_default();

  histories
    .iter()
    .map(|h| common.iter().filter_map(|d| h.get(d).copied()).collect())
    .collect()
}

/// Provider backed by price histories held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProvider {
  histories: HashMap<String, PriceHistory>,
}

impl InMemoryProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_history(mut self, asset: impl Into<String>, history: PriceHistory) -> Self {
    self.histories.insert(asset.into(), history);
    self
  }

}

impl StatisticsProvider for InMemoryProvider {
  fn statistics(
    &self,
    assets: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<MarketStatistics, PortfolioError> {
    let histories = assets
      .iter()
      .map(|a| {
        self
          .histories
          .get(a)
          .ok_or_else(|| PortfolioError::DataUnavailable(format!("no price history for {a}")))
      })
      .collect::<Result<Vec<_>, _>>()?;

    statistics_from_histories(assets, &histories, start, end)
  }
}

pub(crate) fn statistics_from_histories(
  assets: &[String],
  histories: &[&PriceHistory],
  start: NaiveDate,
  end: NaiveDate,
) -> Result<MarketStatistics, PortfolioError> {
  if start > end {
    return Err(PortfolioError::DataUnavailable(format!(
      "empty date range {start}..{end}"
    )));
  }

  let closes = align_price_histories(histories, start, end);
  let observations = closes.first().map(|c| c.len()).unwrap_or(0);
  debug!(assets = assets.len(), observations, %start, %end, "aligned price histories");

  if observations < 3 {
    return Err(PortfolioError::DataUnavailable(format!(
      "only {observations} common trading days between {start} and {end}"
    )));
  }

  MarketStatistics::from_prices(assets.to_vec(), &closes)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
  }

  #[test]
  fn new_rejects_ragged_covariance() {
    let err = MarketStatistics::new(
      vec!["A".into(), "B".into()],
      vec![0.001, 0.002],
      vec![vec![0.0004, 0.0001], vec![0.0001]],
    )
    .unwrap_err();
    assert_eq!(err, PortfolioError::dimension("covariance columns", 2, 1));
  }

  #[test]
  fn from_returns_matches_sample_moments() {
    let returns = vec![vec![0.01, -0.01, 0.02, 0.0], vec![0.005, 0.004, -0.002, 0.003]];
    let stats = MarketStatistics::from_returns(vec!["A".into(), "B".into()], &returns).unwrap();

    assert_abs_diff_eq!(stats.mean_returns()[0], 0.005, epsilon = 1e-15);
    assert_abs_diff_eq!(stats.mean_returns()[1], 0.0025, epsilon = 1e-15);

    // Unbiased variance of asset A: sum of squared deviations / (T - 1).
    let var_a = (0.005f64.powi(2) + 0.015f64.powi(2) + 0.015f64.powi(2) + 0.005f64.powi(2)) / 3.0;
    assert_abs_diff_eq!(stats.cov()[(0, 0)], var_a, epsilon = 1e-15);
    assert_eq!(stats.cov()[(0, 1)], stats.cov()[(1, 0)]);
  }

  #[test]
  fn simple_returns_reject_non_positive_prices() {
    assert_eq!(simple_returns(&[100.0, 110.0, 99.0]).unwrap().len(), 2);
    assert!(simple_returns(&[0.0, 1.0]).is_err());
  }

  #[test]
  fn in_memory_provider_aligns_on_shared_dates() {
    let a: PriceHistory = [(date(2), 100.0), (date(3), 101.0), (date(4), 99.0), (date(5), 102.0)]
      .into_iter()
      .collect();
    // Missing the 3rd; extra day outside the window.
    let b: PriceHistory = [(date(2), 50.0), (date(4), 51.0), (date(5), 50.5), (date(20), 60.0)]
      .into_iter()
      .collect();
    let provider = InMemoryProvider::new().with_history("A", a).with_history("B", b);

    let stats = provider
      .statistics(&["A".to_string(), "B".to_string()], date(1), date(10))
      .unwrap();

    assert_eq!(stats.n_assets(), 2);
    let r_a = [99.0 / 100.0 - 1.0, 102.0 / 99.0 - 1.0];
    assert_abs_diff_eq!(stats.mean_returns()[0], (r_a[0] + r_a[1]) / 2.0, epsilon = 1e-15);
  }

  #[test]
  fn in_memory_provider_reports_missing_data() {
    let provider = InMemoryProvider::new();
    let err = provider
      .statistics(&["ZZZ".to_string()], date(1), date(10))
      .unwrap_err();
    assert!(matches!(err, PortfolioError::DataUnavailable(_)));

    let a: PriceHistory = [(date(2), 100.0), (date(3), 101.0)].into_iter().collect();
    let provider = InMemoryProvider::new().with_history("A", a);
    let err = provider
      .statistics(&["A".to_string()], date(1), date(10))
      .unwrap_err();
    assert!(matches!(err, PortfolioError::DataUnavailable(_)));
  }
}
