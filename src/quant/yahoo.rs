//! # Yahoo Finance Provider
//!
//! Daily closes from Yahoo Finance, turned into return statistics.

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::DateTime;
use chrono::NaiveDate;
use time::OffsetDateTime;
use tracing::info;
use yahoo_finance_api::YahooConnector;

use super::portfolio::data::MarketStatistics;
use super::portfolio::data::PriceHistory;
use super::portfolio::data::StatisticsProvider;
use super::portfolio::data::statistics_from_histories;
use super::portfolio::error::PortfolioError;

/// [`StatisticsProvider`] backed by the Yahoo Finance chart API.
pub struct YahooProvider {
  connector: YahooConnector,
}

impl YahooProvider {
  pub fn new() -> Result<Self> {
    let connector = YahooConnector::new().context("failed to build Yahoo connector")?;
    Ok(Self { connector })
  }

  /// Daily closes of `ticker` between `start` and `end`, both inclusive.
  pub fn price_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceHistory> {
    let from = to_offset(start)?;
    let to = to_offset(end.succ_opt().unwrap_or(end))?;

    let response = tokio_test::block_on(self.connector.get_quote_history(ticker, from, to))
      .with_context(|| format!("quote history request for {ticker} failed"))?;
    let quotes = response
      .quotes()
      .with_context(|| format!("no quotes in response for {ticker}"))?;

    let history: PriceHistory = quotes
      .iter()
      .filter_map(|q| {
        DateTime::from_timestamp(q.timestamp as i64, 0).map(|t| (t.date_naive(), q.close))
      })
      .collect();
    info!(ticker, observations = history.len(), "fetched yahoo price history");

    Ok(history)
  }
}

impl StatisticsProvider for YahooProvider {
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
          .price_history(a, start, end)
          .map_err(|e| PortfolioError::DataUnavailable(format!("{e:#}")))
      })
      .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&PriceHistory> = histories.iter().collect();

    statistics_from_histories(assets, &refs, start, end)
  }
}

fn to_offset(date: NaiveDate) -> Result<OffsetDateTime> {
  let ts = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| anyhow!("invalid date {date}"))?
    .and_utc()
    .timestamp();
  OffsetDateTime::from_unix_timestamp(ts).with_context(|| format!("date {date} out of range"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dates_convert_to_utc_midnight() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let odt = to_offset(date).unwrap();
    assert_eq!(odt.unix_timestamp(), 1_709_251_200);
  }
}
