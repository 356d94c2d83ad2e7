//! Web Data Client
//!
//! Fetches daily OHLCV series from a public chart-style JSON endpoint. One
//! GET per symbol covers the whole requested window; transient failures are
//! retried a bounded number of times with a randomized pause, the way a
//! polite scraper behaves against a public service.

pub mod messages;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use rand::Rng;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::bar::DailyBar;
use crate::infrastructure::config::WebDataSettings;
use crate::infrastructure::webdata::messages::ChartResponse;

/// User agent presented to the web data service.
const USER_AGENT: &str = concat!("market-archiver/", env!("CARGO_PKG_VERSION"));

/// Web data fetch failure.
#[derive(Debug, Error)]
pub enum WebDataError {
    /// The configured base url does not parse.
    #[error("invalid web data base url: {0}")]
    InvalidUrl(String),
    /// Transport-level failure (connect, timeout, body read, decode).
    #[error("web data request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status.
    #[error("web data service returned {status}")]
    Status {
        /// The response status.
        status: StatusCode,
    },
    /// The service answered with its own error body.
    #[error("web data service error {code}: {description}")]
    Service {
        /// Short error code.
        code: String,
        /// Human-readable description.
        description: String,
    },
    /// The body parsed as JSON but not as a usable chart.
    #[error("malformed chart response: {0}")]
    Malformed(String),
    /// All attempts failed with retryable errors.
    #[error("web data service is not reachable after {attempts} attempts")]
    Unreachable {
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Port for fetching daily series, implemented by [`WebDataClient`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DailySeriesSource: Send + Sync {
    /// Fetch the daily bars of `symbol` for `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns a [`WebDataError`] when the series cannot be fetched.
    async fn fetch_daily_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, WebDataError>;
}

/// HTTP client for the chart endpoint with bounded randomized retries.
#[derive(Debug, Clone)]
pub struct WebDataClient {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    retry_wait_min: Duration,
    retry_wait_max: Duration,
}

impl WebDataClient {
    /// Build a client from settings.
    ///
    /// # Errors
    ///
    /// [`WebDataError::InvalidUrl`] when the base url does not parse;
    /// [`WebDataError::Http`] when the underlying client cannot be built.
    pub fn new(settings: &WebDataSettings) -> Result<Self, WebDataError> {
        reqwest::Url::parse(&settings.base_url)
            .map_err(|error| WebDataError::InvalidUrl(format!("{}: {error}", settings.base_url)))?;
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_attempts: settings.max_attempts.max(1),
            retry_wait_min: settings.retry_wait_min,
            retry_wait_max: settings.retry_wait_max,
        })
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, WebDataError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
            self.base_url,
            symbol,
            epoch_utc(start),
            epoch_utc(end)
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebDataError::Status { status });
        }
        let body: ChartResponse = response.json().await?;
        daily_bars_from(body)
    }

    fn retry_delay(&self) -> Duration {
        let min = self.retry_wait_min.min(self.retry_wait_max);
        let max = self.retry_wait_min.max(self.retry_wait_max);
        if min == max {
            return min;
        }
        let millis = rand::rng().random_range(min.as_millis()..=max.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl DailySeriesSource for WebDataClient {
    async fn fetch_daily_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, WebDataError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol, start, end).await {
                Ok(bars) => {
                    tracing::info!(symbol, rows = bars.len(), "daily series fetched");
                    return Ok(bars);
                }
                Err(error) if !is_retryable(&error) => {
                    tracing::error!(symbol, %error, "daily series fetch failed");
                    return Err(error);
                }
                Err(error) => {
                    if attempt >= self.max_attempts {
                        tracing::error!(symbol, attempt, %error, "web data service is not reachable");
                        return Err(WebDataError::Unreachable { attempts: attempt });
                    }
                    let delay = self.retry_delay();
                    tracing::warn!(
                        symbol,
                        attempt,
                        delay_ms = delay.as_millis(),
                        %error,
                        "daily series fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Whether another attempt may succeed.
fn is_retryable(error: &WebDataError) -> bool {
    match error {
        WebDataError::Http(_) | WebDataError::Malformed(_) => true,
        WebDataError::Status { status } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        WebDataError::InvalidUrl(_)
        | WebDataError::Service { .. }
        | WebDataError::Unreachable { .. } => false,
    }
}

/// Epoch seconds of `day` at UTC midnight.
fn epoch_utc(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Flatten a chart body into daily bars, skipping null (holiday) rows.
fn daily_bars_from(response: ChartResponse) -> Result<Vec<DailyBar>, WebDataError> {
    if let Some(error) = response.chart.error {
        return Err(WebDataError::Service {
            code: error.code,
            description: error.description,
        });
    }
    let result = response
        .chart
        .result
        .and_then(|mut results| {
            if results.is_empty() {
                None
            } else {
                Some(results.swap_remove(0))
            }
        })
        .ok_or_else(|| WebDataError::Malformed("body has neither result nor error".to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| WebDataError::Malformed("result has no quote block".to_string()))?;
    let adjclose = result
        .indicators
        .adjclose
        .and_then(|blocks| blocks.into_iter().next())
        .map(|block| block.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (row, &ts) in timestamps.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            value_at(&quote.open, row),
            value_at(&quote.high, row),
            value_at(&quote.low, row),
            value_at(&quote.close, row),
            quote.volume.get(row).copied().flatten(),
        ) else {
            tracing::debug!(row, "skipping null quote row");
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            tracing::warn!(row, ts, "skipping row with out-of-range timestamp");
            continue;
        };
        let adj = value_at(&adjclose, row).unwrap_or(close);
        let (Some(open), Some(high), Some(low), Some(close), Some(adj_close)) =
            (price(open), price(high), price(low), price(close), price(adj))
        else {
            tracing::warn!(row, "skipping row with unrepresentable price");
            continue;
        };

        bars.push(DailyBar {
            date,
            open,
            high,
            low,
            close,
            adj_close,
            volume,
        });
    }
    Ok(bars)
}

fn value_at(values: &[Option<f64>], row: usize) -> Option<f64> {
    values.get(row).copied().flatten()
}

fn price(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}
