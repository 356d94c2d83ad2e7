//! Web Archive Job
//!
//! Fetches each configured symbol's daily history from the web data
//! service and rewrites its series file. One symbol failing does not stop
//! the others; failures end up in the summary.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infrastructure::store::{DailySeriesStore, StoreError};
use crate::infrastructure::webdata::DailySeriesSource;

/// Totals for one `archive_symbols` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebArchiveSummary {
    /// Series files rewritten.
    pub written: usize,
    /// Symbols whose fetch failed, with the failure text.
    pub failed: Vec<(String, String)>,
}

/// Daily series archive job over an injected series source.
pub struct WebArchiveService {
    source: Arc<dyn DailySeriesSource>,
    store: DailySeriesStore,
    symbols: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
    shutdown: CancellationToken,
}

impl WebArchiveService {
    /// Create a job fetching `symbols` over the inclusive `start..=end`
    /// window.
    #[must_use]
    pub const fn new(
        source: Arc<dyn DailySeriesSource>,
        store: DailySeriesStore,
        symbols: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            symbols,
            start,
            end,
            shutdown,
        }
    }

    /// Fetch every configured symbol and rewrite its series file.
    ///
    /// The shutdown token is checked before each symbol.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when a series file cannot be written; fetch failures
    /// are recorded in the summary instead.
    pub async fn archive_symbols(&self) -> Result<WebArchiveSummary, StoreError> {
        let mut summary = WebArchiveSummary::default();
        // The source takes an exclusive end, the configured window is inclusive.
        let fetch_end = self.end.succ_opt().unwrap_or(self.end);
        info!(
            symbols = self.symbols.len(),
            start = %self.start,
            end = %self.end,
            "web archive starting"
        );
        for symbol in &self.symbols {
            if self.shutdown.is_cancelled() {
                info!(%symbol, "shutdown requested, stopping");
                break;
            }
            match self
                .source
                .fetch_daily_series(symbol, self.start, fetch_end)
                .await
            {
                Ok(bars) => {
                    let path = self.store.write_series(symbol, &bars)?;
                    info!(%symbol, rows = bars.len(), path = %path.display(), "series archived");
                    summary.written += 1;
                }
                Err(error) => {
                    warn!(%symbol, %error, "series fetch failed");
                    summary.failed.push((symbol.clone(), error.to_string()));
                }
            }
        }
        info!(
            written = summary.written,
            failed = summary.failed.len(),
            "web archive finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for WebArchiveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebArchiveService")
            .field("symbols", &self.symbols)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    use crate::domain::bar::DailyBar;
    use crate::infrastructure::webdata::{MockDailySeriesSource, WebDataError};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_bar(date: NaiveDate) -> DailyBar {
        DailyBar {
            date,
            open: Decimal::new(21_000, 0),
            high: Decimal::new(21_100, 0),
            low: Decimal::new(20_900, 0),
            close: Decimal::new(21_050, 0),
            adj_close: Decimal::new(21_050, 0),
            volume: 1_000_000,
        }
    }

    fn service(
        mock: MockDailySeriesSource,
        root: &std::path::Path,
        symbols: &[&str],
        shutdown: CancellationToken,
    ) -> WebArchiveService {
        WebArchiveService::new(
            Arc::new(mock),
            DailySeriesStore::new(root),
            symbols.iter().map(|s| (*s).to_string()).collect(),
            day(2010, 1, 1),
            day(2010, 1, 8),
            shutdown,
        )
    }

    #[tokio::test]
    async fn writes_each_symbol_with_exclusive_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockDailySeriesSource::new();
        mock.expect_fetch_daily_series()
            .with(eq("^HSI"), eq(day(2010, 1, 1)), eq(day(2010, 1, 9)))
            .times(1)
            .returning(|_, start, _| Ok(vec![one_bar(start.succ_opt().unwrap())]));

        let service = service(mock, dir.path(), &["^HSI"], CancellationToken::new());
        let summary = service.archive_symbols().await.unwrap();

        assert_eq!(summary.written, 1);
        assert!(summary.failed.is_empty());
        assert!(dir.path().join("HSI.csv").exists());
    }

    #[tokio::test]
    async fn one_failed_symbol_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockDailySeriesSource::new();
        mock.expect_fetch_daily_series()
            .with(eq("^HSI"), eq(day(2010, 1, 1)), eq(day(2010, 1, 9)))
            .times(1)
            .returning(|_, _, _| Err(WebDataError::Unreachable { attempts: 3 }));
        mock.expect_fetch_daily_series()
            .with(eq("0005.HK"), eq(day(2010, 1, 1)), eq(day(2010, 1, 9)))
            .times(1)
            .returning(|_, start, _| Ok(vec![one_bar(start)]));

        let service = service(mock, dir.path(), &["^HSI", "0005.HK"], CancellationToken::new());
        let summary = service.archive_symbols().await.unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "^HSI");
        assert!(summary.failed[0].1.contains("not reachable"));
        assert!(dir.path().join("0005.HK.csv").exists());
        assert!(!dir.path().join("HSI.csv").exists());
    }

    #[tokio::test]
    async fn cancelled_token_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockDailySeriesSource::new();
        mock.expect_fetch_daily_series().times(0);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let service = service(mock, dir.path(), &["^HSI"], shutdown);
        let summary = service.archive_symbols().await.unwrap();

        assert_eq!(summary, WebArchiveSummary::default());
    }

    #[tokio::test]
    async fn empty_series_still_rewrites_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockDailySeriesSource::new();
        mock.expect_fetch_daily_series()
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let service = service(mock, dir.path(), &["^HSI"], CancellationToken::new());
        let summary = service.archive_symbols().await.unwrap();

        assert_eq!(summary.written, 1);
        let contents = std::fs::read_to_string(dir.path().join("HSI.csv")).unwrap();
        assert_eq!(contents, "date,open,high,low,close,adj_close,volume\n");
    }
}
