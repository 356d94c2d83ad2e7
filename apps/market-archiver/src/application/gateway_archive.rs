//! Gateway Archive Job
//!
//! Walks the archive window one trading day at a time, requesting a day of
//! 30-second bars per contract and persisting each day to its own CSV file.
//! Days whose file already exists are skipped, so an interrupted run picks
//! up where it left off.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::bar::HistoricalBar;
use crate::domain::contract::Contract;
use crate::domain::handler::MarketEventHandler;
use crate::domain::request::{Request, WaitError};
use crate::infrastructure::config::GatewaySettings;
use crate::infrastructure::gateway::GatewayClient;
use crate::infrastructure::gateway::params::{BarSize, HistoricalDataParams};
use crate::infrastructure::store::{BarStore, StoreError};

/// Collects historical bars delivered by the dispatcher thread.
///
/// Tick events are not part of the historical stream and are dropped.
#[derive(Debug, Default)]
pub struct BarCollector {
    bars: Mutex<Vec<HistoricalBar>>,
}

impl BarCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the bars collected so far, oldest first.
    #[must_use]
    pub fn take(&self) -> Vec<HistoricalBar> {
        std::mem::take(&mut *self.bars.lock())
    }
}

impl MarketEventHandler for BarCollector {
    fn on_historical_bar(&self, _request: &Request, bar: HistoricalBar) {
        self.bars.lock().push(bar);
    }

    fn on_price_tick(&self, _request: &Request, _field: i32, _price: Decimal) {}

    fn on_size_tick(&self, _request: &Request, _field: i32, _size: i64) {}

    fn on_generic_tick(&self, _request: &Request, _field: i32, _value: f64) {}

    fn on_string_tick(&self, _request: &Request, _field: i32, _value: &str) {}
}

/// What happened to one (contract, day) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Bars were fetched and the day file written.
    Written(PathBuf),
    /// The day file already existed; no request was issued.
    Skipped,
    /// Every attempt failed; the day is left for a later run.
    Unfetched,
}

/// Totals for one `archive_range` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Day files written.
    pub written: usize,
    /// Days skipped because their file already existed.
    pub skipped: usize,
    /// (symbol, day) pairs that exhausted their attempts.
    pub unfetched: Vec<(String, NaiveDate)>,
}

impl ArchiveSummary {
    fn record(&mut self, symbol: &str, day: NaiveDate, outcome: &ArchiveOutcome) {
        match outcome {
            ArchiveOutcome::Written(_) => self.written += 1,
            ArchiveOutcome::Skipped => self.skipped += 1,
            ArchiveOutcome::Unfetched => self.unfetched.push((symbol.to_string(), day)),
        }
    }
}

/// Pacing and retry knobs for the gateway job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayArchiveSettings {
    /// Contracts to archive, in request order.
    pub contracts: Vec<Contract>,
    /// Deadline for one historical request to complete.
    pub request_timeout: Duration,
    /// Attempts per (contract, day) before it is recorded as unfetched.
    pub retry_count: u32,
    /// Sleep after a failed attempt.
    pub retry_wait: Duration,
    /// Sleep after a written day, keeping under the gateway pacing limit.
    pub pacing_wait: Duration,
}

impl From<&GatewaySettings> for GatewayArchiveSettings {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            contracts: settings.contracts.clone(),
            request_timeout: settings.request_timeout,
            retry_count: settings.retry_count,
            retry_wait: settings.retry_wait,
            pacing_wait: settings.pacing_wait,
        }
    }
}

/// Intraday archive job over an already-connected gateway client.
#[derive(Debug)]
pub struct GatewayArchiveService {
    client: GatewayClient,
    store: BarStore,
    settings: GatewayArchiveSettings,
    shutdown: CancellationToken,
}

impl GatewayArchiveService {
    /// Create the job. The client's connection guard stays with the caller.
    #[must_use]
    pub const fn new(
        client: GatewayClient,
        store: BarStore,
        settings: GatewayArchiveSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            shutdown,
        }
    }

    /// Archive every day in `days`, contracts inner loop.
    ///
    /// Blocks the calling thread. The shutdown token is checked between
    /// units of work, so cancellation stops the job at a (contract, day)
    /// boundary.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when a day file cannot be written; fetch failures are
    /// recorded as unfetched instead.
    pub fn archive_range(&self, days: &[NaiveDate]) -> Result<ArchiveSummary, StoreError> {
        let mut summary = ArchiveSummary::default();
        info!(
            days = days.len(),
            contracts = self.settings.contracts.len(),
            "gateway archive starting"
        );
        'days: for day in days {
            for contract in &self.settings.contracts {
                if self.shutdown.is_cancelled() {
                    info!(day = %day, "shutdown requested, stopping");
                    break 'days;
                }
                let outcome = self.archive_day(contract, *day)?;
                summary.record(&contract.symbol, *day, &outcome);
            }
        }
        info!(
            written = summary.written,
            skipped = summary.skipped,
            unfetched = summary.unfetched.len(),
            "gateway archive finished"
        );
        Ok(summary)
    }

    /// Fetch and persist one (contract, day), retrying per the settings.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the fetched day cannot be written.
    pub fn archive_day(
        &self,
        contract: &Contract,
        day: NaiveDate,
    ) -> Result<ArchiveOutcome, StoreError> {
        if self.store.contains(day, contract) {
            debug!(symbol = %contract.symbol, %day, "day file exists, skipping");
            return Ok(ArchiveOutcome::Skipped);
        }
        let Some(end_day) = day.succ_opt() else {
            warn!(%day, "day has no successor, leaving unfetched");
            return Ok(ArchiveOutcome::Unfetched);
        };
        // A "1 D" request ending at the next midnight covers the whole session.
        let end = end_day.and_time(NaiveTime::MIN);
        let params = HistoricalDataParams::new().with_bar_size(BarSize::Sec30);

        for attempt in 1..=self.settings.retry_count.max(1) {
            let collector = Arc::new(BarCollector::new());
            let handler: Arc<dyn MarketEventHandler> = Arc::clone(&collector) as _;
            let request = match self
                .client
                .request_historical_data(handler, contract, end, &params)
            {
                Ok(request) => request,
                Err(error) => {
                    warn!(
                        symbol = %contract.symbol,
                        %day,
                        attempt,
                        %error,
                        "historical request refused"
                    );
                    thread::sleep(self.settings.retry_wait);
                    continue;
                }
            };
            match request.wait_for_completion(self.settings.request_timeout) {
                Ok(()) => {
                    let bars = collector.take();
                    let path = self.store.write_day(day, contract, &bars)?;
                    info!(
                        symbol = %contract.symbol,
                        %day,
                        bars = bars.len(),
                        path = %path.display(),
                        "day archived"
                    );
                    thread::sleep(self.settings.pacing_wait);
                    return Ok(ArchiveOutcome::Written(path));
                }
                Err(WaitError::Failed(error)) => {
                    warn!(
                        symbol = %contract.symbol,
                        %day,
                        attempt,
                        code = error.code,
                        message = %error.message,
                        "historical request failed"
                    );
                    thread::sleep(self.settings.retry_wait);
                }
                Err(WaitError::Timeout { waited }) => {
                    warn!(
                        symbol = %contract.symbol,
                        %day,
                        attempt,
                        waited = ?waited,
                        "historical request timed out, cancelling"
                    );
                    self.client.cancel(&request);
                }
                Err(WaitError::Cancelled) => {
                    debug!(symbol = %contract.symbol, %day, "request cancelled, stopping unit");
                    return Ok(ArchiveOutcome::Unfetched);
                }
            }
        }
        warn!(
            symbol = %contract.symbol,
            %day,
            attempts = self.settings.retry_count,
            "attempts exhausted, leaving unfetched"
        );
        Ok(ArchiveOutcome::Unfetched)
    }
}

// =============================================================================
// Tests
// =============================================================================
