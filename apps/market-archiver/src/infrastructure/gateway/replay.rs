//! Replay Transport
//!
//! Deterministic [`GatewayTransport`] used by integration tests and the
//! binary's offline replay mode. Responses are scripted per (symbol, day);
//! a delivery thread owned by the transport replays them through the
//! request registry's dispatch entry points, so callers see the same
//! threading as against a live session.
//!
//! Historical streams end with the `finished` sentinel dated by the
//! requested day. A start command whose (symbol, day) has no scripted
//! response replays an empty day. Scripted `Silence` replies with nothing
//! at all, which is how caller timeouts are exercised.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;

use crate::domain::bar::{WIRE_DATE_FORMAT, WIRE_DATETIME_FORMAT};
use crate::domain::contract::Contract;
use crate::domain::request::RequestRegistry;
use crate::infrastructure::gateway::params::{END_DATE_TIME_FORMAT, HistoricalDataParams};
use crate::infrastructure::gateway::transport::{GatewayTransport, TransportError};

/// Seconds from midnight to the scripted session open (09:30).
const SESSION_OPEN_SECS: i64 = 9 * 3600 + 30 * 60;

/// One scripted intraday bar, in wire shape.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub struct ReplayBar {
    pub time: NaiveTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub bar_count: i32,
    pub wap: f64,
    pub has_gaps: bool,
}

impl ReplayBar {
    /// Bar with the given prices; trade count, weighted average and gap
    /// flag take unremarkable defaults.
    #[must_use]
    pub const fn new(
        time: NaiveTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            bar_count: 1,
            wap: close,
            has_gaps: false,
        }
    }
}

/// Scripted reply to one historical start command.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayResponse {
    /// Deliver these bars, then the completion sentinel.
    Bars(Vec<ReplayBar>),
    /// Deliver one gateway error and nothing else.
    Error {
        /// Vendor error code.
        code: i32,
        /// Vendor error message.
        message: String,
    },
    /// Deliver nothing; the caller's wait runs into its deadline.
    Silence,
}

/// One scripted market data tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayTick {
    /// A price field update.
    Price {
        /// Vendor tick field.
        field: i32,
        /// Price value.
        price: f64,
    },
    /// A size field update.
    Size {
        /// Vendor tick field.
        field: i32,
        /// Size value.
        size: i64,
    },
    /// A generic numeric field update.
    Generic {
        /// Vendor tick field.
        field: i32,
        /// Numeric value.
        value: f64,
    },
    /// A string field update.
    Text {
        /// Vendor tick field.
        field: i32,
        /// String value.
        value: String,
    },
}

/// Scripted gateway behavior, keyed by symbol and day.
#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    historical: HashMap<(String, NaiveDate), VecDeque<ReplayResponse>>,
    ticks: HashMap<String, Vec<ReplayTick>>,
}

impl ReplayScript {
    /// Empty script: every historical request replays an empty day.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for historical requests on `(symbol, day)`.
    ///
    /// Repeated calls for the same key queue further responses, consumed by
    /// successive start commands; this is how an error-then-success retry
    /// sequence is scripted.
    #[must_use]
    pub fn with_historical(
        mut self,
        symbol: impl Into<String>,
        day: NaiveDate,
        response: ReplayResponse,
    ) -> Self {
        self.historical
            .entry((symbol.into(), day))
            .or_default()
            .push_back(response);
        self
    }

    /// Set the tick list replayed to every market data request on `symbol`.
    #[must_use]
    pub fn with_ticks(mut self, symbol: impl Into<String>, ticks: Vec<ReplayTick>) -> Self {
        self.ticks.insert(symbol.into(), ticks);
        self
    }

    /// Deterministic intraday session per (contract, day).
    ///
    /// Prices follow an arithmetic walk seeded by the day's ordinal, so the
    /// same inputs always produce the same files in replay runs.
    #[must_use]
    pub fn synthetic(contracts: &[Contract], days: &[NaiveDate], bars_per_day: usize) -> Self {
        let mut script = Self::new();
        for contract in contracts {
            for &day in days {
                script = script.with_historical(
                    contract.symbol.clone(),
                    day,
                    ReplayResponse::Bars(synthetic_session(day, bars_per_day)),
                );
            }
        }
        script
    }

    fn next_historical(&mut self, symbol: &str, day: NaiveDate) -> ReplayResponse {
        self.historical
            .get_mut(&(symbol.to_string(), day))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ReplayResponse::Bars(Vec::new()))
    }

    fn ticks_for(&self, symbol: &str) -> Vec<ReplayTick> {
        self.ticks.get(symbol).cloned().unwrap_or_default()
    }
}

fn synthetic_session(day: NaiveDate, bars_per_day: usize) -> Vec<ReplayBar> {
    let seed = f64::from(chrono::Datelike::num_days_from_ce(&day) % 997);
    let mut price = 20_000.0 + seed;
    let session_open = day.and_time(NaiveTime::MIN) + Duration::seconds(SESSION_OPEN_SECS);

    (0..bars_per_day)
        .map(|i| {
            let open = price;
            let step = if i % 2 == 0 { 2.5 } else { -1.5 };
            let close = open + step;
            price = close;
            let stamp = session_open + Duration::seconds(30 * i as i64);
            ReplayBar {
                time: stamp.time(),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 100 + i as i64,
                bar_count: 4,
                wap: (open + close) / 2.0,
                has_gaps: false,
            }
        })
        .collect()
}

enum Job {
    Historical {
        request_id: i32,
        symbol: String,
        day: NaiveDate,
    },
    Market {
        request_id: i32,
        symbol: String,
    },
}

struct Session {
    sender: Sender<Job>,
    worker: JoinHandle<()>,
}

/// Scripted transport delivering events from its own thread.
pub struct ReplayTransport {
    registry: Arc<RequestRegistry>,
    script: Arc<Mutex<ReplayScript>>,
    session: Mutex<Option<Session>>,
}

impl ReplayTransport {
    /// Build a transport that dispatches into `registry` according to
    /// `script` once connected.
    #[must_use]
    pub fn new(script: ReplayScript, registry: Arc<RequestRegistry>) -> Self {
        Self {
            registry,
            script: Arc::new(Mutex::new(script)),
            session: Mutex::new(None),
        }
    }

    fn send(&self, job: Job) -> Result<(), TransportError> {
        let session = self.session.lock();
        let Some(session) = session.as_ref() else {
            return Err(TransportError::NotConnected);
        };
        session
            .sender
            .send(job)
            .map_err(|_| TransportError::NotConnected)
    }

    fn shutdown(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        // Dropping the sender lets the worker drain queued jobs and exit.
        drop(session.sender);
        if session.worker.join().is_err() {
            tracing::warn!("replay delivery thread panicked");
        }
    }
}

impl GatewayTransport for ReplayTransport {
    fn connect(&self, host: &str, port: u16, client_id: i32) -> Result<(), TransportError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }

        let (sender, receiver) = channel();
        let registry = Arc::clone(&self.registry);
        let script = Arc::clone(&self.script);
        let worker = std::thread::Builder::new()
            .name("gateway-replay".to_string())
            .spawn(move || run_delivery(&receiver, &registry, &script))
            .map_err(|error| TransportError::Rejected {
                reason: format!("unable to spawn delivery thread: {error}"),
            })?;

        tracing::debug!(host, port, client_id, "replay session started");
        *session = Some(Session { sender, worker });
        Ok(())
    }

    fn disconnect(&self) {
        self.shutdown();
    }

    fn start_historical_data(
        &self,
        request_id: i32,
        contract: &Contract,
        end_date_time: &str,
        _params: &HistoricalDataParams,
    ) -> Result<(), TransportError> {
        let end = NaiveDateTime::parse_from_str(end_date_time, END_DATE_TIME_FORMAT).map_err(
            |error| TransportError::Rejected {
                reason: format!("unparseable end date time {end_date_time:?}: {error}"),
            },
        )?;
        // An end at midnight closes the previous day's session.
        let day = if end.time() == NaiveTime::MIN {
            end.date().pred_opt()
        } else {
            Some(end.date())
        }
        .ok_or_else(|| TransportError::Rejected {
            reason: format!("end date out of range: {end_date_time}"),
        })?;

        self.send(Job::Historical {
            request_id,
            symbol: contract.symbol.clone(),
            day,
        })
    }

    fn cancel_historical_data(&self, request_id: i32) -> Result<(), TransportError> {
        if self.session.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        tracing::debug!(request_id, "replay historical cancel acknowledged");
        Ok(())
    }

    fn start_market_data(
        &self,
        request_id: i32,
        contract: &Contract,
        _generic_ticks: &str,
        _snapshot: bool,
    ) -> Result<(), TransportError> {
        self.send(Job::Market {
            request_id,
            symbol: contract.symbol.clone(),
        })
    }

    fn cancel_market_data(&self, request_id: i32) -> Result<(), TransportError> {
        if self.session.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        tracing::debug!(request_id, "replay market data cancel acknowledged");
        Ok(())
    }
}

impl Drop for ReplayTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ReplayTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayTransport")
            .field("connected", &self.session.lock().is_some())
            .finish_non_exhaustive()
    }
}

fn run_delivery(
    receiver: &Receiver<Job>,
    registry: &RequestRegistry,
    script: &Mutex<ReplayScript>,
) {
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Historical {
                request_id,
                symbol,
                day,
            } => {
                let response = script.lock().next_historical(&symbol, day);
                deliver_historical(registry, request_id, day, response);
            }
            Job::Market { request_id, symbol } => {
                for tick in script.lock().ticks_for(&symbol) {
                    deliver_tick(registry, request_id, tick);
                }
            }
        }
    }
}

fn deliver_historical(
    registry: &RequestRegistry,
    request_id: i32,
    day: NaiveDate,
    response: ReplayResponse,
) {
    match response {
        ReplayResponse::Silence => {
            tracing::debug!(request_id, %day, "scripted silence");
        }
        ReplayResponse::Error { code, message } => {
            registry.dispatch_error(request_id, code, &message);
        }
        ReplayResponse::Bars(bars) => {
            for bar in bars {
                let stamp = day.and_time(bar.time).format(WIRE_DATETIME_FORMAT).to_string();
                registry.dispatch_historical_bar(
                    request_id,
                    &stamp,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.bar_count,
                    bar.wap,
                    bar.has_gaps,
                );
            }
            let finished = format!("finished-{}", day.format(WIRE_DATE_FORMAT));
            registry.dispatch_historical_bar(
                request_id, &finished, 0.0, 0.0, 0.0, 0.0, 0, 0, 0.0, false,
            );
        }
    }
}

fn deliver_tick(registry: &RequestRegistry, request_id: i32, tick: ReplayTick) {
    match tick {
        ReplayTick::Price { field, price } => registry.dispatch_price_tick(request_id, field, price),
        ReplayTick::Size { field, size } => registry.dispatch_size_tick(request_id, field, size),
        ReplayTick::Generic { field, value } => {
            registry.dispatch_generic_tick(request_id, field, value);
        }
        ReplayTick::Text { field, value } => {
            registry.dispatch_string_tick(request_id, field, &value);
        }
    }
}
