//! Request Registry & Event Dispatcher
//!
//! Correlates asynchronous gateway callback events with pending logical
//! requests. Callers create requests through the registry and receive a
//! handle; the transport's callback thread feeds events back through the
//! dispatch entry points, which route each event to the handler registered
//! under its request identifier.
//!
//! # Locking
//!
//! One mutex guards the identifier table and is held only for
//! lookup/insert/delete. Handlers always run with the table lock released,
//! so a handler may re-enter the registry (for example to issue a follow-up
//! request). Completion signaling uses a per-request latch so waiters never
//! contend with dispatch.
//!
//! # Terminal Events
//!
//! A request leaves the table exactly once: on the historical completion
//! sentinel (a date field starting with `finished`), on a request-error band
//! error, or on explicit cancellation. Events arriving for an identifier no
//! longer in the table are logged and dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::bar::HistoricalBar;
use crate::domain::handler::MarketEventHandler;

/// Date-field prefix the gateway sends to end a historical bar stream.
const FINISHED_SENTINEL: &str = "finished";

// =============================================================================
// Request
// =============================================================================

/// Kind of a logical request, selecting the transport commands that start
/// and cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Bounded stream of historical bars ending with the completion sentinel.
    HistoricalData,
    /// Open-ended stream of market data ticks, ended by cancellation.
    MarketData,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoricalData => f.write_str("historical data"),
            Self::MarketData => f.write_str("market data"),
        }
    }
}

/// Lifecycle state of a request as observed through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Registered and awaiting events.
    Pending,
    /// The historical stream finished normally.
    Completed,
    /// Removed by explicit cancellation.
    Cancelled,
    /// Removed by a request-error band gateway error.
    Errored,
}

/// Gateway error attached to a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gateway error {code}: {message}")]
pub struct RequestError {
    /// Vendor error code (request-error band).
    pub code: i32,
    /// Vendor error message.
    pub message: String,
}

/// Error returned by [`Request::wait_for_completion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// Nothing terminal happened before the caller's deadline.
    #[error("request still pending after {waited:?}")]
    Timeout {
        /// Time actually spent waiting.
        waited: Duration,
    },
    /// The request was cancelled while waiting.
    #[error("request was cancelled")]
    Cancelled,
    /// The gateway reported a request-error band error.
    #[error("request failed: {0}")]
    Failed(RequestError),
}

/// Completion latch contents; terminal states carry their outcome.
enum CompletionState {
    Pending,
    Completed,
    Cancelled,
    Errored(RequestError),
}

/// One in-flight logical operation against the gateway.
///
/// Created by [`RequestRegistry::create_request`] and shared between the
/// caller, the registry table, and dispatch. The handle stays valid after
/// the registry entry is removed and then reports the terminal status.
pub struct Request {
    id: i32,
    kind: RequestKind,
    handler: Arc<dyn MarketEventHandler>,
    state: Mutex<CompletionState>,
    done: Condvar,
}

impl Request {
    fn new(id: i32, kind: RequestKind, handler: Arc<dyn MarketEventHandler>) -> Self {
        Self {
            id,
            kind,
            handler,
            state: Mutex::new(CompletionState::Pending),
            done: Condvar::new(),
        }
    }

    /// Identifier this request is registered under.
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Kind of this request.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        match *self.state.lock() {
            CompletionState::Pending => RequestStatus::Pending,
            CompletionState::Completed => RequestStatus::Completed,
            CompletionState::Cancelled => RequestStatus::Cancelled,
            CompletionState::Errored(_) => RequestStatus::Errored,
        }
    }

    /// Gateway error attached by a request-error band error, if any.
    #[must_use]
    pub fn error(&self) -> Option<RequestError> {
        match &*self.state.lock() {
            CompletionState::Errored(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Block until the request reaches a terminal state or `timeout` passes.
    ///
    /// Re-checks the latch after every wakeup, so spurious wakeups and
    /// near-deadline completions resolve to the terminal outcome. The
    /// registry enforces no timeout of its own; this deadline belongs to the
    /// caller, who reacts by retrying or cancelling.
    ///
    /// # Errors
    ///
    /// [`WaitError::Timeout`] if still pending at the deadline,
    /// [`WaitError::Cancelled`] or [`WaitError::Failed`] for the respective
    /// terminal states.
    pub fn wait_for_completion(&self, timeout: Duration) -> Result<(), WaitError> {
        let started = Instant::now();
        let mut state = self.state.lock();
        loop {
            match &*state {
                CompletionState::Pending => {}
                CompletionState::Completed => return Ok(()),
                CompletionState::Cancelled => return Err(WaitError::Cancelled),
                CompletionState::Errored(error) => return Err(WaitError::Failed(error.clone())),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(WaitError::Timeout { waited });
            }
            self.done.wait_for(&mut state, timeout - waited);
        }
    }

    /// Move the latch to a terminal state, waking waiters. Transitions after
    /// a terminal state are ignored.
    fn finish(&self, terminal: CompletionState) {
        {
            let mut state = self.state.lock();
            if !matches!(*state, CompletionState::Pending) {
                tracing::debug!(request_id = self.id, "terminal state already set - ignored");
                return;
            }
            *state = terminal;
        }
        self.done.notify_all();
    }

    fn complete(&self) {
        self.finish(CompletionState::Completed);
    }

    fn fail(&self, error: RequestError) {
        self.finish(CompletionState::Errored(error));
    }

    pub(crate) fn mark_cancelled(&self) {
        self.finish(CompletionState::Cancelled);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Error Severity
// =============================================================================

/// Severity band of a vendor error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 100-599: failure of one outstanding request.
    RequestError,
    /// 1100-2099: gateway/system level condition, no request affected.
    SystemMessage,
    /// 2100-2110: advisory notice.
    Notice,
    /// Anything else the vendor emits.
    Unclassified,
}

impl Severity {
    /// Classify a vendor error code into its severity band.
    #[must_use]
    pub const fn classify(code: i32) -> Self {
        match code {
            100..=599 => Self::RequestError,
            1100..=2099 => Self::SystemMessage,
            2100..=2110 => Self::Notice,
            _ => Self::Unclassified,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Owns the identifier table and dispatches gateway events to handlers.
///
/// An explicitly injected component: the owning client holds it in an
/// [`Arc`] and shares it with the transport adapter that delivers events.
pub struct RequestRegistry {
    next_id: AtomicI32,
    requests: Mutex<HashMap<i32, Arc<Request>>>,
}

impl RequestRegistry {
    /// Create an empty registry. Identifiers start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next identifier and register a new request under it.
    ///
    /// Concurrent callers always receive distinct identifiers.
    pub fn create_request(
        &self,
        kind: RequestKind,
        handler: Arc<dyn MarketEventHandler>,
    ) -> Arc<Request> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Arc::new(Request::new(id, kind, handler));
        self.requests.lock().insert(id, Arc::clone(&request));
        tracing::debug!(request_id = id, kind = %request.kind(), "request registered");
        request
    }

    /// Number of currently registered requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Whether an identifier is currently registered.
    #[must_use]
    pub fn is_registered(&self, request_id: i32) -> bool {
        self.requests.lock().contains_key(&request_id)
    }

    /// Remove the request if it is still the instance registered under its
    /// identifier, returning whether it was.
    ///
    /// Pointer identity guards against stale handles: a handle whose entry
    /// already left the table (completed, errored, cancelled) removes
    /// nothing and returns `false`.
    pub fn remove_if_registered(&self, request: &Arc<Request>) -> bool {
        let mut requests = self.requests.lock();
        match requests.get(&request.id()) {
            Some(registered) if Arc::ptr_eq(registered, request) => {
                requests.remove(&request.id());
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Dispatch entry points (transport callback thread)
    // =========================================================================

    /// Route one historical bar event.
    ///
    /// A date field starting with the `finished` sentinel ends the stream:
    /// the entry leaves the table and the completion latch is set instead of
    /// forwarding to the handler. Malformed wire fields drop the event with
    /// a warning and leave the request registered.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch_historical_bar(
        &self,
        request_id: i32,
        date: &str,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
        bar_count: i32,
        wap: f64,
        has_gaps: bool,
    ) {
        if date.starts_with(FINISHED_SENTINEL) {
            let removed = self.requests.lock().remove(&request_id);
            if let Some(request) = removed {
                tracing::debug!(request_id, "historical data stream finished");
                request.complete();
            } else {
                tracing::warn!(
                    request_id,
                    "completion with no associated request - ignored"
                );
            }
            return;
        }

        let Some(request) = self.lookup(request_id, "historical bar") else {
            return;
        };
        match HistoricalBar::from_wire(
            date, open, high, low, close, volume, bar_count, wap, has_gaps,
        ) {
            Ok(bar) => request.handler.on_historical_bar(&request, bar),
            Err(error) => {
                tracing::warn!(request_id, %error, "dropping malformed historical bar");
            }
        }
    }

    /// Route one price tick event.
    pub fn dispatch_price_tick(&self, request_id: i32, field: i32, price: f64) {
        let Some(request) = self.lookup(request_id, "price tick") else {
            return;
        };
        match Decimal::try_from(price) {
            Ok(price) => request.handler.on_price_tick(&request, field, price),
            Err(_) => {
                tracing::warn!(request_id, field, price, "dropping unrepresentable price tick");
            }
        }
    }

    /// Route one size tick event.
    pub fn dispatch_size_tick(&self, request_id: i32, field: i32, size: i64) {
        if let Some(request) = self.lookup(request_id, "size tick") {
            request.handler.on_size_tick(&request, field, size);
        }
    }

    /// Route one generic tick event.
    pub fn dispatch_generic_tick(&self, request_id: i32, field: i32, value: f64) {
        if let Some(request) = self.lookup(request_id, "generic tick") {
            request.handler.on_generic_tick(&request, field, value);
        }
    }

    /// Route one string tick event.
    pub fn dispatch_string_tick(&self, request_id: i32, field: i32, value: &str) {
        if let Some(request) = self.lookup(request_id, "string tick") {
            request.handler.on_string_tick(&request, field, value);
        }
    }

    /// Route one gateway error.
    ///
    /// Codes in the request-error band (100-599) attach the message to the
    /// registered request, remove it, and wake its waiter. Every other band
    /// is logged and mutates nothing.
    pub fn dispatch_error(&self, request_id: i32, code: i32, message: &str) {
        match Severity::classify(code) {
            Severity::RequestError => {
                let removed = self.requests.lock().remove(&request_id);
                if let Some(request) = removed {
                    tracing::error!(request_id, code, message, "request failed");
                    request.fail(RequestError {
                        code,
                        message: message.to_string(),
                    });
                } else {
                    tracing::warn!(
                        request_id,
                        code,
                        message,
                        "error with no associated request - ignored"
                    );
                }
            }
            Severity::SystemMessage => {
                tracing::error!(request_id, code, message, "gateway system message");
            }
            Severity::Notice => {
                tracing::warn!(request_id, code, message, "gateway notice");
            }
            Severity::Unclassified => {
                tracing::error!(request_id, code, message, "gateway error");
            }
        }
    }

    /// Clone the registered request, warning when the identifier is unknown.
    /// The table lock is released before the caller touches the handler.
    fn lookup(&self, request_id: i32, event: &str) -> Option<Arc<Request>> {
        let found = self.requests.lock().get(&request_id).cloned();
        if found.is_none() {
            tracing::warn!(request_id, event, "event with no associated request - ignored");
        }
        found
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use test_case::test_case;

    use super::*;

    /// Captures every dispatched event with the id it arrived under.
    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<Recorded>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Bar(i32, HistoricalBar),
        Price(i32, i32, Decimal),
        Size(i32, i32, i64),
        Generic(i32, i32, f64),
        Text(i32, i32, String),
    }

    impl RecordingHandler {
        fn events(&self) -> Vec<Recorded> {
            self.events.lock().clone()
        }
    }

    impl MarketEventHandler for RecordingHandler {
        fn on_historical_bar(&self, request: &Request, bar: HistoricalBar) {
            self.events.lock().push(Recorded::Bar(request.id(), bar));
        }

        fn on_price_tick(&self, request: &Request, field: i32, price: Decimal) {
            self.events.lock().push(Recorded::Price(request.id(), field, price));
        }

        fn on_size_tick(&self, request: &Request, field: i32, size: i64) {
            self.events.lock().push(Recorded::Size(request.id(), field, size));
        }

        fn on_generic_tick(&self, request: &Request, field: i32, value: f64) {
            self.events.lock().push(Recorded::Generic(request.id(), field, value));
        }

        fn on_string_tick(&self, request: &Request, field: i32, value: &str) {
            self.events
                .lock()
                .push(Recorded::Text(request.id(), field, value.to_string()));
        }
    }

    struct NoopHandler;

    impl MarketEventHandler for NoopHandler {
        fn on_historical_bar(&self, _request: &Request, _bar: HistoricalBar) {}
        fn on_price_tick(&self, _request: &Request, _field: i32, _price: Decimal) {}
        fn on_size_tick(&self, _request: &Request, _field: i32, _size: i64) {}
        fn on_generic_tick(&self, _request: &Request, _field: i32, _value: f64) {}
        fn on_string_tick(&self, _request: &Request, _field: i32, _value: &str) {}
    }

    fn send_bar(registry: &RequestRegistry, id: i32, minute: u32) {
        registry.dispatch_historical_bar(
            id,
            &format!("20100104  09:{minute:02}:00"),
            100.0,
            101.0,
            99.0,
            100.5,
            1_000,
            25,
            100.25,
            false,
        );
    }

    #[test]
    fn identifiers_are_sequential_and_unique() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(NoopHandler);

        let first = registry.create_request(RequestKind::HistoricalData, handler.clone());
        let second = registry.create_request(RequestKind::MarketData, handler);

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(registry.pending_count(), 2);
        assert!(registry.is_registered(1));
        assert!(registry.is_registered(2));
    }

    #[test]
    fn identifiers_stay_unique_across_threads() {
        let registry = Arc::new(RequestRegistry::new());
        let mut joins = Vec::new();

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            joins.push(thread::spawn(move || {
                let handler = Arc::new(NoopHandler);
                (0..50)
                    .map(|_| {
                        registry
                            .create_request(RequestKind::HistoricalData, handler.clone())
                            .id()
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for join in joins {
            for id in join.join().unwrap() {
                assert!(seen.insert(id), "identifier {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(registry.pending_count(), 400);
    }

    #[test]
    fn unknown_identifier_dispatch_is_a_no_op() {
        let registry = RequestRegistry::new();

        send_bar(&registry, 42, 30);
        registry.dispatch_price_tick(42, 1, 100.0);
        registry.dispatch_size_tick(42, 0, 10);
        registry.dispatch_generic_tick(42, 49, 0.0);
        registry.dispatch_string_tick(42, 45, "1262594100");
        registry.dispatch_error(42, 354, "not subscribed");

        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn bars_are_forwarded_in_order() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let request = registry.create_request(RequestKind::HistoricalData, handler.clone());

        for minute in [30, 31, 32] {
            send_bar(&registry, request.id(), minute);
        }

        let minutes: Vec<u32> = handler
            .events()
            .iter()
            .map(|event| match event {
                Recorded::Bar(id, bar) => {
                    assert_eq!(*id, request.id());
                    chrono::Timelike::minute(&bar.timestamp)
                }
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(minutes, vec![30, 31, 32]);
        assert!(registry.is_registered(request.id()));
    }

    #[test]
    fn each_tick_shape_reaches_its_method() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let request = registry.create_request(RequestKind::MarketData, handler.clone());
        let id = request.id();

        registry.dispatch_price_tick(id, 1, 24_001.5);
        registry.dispatch_size_tick(id, 0, 500);
        registry.dispatch_generic_tick(id, 49, 1.0);
        registry.dispatch_string_tick(id, 45, "1262594100");

        assert_eq!(
            handler.events(),
            vec![
                Recorded::Price(id, 1, Decimal::try_from(24_001.5).unwrap()),
                Recorded::Size(id, 0, 500),
                Recorded::Generic(id, 49, 1.0),
                Recorded::Text(id, 45, "1262594100".to_string()),
            ]
        );
    }

    #[test]
    fn finished_sentinel_completes_and_removes() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let request = registry.create_request(RequestKind::HistoricalData, handler.clone());

        send_bar(&registry, request.id(), 30);
        registry.dispatch_historical_bar(
            request.id(),
            "finished-20100104  00:00:00",
            0.0,
            0.0,
            0.0,
            0.0,
            0,
            0,
            0.0,
            false,
        );

        assert!(!registry.is_registered(request.id()));
        assert_eq!(request.status(), RequestStatus::Completed);
        assert_eq!(handler.events().len(), 1);

        // Late events after removal are dropped, not forwarded.
        send_bar(&registry, request.id(), 31);
        assert_eq!(handler.events().len(), 1);
    }

    #[test]
    fn malformed_bar_is_dropped_and_request_stays() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let request = registry.create_request(RequestKind::HistoricalData, handler.clone());

        registry.dispatch_historical_bar(
            request.id(),
            "garbage",
            100.0,
            101.0,
            99.0,
            100.5,
            0,
            0,
            100.0,
            false,
        );

        assert!(handler.events().is_empty());
        assert!(registry.is_registered(request.id()));
    }

    #[test]
    fn non_finite_price_tick_is_dropped() {
        let registry = RequestRegistry::new();
        let handler = Arc::new(RecordingHandler::default());
        let request = registry.create_request(RequestKind::MarketData, handler.clone());

        registry.dispatch_price_tick(request.id(), 1, f64::NAN);

        assert!(handler.events().is_empty());
        assert!(registry.is_registered(request.id()));
    }

    #[test]
    fn handler_may_reenter_the_registry() {
        struct ReenteringHandler {
            registry: Arc<RequestRegistry>,
        }

        impl MarketEventHandler for ReenteringHandler {
            fn on_historical_bar(&self, request: &Request, _bar: HistoricalBar) {
                // Deadlocks if dispatch held the table lock here.
                assert!(self.registry.is_registered(request.id()));
            }
            fn on_price_tick(&self, _request: &Request, _field: i32, _price: Decimal) {}
            fn on_size_tick(&self, _request: &Request, _field: i32, _size: i64) {}
            fn on_generic_tick(&self, _request: &Request, _field: i32, _value: f64) {}
            fn on_string_tick(&self, _request: &Request, _field: i32, _value: &str) {}
        }

        let registry = Arc::new(RequestRegistry::new());
        let handler = Arc::new(ReenteringHandler {
            registry: Arc::clone(&registry),
        });
        let request = registry.create_request(RequestKind::HistoricalData, handler);

        send_bar(&registry, request.id(), 30);
    }

    #[test_case(100, "order rejected"; "band lower edge")]
    #[test_case(165, "historical data service message"; "service message code")]
    #[test_case(354, "not subscribed"; "mid band")]
    #[test_case(599, "socket closed"; "band upper edge")]
    fn request_error_band_attaches_and_removes(code: i32, message: &str) {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        registry.dispatch_error(request.id(), code, message);

        assert!(!registry.is_registered(request.id()));
        assert_eq!(request.status(), RequestStatus::Errored);
        assert_eq!(
            request.error(),
            Some(RequestError {
                code,
                message: message.to_string(),
            })
        );
    }

    #[test_case(99; "below band")]
    #[test_case(600; "above band")]
    #[test_case(1100; "system band")]
    #[test_case(2105; "notice band")]
    #[test_case(-1; "connection level")]
    fn other_bands_never_mutate_requests(code: i32) {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        registry.dispatch_error(request.id(), code, "anything");

        assert!(registry.is_registered(request.id()));
        assert_eq!(request.status(), RequestStatus::Pending);
        assert_eq!(request.error(), None);
    }

    #[test_case(99, Severity::Unclassified)]
    #[test_case(100, Severity::RequestError)]
    #[test_case(165, Severity::RequestError)]
    #[test_case(501, Severity::RequestError)]
    #[test_case(599, Severity::RequestError)]
    #[test_case(600, Severity::Unclassified)]
    #[test_case(1099, Severity::Unclassified)]
    #[test_case(1100, Severity::SystemMessage)]
    #[test_case(2099, Severity::SystemMessage)]
    #[test_case(2100, Severity::Notice)]
    #[test_case(2110, Severity::Notice)]
    #[test_case(2111, Severity::Unclassified)]
    fn severity_band_edges(code: i32, expected: Severity) {
        assert_eq!(Severity::classify(code), expected);
    }

    #[test]
    fn wait_times_out_while_pending() {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        let result = request.wait_for_completion(Duration::from_millis(20));

        assert!(matches!(result, Err(WaitError::Timeout { .. })));
        assert_eq!(request.status(), RequestStatus::Pending);
        assert!(registry.is_registered(request.id()));
    }

    #[test]
    fn wait_returns_ok_when_already_completed() {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        registry.dispatch_historical_bar(
            request.id(),
            "finished",
            0.0,
            0.0,
            0.0,
            0.0,
            0,
            0,
            0.0,
            false,
        );

        assert_eq!(request.wait_for_completion(Duration::from_millis(10)), Ok(()));
    }

    #[test]
    fn wait_wakes_on_completion_from_another_thread() {
        let registry = Arc::new(RequestRegistry::new());
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        let dispatcher = {
            let registry = Arc::clone(&registry);
            let id = request.id();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                registry.dispatch_historical_bar(
                    id, "finished", 0.0, 0.0, 0.0, 0.0, 0, 0, 0.0, false,
                );
            })
        };

        assert_eq!(request.wait_for_completion(Duration::from_secs(5)), Ok(()));
        dispatcher.join().unwrap();
    }

    #[test]
    fn wait_wakes_on_request_error() {
        let registry = Arc::new(RequestRegistry::new());
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        let dispatcher = {
            let registry = Arc::clone(&registry);
            let id = request.id();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                registry.dispatch_error(id, 162, "historical data request pacing violation");
            })
        };

        let result = request.wait_for_completion(Duration::from_secs(5));
        assert_eq!(
            result,
            Err(WaitError::Failed(RequestError {
                code: 162,
                message: "historical data request pacing violation".to_string(),
            }))
        );
        dispatcher.join().unwrap();
    }

    #[test]
    fn wait_reports_cancellation() {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::MarketData, Arc::new(NoopHandler));

        assert!(registry.remove_if_registered(&request));
        request.mark_cancelled();

        assert_eq!(
            request.wait_for_completion(Duration::from_millis(10)),
            Err(WaitError::Cancelled)
        );
    }

    #[test]
    fn remove_if_registered_rejects_stale_handles() {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        assert!(registry.remove_if_registered(&request));
        assert!(!registry.remove_if_registered(&request));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn terminal_state_is_not_reentered() {
        let registry = RequestRegistry::new();
        let request = registry.create_request(RequestKind::HistoricalData, Arc::new(NoopHandler));

        registry.dispatch_historical_bar(
            request.id(),
            "finished",
            0.0,
            0.0,
            0.0,
            0.0,
            0,
            0,
            0.0,
            false,
        );
        request.fail(RequestError {
            code: 162,
            message: "late error".to_string(),
        });
        request.mark_cancelled();

        assert_eq!(request.status(), RequestStatus::Completed);
        assert_eq!(request.error(), None);
    }
}
