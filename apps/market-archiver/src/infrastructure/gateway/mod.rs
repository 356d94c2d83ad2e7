//! Gateway Client
//!
//! Public request surface over the brokerage gateway. The client owns an
//! injected [`RequestRegistry`] and an opaque [`GatewayTransport`]; it
//! registers a request, issues the matching transport command, and hands the
//! caller the request handle to wait on. Inbound events flow back through
//! the registry's dispatch entry points, driven by the transport's callback
//! thread.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use market_archiver::{
//!     BarCollector, Contract, GatewayClient, HistoricalDataParams, RequestRegistry,
//!     ReplayScript, ReplayTransport, SecurityType,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(RequestRegistry::new());
//! let contract = Contract::new("HSI", SecurityType::Index, "HKFE", "HKD");
//! let days = vec![chrono::NaiveDate::from_ymd_opt(2010, 1, 4).unwrap()];
//! let script = ReplayScript::synthetic(std::slice::from_ref(&contract), &days, 8);
//! let transport = Arc::new(ReplayTransport::new(script, Arc::clone(&registry)));
//!
//! let client = GatewayClient::new(15, registry, transport);
//! let _session = client.connect("127.0.0.1", 7496)?;
//!
//! let collector = Arc::new(BarCollector::new());
//! let end = days[0].succ_opt().unwrap().and_time(chrono::NaiveTime::MIN);
//! let request = client.request_historical_data(
//!     collector.clone(),
//!     &contract,
//!     end,
//!     &HistoricalDataParams::new(),
//! )?;
//! request.wait_for_completion(Duration::from_secs(5))?;
//! let bars = collector.take();
//! # Ok(())
//! # }
//! ```

pub mod params;
pub mod replay;
pub mod transport;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::contract::Contract;
use crate::domain::handler::MarketEventHandler;
use crate::domain::request::{Request, RequestKind, RequestRegistry};
use crate::infrastructure::gateway::params::{END_DATE_TIME_FORMAT, HistoricalDataParams};
use crate::infrastructure::gateway::transport::{GatewayTransport, TransportError};

/// Gateway client failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The session could not be established.
    #[error("unable to connect to the gateway at {host}:{port} as client {client_id}: {source}")]
    ConnectFailed {
        /// Gateway host.
        host: String,
        /// Gateway port.
        port: u16,
        /// Session client id.
        client_id: i32,
        /// Underlying transport failure.
        source: TransportError,
    },
    /// A transport command failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client for issuing and cancelling gateway data requests.
pub struct GatewayClient {
    client_id: i32,
    registry: Arc<RequestRegistry>,
    transport: Arc<dyn GatewayTransport>,
}

impl GatewayClient {
    /// Build a client over an injected registry and transport.
    #[must_use]
    pub fn new(
        client_id: i32,
        registry: Arc<RequestRegistry>,
        transport: Arc<dyn GatewayTransport>,
    ) -> Self {
        Self {
            client_id,
            registry,
            transport,
        }
    }

    /// Registry this client registers its requests in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    /// Establish the gateway session.
    ///
    /// The returned guard disconnects the session when dropped.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectFailed`] naming host, port and client id.
    pub fn connect(&self, host: &str, port: u16) -> Result<ConnectionGuard, GatewayError> {
        self.transport
            .connect(host, port, self.client_id)
            .map_err(|source| GatewayError::ConnectFailed {
                host: host.to_string(),
                port,
                client_id: self.client_id,
                source,
            })?;
        tracing::info!(host, port, client_id = self.client_id, "gateway session established");
        Ok(ConnectionGuard {
            transport: Arc::clone(&self.transport),
        })
    }

    /// Request historical bars for `contract`, ending at `end`.
    ///
    /// The stream is delivered to `handler` on the transport's callback
    /// thread and finishes with a completion sentinel; wait on the returned
    /// handle to observe it. If the transport refuses the start command, the
    /// just-registered entry is removed again before the error is returned.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] when the start command fails.
    pub fn request_historical_data(
        &self,
        handler: Arc<dyn MarketEventHandler>,
        contract: &Contract,
        end: NaiveDateTime,
        params: &HistoricalDataParams,
    ) -> Result<Arc<Request>, GatewayError> {
        let request = self
            .registry
            .create_request(RequestKind::HistoricalData, handler);
        let end_date_time = end.format(END_DATE_TIME_FORMAT).to_string();
        if let Err(error) =
            self.transport
                .start_historical_data(request.id(), contract, &end_date_time, params)
        {
            self.registry.remove_if_registered(&request);
            return Err(error.into());
        }
        tracing::debug!(
            request_id = request.id(),
            symbol = %contract.symbol,
            end = %end_date_time,
            bar_size = %params.bar_size,
            "historical data requested"
        );
        Ok(request)
    }

    /// Request streaming market data for `contract`.
    ///
    /// Ticks are delivered to `handler` until the request is cancelled.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] when the start command fails.
    pub fn request_market_data(
        &self,
        handler: Arc<dyn MarketEventHandler>,
        contract: &Contract,
        generic_ticks: &str,
        snapshot: bool,
    ) -> Result<Arc<Request>, GatewayError> {
        let request = self.registry.create_request(RequestKind::MarketData, handler);
        if let Err(error) =
            self.transport
                .start_market_data(request.id(), contract, generic_ticks, snapshot)
        {
            self.registry.remove_if_registered(&request);
            return Err(error.into());
        }
        tracing::debug!(
            request_id = request.id(),
            symbol = %contract.symbol,
            generic_ticks,
            snapshot,
            "market data requested"
        );
        Ok(request)
    }

    /// Cancel an outstanding request.
    ///
    /// Returns `false` without touching the transport when the handle is
    /// stale, that is when the request already left the registry through
    /// completion, an error, or an earlier cancellation. Otherwise removes
    /// the entry, issues the cancel command matching the request kind as a
    /// best effort, marks the handle cancelled, and returns `true`.
    pub fn cancel(&self, request: &Arc<Request>) -> bool {
        if !self.registry.remove_if_registered(request) {
            tracing::debug!(
                request_id = request.id(),
                "cancel for request no longer registered - skipped"
            );
            return false;
        }
        let command = match request.kind() {
            RequestKind::HistoricalData => self.transport.cancel_historical_data(request.id()),
            RequestKind::MarketData => self.transport.cancel_market_data(request.id()),
        };
        if let Err(error) = command {
            tracing::warn!(request_id = request.id(), %error, "transport cancel failed");
        }
        request.mark_cancelled();
        tracing::debug!(request_id = request.id(), kind = %request.kind(), "request cancelled");
        true
    }
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("client_id", &self.client_id)
            .field("pending", &self.registry.pending_count())
            .finish_non_exhaustive()
    }
}

/// Open gateway session; disconnects on drop.
#[must_use = "dropping the guard closes the gateway session"]
pub struct ConnectionGuard {
    transport: Arc<dyn GatewayTransport>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        tracing::info!("closing gateway session");
        self.transport.disconnect();
    }
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::bar::HistoricalBar;
    use crate::domain::contract::SecurityType;
    use crate::domain::request::RequestStatus;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Command {
        Connect {
            host: String,
            port: u16,
            client_id: i32,
        },
        Disconnect,
        StartHistorical {
            request_id: i32,
            symbol: String,
            end_date_time: String,
            bar_size: params::BarSize,
        },
        CancelHistorical {
            request_id: i32,
        },
        StartMarket {
            request_id: i32,
            symbol: String,
            generic_ticks: String,
            snapshot: bool,
        },
        CancelMarket {
            request_id: i32,
        },
    }

    #[derive(Default)]
    struct RecordingTransport {
        commands: Mutex<Vec<Command>>,
        refuse_connect: bool,
        refuse_start: bool,
        refuse_cancel: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self::default()
        }

        fn refusing_connect() -> Self {
            Self {
                refuse_connect: true,
                ..Self::default()
            }
        }

        fn refusing_start() -> Self {
            Self {
                refuse_start: true,
                ..Self::default()
            }
        }

        fn refusing_cancel() -> Self {
            Self {
                refuse_cancel: true,
                ..Self::default()
            }
        }

        fn commands(&self) -> Vec<Command> {
            self.commands.lock().clone()
        }
    }

    impl GatewayTransport for RecordingTransport {
        fn connect(&self, host: &str, port: u16, client_id: i32) -> Result<(), TransportError> {
            if self.refuse_connect {
                return Err(TransportError::Rejected {
                    reason: "connection refused".to_string(),
                });
            }
            self.commands.lock().push(Command::Connect {
                host: host.to_string(),
                port,
                client_id,
            });
            Ok(())
        }

        fn disconnect(&self) {
            self.commands.lock().push(Command::Disconnect);
        }

        fn start_historical_data(
            &self,
            request_id: i32,
            contract: &Contract,
            end_date_time: &str,
            params: &HistoricalDataParams,
        ) -> Result<(), TransportError> {
            if self.refuse_start {
                return Err(TransportError::NotConnected);
            }
            self.commands.lock().push(Command::StartHistorical {
                request_id,
                symbol: contract.symbol.clone(),
                end_date_time: end_date_time.to_string(),
                bar_size: params.bar_size,
            });
            Ok(())
        }

        fn cancel_historical_data(&self, request_id: i32) -> Result<(), TransportError> {
            if self.refuse_cancel {
                return Err(TransportError::NotConnected);
            }
            self.commands
                .lock()
                .push(Command::CancelHistorical { request_id });
            Ok(())
        }

        fn start_market_data(
            &self,
            request_id: i32,
            contract: &Contract,
            generic_ticks: &str,
            snapshot: bool,
        ) -> Result<(), TransportError> {
            if self.refuse_start {
                return Err(TransportError::NotConnected);
            }
            self.commands.lock().push(Command::StartMarket {
                request_id,
                symbol: contract.symbol.clone(),
                generic_ticks: generic_ticks.to_string(),
                snapshot,
            });
            Ok(())
        }

        fn cancel_market_data(&self, request_id: i32) -> Result<(), TransportError> {
            if self.refuse_cancel {
                return Err(TransportError::NotConnected);
            }
            self.commands
                .lock()
                .push(Command::CancelMarket { request_id });
            Ok(())
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

    fn client_over(transport: Arc<RecordingTransport>) -> GatewayClient {
        GatewayClient::new(15, Arc::new(RequestRegistry::new()), transport)
    }

    fn hsi() -> Contract {
        Contract::new("HSI", SecurityType::Index, "HKFE", "HKD")
    }

    fn end_of(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    #[test]
    fn connect_issues_command_and_guard_disconnects_once_on_drop() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let guard = client.connect("127.0.0.1", 7496).unwrap();
        drop(guard);

        assert_eq!(
            transport.commands(),
            vec![
                Command::Connect {
                    host: "127.0.0.1".to_string(),
                    port: 7496,
                    client_id: 15,
                },
                Command::Disconnect,
            ]
        );
    }

    #[test]
    fn connect_failure_names_host_port_and_client_id() {
        let transport = Arc::new(RecordingTransport::refusing_connect());
        let client = client_over(transport);

        let error = client.connect("10.0.0.9", 4001).unwrap_err();

        let GatewayError::ConnectFailed {
            host,
            port,
            client_id,
            ..
        } = error
        else {
            panic!("expected ConnectFailed, got {error:?}");
        };
        assert_eq!(host, "10.0.0.9");
        assert_eq!(port, 4001);
        assert_eq!(client_id, 15);
    }

    #[test]
    fn historical_request_formats_end_and_registers() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let params = HistoricalDataParams::new().with_bar_size(params::BarSize::Sec30);
        let request = client
            .request_historical_data(Arc::new(NoopHandler), &hsi(), end_of(2010, 1, 5), &params)
            .unwrap();

        assert!(client.registry().is_registered(request.id()));
        assert_eq!(
            transport.commands(),
            vec![Command::StartHistorical {
                request_id: request.id(),
                symbol: "HSI".to_string(),
                end_date_time: "20100105 00:00:00".to_string(),
                bar_size: params::BarSize::Sec30,
            }]
        );
    }

    #[test]
    fn rejected_start_removes_the_fresh_entry() {
        let transport = Arc::new(RecordingTransport::refusing_start());
        let client = client_over(transport);

        let result = client.request_historical_data(
            Arc::new(NoopHandler),
            &hsi(),
            end_of(2010, 1, 5),
            &HistoricalDataParams::new(),
        );

        assert!(matches!(
            result,
            Err(GatewayError::Transport(TransportError::NotConnected))
        ));
        assert_eq!(client.registry().pending_count(), 0);
    }

    #[test]
    fn market_data_request_carries_tick_list_and_snapshot_flag() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let request = client
            .request_market_data(Arc::new(NoopHandler), &hsi(), "233,236", false)
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![Command::StartMarket {
                request_id: request.id(),
                symbol: "HSI".to_string(),
                generic_ticks: "233,236".to_string(),
                snapshot: false,
            }]
        );
    }

    #[test]
    fn cancel_selects_the_command_for_the_request_kind() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let historical = client
            .request_historical_data(
                Arc::new(NoopHandler),
                &hsi(),
                end_of(2010, 1, 5),
                &HistoricalDataParams::new(),
            )
            .unwrap();
        let market = client
            .request_market_data(Arc::new(NoopHandler), &hsi(), "", false)
            .unwrap();

        assert!(client.cancel(&historical));
        assert!(client.cancel(&market));

        assert_eq!(historical.status(), RequestStatus::Cancelled);
        assert_eq!(market.status(), RequestStatus::Cancelled);
        let commands = transport.commands();
        assert!(commands.contains(&Command::CancelHistorical {
            request_id: historical.id()
        }));
        assert!(commands.contains(&Command::CancelMarket {
            request_id: market.id()
        }));
    }

    #[test]
    fn cancelling_a_stale_handle_is_a_no_op() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let request = client
            .request_historical_data(
                Arc::new(NoopHandler),
                &hsi(),
                end_of(2010, 1, 5),
                &HistoricalDataParams::new(),
            )
            .unwrap();

        assert!(client.cancel(&request));
        let after_first = transport.commands().len();

        // Second cancel sees a stale handle: no removal, no transport call.
        assert!(!client.cancel(&request));
        assert_eq!(transport.commands().len(), after_first);
    }

    #[test]
    fn cancel_after_error_removal_skips_the_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let client = client_over(Arc::clone(&transport));

        let request = client
            .request_historical_data(
                Arc::new(NoopHandler),
                &hsi(),
                end_of(2010, 1, 5),
                &HistoricalDataParams::new(),
            )
            .unwrap();
        client.registry().dispatch_error(request.id(), 162, "pacing violation");

        let before = transport.commands().len();
        assert!(!client.cancel(&request));
        assert_eq!(transport.commands().len(), before);

        assert_eq!(request.status(), RequestStatus::Errored);
    }

    #[test]
    fn cancel_marks_the_handle_even_when_the_transport_refuses() {
        let transport = Arc::new(RecordingTransport::refusing_cancel());
        let client = client_over(Arc::clone(&transport));

        let request = client
            .request_market_data(Arc::new(NoopHandler), &hsi(), "", false)
            .unwrap();

        assert!(client.cancel(&request));

        assert_eq!(request.status(), RequestStatus::Cancelled);
        assert_eq!(client.registry().pending_count(), 0);
    }
}
