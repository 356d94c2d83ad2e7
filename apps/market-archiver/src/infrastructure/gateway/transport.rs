//! Gateway Transport Port (Driven Port)
//!
//! The vendor-owned wire session as an opaque command sink. The protocol
//! behind this trait is not modeled; implementations translate each command
//! into whatever the vendor session expects and deliver inbound events by
//! calling the request registry's dispatch entry points from their own
//! callback thread.

use thiserror::Error;

use crate::domain::contract::Contract;
use crate::infrastructure::gateway::params::HistoricalDataParams;

/// Transport command failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// A command was issued while no session is established.
    #[error("gateway session is not connected")]
    NotConnected,
    /// The session refused the command.
    #[error("gateway refused the command: {reason}")]
    Rejected {
        /// Vendor-supplied reason.
        reason: String,
    },
}

/// Port for the gateway wire session.
pub trait GatewayTransport: Send + Sync {
    /// Establish the session.
    ///
    /// # Errors
    ///
    /// [`TransportError::Rejected`] when the session cannot be established.
    fn connect(&self, host: &str, port: u16, client_id: i32) -> Result<(), TransportError>;

    /// Tear the session down. Safe to call on a session that never
    /// connected or already disconnected.
    fn disconnect(&self);

    /// Issue a historical data request under the given identifier.
    ///
    /// `end_date_time` carries the wire layout produced with
    /// [`super::params::END_DATE_TIME_FORMAT`].
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the command cannot be sent.
    fn start_historical_data(
        &self,
        request_id: i32,
        contract: &Contract,
        end_date_time: &str,
        params: &HistoricalDataParams,
    ) -> Result<(), TransportError>;

    /// Cancel an outstanding historical data request.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the command cannot be sent.
    fn cancel_historical_data(&self, request_id: i32) -> Result<(), TransportError>;

    /// Issue a streaming market data request under the given identifier.
    ///
    /// `generic_ticks` is the vendor's comma-separated tick type list;
    /// `snapshot` requests a single snapshot instead of a stream.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the command cannot be sent.
    fn start_market_data(
        &self,
        request_id: i32,
        contract: &Contract,
        generic_ticks: &str,
        snapshot: bool,
    ) -> Result<(), TransportError>;

    /// Cancel an outstanding market data request.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the command cannot be sent.
    fn cancel_market_data(&self, request_id: i32) -> Result<(), TransportError>;
}
