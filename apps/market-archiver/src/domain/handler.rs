//! Market Event Handler
//!
//! The capability set a request's result handler must provide: one method
//! per event shape the gateway can deliver. Every method is required so a
//! handler that ignores an event shape says so explicitly with an empty
//! body instead of relying on silent defaults.

use rust_decimal::Decimal;

use crate::domain::bar::HistoricalBar;
use crate::domain::request::Request;

/// Receives the events dispatched to one or more requests.
///
/// Methods run on the transport's callback thread with no registry lock
/// held; implementations must be thread-safe and should return quickly.
pub trait MarketEventHandler: Send + Sync {
    /// One historical bar of a historical-data request.
    fn on_historical_bar(&self, request: &Request, bar: HistoricalBar);

    /// A price field update (bid, ask, last, ...) of a market-data request.
    fn on_price_tick(&self, request: &Request, field: i32, price: Decimal);

    /// A size field update of a market-data request.
    fn on_size_tick(&self, request: &Request, field: i32, size: i64);

    /// A generic numeric field update of a market-data request.
    fn on_generic_tick(&self, request: &Request, field: i32, value: f64);

    /// A string-valued field update of a market-data request.
    fn on_string_tick(&self, request: &Request, field: i32, value: &str);
}
