//! Bar Types
//!
//! Intraday historical bars as delivered through the gateway callback
//! surface, and daily bars produced by the web data path. Gateway wire
//! fields arrive loosely typed (a date string and `f64` prices); parsing
//! into the typed form happens here so downstream code never revisits the
//! wire encoding.
//!
//! # Wire Format
//!
//! Gateway bar timestamps use the vendor text layout (note the double
//! space), with a date-only form for day-or-longer bar sizes:
//!
//! ```text
//! 20100104  09:30:00
//! 20100104
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use thiserror::Error;

/// Vendor text timestamp layout for intraday bars.
pub(crate) const WIRE_DATETIME_FORMAT: &str = "%Y%m%d  %H:%M:%S";

/// Vendor date-only layout for day-or-longer bars.
pub(crate) const WIRE_DATE_FORMAT: &str = "%Y%m%d";

/// A malformed field in a gateway bar event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarFieldError {
    /// The date field matched neither vendor layout.
    #[error("unparseable bar timestamp {0:?}")]
    Timestamp(String),
    /// A price field was not representable as a decimal.
    #[error("bar {field} value {value} is not representable as a decimal")]
    Price {
        /// Which price field failed.
        field: &'static str,
        /// The offending wire value.
        value: f64,
    },
}

/// One intraday historical bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalBar {
    /// Bar start time.
    pub timestamp: NaiveDateTime,
    /// Opening price.
    pub open: Decimal,
    /// Highest traded price.
    pub high: Decimal,
    /// Lowest traded price.
    pub low: Decimal,
    /// Last traded price of the period.
    pub close: Decimal,
    /// Traded volume.
    pub volume: i64,
    /// Number of trades aggregated into the bar.
    pub bar_count: i32,
    /// Volume-weighted average price.
    pub wap: Decimal,
    /// Whether the bar period contains trading gaps.
    pub has_gaps: bool,
}

impl HistoricalBar {
    /// Build a bar from gateway wire fields.
    ///
    /// # Errors
    ///
    /// Returns [`BarFieldError`] when the date string matches neither vendor
    /// layout or a price is not finite.
    #[allow(clippy::too_many_arguments)]
    pub fn from_wire(
        date: &str,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
        bar_count: i32,
        wap: f64,
        has_gaps: bool,
    ) -> Result<Self, BarFieldError> {
        Ok(Self {
            timestamp: parse_wire_timestamp(date)?,
            open: decimal_field("open", open)?,
            high: decimal_field("high", high)?,
            low: decimal_field("low", low)?,
            close: decimal_field("close", close)?,
            volume,
            bar_count,
            wap: decimal_field("wap", wap)?,
            has_gaps,
        })
    }
}

/// One daily bar from the web data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyBar {
    /// Trading day.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// Highest traded price.
    pub high: Decimal,
    /// Lowest traded price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Split/dividend adjusted close.
    pub adj_close: Decimal,
    /// Traded volume.
    pub volume: i64,
}

/// Parse a vendor bar timestamp, trying the intraday layout first.
fn parse_wire_timestamp(date: &str) -> Result<NaiveDateTime, BarFieldError> {
    let trimmed = date.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, WIRE_DATETIME_FORMAT) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(trimmed, WIRE_DATE_FORMAT)
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| BarFieldError::Timestamp(date.to_string()))
}

fn decimal_field(field: &'static str, value: f64) -> Result<Decimal, BarFieldError> {
    Decimal::try_from(value).map_err(|_| BarFieldError::Price { field, value })
}
