//! Chart endpoint wire messages.
//!
//! Typed view of the chart-style JSON body. Quote arrays are positionally
//! aligned with `timestamp`; a market holiday shows up as `null` entries,
//! which deserialize to `None` and are skipped during conversion.
//!
//! ```json
//! {
//!   "chart": {
//!     "result": [{
//!       "meta": { "symbol": "^HSI", "currency": "HKD" },
//!       "timestamp": [1262563200, 1262649600],
//!       "indicators": {
//!         "quote": [{ "open": [21860.1, null], "high": [...], "low": [...],
//!                     "close": [...], "volume": [...] }],
//!         "adjclose": [{ "adjclose": [22165.3, null] }]
//!       }
//!     }],
//!     "error": null
//!   }
//! }
//! ```

use serde::Deserialize;

/// Top-level chart body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartResponse {
    /// The single `chart` envelope.
    pub chart: Chart,
}

/// Envelope holding either results or a service error.
#[derive(Debug, Clone, Deserialize)]
pub struct Chart {
    /// Result list; the endpoint returns exactly one entry per symbol.
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    /// Service-level error, populated instead of `result`.
    #[serde(default)]
    pub error: Option<ChartError>,
}

/// Service-level error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartError {
    /// Short error code, e.g. `Not Found`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

/// One symbol's chart data.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartResult {
    /// Row timestamps as epoch seconds.
    #[serde(default)]
    pub timestamp: Option<Vec<i64>>,
    /// Quote and adjusted-close arrays.
    pub indicators: Indicators,
}

/// Indicator arrays aligned with `timestamp`.
#[derive(Debug, Clone, Deserialize)]
pub struct Indicators {
    /// OHLCV arrays; the endpoint returns exactly one entry.
    pub quote: Vec<Quote>,
    /// Adjusted close arrays, absent for some instruments.
    #[serde(default)]
    pub adjclose: Option<Vec<AdjClose>>,
}

/// Positional OHLCV arrays with `null` holes on holidays.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<i64>>,
}

/// Positional adjusted-close array.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjClose {
    /// Adjusted close per row, `null` on holidays.
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}
