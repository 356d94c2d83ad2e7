//! Historical request parameter vocabulary.
//!
//! Vendor-defined enumerations controlling a historical data request. The
//! string and integer forms are part of the wire contract and are sent
//! verbatim by transport implementations.

use std::fmt;

/// Wire layout of the end-of-range timestamp in a historical request.
pub const END_DATE_TIME_FORMAT: &str = "%Y%m%d %H:%M:%S";

/// Width of one historical bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BarSize {
    Sec1,
    Sec5,
    Sec10,
    Sec15,
    Sec30,
    Min1,
    Min2,
    Min3,
    Min5,
    Min10,
    Min15,
    Min20,
    Min30,
    Hour1,
    Hour2,
    Hour3,
    Hour4,
    Hour8,
    Day1,
    Week1,
    Month1,
}

impl BarSize {
    /// Vendor wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sec1 => "1 sec",
            Self::Sec5 => "5 secs",
            Self::Sec10 => "10 secs",
            Self::Sec15 => "15 secs",
            Self::Sec30 => "30 secs",
            Self::Min1 => "1 min",
            Self::Min2 => "2 mins",
            Self::Min3 => "3 mins",
            Self::Min5 => "5 mins",
            Self::Min10 => "10 mins",
            Self::Min15 => "15 mins",
            Self::Min20 => "20 mins",
            Self::Min30 => "30 mins",
            Self::Hour1 => "1 hour",
            Self::Hour2 => "2 hours",
            Self::Hour3 => "3 hours",
            Self::Hour4 => "4 hours",
            Self::Hour8 => "8 hours",
            Self::Day1 => "1 day",
            Self::Week1 => "1 week",
            Self::Month1 => "1 month",
        }
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which data series the bars are built from.
///
/// Note that for `Trades` a day bar's close is the last trade of the span,
/// not the official closing price of the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum WhatToShow {
    Trades,
    Midpoint,
    Bid,
    Ask,
    BidAsk,
    HistoricalVolatility,
    OptionImpliedVolatility,
}

impl WhatToShow {
    /// Vendor wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "TRADES",
            Self::Midpoint => "MIDPOINT",
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::BidAsk => "BID_ASK",
            Self::HistoricalVolatility => "HISTORICAL_VOLATILITY",
            Self::OptionImpliedVolatility => "OPTION_IMPLIED_VOLATILITY",
        }
    }
}

impl fmt::Display for WhatToShow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether bars outside regular trading hours are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseRth {
    /// Return all data, even where the market was outside its regular
    /// trading hours.
    All,
    /// Return only data within regular trading hours, even if the requested
    /// span falls partially or completely outside.
    RegularOnly,
}

impl UseRth {
    /// Vendor wire flag.
    #[must_use]
    pub const fn as_flag(self) -> i32 {
        match self {
            Self::All => 0,
            Self::RegularOnly => 1,
        }
    }
}

/// Date format applied to returned bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatDate {
    /// Timestamps as formatted date strings.
    Text,
    /// Timestamps as seconds since 1/1/1970 GMT.
    Epoch,
}

impl FormatDate {
    /// Vendor wire flag.
    #[must_use]
    pub const fn as_flag(self) -> i32 {
        match self {
            Self::Text => 1,
            Self::Epoch => 2,
        }
    }
}

/// Parameters of one historical data request, excluding the end timestamp
/// (which the caller supplies per request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalDataParams {
    /// Span to fetch, as a vendor duration string such as `"1 D"`.
    pub duration: String,
    /// Width of each bar.
    pub bar_size: BarSize,
    /// Data series the bars are built from.
    pub what_to_show: WhatToShow,
    /// Regular-trading-hours filter.
    pub use_rth: UseRth,
    /// Timestamp format of returned bars.
    pub format_date: FormatDate,
}

impl HistoricalDataParams {
    /// One day of one-minute trade bars, regular hours only, text dates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            duration: "1 D".to_string(),
            bar_size: BarSize::Min1,
            what_to_show: WhatToShow::Trades,
            use_rth: UseRth::RegularOnly,
            format_date: FormatDate::Text,
        }
    }

    /// Set the duration string.
    #[must_use]
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    /// Set the bar width.
    #[must_use]
    pub const fn with_bar_size(mut self, bar_size: BarSize) -> Self {
        self.bar_size = bar_size;
        self
    }

    /// Set the data series.
    #[must_use]
    pub const fn with_what_to_show(mut self, what_to_show: WhatToShow) -> Self {
        self.what_to_show = what_to_show;
        self
    }

    /// Set the regular-trading-hours filter.
    #[must_use]
    pub const fn with_use_rth(mut self, use_rth: UseRth) -> Self {
        self.use_rth = use_rth;
        self
    }

    /// Set the timestamp format.
    #[must_use]
    pub const fn with_format_date(mut self, format_date: FormatDate) -> Self {
        self.format_date = format_date;
        self
    }
}

impl Default for HistoricalDataParams {
    fn default() -> Self {
        Self::new()
    }
}
