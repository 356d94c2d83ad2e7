#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Archiver - Historical & Daily Market Data Collector
//!
//! Pulls intraday historical bars from a brokerage gateway and daily OHLCV
//! series from a public web data service, persisting them as per-symbol,
//! per-day CSV files. The gateway side multiplexes asynchronous callback
//! events onto pending logical requests through a lock-guarded request
//! registry.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core request multiplexing and data types
//!   - `request`: Request registry & event dispatcher
//!   - `handler`: Per-event-shape handler trait
//!   - `contract` / `bar`: Instruments and bar types
//!   - `calendar`: Trading-day date ranges
//!
//! - **Application**: Archive jobs
//!   - `gateway_archive`: Per-contract, per-day intraday bar download
//!   - `web_archive`: Full daily series download per symbol
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`: Gateway client, transport port, replay transport
//!   - `webdata`: Chart endpoint client and wire messages
//!   - `store`: CSV file stores
//!   - `config`: Environment configuration
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! Gateway callbacks ──► ┌──────────────┐      ┌──────────────┐
//!   (vendor thread)     │   Request    │─────►│   Handler    │──► BarStore
//!                       │   Registry   │      │ (collector)  │     (CSV)
//! Caller requests  ──►  └──────────────┘      └──────────────┘
//!
//! Web chart JSON  ──► WebDataClient ──► DailyBar rows ──► DailySeriesStore
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Request multiplexing core and data types.
pub mod domain;

/// Application layer - Archive jobs.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::bar::{BarFieldError, DailyBar, HistoricalBar};
pub use domain::calendar::{date_range, is_weekend, trading_days};
pub use domain::contract::{Contract, ContractParseError, SecurityType};
pub use domain::handler::MarketEventHandler;
pub use domain::request::{
    Request, RequestError, RequestKind, RequestRegistry, RequestStatus, Severity, WaitError,
};

// Archive services
pub use application::gateway_archive::{
    ArchiveOutcome, ArchiveSummary, BarCollector, GatewayArchiveService, GatewayArchiveSettings,
};
pub use application::web_archive::{WebArchiveService, WebArchiveSummary};

// Gateway client and transport boundary
pub use infrastructure::gateway::params::{
    BarSize, FormatDate, HistoricalDataParams, UseRth, WhatToShow,
};
pub use infrastructure::gateway::replay::{
    ReplayBar, ReplayResponse, ReplayScript, ReplayTick, ReplayTransport,
};
pub use infrastructure::gateway::transport::{GatewayTransport, TransportError};
pub use infrastructure::gateway::{ConnectionGuard, GatewayClient, GatewayError};

// Web data client
pub use infrastructure::webdata::{DailySeriesSource, WebDataClient, WebDataError};

// CSV stores
pub use infrastructure::store::{BarStore, DailySeriesStore, StoreError};

// Configuration
pub use infrastructure::config::{
    ArchiveConfig, ArchiveJob, ConfigError, GatewaySettings, StoreSettings, WebDataSettings,
};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
