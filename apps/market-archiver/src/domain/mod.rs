//! Domain Layer - Request multiplexing core and market data types.
//!
//! This layer contains the request registry that correlates gateway callback
//! events with pending logical requests, plus the pure data types shared by
//! both archive paths. Nothing here performs I/O.

/// Instrument contracts and security types.
pub mod contract;

/// Intraday and daily bar types with wire-field parsing.
pub mod bar;

/// Trading-day date ranges and weekend filtering.
pub mod calendar;

/// Per-event-shape market event handler trait.
pub mod handler;

/// Request registry & event dispatcher.
pub mod request;
