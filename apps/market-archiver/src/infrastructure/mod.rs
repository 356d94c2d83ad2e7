//! Infrastructure Layer
//!
//! Adapters binding the domain to the outside world: the brokerage gateway
//! client and its transports, the web data client, CSV stores, environment
//! configuration, and telemetry.

pub mod config;
pub mod gateway;
pub mod store;
pub mod telemetry;
pub mod webdata;
