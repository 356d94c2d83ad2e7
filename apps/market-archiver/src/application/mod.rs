//! Application Services
//!
//! The archive jobs composing domain and infrastructure: the gateway job
//! pulls intraday bars through the request registry and writes per-day
//! files, the web job pulls daily series from the chart endpoint and
//! rewrites per-symbol files.

pub mod gateway_archive;
pub mod web_archive;
