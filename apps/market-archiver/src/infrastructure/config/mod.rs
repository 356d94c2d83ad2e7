//! Environment-Driven Configuration
//!
//! Every variable has a default, so the binary runs with no configuration
//! at all. A variable that is missing falls back to its default; a variable
//! that is set but malformed fails loudly with a [`ConfigError`] naming the
//! variable and the reason.
//!
//! # Environment Variables
//!
//! - `ARCHIVE_JOBS`: comma list of jobs to run, `web` and/or `replay` (default: web)
//! - `ARCHIVE_START_DATE`: first day of the archive window, `YYYY-MM-DD` (default: 2010-01-01)
//! - `ARCHIVE_END_DATE`: last day of the archive window, `YYYY-MM-DD` (default: today)
//! - `GATEWAY_HOST` / `GATEWAY_PORT` / `GATEWAY_CLIENT_ID`: gateway endpoint (default: 127.0.0.1:7496, client 15)
//! - `GATEWAY_CONTRACTS`: comma list of `SYMBOL:TYPE:EXCHANGE:CURRENCY` descriptors
//! - `GATEWAY_DATA_DIR`: intraday CSV root (default: market-data/intraday/hk)
//! - `GATEWAY_REQUEST_TIMEOUT_SECS` / `GATEWAY_RETRY_COUNT` / `GATEWAY_RETRY_WAIT_SECS` /
//!   `GATEWAY_PACING_WAIT_SECS`: per-request deadline and pacing (defaults: 5 / 5 / 2 / 5)
//! - `WEBDATA_BASE_URL`: chart endpoint base (default: <https://query1.finance.yahoo.com>)
//! - `WEBDATA_SYMBOLS`: comma list of symbols (default: ^HSI)
//! - `WEBDATA_DATA_DIR`: daily CSV root (default: market-data/daily/hk)
//! - `WEBDATA_REQUEST_TIMEOUT_SECS` / `WEBDATA_MAX_ATTEMPTS` /
//!   `WEBDATA_RETRY_WAIT_MIN_SECS` / `WEBDATA_RETRY_WAIT_MAX_SECS`: fetch
//!   deadline and retry spread (defaults: 10 / 3 / 1 / 10)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use thiserror::Error;

use crate::domain::contract::{Contract, ContractParseError, SecurityType};

/// Date format accepted by `ARCHIVE_START_DATE` and `ARCHIVE_END_DATE`.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set to an empty or whitespace-only value.
    #[error("environment variable {0} is set but empty")]
    EmptyValue(String),

    /// A variable is set to a value that does not parse.
    #[error("environment variable {var} is invalid: {reason}")]
    InvalidValue {
        /// Name of the offending variable.
        var: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// One archive job named in `ARCHIVE_JOBS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveJob {
    /// Daily series from the web data service.
    Web,
    /// Intraday bars from the gateway, served by the replay transport.
    Replay,
}

impl ArchiveJob {
    /// Job name as written in `ARCHIVE_JOBS`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for ArchiveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway connection, retry, and pacing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Gateway host.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Client id presented on connect.
    pub client_id: i32,
    /// Contracts to archive, in request order.
    pub contracts: Vec<Contract>,
    /// Deadline for one historical data request to complete.
    pub request_timeout: Duration,
    /// Attempts per contract and day before it is recorded as unfetched.
    pub retry_count: u32,
    /// Sleep after a failed attempt.
    pub retry_wait: Duration,
    /// Sleep after a completed request, keeping under the pacing limit.
    pub pacing_wait: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7496,
            client_id: 15,
            contracts: vec![
                Contract::new("HSI", SecurityType::Index, "HKFE", "HKD"),
                Contract::new("HHI.HK", SecurityType::Index, "HKFE", "HKD"),
            ],
            request_timeout: Duration::from_secs(5),
            retry_count: 5,
            retry_wait: Duration::from_secs(2),
            pacing_wait: Duration::from_secs(5),
        }
    }
}

impl GatewaySettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let contracts = match env_value("GATEWAY_CONTRACTS")? {
            Some(raw) => parse_contracts("GATEWAY_CONTRACTS", &raw)?,
            None => defaults.contracts,
        };
        Ok(Self {
            host: parse_env_string("GATEWAY_HOST", &defaults.host)?,
            port: parse_env("GATEWAY_PORT", defaults.port)?,
            client_id: parse_env("GATEWAY_CLIENT_ID", defaults.client_id)?,
            contracts,
            request_timeout: parse_env_duration_secs(
                "GATEWAY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            retry_count: parse_env("GATEWAY_RETRY_COUNT", defaults.retry_count)?,
            retry_wait: parse_env_duration_secs("GATEWAY_RETRY_WAIT_SECS", defaults.retry_wait)?,
            pacing_wait: parse_env_duration_secs("GATEWAY_PACING_WAIT_SECS", defaults.pacing_wait)?,
        })
    }
}

/// Web data service access settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDataSettings {
    /// Base url of the chart endpoint, scheme and host only.
    pub base_url: String,
    /// Symbols to archive, in request order.
    pub symbols: Vec<String>,
    /// Deadline for one HTTP request.
    pub request_timeout: Duration,
    /// Attempts per symbol before the service is declared unreachable.
    pub max_attempts: u32,
    /// Lower bound of the randomized retry sleep.
    pub retry_wait_min: Duration,
    /// Upper bound of the randomized retry sleep.
    pub retry_wait_max: Duration,
}

impl Default for WebDataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            symbols: vec!["^HSI".to_string()],
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_wait_min: Duration::from_secs(1),
            retry_wait_max: Duration::from_secs(10),
        }
    }
}

impl WebDataSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let symbols = match env_value("WEBDATA_SYMBOLS")? {
            Some(raw) => parse_symbols("WEBDATA_SYMBOLS", &raw)?,
            None => defaults.symbols,
        };
        let settings = Self {
            base_url: parse_env_string("WEBDATA_BASE_URL", &defaults.base_url)?,
            symbols,
            request_timeout: parse_env_duration_secs(
                "WEBDATA_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            max_attempts: parse_env("WEBDATA_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_wait_min: parse_env_duration_secs(
                "WEBDATA_RETRY_WAIT_MIN_SECS",
                defaults.retry_wait_min,
            )?,
            retry_wait_max: parse_env_duration_secs(
                "WEBDATA_RETRY_WAIT_MAX_SECS",
                defaults.retry_wait_max,
            )?,
        };
        if settings.retry_wait_min > settings.retry_wait_max {
            return Err(ConfigError::invalid(
                "WEBDATA_RETRY_WAIT_MAX_SECS",
                format!(
                    "retry wait range is inverted ({}s > {}s)",
                    settings.retry_wait_min.as_secs(),
                    settings.retry_wait_max.as_secs()
                ),
            ));
        }
        Ok(settings)
    }
}

/// Output directories for archived CSV files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Root of the intraday per-day tree.
    pub intraday_dir: PathBuf,
    /// Root of the daily series tree.
    pub daily_dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            intraday_dir: PathBuf::from("market-data/intraday/hk"),
            daily_dir: PathBuf::from("market-data/daily/hk"),
        }
    }
}

impl StoreSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            intraday_dir: parse_env_path("GATEWAY_DATA_DIR", defaults.intraday_dir)?,
            daily_dir: parse_env_path("WEBDATA_DATA_DIR", defaults.daily_dir)?,
        })
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Jobs to run, in declaration order.
    pub jobs: Vec<ArchiveJob>,
    /// First day of the archive window.
    pub start_date: NaiveDate,
    /// Last day of the archive window, inclusive.
    pub end_date: NaiveDate,
    /// Gateway connection and pacing.
    pub gateway: GatewaySettings,
    /// Web data service access.
    pub webdata: WebDataSettings,
    /// CSV output locations.
    pub store: StoreSettings,
}

impl ArchiveConfig {
    /// Read the full configuration from the environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] naming the offending variable when a value is set
    /// but empty, malformed, or inconsistent with another value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jobs = match env_value("ARCHIVE_JOBS")? {
            Some(raw) => parse_jobs("ARCHIVE_JOBS", &raw)?,
            None => vec![ArchiveJob::Web],
        };
        let start_date = parse_env_date("ARCHIVE_START_DATE", default_start_date())?;
        let end_date = parse_env_date("ARCHIVE_END_DATE", Local::now().date_naive())?;
        if start_date > end_date {
            return Err(ConfigError::invalid(
                "ARCHIVE_START_DATE",
                format!("{start_date} is after the end date {end_date}"),
            ));
        }
        Ok(Self {
            jobs,
            start_date,
            end_date,
            gateway: GatewaySettings::from_env()?,
            webdata: WebDataSettings::from_env()?,
            store: StoreSettings::from_env()?,
        })
    }
}

/// First day the upstream services have data worth archiving.
fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Read a variable, trimming whitespace.
///
/// `None` when unset; [`ConfigError::EmptyValue`] when set but blank.
fn env_value(var: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Err(ConfigError::EmptyValue(var.to_string()))
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(_) => Ok(None),
    }
}

fn parse_env_string(var: &str, default: &str) -> Result<String, ConfigError> {
    Ok(env_value(var)?.unwrap_or_else(|| default.to_string()))
}

fn parse_env_path(var: &str, default: PathBuf) -> Result<PathBuf, ConfigError> {
    Ok(env_value(var)?.map_or(default, PathBuf::from))
}

fn parse_env<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_value(var)?.map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|error: T::Err| ConfigError::invalid(var, error.to_string()))
    })
}

fn parse_env_duration_secs(var: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_env(var, default.as_secs())?))
}

fn parse_env_date(var: &str, default: NaiveDate) -> Result<NaiveDate, ConfigError> {
    env_value(var)?.map_or(Ok(default), |raw| parse_date(var, &raw))
}

fn parse_date(var: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| ConfigError::invalid(var, format!("{raw:?} is not a yyyy-mm-dd date: {error}")))
}

fn parse_jobs(var: &str, raw: &str) -> Result<Vec<ArchiveJob>, ConfigError> {
    let mut jobs = Vec::new();
    for entry in raw.split(',') {
        let name = entry.trim();
        if name.is_empty() {
            continue;
        }
        let job = match name.to_ascii_lowercase().as_str() {
            "web" => ArchiveJob::Web,
            "replay" => ArchiveJob::Replay,
            _ => {
                return Err(ConfigError::invalid(
                    var,
                    format!("unknown job {name:?}, expected web or replay"),
                ));
            }
        };
        if !jobs.contains(&job) {
            jobs.push(job);
        }
    }
    if jobs.is_empty() {
        return Err(ConfigError::invalid(var, "no jobs listed"));
    }
    Ok(jobs)
}

fn parse_contracts(var: &str, raw: &str) -> Result<Vec<Contract>, ConfigError> {
    let mut contracts = Vec::new();
    for entry in raw.split(',') {
        let descriptor = entry.trim();
        if descriptor.is_empty() {
            continue;
        }
        let contract = descriptor
            .parse()
            .map_err(|error: ContractParseError| ConfigError::invalid(var, error.to_string()))?;
        contracts.push(contract);
    }
    if contracts.is_empty() {
        return Err(ConfigError::invalid(var, "no contracts listed"));
    }
    Ok(contracts)
}

fn parse_symbols(var: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(ConfigError::invalid(var, "no symbols listed"));
    }
    Ok(symbols)
}

// =============================================================================
// Tests
// =============================================================================
