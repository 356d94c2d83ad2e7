//! CSV Stores
//!
//! Plain-file persistence for fetched market data. Intraday bars land in
//! one file per (contract, day) under a date directory; daily series land
//! in one file per symbol. Files are built in memory and written whole, so
//! a partially fetched day never leaves a truncated file behind.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::bar::{DailyBar, HistoricalBar};
use crate::domain::contract::Contract;

/// Header of intraday day files.
pub const INTRADAY_HEADER: &str = "date,open,high,low,close,volume,bar_count,wap,has_gaps";

/// Header of daily series files.
pub const DAILY_HEADER: &str = "date,open,high,low,close,adj_close,volume";

/// Timestamp layout used in stored intraday rows.
const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Store failure, carrying the path that could not be touched.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("store i/o failed at {}: {source}", path.display())]
    Io {
        /// Path of the failed operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Intraday bar files, one per (contract, day).
#[derive(Debug, Clone)]
pub struct BarStore {
    root: PathBuf,
}

impl BarStore {
    /// Store rooted at `root`; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the day file for `(day, contract)`:
    /// `<root>/<YYYY-MM-DD>/<EXCHANGE>-<SECTYPE>-<SYMBOL>.csv`.
    #[must_use]
    pub fn day_file(&self, day: NaiveDate, contract: &Contract) -> PathBuf {
        self.root.join(day.to_string()).join(format!(
            "{}-{}-{}.csv",
            contract.exchange,
            contract.security_type.as_code(),
            contract.symbol
        ))
    }

    /// Whether the day file already exists. An existing file marks the day
    /// as fetched; the archive job skips it.
    #[must_use]
    pub fn contains(&self, day: NaiveDate, contract: &Contract) -> bool {
        self.day_file(day, contract).exists()
    }

    /// Write the day file for `(day, contract)`, creating the day directory
    /// as needed. Zero bars still writes the header, marking the day as
    /// fetched.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when a directory or the file cannot be written.
    pub fn write_day(
        &self,
        day: NaiveDate,
        contract: &Contract,
        bars: &[HistoricalBar],
    ) -> Result<PathBuf, StoreError> {
        let path = self.day_file(day, contract);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }

        let mut csv = String::from(INTRADAY_HEADER);
        csv.push('\n');
        for bar in bars {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{},{}",
                bar.timestamp.format(STORED_TIMESTAMP_FORMAT),
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                bar.bar_count,
                bar.wap,
                bar.has_gaps,
            );
        }

        fs::write(&path, csv).map_err(io_at(&path))?;
        tracing::info!(path = %path.display(), rows = bars.len(), "day file written");
        Ok(path)
    }
}

/// Daily series files, one per symbol, rewritten whole on each run.
#[derive(Debug, Clone)]
pub struct DailySeriesStore {
    root: PathBuf,
}

impl DailySeriesStore {
    /// Store rooted at `root`; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the series file for `symbol`, with a leading `^` stripped
    /// so index symbols produce portable file names.
    #[must_use]
    pub fn series_file(&self, symbol: &str) -> PathBuf {
        self.root
            .join(format!("{}.csv", symbol.trim_start_matches('^')))
    }

    /// Rewrite the series file for `symbol`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the directory or the file cannot be written.
    pub fn write_series(&self, symbol: &str, bars: &[DailyBar]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.root).map_err(io_at(&self.root))?;
        let path = self.series_file(symbol);

        let mut csv = String::from(DAILY_HEADER);
        csv.push('\n');
        for bar in bars {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{}",
                bar.date, bar.open, bar.high, bar.low, bar.close, bar.adj_close, bar.volume,
            );
        }

        fs::write(&path, csv).map_err(io_at(&path))?;
        tracing::info!(path = %path.display(), rows = bars.len(), "series file written");
        Ok(path)
    }
}
