//! Instrument Contracts
//!
//! Identifies a tradeable instrument to the brokerage gateway by symbol,
//! security type, exchange, and currency. Contracts are parseable from the
//! compact descriptor form used in configuration:
//!
//! ```text
//! SYMBOL:SECTYPE:EXCHANGE:CURRENCY
//! HSI:IND:HKFE:HKD
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Security type of a contract, with the vendor code used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityType {
    /// Common stock (`STK`).
    Stock,
    /// Index (`IND`).
    Index,
    /// Future (`FUT`).
    Future,
    /// Option (`OPT`).
    Option,
    /// Currency pair (`CASH`).
    Forex,
}

impl SecurityType {
    /// Vendor code for this security type.
    #[must_use]
    pub const fn as_code(&self) -> &'static str {
        match self {
            Self::Stock => "STK",
            Self::Index => "IND",
            Self::Future => "FUT",
            Self::Option => "OPT",
            Self::Forex => "CASH",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for SecurityType {
    type Err = ContractParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STK" => Ok(Self::Stock),
            "IND" => Ok(Self::Index),
            "FUT" => Ok(Self::Future),
            "OPT" => Ok(Self::Option),
            "CASH" => Ok(Self::Forex),
            other => Err(ContractParseError::UnknownSecurityType(other.to_string())),
        }
    }
}

/// Error parsing a contract descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractParseError {
    /// The descriptor did not have exactly four `:`-separated fields.
    #[error("expected SYMBOL:SECTYPE:EXCHANGE:CURRENCY, got {0:?}")]
    MalformedDescriptor(String),
    /// A field was empty.
    #[error("empty {0} field in contract descriptor")]
    EmptyField(&'static str),
    /// The security type code is not recognized.
    #[error("unknown security type code {0:?}")]
    UnknownSecurityType(String),
}

/// A tradeable instrument as the gateway identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contract {
    /// Ticker symbol, e.g. `HSI` or `HHI.HK`.
    pub symbol: String,
    /// Security type.
    pub security_type: SecurityType,
    /// Listing exchange, e.g. `HKFE`.
    pub exchange: String,
    /// Quote currency, e.g. `HKD`.
    pub currency: String,
}

impl Contract {
    /// Create a contract from its four identifying fields.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        security_type: SecurityType,
        exchange: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            security_type,
            exchange: exchange.into(),
            currency: currency.into(),
        }
    }

    /// Compact descriptor form, the inverse of [`FromStr`].
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.symbol, self.security_type, self.exchange, self.currency
        )
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{}, {})",
            self.symbol, self.security_type, self.exchange, self.currency
        )
    }
}

impl FromStr for Contract {
    type Err = ContractParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(':').collect();
        let [symbol, sec_type, exchange, currency] = fields.as_slice() else {
            return Err(ContractParseError::MalformedDescriptor(s.to_string()));
        };

        for (name, value) in [
            ("symbol", symbol),
            ("security type", sec_type),
            ("exchange", exchange),
            ("currency", currency),
        ] {
            if value.trim().is_empty() {
                return Err(ContractParseError::EmptyField(name));
            }
        }

        Ok(Self {
            symbol: symbol.trim().to_string(),
            security_type: sec_type.trim().parse()?,
            exchange: exchange.trim().to_uppercase(),
            currency: currency.trim().to_uppercase(),
        })
    }
}
