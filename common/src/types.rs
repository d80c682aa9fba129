//! Core types shared across the pricing, OMS, execution and risk crates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar days per year used to convert an expiry date into a year fraction.
const DAYS_PER_YEAR: f64 = 365.25;

/// Put or call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Right to buy the underlying at strike.
    Call,
    /// Right to sell the underlying at strike.
    Put,
}

impl OptionType {
    /// Parse from the wire representation used throughout the spec ("CALL"/"PUT").
    pub fn parse(s: &str) -> Result<Self, CommonError> {
        match s {
            "CALL" => Ok(Self::Call),
            "PUT" => Ok(Self::Put),
            other => Err(CommonError::InvalidOptionType {
                value: other.to_string(),
            }),
        }
    }

    /// `true` for calls, matching `OptionParameters::is_call`.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(self, Self::Call)
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        })
    }
}

/// Strike wrapper with bit-pattern equality/hashing so it can serve as part of
/// a hash-map key. Strikes are always finite and positive by the time one is
/// constructed (`OptionOrder`/`OptionData` validation enforces that upstream),
/// so `to_bits` equality is exact and stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Strike(pub f64);

impl Strike {
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Strike {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for Strike {}

impl std::hash::Hash for Strike {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Identity of an option position: everything needed to distinguish one
/// options contract from another. Equality and hashing are structural over
/// all four fields, per the spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: Strike,
    pub expiry: String,
}

impl PositionKey {
    #[must_use]
    pub fn new(underlying: impl Into<String>, option_type: OptionType, strike: f64, expiry: impl Into<String>) -> Self {
        Self {
            underlying: underlying.into(),
            option_type,
            strike: Strike(strike),
            expiry: expiry.into(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.underlying, self.option_type, self.strike, self.expiry
        )
    }
}

/// Abstraction over "now", so position time-to-expiry can be computed
/// deterministically in tests instead of racing the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests: always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Convert an ISO `YYYY-MM-DD` expiry date into a year fraction remaining
/// from `now`. This is the one place a wall-clock date is converted into the
/// floating-point year fraction the pricing kernel expects, performed once on
/// ingestion per the spec's scope note. Expired or same-day expiries clamp to
/// a small positive floor so they remain priceable rather than failing the
/// kernel's `timeToExpiry > 0` precondition.
pub fn time_to_expiry_years(expiry: &str, now: DateTime<Utc>) -> Result<f64, CommonError> {
    let expiry_date = NaiveDate::parse_from_str(expiry, "%Y-%m-%d")
        .map_err(|_| CommonError::InvalidExpiry { value: expiry.to_string() })?;
    let today = now.date_naive();
    let days = (expiry_date - today).num_days() as f64;
    Ok((days / DAYS_PER_YEAR).max(1.0 / DAYS_PER_YEAR))
}

/// Errors shared by the common-types helpers.
#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("invalid option type: {value}")]
    InvalidOptionType { value: String },
    #[error("invalid expiry date: {value}")]
    InvalidExpiry { value: String },
}
