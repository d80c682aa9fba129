//! Order and position vocabulary shared between the OMS and execution crates.
//!
//! Living here (rather than inside `oms`) is what lets `oms` and `execution`
//! depend on each other's narrow trait interface without a circular crate
//! dependency — see [`OrderSubmissionChannel`] and [`OrderResultSink`].

use crate::types::OptionType;
use chrono::{DateTime, Utc};

/// Which side of a position an order opens or closes. Drives position
/// accounting in the OMS (spec.md §9: side drives accounting, quantity sign
/// drives the engine's buy/sell fill logic — the two must not disagree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    BuyToOpen,
    SellToOpen,
    BuyToClose,
    SellToClose,
}

/// Order type, governing the execution engine's fill/reject rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

/// A client-submitted option order and its current lifecycle state.
#[derive(Debug, Clone)]
pub struct OptionOrder {
    /// Assigned by the OMS on submission; empty on a caller-constructed order.
    pub order_id: String,
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: String,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Signed, non-zero. Sign drives the execution engine's buy/sell fill
    /// logic; `side` drives OMS position accounting (spec.md §4.3/§9).
    pub quantity: i64,
    pub status: OrderStatus,
    pub is_active: bool,
    pub submit_time: DateTime<Utc>,
    pub fill_time: Option<DateTime<Utc>>,
    pub fill_price: Option<f64>,
}

impl OptionOrder {
    /// An empty, unsubmitted order shell — what callers fill in before
    /// calling `Oms::submit`.
    #[must_use]
    pub fn new(
        underlying: impl Into<String>,
        option_type: OptionType,
        strike: f64,
        expiry: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: i64,
    ) -> Self {
        Self {
            order_id: String::new(),
            underlying: underlying.into(),
            option_type,
            strike,
            expiry: expiry.into(),
            side,
            order_type,
            limit_price: None,
            stop_price: None,
            quantity,
            status: OrderStatus::Pending,
            is_active: true,
            submit_time: Utc::now(),
            fill_time: None,
            fill_price: None,
        }
    }

    /// Default record for `getOrderStatus` on an unknown order id: empty
    /// `order_id` signals "not found" per spec.md §4.2.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            order_id: String::new(),
            underlying: String::new(),
            option_type: OptionType::Call,
            strike: 0.0,
            expiry: String::new(),
            side: Side::BuyToOpen,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            quantity: 0,
            status: OrderStatus::Pending,
            is_active: false,
            submit_time: DateTime::<Utc>::UNIX_EPOCH,
            fill_time: None,
            fill_price: None,
        }
    }
}

/// A resting option position, keyed externally by `common::PositionKey`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionPosition {
    /// Signed: positive is long, negative is short.
    pub quantity: f64,
    /// Years remaining to expiry, refreshed on each risk pass.
    pub time_to_expiry: f64,
}

impl OptionPosition {
    #[must_use]
    pub const fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    #[must_use]
    pub fn abs_quantity(&self) -> f64 {
        self.quantity.abs()
    }
}

/// Error returned across the OMS/execution-engine trait seam. Deliberately
/// thin: richer per-crate errors (`oms::OmsError`, `execution::ExecutionError`)
/// wrap this at their boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("execution engine is not running")]
    NotRunning,
}

/// What the OMS needs from the execution engine: somewhere to enqueue a
/// freshly submitted order. Implemented by `execution::ExecutionEngine`.
/// Breaks the raw-back-pointer cycle the C++ original has between the OMS
/// and the execution engine (spec.md §9).
pub trait OrderSubmissionChannel: Send + Sync {
    fn enqueue(&self, order: OptionOrder) -> Result<(), ChannelError>;
}

/// What the execution engine needs from the OMS: somewhere to report a fill
/// or rejection. Implemented by `oms::Oms`. The other half of the same
/// dependency inversion.
pub trait OrderResultSink: Send + Sync {
    fn on_filled(&self, order_id: &str, fill_price: f64);
    fn on_rejected(&self, order_id: &str, reason: &str);
    /// Snapshot of currently-active (PENDING) orders, used by the engine's
    /// retry pass so a submission that raced `enqueue` is never lost.
    fn active_orders(&self) -> Vec<OptionOrder>;
}
