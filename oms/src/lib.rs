//! Order Management System (OMS)
//!
//! In-memory order submission, lifecycle management and position
//! aggregation. Holds two independently-locked maps — orders keyed by order
//! id, positions keyed by [`PositionKey`] — and forwards accepted orders to
//! an execution engine through the narrow [`OrderSubmissionChannel`]
//! abstraction rather than a concrete back-pointer.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;

use common::{
    Clock, OptionOrder, OptionPosition, OrderResultSink, OrderStatus, OrderSubmissionChannel, PositionKey, Side,
    SystemClock, order::OrderType, time_to_expiry_years,
};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub use error::{OmsError, OmsResult};

/// Order management system: validates and stores orders, forwards them to
/// an execution channel, and absorbs fill/reject callbacks into position
/// state.
pub struct Oms {
    orders: RwLock<FxHashMap<String, OptionOrder>>,
    positions: RwLock<FxHashMap<PositionKey, OptionPosition>>,
    order_sequence: AtomicU64,
    running: AtomicBool,
    channel: RwLock<Option<Arc<dyn OrderSubmissionChannel>>>,
    clock: Arc<dyn Clock>,
}

impl Default for Oms {
    fn default() -> Self {
        Self::new()
    }
}

impl Oms {
    /// A fresh, unstarted OMS with no execution channel installed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Construct with an explicit clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            orders: RwLock::new(FxHashMap::default()),
            positions: RwLock::new(FxHashMap::default()),
            order_sequence: AtomicU64::new(0),
            running: AtomicBool::new(false),
            channel: RwLock::new(None),
            clock,
        }
    }

    /// Start accepting submissions.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("oms started");
    }

    /// Stop accepting submissions. Already-stored orders are untouched.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("oms stopped");
    }

    /// Install the execution channel orders are forwarded to on submit.
    pub fn set_execution_channel(&self, channel: Arc<dyn OrderSubmissionChannel>) {
        *self.channel.write() = Some(channel);
    }

    fn next_order_id(&self) -> String {
        let seq = self.order_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("ORD-{seq:08}")
    }

    fn validate(order: &OptionOrder) -> OmsResult<()> {
        if order.underlying.is_empty() {
            return Err(OmsError::InvalidOrder { reason: "underlying must not be empty".into() });
        }
        if order.quantity == 0 {
            return Err(OmsError::InvalidOrder { reason: "quantity must be non-zero".into() });
        }
        if order.order_type == OrderType::Limit && order.limit_price.unwrap_or(0.0) <= 0.0 {
            return Err(OmsError::InvalidOrder { reason: "limit order requires a positive limit_price".into() });
        }
        if order.order_type == OrderType::Stop && order.stop_price.unwrap_or(0.0) <= 0.0 {
            return Err(OmsError::InvalidOrder { reason: "stop order requires a positive stop_price".into() });
        }
        Ok(())
    }

    /// Validate, assign an order id, store as PENDING, and forward to the
    /// execution channel. Engine unavailability is non-fatal: the order
    /// stays PENDING and a diagnostic is logged.
    pub fn submit(&self, mut order: OptionOrder) -> OmsResult<String> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(OmsError::NotRunning);
        }
        Self::validate(&order)?;

        let order_id = self.next_order_id();
        order.order_id = order_id.clone();
        order.status = OrderStatus::Pending;
        order.is_active = true;
        order.submit_time = self.clock.now();

        self.orders.write().insert(order_id.clone(), order.clone());

        match self.channel.read().as_ref() {
            Some(channel) => {
                if let Err(e) = channel.enqueue(order) {
                    warn!(%order_id, error = ?e, "execution channel unavailable, order remains PENDING");
                }
            }
            None => warn!(%order_id, "no execution channel registered, order remains PENDING"),
        }

        Ok(order_id)
    }

    /// Cancel an active order. A no-op if the order is unknown or already
    /// in a terminal state.
    pub fn cancel(&self, order_id: &str) {
        let mut orders = self.orders.write();
        if let Some(order) = orders.get_mut(order_id) {
            if order.is_active {
                order.status = OrderStatus::Cancelled;
                order.is_active = false;
                debug!(order_id, "order cancelled");
            }
        }
    }

    /// Overwrite an active order's parameters, retaining its original id.
    /// A no-op on unknown or terminal orders (see spec Open Questions).
    pub fn modify(&self, order_id: &str, mut new_order: OptionOrder) -> OmsResult<()> {
        let mut orders = self.orders.write();
        let Some(existing) = orders.get_mut(order_id) else {
            return Ok(());
        };
        if !existing.is_active {
            return Ok(());
        }
        Self::validate(&new_order)?;
        new_order.order_id = order_id.to_string();
        new_order.status = existing.status;
        new_order.is_active = existing.is_active;
        new_order.submit_time = existing.submit_time;
        *existing = new_order;
        Ok(())
    }

    /// Snapshot of all orders currently PENDING.
    #[must_use]
    pub fn get_active_orders(&self) -> Vec<OptionOrder> {
        self.orders.read().values().filter(|o| o.is_active).cloned().collect()
    }

    /// Snapshot of one order, or a default record with an empty `order_id`
    /// if unknown.
    #[must_use]
    pub fn get_order_status(&self, order_id: &str) -> OptionOrder {
        self.orders.read().get(order_id).cloned().unwrap_or_else(OptionOrder::not_found)
    }

    /// Snapshot of all open positions.
    #[must_use]
    pub fn get_positions(&self) -> FxHashMap<PositionKey, OptionPosition> {
        self.positions.read().clone()
    }

    /// Snapshot of one position, or a zeroed default if the key is unknown.
    #[must_use]
    pub fn get_position(&self, key: &PositionKey) -> OptionPosition {
        self.positions.read().get(key).copied().unwrap_or_default()
    }

    /// Placeholder valuation: Σ quantity · strike. Real valuation is the
    /// risk evaluator's responsibility.
    #[must_use]
    pub fn get_total_position_value(&self) -> f64 {
        self.positions.read().iter().map(|(key, pos)| pos.quantity * key.strike.value()).sum()
    }

    /// Recompute `timeToExpiry` for every stored position against the
    /// current clock. Callers (e.g. the risk evaluator's caller) should
    /// invoke this immediately before a risk pass so Greeks are never
    /// computed against a stale year fraction.
    pub fn refresh_times_to_expiry(&self) {
        let now = self.clock.now();
        let mut positions = self.positions.write();
        for (key, position) in positions.iter_mut() {
            if let Ok(t) = time_to_expiry_years(&key.expiry, now) {
                position.time_to_expiry = t;
            }
        }
    }

    fn apply_fill_to_position(&self, order: &OptionOrder) {
        let key = PositionKey::new(order.underlying.clone(), order.option_type, order.strike, order.expiry.clone());
        let mut positions = self.positions.write();
        let entry = positions.entry(key.clone()).or_insert_with(|| {
            let time_to_expiry = time_to_expiry_years(&key.expiry, self.clock.now()).unwrap_or(0.0);
            OptionPosition { quantity: 0.0, time_to_expiry }
        });

        let delta = order.quantity as f64;
        match order.side {
            Side::BuyToOpen | Side::BuyToClose => entry.quantity += delta,
            Side::SellToOpen | Side::SellToClose => entry.quantity -= delta,
        }

        if entry.quantity == 0.0 {
            positions.remove(&key);
        }
    }
}

impl OrderResultSink for Oms {
    fn on_filled(&self, order_id: &str, fill_price: f64) {
        let order = {
            let mut orders = self.orders.write();
            let Some(order) = orders.get_mut(order_id) else {
                return;
            };
            if order.status != OrderStatus::Pending {
                return;
            }
            order.status = OrderStatus::Filled;
            order.fill_price = Some(fill_price);
            order.fill_time = Some(self.clock.now());
            order.is_active = false;
            order.clone()
        };
        self.apply_fill_to_position(&order);
        debug!(order_id, fill_price, "order filled");
    }

    fn on_rejected(&self, order_id: &str, reason: &str) {
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(order_id) else {
            return;
        };
        if order.status != OrderStatus::Pending {
            return;
        }
        order.status = OrderStatus::Rejected;
        order.is_active = false;
        info!(order_id, reason, "order rejected");
    }

    fn active_orders(&self) -> Vec<OptionOrder> {
        self.get_active_orders()
    }
}
