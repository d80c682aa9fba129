//! Simulated execution engine.
//!
//! Owns a FIFO queue and a single worker task that wakes every 100ms,
//! decides fill/reject per order-type rules and a configurable stochastic
//! fill rate, and reports outcomes back through the narrow
//! [`common::OrderResultSink`] abstraction rather than a concrete pointer
//! back into the OMS.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use common::{ChannelError, OptionOrder, OrderResultSink, OrderSubmissionChannel, order::OrderType};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_SIMULATED_SLIPPAGE: f64 = 0.01;
const DEFAULT_SIMULATED_FILL_RATE: f64 = 0.95;
const REJECTION_REASON: &str = "Order execution failed";

/// Errors the execution engine can raise.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// `enqueue` called while the engine is stopped.
    #[error("execution engine is not running")]
    NotRunning,
    /// A slippage or fill-rate knob fell outside `[0, 1]`.
    #[error("invalid execution config: {reason}")]
    InvalidConfig { reason: String },
}

/// Point-in-time counters exposed after `stop()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCounters {
    /// Orders dequeued and decided, fill or reject, including retry-pass orders.
    pub processed: u64,
    /// Orders accepted and reported via `on_filled`.
    pub filled: u64,
    /// Orders rejected and reported via `on_rejected`.
    pub rejected: u64,
}

/// FIFO order queue plus a background worker that simulates fills.
pub struct ExecutionEngine {
    queue: Mutex<VecDeque<OptionOrder>>,
    running: AtomicBool,
    sink: RwLock<Option<Arc<dyn OrderResultSink>>>,
    simulated_slippage: RwLock<f64>,
    simulated_fill_rate: RwLock<f64>,
    processed: AtomicU64,
    filled: AtomicU64,
    rejected: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    /// A fresh, unstarted engine with spec-default slippage and fill rate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            sink: RwLock::new(None),
            simulated_slippage: RwLock::new(DEFAULT_SIMULATED_SLIPPAGE),
            simulated_fill_rate: RwLock::new(DEFAULT_SIMULATED_FILL_RATE),
            processed: AtomicU64::new(0),
            filled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Install the callback target for fills/rejections. Without one,
    /// outcomes are logged only.
    pub fn set_oms(&self, sink: Arc<dyn OrderResultSink>) {
        *self.sink.write() = Some(sink);
    }

    /// `s` must be in `[0, 1]`.
    pub fn set_simulated_slippage(&self, s: f64) -> Result<(), ExecutionError> {
        if !(0.0..=1.0).contains(&s) {
            return Err(ExecutionError::InvalidConfig { reason: format!("simulated slippage {s} outside [0, 1]") });
        }
        *self.simulated_slippage.write() = s;
        Ok(())
    }

    /// `f` must be in `[0, 1]`.
    pub fn set_simulated_fill_rate(&self, f: f64) -> Result<(), ExecutionError> {
        if !(0.0..=1.0).contains(&f) {
            return Err(ExecutionError::InvalidConfig { reason: format!("simulated fill rate {f} outside [0, 1]") });
        }
        *self.simulated_fill_rate.write() = f;
        Ok(())
    }

    /// Idempotent: spawns the worker if one is not already running. Must be
    /// called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run().await });
        *self.worker.lock() = Some(handle);
        info!("execution engine started");
    }

    /// Signals the worker to stop and waits for it to drain its current
    /// iteration and exit, then logs summary counters.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let counters = self.counters();
        info!(
            processed = counters.processed,
            filled = counters.filled,
            rejected = counters.rejected,
            "execution engine stopped"
        );
    }

    /// Current processed/filled/rejected counters.
    #[must_use]
    pub fn counters(&self) -> ExecutionCounters {
        ExecutionCounters {
            processed: self.processed.load(Ordering::Relaxed),
            filled: self.filled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(WORKER_POLL_INTERVAL);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.drain_queue();
            self.retry_pending_from_sink();
        }
    }

    fn drain_queue(&self) {
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(order) => self.decide_and_report(order),
                None => break,
            }
        }
    }

    /// After draining the queue, re-poll the sink's view of active orders
    /// so a submission that raced `enqueue` is never lost (spec.md §4.3).
    fn retry_pending_from_sink(&self) {
        let Some(sink) = self.sink.read().as_ref().map(Arc::clone) else {
            return;
        };
        for order in sink.active_orders() {
            self.decide_and_report(order);
        }
    }

    fn decide_and_report(&self, order: OptionOrder) {
        self.processed.fetch_add(1, Ordering::Relaxed);

        if order.quantity == 0 {
            self.reject(&order, REJECTION_REASON);
            return;
        }

        let fill_rate = *self.simulated_fill_rate.read();
        let slippage = *self.simulated_slippage.read();
        let mut rng = rand::thread_rng();

        if rng.gen::<f64>() >= fill_rate {
            self.reject(&order, REJECTION_REASON);
            return;
        }

        let price = simulated_fill_price(&order, slippage, &mut rng);
        if !order_accepts(&order, price) {
            self.reject(&order, REJECTION_REASON);
            return;
        }

        let fill_price = simulated_fill_price(&order, slippage, &mut rng);
        self.filled.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = self.sink.read().as_ref() {
            sink.on_filled(&order.order_id, fill_price);
        } else {
            warn!(order_id = %order.order_id, fill_price, "filled order but no OMS registered");
        }
        debug!(order_id = %order.order_id, fill_price, "order filled");
    }

    fn reject(&self, order: &OptionOrder, reason: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = self.sink.read().as_ref() {
            sink.on_rejected(&order.order_id, reason);
        } else {
            warn!(order_id = %order.order_id, reason, "rejected order but no OMS registered");
        }
    }
}

impl OrderSubmissionChannel for ExecutionEngine {
    fn enqueue(&self, order: OptionOrder) -> Result<(), ChannelError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ChannelError::NotRunning);
        }
        self.queue.lock().push_back(order);
        Ok(())
    }
}

/// Simulated fill price: `limitPrice · (1 + s)`, `s ~ Uniform[-σ, +σ]`, with
/// the sign forced adverse to the taker for MARKET orders.
fn simulated_fill_price(order: &OptionOrder, slippage_bound: f64, rng: &mut impl Rng) -> f64 {
    let base = order.limit_price.unwrap_or(0.0);
    let mut s = if slippage_bound > 0.0 { rng.gen_range(-slippage_bound..=slippage_bound) } else { 0.0 };
    if order.order_type == OrderType::Market {
        let is_buy = order.quantity > 0;
        s = if is_buy { s.abs() } else { -s.abs() };
    }
    base * (1.0 + s)
}

fn order_accepts(order: &OptionOrder, price: f64) -> bool {
    let is_buy = order.quantity > 0;
    match order.order_type {
        OrderType::Market => true,
        OrderType::Limit => limit_condition(order, price, is_buy),
        OrderType::Stop => stop_condition(order, price, is_buy),
        OrderType::StopLimit => stop_condition(order, price, is_buy) && limit_condition(order, price, is_buy),
    }
}

fn limit_condition(order: &OptionOrder, price: f64, is_buy: bool) -> bool {
    let Some(limit_price) = order.limit_price else { return false };
    if is_buy { price <= limit_price } else { price >= limit_price }
}

fn stop_condition(order: &OptionOrder, price: f64, is_buy: bool) -> bool {
    let Some(stop_price) = order.stop_price else { return false };
    if is_buy { price >= stop_price } else { price <= stop_price }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OptionType, Side};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        filled: StdMutex<Vec<(String, f64)>>,
        rejected: StdMutex<Vec<(String, String)>>,
    }

    impl OrderResultSink for RecordingSink {
        fn on_filled(&self, order_id: &str, fill_price: f64) {
            self.filled.lock().unwrap().push((order_id.to_string(), fill_price));
        }
        fn on_rejected(&self, order_id: &str, reason: &str) {
            self.rejected.lock().unwrap().push((order_id.to_string(), reason.to_string()));
        }
        fn active_orders(&self) -> Vec<OptionOrder> {
            Vec::new()
        }
    }

    fn order(order_type: OrderType, qty: i64, limit_price: Option<f64>) -> OptionOrder {
        let mut o = OptionOrder::new("AAPL", OptionType::Call, 150.0, "2099-01-01", Side::BuyToOpen, order_type, qty);
        o.order_id = "ORD-00000001".into();
        o.limit_price = limit_price;
        o
    }

    #[tokio::test]
    async fn market_order_always_fills_with_full_rate_and_no_slippage() {
        let engine = Arc::new(ExecutionEngine::new());
        engine.set_simulated_fill_rate(1.0).unwrap();
        engine.set_simulated_slippage(0.0).unwrap();
        let sink = Arc::new(RecordingSink::default());
        engine.set_oms(sink.clone());
        engine.start();

        engine.enqueue(order(OrderType::Market, 10, Some(5.0))).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        engine.stop().await;

        let filled = sink.filled.lock().unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].1, 5.0);
    }

    #[tokio::test]
    async fn zero_fill_rate_always_rejects() {
        let engine = Arc::new(ExecutionEngine::new());
        engine.set_simulated_fill_rate(0.0).unwrap();
        let sink = Arc::new(RecordingSink::default());
        engine.set_oms(sink.clone());
        engine.start();

        engine.enqueue(order(OrderType::Market, 10, Some(5.0))).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        engine.stop().await;

        assert_eq!(sink.rejected.lock().unwrap().len(), 1);
        assert_eq!(engine.counters().rejected, 1);
    }

    #[tokio::test]
    async fn enqueue_before_start_fails_not_running() {
        let engine = ExecutionEngine::new();
        assert!(matches!(engine.enqueue(order(OrderType::Market, 10, Some(5.0))), Err(ChannelError::NotRunning)));
    }

    #[test]
    fn invalid_config_rejected() {
        let engine = ExecutionEngine::new();
        assert!(engine.set_simulated_slippage(1.5).is_err());
        assert!(engine.set_simulated_fill_rate(-0.1).is_err());
    }

    #[test]
    fn limit_buy_rejects_above_limit_and_accepts_at_or_below() {
        let o = order(OrderType::Limit, 10, Some(5.0));
        assert!(!order_accepts(&o, 6.0));
        assert!(order_accepts(&o, 5.0));
        assert!(order_accepts(&o, 4.0));
    }

    #[test]
    fn limit_sell_rejects_below_limit_and_accepts_at_or_above() {
        let o = order(OrderType::Limit, -10, Some(5.0));
        assert!(!order_accepts(&o, 4.0));
        assert!(order_accepts(&o, 5.0));
        assert!(order_accepts(&o, 6.0));
    }

    #[test]
    fn stop_limit_requires_both_conditions() {
        let mut o = order(OrderType::StopLimit, 10, Some(5.0));
        o.stop_price = Some(4.0);
        assert!(order_accepts(&o, 4.5));
        assert!(!order_accepts(&o, 5.5));
        assert!(!order_accepts(&o, 3.0));
    }

    #[test]
    fn market_fill_price_slippage_is_adverse_to_taker() {
        let mut rng = rand::thread_rng();
        let buy = order(OrderType::Market, 10, Some(100.0));
        let sell = order(OrderType::Market, -10, Some(100.0));
        for _ in 0..50 {
            assert!(simulated_fill_price(&buy, 0.05, &mut rng) >= 100.0);
            assert!(simulated_fill_price(&sell, 0.05, &mut rng) <= 100.0);
        }
    }
}
