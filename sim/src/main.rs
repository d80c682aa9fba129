//! Simulation composition root.
//!
//! Wires the OMS, execution engine, and risk evaluator together and walks
//! through a submit → fill → position → risk cycle. No network surface:
//! that glue belongs to the GUI and transport collaborators, out of scope
//! here.

use anyhow::Result;
use common::{OptionOrder, OptionType, OrderType, Side};
use execution::ExecutionEngine;
use fxhash::FxHashMap;
use oms::Oms;
use risk::RiskEvaluator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("sim=debug,info").init();

    let oms = Arc::new(Oms::new());
    let engine = Arc::new(ExecutionEngine::new());
    engine.set_simulated_fill_rate(1.0)?;
    engine.set_simulated_slippage(0.0)?;

    oms.set_execution_channel(engine.clone());
    engine.set_oms(oms.clone());

    oms.start();
    engine.start();

    info!("submitting opening order");
    let order = OptionOrder::new("AAPL", OptionType::Call, 150.0, "2099-01-01", Side::BuyToOpen, OrderType::Market, 10);
    let mut resting = order.clone();
    resting.limit_price = Some(8.25);
    let order_id = oms.submit(resting)?;

    tokio::time::sleep(Duration::from_millis(250)).await;

    let status = oms.get_order_status(&order_id);
    info!(order_id = %order_id, status = ?status.status, fill_price = ?status.fill_price, "order settled");

    oms.refresh_times_to_expiry();
    let positions = oms.get_positions();
    let mut underlying_prices = FxHashMap::default();
    underlying_prices.insert("AAPL".to_string(), 150.0);

    let evaluator = RiskEvaluator::new();
    let metrics = evaluator.calculate_portfolio_risk(&positions, &underlying_prices);
    info!(
        delta = metrics.total_delta,
        gamma = metrics.total_gamma,
        vega = metrics.total_vega,
        value_at_risk = metrics.value_at_risk,
        margin_requirement = metrics.margin_requirement,
        "portfolio risk"
    );

    if evaluator.check_order_risk(&metrics) {
        info!("portfolio within configured risk limits");
    } else {
        info!("portfolio breaches configured risk limits");
    }

    engine.stop().await;
    oms.stop();

    Ok(())
}
