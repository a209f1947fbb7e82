//! End-to-end scenario tests (§8) driving the public orchestrator/grid-engine
//! APIs against the paper exchange adapter, never a live venue (§10.7).

use gridbot::config::{GridConfig, RiskConfig, TrailingConfig};
use gridbot::exchange::{OrderSide, PaperExchange};
use gridbot::grid_engine::{GridEngine, LevelStatus};
use gridbot::grid_math::Spacing;
use gridbot::journal::Journal;
use gridbot::order_manager::OrderManager;
use gridbot::position::PositionTracker;
use gridbot::risk::RiskSupervisor;
use std::collections::HashMap;
use std::sync::Arc;

async fn test_journal() -> Arc<Journal> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gridbot.db");
    let path_str = path.to_str().unwrap().to_string();
    std::mem::forget(dir);
    Arc::new(Journal::open(&path_str).await.unwrap())
}

fn grid_config(symbol: &str, lower: f64, upper: f64, num_levels: usize) -> GridConfig {
    GridConfig {
        symbol: symbol.to_string(),
        lower,
        upper,
        num_levels,
        spacing: Spacing::Arithmetic,
        order_size_quote: Some(100.0),
        order_size_base: None,
        trailing: TrailingConfig::default(),
    }
}

fn risk_config() -> RiskConfig {
    RiskConfig {
        max_position_quote: 50_000.0,
        max_position_quote_per_pair: 50_000.0,
        max_open_orders: 200,
        stop_loss_pct: 5.0,
        take_profit_pct: 3.0,
        max_drawdown_pct: 10.0,
        extreme_fear_threshold: None,
    }
}

/// Scenario 1: arithmetic grid, price oscillation between 58000 and 62000
/// should produce at least one buy and one sell fill, each mirrored to the
/// adjacent level, while the ledger stays conserved within fee losses.
#[tokio::test]
async fn arithmetic_grid_oscillation_fills_and_mirrors() {
    let journal = test_journal().await;
    let symbol = "BTC/USD";
    let exchange = Arc::new(PaperExchange::new(10_000.0, 0.0, symbol, 0.0006));
    exchange.seed_price(symbol, 60_000.0);
    let order_manager = Arc::new(OrderManager::new(exchange.clone(), journal.clone()));
    let tracker = Arc::new(PositionTracker::new(
        &[symbol.to_string()],
        10_000.0,
        journal.clone(),
    ));
    let risk = Arc::new(RiskSupervisor::new(risk_config()));

    let engine = Arc::new(GridEngine::new(
        grid_config(symbol, 55_000.0, 65_000.0, 5),
        journal.clone(),
        exchange.clone(),
        order_manager.clone(),
        risk.clone(),
        tracker.clone(),
        None,
    ));
    engine.initialize_grid().await.unwrap();

    let mut buy_fills = 0u32;
    let mut sell_fills = 0u32;
    let tape = [58_000.0, 62_000.0];
    for i in 0..200 {
        let price = tape[i % tape.len()];
        let mut prices = HashMap::new();
        prices.insert(symbol.to_string(), price);
        let fills = exchange.simulate_prices(&prices);
        for order in &fills {
            match order.side {
                OrderSide::Buy => buy_fills += 1,
                OrderSide::Sell => sell_fills += 1,
            }
            tracker
                .record_fill(symbol, order.side, order.filled_amount, order.price, order.fee)
                .await
                .unwrap();
        }
        engine.check_and_process_fills().await.unwrap();
    }

    assert!(buy_fills >= 1, "expected at least one buy fill");
    assert!(sell_fills >= 1, "expected at least one sell fill");

    let pool = tracker.pool_state();
    let pair = tracker.pair_state(symbol);
    let wealth = pool.available_quote + pool.secured_profits + pair.base_balance * pair.avg_entry_price;
    assert!(
        wealth <= 10_000.0 + 1e-6,
        "wealth {wealth} should never exceed the initial pool plus rounding slack"
    );
    assert!(
        wealth >= 10_000.0 - 200.0,
        "wealth {wealth} drifted further than fees alone should account for"
    );
}

/// Scenario 2: a stop-loss trip on one pair must not affect another.
#[tokio::test]
async fn stop_loss_halts_one_pair_leaves_the_other_trading() {
    let journal = test_journal().await;
    let exchange = Arc::new(PaperExchange::new(20_000.0, 0.0, "BTC/USD", 0.0));
    exchange.seed_price("BTC/USD", 60_000.0);
    exchange.seed_price("ETH/USD", 3_000.0);
    let order_manager = Arc::new(OrderManager::new(exchange.clone(), journal.clone()));
    let tracker = Arc::new(PositionTracker::new(
        &["BTC/USD".to_string(), "ETH/USD".to_string()],
        20_000.0,
        journal.clone(),
    ));
    let risk = Arc::new(RiskSupervisor::new(risk_config()));

    let engine_a = Arc::new(GridEngine::new(
        grid_config("BTC/USD", 55_000.0, 65_000.0, 5),
        journal.clone(),
        exchange.clone(),
        order_manager.clone(),
        risk.clone(),
        tracker.clone(),
        None,
    ));
    let engine_b = Arc::new(GridEngine::new(
        grid_config("ETH/USD", 2_800.0, 3_200.0, 5),
        journal.clone(),
        exchange.clone(),
        order_manager.clone(),
        risk.clone(),
        tracker.clone(),
        None,
    ));
    engine_a.initialize_grid().await.unwrap();
    engine_b.initialize_grid().await.unwrap();

    // Pair A's price drops below its stop-loss threshold.
    let tripped = risk.check_stop_loss("BTC/USD", 55_000.0 * 0.94, 55_000.0);
    assert!(tripped);
    engine_a.cancel_all_grid_orders().await;

    assert!(risk.is_pair_halted("BTC/USD"));
    assert!(!risk.is_pair_halted("ETH/USD"));
    assert!(!risk.is_halted());

    let levels_a = engine_a.levels();
    assert!(levels_a.iter().all(|l| l.status != LevelStatus::Placed));

    let mut prices = HashMap::new();
    prices.insert("ETH/USD".to_string(), 2_850.0);
    let fills = exchange.simulate_prices(&prices);
    assert!(!fills.is_empty(), "pair B must still be able to fill");
    engine_b.check_and_process_fills().await.unwrap();
    let levels_b = engine_b.levels();
    assert!(levels_b.iter().any(|l| l.status == LevelStatus::Placed));
}

/// Scenario 4: a trailing grid shifts once the price crosses the trigger
/// band, then suppresses further shifts within its cooldown.
#[tokio::test]
async fn trailing_grid_shifts_once_then_cools_down() {
    let journal = test_journal().await;
    let symbol = "BTC/USD";
    let exchange = Arc::new(PaperExchange::new(10_000.0, 0.0, symbol, 0.0));
    exchange.seed_price(symbol, 60_000.0);
    let order_manager = Arc::new(OrderManager::new(exchange.clone(), journal.clone()));
    let tracker = Arc::new(PositionTracker::new(&[symbol.to_string()], 10_000.0, journal.clone()));
    let risk = Arc::new(RiskSupervisor::new(risk_config()));

    let mut cfg = grid_config(symbol, 55_000.0, 65_000.0, 5);
    cfg.trailing = TrailingConfig {
        enabled: true,
        trigger_pct: 75.0,
        rebalance_pct: 50.0,
        cooldown_secs: 300.0,
    };
    let engine = Arc::new(GridEngine::new(
        cfg,
        journal.clone(),
        exchange.clone(),
        order_manager.clone(),
        risk.clone(),
        tracker.clone(),
        None,
    ));
    engine.initialize_grid().await.unwrap();

    let shifted = engine.check_trailing(63_750.0).await.unwrap();
    assert!(shifted);
    assert_eq!(engine.trailing_shift_count(), 1);

    // Still within cooldown: a second crossing must not shift again.
    let shifted_again = engine.check_trailing(68_000.0).await.unwrap();
    assert!(!shifted_again);
    assert_eq!(engine.trailing_shift_count(), 1);
}

/// Scenario 6: a grid that wants more placements than `maxOpenOrders` allows
/// only places up to the cap and leaves the rest pending, with no error.
#[tokio::test]
async fn max_open_orders_caps_initial_placement() {
    let journal = test_journal().await;
    let symbol = "BTC/USD";
    let exchange = Arc::new(PaperExchange::new(100_000.0, 0.0, symbol, 0.0));
    exchange.seed_price(symbol, 60_000.0);
    let order_manager = Arc::new(OrderManager::new(exchange.clone(), journal.clone()));
    let tracker = Arc::new(PositionTracker::new(&[symbol.to_string()], 100_000.0, journal.clone()));
    let mut risk_cfg = risk_config();
    risk_cfg.max_open_orders = 5;
    let risk = Arc::new(RiskSupervisor::new(risk_cfg));

    let engine = Arc::new(GridEngine::new(
        grid_config(symbol, 50_000.0, 70_000.0, 10),
        journal.clone(),
        exchange.clone(),
        order_manager.clone(),
        risk.clone(),
        tracker.clone(),
        None,
    ));
    engine.initialize_grid().await.unwrap();

    let levels = engine.levels();
    let placed = levels.iter().filter(|l| l.status == LevelStatus::Placed).count();
    let pending = levels.iter().filter(|l| l.status == LevelStatus::Pending).count();
    assert_eq!(placed, 5);
    assert_eq!(pending, 5);
}

/// Scenario 5: reconciling after a restart drops orders that vanished at the
/// venue and leaves the live set matching the venue's open set exactly.
#[tokio::test]
async fn reconcile_after_restart_drops_vanished_orders() {
    let journal = test_journal().await;
    let symbol = "BTC/USD";
    let exchange = Arc::new(PaperExchange::new(10_000.0, 0.0, symbol, 0.0));
    exchange.seed_price(symbol, 60_000.0);
    let order_manager = OrderManager::new(exchange.clone(), journal.clone());

    let mut placed_ids = Vec::new();
    for price in [58_000.0, 58_500.0, 59_000.0] {
        let order = order_manager
            .place_grid_order(symbol, OrderSide::Buy, 0.01, price, None)
            .await
            .unwrap();
        placed_ids.push(order.venue_order_id);
    }
    assert_eq!(order_manager.open_order_count(), 3);

    // One order vanishes at the venue without the manager's involvement.
    exchange.cancel(&placed_ids[0], symbol).await.unwrap();

    order_manager.reconcile_with_exchange(symbol).await.unwrap();
    assert_eq!(order_manager.open_order_count(), 2);

    // Idempotent: reconciling again with no further venue change is a no-op.
    order_manager.reconcile_with_exchange(symbol).await.unwrap();
    assert_eq!(order_manager.open_order_count(), 2);
}

/// Scenario 3: drawdown crossing the configured threshold trips the global
/// halt and every pair's admission is rejected from that point on.
#[tokio::test]
async fn drawdown_trips_global_halt_and_blocks_every_pair() {
    let risk = RiskSupervisor::new(risk_config());
    risk.check_drawdown(10_000.0);
    assert!(!risk.check_drawdown(9_500.0));
    assert!(risk.check_drawdown(8_900.0));
    assert!(risk.is_halted());
}
