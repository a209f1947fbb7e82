//! Owns every subsystem and drives the per-tick trading loop (§4.10, §5).
//!
//! Grounded on `original_source/src/bot/orchestrator.py`, generalized from
//! its single pair to the multi-pair map of `GridEngine`s the rest of this
//! crate already assumes, and from its `asyncio.Task`/`Event` pair to a
//! `tokio::task::JoinHandle` plus a single-consumer `mpsc` command channel
//! (§5: "reconfigure is serialized against the main loop... via a
//! single-consumer command channel; the loop drains the channel at the
//! start of each tick").

use crate::config::{BotConfig, GridConfig};
use crate::defense::{PairRotator, PositionStopLoss, TrendFilter};
use crate::exchange::{ExchangeAdapter, LiveExchange, PaperExchange};
use crate::grid_engine::GridEngine;
use crate::journal::Journal;
use crate::order_manager::OrderManager;
use crate::position::PositionTracker;
use crate::risk::RiskSupervisor;
use crate::strategy::{NoopStrategy, Strategy};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

enum Command {
    Reconfigure {
        grid: GridConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Halt {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
}

pub struct Orchestrator {
    config: AsyncMutex<BotConfig>,
    journal: Arc<Journal>,
    exchange: Arc<dyn ExchangeAdapter>,
    paper: Option<Arc<PaperExchange>>,
    order_manager: Arc<OrderManager>,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskSupervisor>,
    trend_filter: Option<Arc<TrendFilter>>,
    stop_loss: Option<Arc<PositionStopLoss>>,
    pair_rotator: Option<Arc<PairRotator>>,
    ancillary_strategies: Vec<Arc<dyn Strategy>>,
    engines: AsyncMutex<HashMap<String, Arc<GridEngine>>>,
    status: AsyncMutex<BotStatus>,
    shutdown: Arc<AtomicBool>,
    command_tx: mpsc::Sender<Command>,
    command_rx: AsyncMutex<Option<mpsc::Receiver<Command>>>,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Builds every subsystem, reconciles and initializes each pair's grid,
    /// and spawns the main loop. Mirrors `BotOrchestrator.start` (§4.10).
    pub async fn start(config: BotConfig) -> Result<Arc<Self>> {
        let journal = Arc::new(Journal::open(&config.db_path).await.context("opening journal")?);

        let symbols: Vec<String> = config.grids.iter().map(|g| g.symbol.clone()).collect();
        let is_paper = config.paper_trading.enabled;

        let paper: Option<Arc<PaperExchange>> = is_paper.then(|| {
            let first_symbol = symbols.first().map(String::as_str).unwrap_or("BTC/USD");
            Arc::new(PaperExchange::new(
                config.paper_trading.initial_balance_quote,
                config.paper_trading.initial_balance_base,
                first_symbol,
                config.paper_trading.simulated_fee_pct / 100.0,
            ))
        });
        let exchange: Arc<dyn ExchangeAdapter> = if let Some(paper) = &paper {
            paper.clone()
        } else {
            let base_url = std::env::var("GRIDBOT_BASE_URL")
                .context("GRIDBOT_BASE_URL must be set for live trading")?;
            let api_key = std::env::var("GRIDBOT_API_KEY")
                .context("GRIDBOT_API_KEY must be set for live trading")?;
            let api_secret = std::env::var("GRIDBOT_API_SECRET")
                .context("GRIDBOT_API_SECRET must be set for live trading")?;
            let rate_per_sec = 1000.0 / config.exchange.rate_limit_ms.max(1) as f64;
            Arc::new(LiveExchange::new(base_url, api_key, api_secret, rate_per_sec, 5))
        };
        exchange.connect().await.context("connecting to exchange")?;

        let order_manager = Arc::new(OrderManager::new(exchange.clone(), journal.clone()));
        for symbol in &symbols {
            order_manager
                .reconcile_with_exchange(symbol)
                .await
                .with_context(|| format!("reconciling {symbol} on startup"))?;
        }

        let initial_quote = if is_paper {
            config.paper_trading.initial_balance_quote * (config.strategy_allocation.grid_pct / 100.0)
        } else {
            config.pool.initial_balance_quote
        };
        let tracker = Arc::new(PositionTracker::new(&symbols, initial_quote, journal.clone()));
        let risk = Arc::new(RiskSupervisor::new(config.risk.clone()));

        let trend_filter = config
            .trend_filter
            .enabled
            .then(|| Arc::new(TrendFilter::new(&config.trend_filter)));
        let stop_loss = config
            .position_stop_loss
            .enabled
            .then(|| Arc::new(PositionStopLoss::new(&config.position_stop_loss)));
        let pair_rotator = config
            .pair_rotation
            .enabled
            .then(|| Arc::new(PairRotator::new(&config.pair_rotation)));

        // Ancillary strategies (§4.10 point 4, §10.8): each configured slice
        // of the pool gets a tick hook, currently a no-op since
        // momentum-rider/dip-sniper logic itself is out of scope.
        let mut ancillary_strategies: Vec<Arc<dyn Strategy>> = Vec::new();
        if config.strategy_allocation.momentum_pct > 0.0 {
            ancillary_strategies.push(Arc::new(NoopStrategy::new("momentum")));
        }
        if config.strategy_allocation.dip_sniper_pct > 0.0 {
            ancillary_strategies.push(Arc::new(NoopStrategy::new("dip_sniper")));
        }

        let mut last_prices: HashMap<String, f64> = HashMap::new();
        let mut engines = HashMap::new();
        for grid_cfg in config.grids.clone() {
            let mut grid_cfg = grid_cfg;
            if let Some(paper) = &paper {
                // Re-center the grid around the configured midpoint, matching
                // the Python original's "auto-center on the live price" for
                // paper mode, but without a network call for the seed price.
                let live_price = (grid_cfg.lower + grid_cfg.upper) / 2.0;
                let range = grid_cfg.upper - grid_cfg.lower;
                grid_cfg.lower = live_price - range / 2.0;
                grid_cfg.upper = live_price + range / 2.0;
                paper.seed_price(&grid_cfg.symbol, live_price);
                last_prices.insert(grid_cfg.symbol.clone(), live_price);
            }
            let engine = Arc::new(GridEngine::new(
                grid_cfg.clone(),
                journal.clone(),
                exchange.clone(),
                order_manager.clone(),
                risk.clone(),
                tracker.clone(),
                trend_filter.clone(),
            ));
            engine.initialize_grid().await.with_context(|| format!("initializing grid {}", grid_cfg.symbol))?;
            engines.insert(grid_cfg.symbol.clone(), engine);
        }

        let (command_tx, command_rx) = mpsc::channel(16);
        let orchestrator = Arc::new(Self {
            config: AsyncMutex::new(config),
            journal,
            exchange,
            paper,
            order_manager,
            tracker,
            risk,
            trend_filter,
            stop_loss,
            pair_rotator,
            ancillary_strategies,
            engines: AsyncMutex::new(engines),
            status: AsyncMutex::new(BotStatus::Starting),
            shutdown: Arc::new(AtomicBool::new(false)),
            command_tx,
            command_rx: AsyncMutex::new(Some(command_rx)),
            loop_handle: AsyncMutex::new(None),
        });

        *orchestrator.status.lock().await = BotStatus::Running;
        log::info!("bot_running");

        let handle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run_loop().await }
        });
        *orchestrator.loop_handle.lock().await = Some(handle);

        Ok(orchestrator)
    }

    pub async fn status(&self) -> BotStatus {
        *self.status.lock().await
    }

    pub async fn position_tracker(&self) -> Arc<PositionTracker> {
        self.tracker.clone()
    }

    pub async fn engine_snapshot(&self) -> HashMap<String, Arc<GridEngine>> {
        self.engines.lock().await.clone()
    }

    async fn run_loop(self: Arc<Self>) {
        let mut command_rx = self
            .command_rx
            .lock()
            .await
            .take()
            .expect("run_loop entered twice");
        let mut last_snapshot = tokio::time::Instant::now();
        let mut last_prices: HashMap<String, f64> = HashMap::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            while let Ok(cmd) = command_rx.try_recv() {
                self.handle_command(cmd).await;
            }

            let symbols: Vec<String> = self.engines.lock().await.keys().cloned().collect();
            for symbol in &symbols {
                match self.exchange.get_ticker(symbol).await {
                    Ok(ticker) => {
                        last_prices.insert(symbol.clone(), ticker.last);
                    }
                    Err(e) => {
                        log::warn!("price_refresh_failed symbol={symbol} error={e}");
                    }
                }
            }
            if let Some(paper) = &self.paper {
                let filled = paper.simulate_prices(&last_prices);
                for order in filled {
                    if let Err(e) = self
                        .tracker
                        .record_fill(&order.symbol, order.side, order.amount, order.price, order.fee)
                        .await
                    {
                        log::error!("ledger_invariant_violated symbol={} error={e}", order.symbol);
                    }
                }
            }

            if let Some(filter) = &self.trend_filter {
                for (symbol, price) in &last_prices {
                    filter.record_price(symbol, *price);
                }
            }

            for symbol in &symbols {
                if let Err(e) = self.tick_pair(symbol, &last_prices).await {
                    log::error!("pair_tick_failed symbol={symbol} error={e}");
                }
            }

            for strategy in &self.ancillary_strategies {
                strategy.tick(&symbols, &last_prices, &self.tracker).await;
            }

            if let Some(rotator) = &self.pair_rotator {
                if rotator.should_evaluate() {
                    let scores = rotator.evaluate_pairs(&symbols, &self.tracker, self.trend_filter.as_deref());
                    for symbol in rotator.pairs_to_pause(&scores) {
                        if let Some(engine) = self.engines.lock().await.get(&symbol).cloned() {
                            engine.cancel_all_grid_orders().await;
                        }
                        rotator.sell_off_pair(&symbol, self.exchange.as_ref(), &self.tracker).await;
                    }
                }
            }

            let total_equity = self.tracker.total_equity_quote();
            if self.risk.check_drawdown(total_equity) {
                self.emergency_shutdown("drawdown_limit").await;
                break;
            }

            if last_snapshot.elapsed() >= SNAPSHOT_INTERVAL {
                self.tracker.save_snapshot(&last_prices).await;
                last_snapshot = tokio::time::Instant::now();
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// One pair's per-tick work (§4.10, §5): rotation/cooldown gates, stop-loss
    /// or take-profit, fill processing, and trailing rebalance.
    async fn tick_pair(&self, symbol: &str, last_prices: &HashMap<String, f64>) -> Result<()> {
        if let Some(rotator) = &self.pair_rotator {
            if rotator.is_paused(symbol) {
                return Ok(());
            }
        }
        if let Some(stop) = &self.stop_loss {
            if stop.is_in_cooldown(symbol) {
                return Ok(());
            }
        }

        let Some(&price) = last_prices.get(symbol) else {
            return Ok(());
        };
        self.tracker.update_unrealized(symbol, price);

        let engine = self
            .engines
            .lock()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no engine for {symbol}"))?;

        let grid_cfg = {
            let cfg = self.config.lock().await;
            cfg.grids.iter().find(|g| g.symbol == symbol).cloned()
        };
        let Some(grid_cfg) = grid_cfg else {
            return Ok(());
        };

        if let Some(stop) = &self.stop_loss {
            let pair = self.tracker.pair_state(symbol);
            if stop.should_trigger(symbol, &pair, price) {
                engine.cancel_all_grid_orders().await;
                stop.execute(symbol, self.exchange.as_ref(), &self.tracker).await;
                return Ok(());
            }
        }

        if !grid_cfg.trailing.enabled {
            if self.risk.check_stop_loss(symbol, price, grid_cfg.lower) {
                engine.cancel_all_grid_orders().await;
                return Ok(());
            }
            if self.risk.check_take_profit(symbol, price, grid_cfg.upper) {
                engine.cancel_all_grid_orders().await;
                return Ok(());
            }
        }

        let fill_count = engine.check_and_process_fills().await.context("checking fills")?;
        if fill_count > 0 {
            log::info!("fills_processed symbol={symbol} count={fill_count} price={price:.2}");
        }

        if grid_cfg.trailing.enabled {
            match engine.check_trailing(price).await {
                Ok(true) => log::info!(
                    "grid_trailing_rebalanced symbol={symbol} shifts={}",
                    engine.trailing_shift_count()
                ),
                Ok(false) => {}
                Err(e) => log::warn!("trailing_check_failed symbol={symbol} error={e}"),
            }
        }

        Ok(())
    }

    async fn handle_command(&self, cmd: Command) {
        match cmd {
            Command::Reconfigure { grid, reply } => {
                let result = self.apply_reconfigure(grid).await;
                let _ = reply.send(result);
            }
            Command::Halt { reply } => {
                self.risk.halt();
                *self.status.lock().await = BotStatus::Error;
                let _ = reply.send(Ok(()));
            }
            Command::Resume { reply } => {
                self.risk.reset_halt();
                *self.status.lock().await = BotStatus::Running;
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn apply_reconfigure(&self, new_grid: GridConfig) -> Result<()> {
        new_grid.validate().context("validating new grid config")?;
        let symbol = new_grid.symbol.clone();

        if let Some(old) = self.engines.lock().await.remove(&symbol) {
            old.cancel_all_grid_orders().await;
        }

        {
            let mut cfg = self.config.lock().await;
            if let Some(slot) = cfg.grids.iter_mut().find(|g| g.symbol == symbol) {
                *slot = new_grid.clone();
            } else {
                cfg.grids.push(new_grid.clone());
            }
        }

        let engine = Arc::new(GridEngine::new(
            new_grid,
            self.journal.clone(),
            self.exchange.clone(),
            self.order_manager.clone(),
            self.risk.clone(),
            self.tracker.clone(),
            self.trend_filter.clone(),
        ));
        engine.initialize_grid().await.context("initializing reconfigured grid")?;
        self.engines.lock().await.insert(symbol, engine);
        log::info!("bot_reconfigured");
        Ok(())
    }

    /// Queues a reconfigure request; serialized against the loop by the
    /// single-consumer command channel (§5).
    pub async fn reconfigure(&self, grid: GridConfig) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Reconfigure { grid, reply: reply_tx })
            .await
            .map_err(|_| anyhow!("orchestrator loop is not running"))?;
        reply_rx.await.map_err(|_| anyhow!("reconfigure reply dropped"))?
    }

    /// Operator-driven halt, serialized against the loop the same way as
    /// `reconfigure` (§10.5).
    pub async fn halt(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Halt { reply: reply_tx })
            .await
            .map_err(|_| anyhow!("orchestrator loop is not running"))?;
        reply_rx.await.map_err(|_| anyhow!("halt reply dropped"))?
    }

    pub async fn resume(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Resume { reply: reply_tx })
            .await
            .map_err(|_| anyhow!("orchestrator loop is not running"))?;
        reply_rx.await.map_err(|_| anyhow!("resume reply dropped"))?
    }

    pub fn risk_supervisor(&self) -> Arc<RiskSupervisor> {
        self.risk.clone()
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.engines.lock().await.keys().cloned().collect()
    }

    async fn emergency_shutdown(&self, reason: &str) {
        log::error!("emergency_shutdown reason={reason}");
        for engine in self.engines.lock().await.values() {
            engine.cancel_all_grid_orders().await;
        }
        *self.status.lock().await = BotStatus::Error;
    }

    /// Stops the loop, cancels every open grid order, snapshots, and closes
    /// the exchange and journal handles (§4.10).
    pub async fn stop(&self) {
        *self.status.lock().await = BotStatus::Stopping;
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        let mut cancelled = 0;
        for engine in self.engines.lock().await.values() {
            cancelled += engine.cancel_all_grid_orders().await;
        }
        log::info!("orders_cancelled_on_shutdown count={cancelled}");

        self.tracker.save_snapshot(&HashMap::new()).await;

        if let Err(e) = self.exchange.close().await {
            log::warn!("exchange_close_failed error={e}");
        }
        if let Err(e) = self.journal.close().await {
            log::warn!("journal_close_failed error={e}");
        }

        *self.status.lock().await = BotStatus::Stopped;
        log::info!("bot_stopped");
    }
}
