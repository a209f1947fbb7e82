//! Per-pair grid state machine: level lattice, fill mirroring, trailing
//! rebalance (§4.8).
//!
//! Grounded on `original_source/src/strategy/grid_engine.py`, generalized
//! from its single-adapter/single-manager constructor into one that takes
//! the shared `OrderManager`, `RiskSupervisor`, and `PositionTracker` used
//! by every pair (§2's "shared order manager" / "pooled... tracker").

use crate::config::GridConfig;
use crate::defense::TrendFilter;
use crate::errors::ManagerError;
use crate::exchange::{ExchangeAdapter, OrderSide};
use crate::grid_math::{self, Side};
use crate::journal::Journal;
use crate::order_manager::OrderManager;
use crate::position::PositionTracker;
use crate::risk::RiskSupervisor;
use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    Pending,
    Placed,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridLevel {
    pub id: i64,
    pub index: usize,
    pub price: f64,
    pub side: Side,
    pub status: LevelStatus,
    pub venue_order_id: Option<String>,
}

pub struct GridEngine {
    symbol: String,
    config: Mutex<GridConfig>,
    journal: Arc<Journal>,
    exchange: Arc<dyn ExchangeAdapter>,
    order_manager: Arc<OrderManager>,
    risk: Arc<RiskSupervisor>,
    tracker: Arc<PositionTracker>,
    trend_filter: Option<Arc<TrendFilter>>,
    levels: Mutex<Vec<GridLevel>>,
    config_id: Mutex<Option<i64>>,
    trailing_shift_count: Mutex<u64>,
    last_trailing_shift: Mutex<Option<Instant>>,
}

impl GridEngine {
    pub fn new(
        config: GridConfig,
        journal: Arc<Journal>,
        exchange: Arc<dyn ExchangeAdapter>,
        order_manager: Arc<OrderManager>,
        risk: Arc<RiskSupervisor>,
        tracker: Arc<PositionTracker>,
        trend_filter: Option<Arc<TrendFilter>>,
    ) -> Self {
        Self {
            symbol: config.symbol.clone(),
            config: Mutex::new(config),
            journal,
            exchange,
            order_manager,
            risk,
            tracker,
            trend_filter,
            levels: Mutex::new(Vec::new()),
            config_id: Mutex::new(None),
            trailing_shift_count: Mutex::new(0),
            last_trailing_shift: Mutex::new(None),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn levels(&self) -> Vec<GridLevel> {
        self.levels.lock().unwrap().clone()
    }

    pub fn trailing_shift_count(&self) -> u64 {
        *self.trailing_shift_count.lock().unwrap()
    }

    fn admit(&self, side: OrderSide, price: f64, amount: f64) -> bool {
        self.risk.can_place_order(
            &self.symbol,
            side,
            price,
            amount,
            &self.order_manager,
            &self.tracker,
            self.trend_filter.as_deref(),
            None,
        )
    }

    fn order_amount(&self, cfg: &GridConfig, price: f64) -> Option<f64> {
        match grid_math::amount(cfg.order_size_quote, cfg.order_size_base, price) {
            Ok(a) => Some(a),
            Err(e) => {
                log::error!("grid_engine_amount_error symbol={} error={e}", self.symbol);
                None
            }
        }
    }

    /// Reads the current price, lays out a fresh lattice, and places every
    /// level the risk supervisor admits. A single level's placement failure
    /// is logged and that level stays `pending` — initialization itself
    /// never aborts (§4.8).
    pub async fn initialize_grid(&self) -> Result<(), ManagerError> {
        let ticker = self.exchange.get_ticker(&self.symbol).await?;
        let cfg = self.config.lock().unwrap().clone();
        let raw_levels = grid_math::levels(cfg.lower, cfg.upper, cfg.num_levels, cfg.spacing);
        let sided = grid_math::sides(&raw_levels, ticker.last);

        let config_id = self
            .journal
            .insert_grid_config(cfg.clone())
            .await
            .map_err(ManagerError::from)?;
        *self.config_id.lock().unwrap() = Some(config_id);

        let mut new_levels = Vec::with_capacity(sided.len());
        let mut placed = 0usize;
        for (index, (price, side)) in sided.into_iter().enumerate() {
            let level_id = self
                .journal
                .insert_grid_level(config_id, index, price, side)
                .await
                .map_err(ManagerError::from)?;
            let mut level = GridLevel {
                id: level_id,
                index,
                price,
                side,
                status: LevelStatus::Pending,
                venue_order_id: None,
            };

            if let Some(amount) = self.order_amount(&cfg, price) {
                let order_side: OrderSide = side.into();
                if self.admit(order_side, price, amount) {
                    match self
                        .order_manager
                        .place_grid_order(&self.symbol, order_side, amount, price, Some(level_id))
                        .await
                    {
                        Ok(order) => {
                            level.status = LevelStatus::Placed;
                            level.venue_order_id = Some(order.venue_order_id.clone());
                            self.journal
                                .update_grid_level(level_id, "placed", Some(order.venue_order_id), None)
                                .await
                                .map_err(ManagerError::from)?;
                            placed += 1;
                        }
                        Err(e) => {
                            log::warn!(
                                "grid_level_place_failed symbol={} index={index} error={e}",
                                self.symbol
                            );
                        }
                    }
                }
            }
            new_levels.push(level);
        }

        *self.levels.lock().unwrap() = new_levels;
        log::info!(
            "grid_initialized symbol={} levels={} orders_placed={placed} price={}",
            self.symbol,
            raw_levels.len(),
            ticker.last
        );
        Ok(())
    }

    /// Mirrors a fill one level away: a buy fill places the opposite sell at
    /// the next-higher level, a sell fill places the opposite buy at the
    /// next-lower level. Out-of-range mirrors and risk-rejected mirrors are
    /// silently dropped (§9's open question, preserved as specified).
    async fn on_fill(&self, filled_index: usize) -> Result<(), ManagerError> {
        let (side, filled_id) = {
            let mut levels = self.levels.lock().unwrap();
            let Some(level) = levels.get_mut(filled_index) else {
                return Ok(());
            };
            level.status = LevelStatus::Filled;
            (level.side, level.id)
        };
        self.journal
            .update_grid_level(filled_id, "filled", None, None)
            .await
            .map_err(ManagerError::from)?;

        let mirror_index: Option<usize> = match side {
            Side::Buy => Some(filled_index + 1),
            Side::Sell => filled_index.checked_sub(1),
        };
        let Some(mirror_index) = mirror_index else {
            return Ok(());
        };

        let mirror = {
            let levels = self.levels.lock().unwrap();
            levels.get(mirror_index).cloned()
        };
        let Some(mirror) = mirror else {
            return Ok(());
        };

        let cfg = self.config.lock().unwrap().clone();
        let Some(amount) = self.order_amount(&cfg, mirror.price) else {
            return Ok(());
        };
        let opposite_side: OrderSide = side.opposite().into();
        if !self.admit(opposite_side, mirror.price, amount) {
            return Ok(());
        }

        match self
            .order_manager
            .place_grid_order(&self.symbol, opposite_side, amount, mirror.price, Some(mirror.id))
            .await
        {
            Ok(order) => {
                self.journal
                    .update_grid_level(
                        mirror.id,
                        "placed",
                        Some(order.venue_order_id.clone()),
                        Some(side.opposite()),
                    )
                    .await
                    .map_err(ManagerError::from)?;
                let mut levels = self.levels.lock().unwrap();
                if let Some(m) = levels.get_mut(mirror_index) {
                    m.side = side.opposite();
                    m.status = LevelStatus::Placed;
                    m.venue_order_id = Some(order.venue_order_id);
                }
            }
            Err(e) => {
                log::warn!(
                    "grid_mirror_place_failed symbol={} mirror_index={mirror_index} error={e}",
                    self.symbol
                );
            }
        }
        Ok(())
    }

    pub async fn check_and_process_fills(&self) -> Result<usize, ManagerError> {
        let fills = self.order_manager.check_fills(&self.symbol).await;
        let count = fills.len();
        for order in fills {
            let index = {
                let levels = self.levels.lock().unwrap();
                levels
                    .iter()
                    .find(|l| l.venue_order_id.as_deref() == Some(order.venue_order_id.as_str()))
                    .map(|l| l.index)
            };
            if let Some(index) = index {
                self.on_fill(index).await?;
            }
        }
        Ok(count)
    }

    pub async fn cancel_all_grid_orders(&self) -> usize {
        let placed: Vec<(usize, i64, String)> = {
            let levels = self.levels.lock().unwrap();
            levels
                .iter()
                .filter(|l| l.status == LevelStatus::Placed)
                .filter_map(|l| l.venue_order_id.clone().map(|id| (l.index, l.id, id)))
                .collect()
        };

        let mut count = 0;
        for (index, level_id, venue_order_id) in placed {
            if let Err(e) = self.order_manager.cancel(&venue_order_id, &self.symbol).await {
                log::warn!(
                    "grid_cancel_failed symbol={} index={index} error={e}",
                    self.symbol
                );
                continue;
            }
            if let Err(e) = self
                .journal
                .update_grid_level(level_id, "cancelled", None, None)
                .await
            {
                log::warn!("grid_level_cancel_journal_failed level_id={level_id} error={e}");
            }
            let mut levels = self.levels.lock().unwrap();
            if let Some(l) = levels.get_mut(index) {
                l.status = LevelStatus::Cancelled;
            }
            count += 1;
        }
        log::info!("grid_orders_cancelled symbol={} count={count}", self.symbol);
        count
    }

    /// Shifts the grid toward the side the price has drifted to, gated by
    /// `trailing.enabled` and a per-engine cooldown (§4.8).
    pub async fn check_trailing(&self, current_price: f64) -> Result<bool, ManagerError> {
        let (enabled, cooldown) = {
            let cfg = self.config.lock().unwrap();
            (cfg.trailing.enabled, Duration::from_secs_f64(cfg.trailing.cooldown_secs))
        };
        if !enabled {
            return Ok(false);
        }
        if let Some(last) = *self.last_trailing_shift.lock().unwrap() {
            if last.elapsed() < cooldown {
                return Ok(false);
            }
        }

        let (lower, upper, trigger_pct, rebalance_pct) = {
            let cfg = self.config.lock().unwrap();
            (cfg.lower, cfg.upper, cfg.trailing.trigger_pct, cfg.trailing.rebalance_pct)
        };
        let range = upper - lower;
        let position_in_range = (current_price - lower) / range;
        let trigger = trigger_pct / 100.0;
        let rebalance = rebalance_pct / 100.0;

        let shift_amount = if position_in_range >= trigger {
            range * rebalance
        } else if position_in_range <= 1.0 - trigger {
            -(range * rebalance)
        } else {
            return Ok(false);
        };

        let new_lower = lower + shift_amount;
        let new_upper = upper + shift_amount;
        if new_lower <= 0.0 {
            return Ok(false);
        }

        log::info!(
            "trailing_grid_shift symbol={} old_range={lower:.2}-{upper:.2} new_range={new_lower:.2}-{new_upper:.2} trigger_price={current_price:.2}",
            self.symbol
        );

        self.cancel_all_grid_orders().await;
        {
            let mut cfg = self.config.lock().unwrap();
            cfg.lower = new_lower;
            cfg.upper = new_upper;
        }
        self.initialize_grid().await?;

        *self.trailing_shift_count.lock().unwrap() += 1;
        *self.last_trailing_shift.lock().unwrap() = Some(Instant::now());
        Ok(true)
    }
}
