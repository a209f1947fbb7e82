//! Admission control for every order: pair-scoped halts and the global
//! drawdown halt (§4.9).
//!
//! Grounded on `original_source/src/risk/manager.py`, extended per §4.9 to
//! cover the full admission chain (max open orders, trend veto, extreme-fear
//! gate, per-pair/global position ceilings) that the Python original splits
//! across `RiskManager.can_place_order` and the defensive-signal modules.

use crate::config::RiskConfig;
use crate::defense::TrendFilter;
use crate::exchange::OrderSide;
use crate::order_manager::OrderManager;
use crate::position::PositionTracker;
use std::collections::HashSet;
use std::sync::Mutex;

pub struct RiskSupervisor {
    config: RiskConfig,
    global_halt: Mutex<bool>,
    pair_halts: Mutex<HashSet<String>>,
    peak_equity: Mutex<f64>,
}

impl RiskSupervisor {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            global_halt: Mutex::new(false),
            pair_halts: Mutex::new(HashSet::new()),
            peak_equity: Mutex::new(0.0),
        }
    }

    pub fn is_halted(&self) -> bool {
        *self.global_halt.lock().unwrap()
    }

    pub fn is_pair_halted(&self, symbol: &str) -> bool {
        self.pair_halts.lock().unwrap().contains(symbol)
    }

    /// Applied to every order admission (§4.9): global halt, pair halt, the
    /// open-order cap, trend/sentiment vetoes on buys, and capital ceilings.
    pub fn can_place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: f64,
        amount: f64,
        order_manager: &OrderManager,
        tracker: &PositionTracker,
        trend_filter: Option<&TrendFilter>,
        fear_greed_index: Option<i32>,
    ) -> bool {
        if self.is_halted() {
            log::warn!("risk_reject symbol={symbol} reason=global_halt");
            return false;
        }
        if self.is_pair_halted(symbol) {
            log::warn!("risk_reject symbol={symbol} reason=pair_halt");
            return false;
        }
        if order_manager.open_order_count() >= self.config.max_open_orders {
            log::warn!("risk_reject symbol={symbol} reason=max_open_orders");
            return false;
        }

        if side == OrderSide::Buy {
            if let Some(filter) = trend_filter {
                if !filter.should_allow_buy(symbol) {
                    log::warn!("risk_reject symbol={symbol} reason=trend_filter_down");
                    return false;
                }
            }
            if let Some(threshold) = self.config.extreme_fear_threshold {
                if let Some(reading) = fear_greed_index {
                    if reading <= threshold {
                        log::warn!("risk_reject symbol={symbol} reason=extreme_fear reading={reading}");
                        return false;
                    }
                }
            }

            let cost = amount * price;
            if !tracker.can_afford_buy(cost) {
                log::warn!("risk_reject symbol={symbol} reason=insufficient_pool_capital cost={cost}");
                return false;
            }

            let pair = tracker.pair_state(symbol);
            let pair_value = pair.base_balance * pair.avg_entry_price;
            if pair_value >= self.config.max_position_quote_per_pair {
                log::warn!("risk_reject symbol={symbol} reason=max_position_quote_per_pair");
                return false;
            }
            if tracker.total_base_value_quote() >= self.config.max_position_quote {
                log::warn!("risk_reject symbol={symbol} reason=max_position_quote");
                return false;
            }
        }

        true
    }

    pub fn check_stop_loss(&self, symbol: &str, price: f64, lower: f64) -> bool {
        let stop_price = lower * (1.0 - self.config.stop_loss_pct / 100.0);
        if price <= stop_price {
            log::error!(
                "stop_loss_triggered symbol={symbol} price={price} stop_price={stop_price:.2}"
            );
            self.pair_halts.lock().unwrap().insert(symbol.to_string());
            true
        } else {
            false
        }
    }

    pub fn check_take_profit(&self, symbol: &str, price: f64, upper: f64) -> bool {
        let tp_price = upper * (1.0 + self.config.take_profit_pct / 100.0);
        if price >= tp_price {
            log::info!("take_profit_triggered symbol={symbol} price={price} tp_price={tp_price:.2}");
            self.pair_halts.lock().unwrap().insert(symbol.to_string());
            true
        } else {
            false
        }
    }

    /// Maintains a running peak and trips the global halt once the drawdown
    /// from that peak reaches `max_drawdown_pct` (§4.9, §7 — drawdown is the
    /// one failure mode that always escalates globally).
    pub fn check_drawdown(&self, current_equity: f64) -> bool {
        let mut peak = self.peak_equity.lock().unwrap();
        *peak = peak.max(current_equity);
        if *peak > 0.0 {
            let drawdown_pct = (*peak - current_equity) / *peak * 100.0;
            if drawdown_pct >= self.config.max_drawdown_pct {
                log::error!("drawdown_halt drawdown_pct={drawdown_pct:.2}");
                *self.global_halt.lock().unwrap() = true;
                return true;
            }
        }
        false
    }

    pub fn reset_halt(&self) {
        *self.global_halt.lock().unwrap() = false;
        self.pair_halts.lock().unwrap().clear();
        log::info!("risk_halt_reset");
    }

    /// Manual operator-driven halt (§10.5's dashboard controls), distinct
    /// from the automatic trips above but using the same flag.
    pub fn halt(&self) {
        *self.global_halt.lock().unwrap() = true;
        log::warn!("risk_halt_manual");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RiskConfig {
        RiskConfig {
            max_position_quote: 5000.0,
            max_position_quote_per_pair: 2000.0,
            max_open_orders: 200,
            stop_loss_pct: 5.0,
            take_profit_pct: 3.0,
            max_drawdown_pct: 10.0,
            extreme_fear_threshold: None,
        }
    }

    #[test]
    fn drawdown_trips_only_past_threshold() {
        let risk = RiskSupervisor::new(cfg());
        assert!(!risk.check_drawdown(10_000.0));
        assert!(!risk.check_drawdown(9_500.0));
        assert!(risk.check_drawdown(8_900.0));
        assert!(risk.is_halted());
    }

    #[test]
    fn stop_loss_halts_only_the_triggering_pair() {
        let risk = RiskSupervisor::new(cfg());
        assert!(risk.check_stop_loss("BTC/USD", 51_700.0, 55_000.0));
        assert!(risk.is_pair_halted("BTC/USD"));
        assert!(!risk.is_pair_halted("ETH/USD"));
        assert!(!risk.is_halted());
    }

    #[test]
    fn reset_halt_clears_both_global_and_per_pair() {
        let risk = RiskSupervisor::new(cfg());
        risk.check_drawdown(10_000.0);
        risk.check_drawdown(8_000.0);
        risk.check_stop_loss("BTC/USD", 10.0, 100.0);
        risk.reset_halt();
        assert!(!risk.is_halted());
        assert!(!risk.is_pair_halted("BTC/USD"));
    }
}
