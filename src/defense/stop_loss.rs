//! Per-pair position stop-loss on unrealized P&L (§4.7).
//!
//! Grounded on `original_source/src/risk/position_stop_loss.py`.

use crate::config::PositionStopLossConfig;
use crate::exchange::{ExchangeAdapter, OrderSide};
use crate::position::{PairPositionState, PositionTracker};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct PositionStopLoss {
    threshold_pct: f64,
    cooldown: Duration,
    triggered_at: Mutex<HashMap<String, Instant>>,
}

impl PositionStopLoss {
    pub fn new(cfg: &PositionStopLossConfig) -> Self {
        Self {
            threshold_pct: cfg.threshold_pct,
            cooldown: Duration::from_secs_f64(cfg.cooldown_secs),
            triggered_at: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_in_cooldown(&self, symbol: &str) -> bool {
        let mut map = self.triggered_at.lock().unwrap();
        match map.get(symbol) {
            Some(since) if since.elapsed() >= self.cooldown => {
                map.remove(symbol);
                log::info!("position_stop_loss_cooldown_expired symbol={symbol}");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn cooldown_remaining(&self, symbol: &str) -> Duration {
        let map = self.triggered_at.lock().unwrap();
        match map.get(symbol) {
            Some(since) => self.cooldown.saturating_sub(since.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn should_trigger(&self, symbol: &str, pair: &PairPositionState, current_price: f64) -> bool {
        if self.is_in_cooldown(symbol) {
            return false;
        }
        if pair.base_balance <= 0.0 {
            return false;
        }
        let position_value = pair.base_balance * pair.avg_entry_price;
        if position_value <= 0.0 {
            return false;
        }
        let unrealized_pnl = (current_price - pair.avg_entry_price) * pair.base_balance;
        let loss_pct = (unrealized_pnl / position_value).abs() * 100.0;
        if unrealized_pnl < 0.0 && loss_pct >= self.threshold_pct {
            log::warn!(
                "position_stop_loss_triggered symbol={symbol} unrealized_pnl={unrealized_pnl:.4} loss_pct={loss_pct:.2}"
            );
            true
        } else {
            false
        }
    }

    /// Sells the entire base balance at market and starts the pair's cooldown.
    pub async fn execute(
        &self,
        symbol: &str,
        exchange: &dyn ExchangeAdapter,
        tracker: &PositionTracker,
    ) -> bool {
        let pair = tracker.pair_state(symbol);
        if pair.base_balance <= 0.0 {
            return false;
        }
        match exchange.place_market(symbol, OrderSide::Sell, pair.base_balance).await {
            Ok(order) => {
                let fill_amount = if order.filled_amount > 0.0 {
                    order.filled_amount
                } else {
                    pair.base_balance
                };
                let fill_price = order.avg_fill_price.unwrap_or(order.price);
                if let Err(e) = tracker
                    .record_fill(symbol, OrderSide::Sell, fill_amount, fill_price, order.fee)
                    .await
                {
                    log::error!("position_stop_loss_ledger_invariant_violated symbol={symbol} error={e}");
                }
                self.triggered_at
                    .lock()
                    .unwrap()
                    .insert(symbol.to_string(), Instant::now());
                log::warn!(
                    "position_stop_loss_executed symbol={symbol} amount={fill_amount} price={fill_price}"
                );
                true
            }
            Err(e) => {
                log::error!("position_stop_loss_failed symbol={symbol} error={e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PositionStopLossConfig {
        PositionStopLossConfig {
            enabled: true,
            threshold_pct: 2.0,
            cooldown_secs: 300.0,
        }
    }

    #[test]
    fn triggers_on_sufficient_unrealized_loss() {
        let stop = PositionStopLoss::new(&cfg());
        let pair = PairPositionState {
            symbol: "BTC/USD".into(),
            base_balance: 1.0,
            avg_entry_price: 100.0,
            ..Default::default()
        };
        assert!(stop.should_trigger("BTC/USD", &pair, 97.0));
        assert!(!stop.should_trigger("BTC/USD", &pair, 99.5));
    }

    #[test]
    fn does_not_trigger_with_no_position() {
        let stop = PositionStopLoss::new(&cfg());
        let pair = PairPositionState::default();
        assert!(!stop.should_trigger("BTC/USD", &pair, 50.0));
    }
}
