//! Periodic pair scoring and rotation of persistent losers (§4.7).
//!
//! Grounded on `original_source/src/strategy/pair_rotator.py`.

use super::{Trend, TrendFilter};
use crate::config::PairRotationConfig;
use crate::exchange::{ExchangeAdapter, OrderSide};
use crate::position::PositionTracker;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PairScore {
    pub symbol: String,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub trade_count: u64,
    pub trend: Trend,
    pub score: f64,
}

pub struct PairRotator {
    eval_interval: Duration,
    pause_threshold: f64,
    min_trades: u64,
    last_eval: Mutex<Instant>,
    paused: Mutex<HashMap<String, Instant>>,
}

impl PairRotator {
    pub fn new(cfg: &PairRotationConfig) -> Self {
        Self {
            eval_interval: Duration::from_secs_f64(cfg.interval_secs),
            pause_threshold: cfg.pause_threshold,
            min_trades: cfg.min_trades,
            last_eval: Mutex::new(Instant::now()),
            paused: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_paused(&self, symbol: &str) -> bool {
        self.paused.lock().unwrap().contains_key(symbol)
    }

    pub fn should_evaluate(&self) -> bool {
        self.last_eval.lock().unwrap().elapsed() >= self.eval_interval
    }

    pub fn evaluate_pairs(
        &self,
        symbols: &[String],
        tracker: &PositionTracker,
        trend_filter: Option<&TrendFilter>,
    ) -> Vec<PairScore> {
        *self.last_eval.lock().unwrap() = Instant::now();
        let mut scores = Vec::new();
        for symbol in symbols {
            let pair = tracker.pair_state(symbol);
            if pair.trade_count < self.min_trades {
                continue;
            }
            let trend = trend_filter.map(|t| t.trend(symbol)).unwrap_or(Trend::Neutral);
            let trend_bonus = match trend {
                Trend::Up => 0.5,
                Trend::Neutral => 0.0,
                Trend::Down => -0.5,
            };
            let score = pair.realized_pnl
                + pair.unrealized_pnl
                + (pair.trade_count as f64 * 0.01)
                + trend_bonus;
            log::info!(
                "pair_rotation_score symbol={symbol} score={score:.4} realized={:.4} unrealized={:.4} trades={}",
                pair.realized_pnl,
                pair.unrealized_pnl,
                pair.trade_count
            );
            scores.push(PairScore {
                symbol: symbol.clone(),
                realized_pnl: pair.realized_pnl,
                unrealized_pnl: pair.unrealized_pnl,
                trade_count: pair.trade_count,
                trend,
                score,
            });
        }
        scores
    }

    pub fn pairs_to_pause(&self, scores: &[PairScore]) -> Vec<String> {
        let mut to_pause = Vec::new();
        let mut paused = self.paused.lock().unwrap();
        for s in scores {
            if s.score < self.pause_threshold && !paused.contains_key(&s.symbol) {
                paused.insert(s.symbol.clone(), Instant::now());
                log::warn!(
                    "pair_rotation_paused symbol={} score={:.4} threshold={}",
                    s.symbol,
                    s.score,
                    self.pause_threshold
                );
                to_pause.push(s.symbol.clone());
            }
        }
        to_pause
    }

    pub async fn sell_off_pair(
        &self,
        symbol: &str,
        exchange: &dyn ExchangeAdapter,
        tracker: &PositionTracker,
    ) -> bool {
        let pair = tracker.pair_state(symbol);
        if pair.base_balance <= 0.0 {
            return true;
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
                    log::error!("pair_rotation_ledger_invariant_violated symbol={symbol} error={e}");
                }
                log::info!("pair_rotation_sold_off symbol={symbol} amount={fill_amount} price={fill_price}");
                true
            }
            Err(e) => {
                log::error!("pair_rotation_sell_failed symbol={symbol} error={e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_below_threshold_are_paused_once() {
        let cfg = PairRotationConfig {
            enabled: true,
            interval_secs: 1800.0,
            pause_threshold: -1.0,
            min_trades: 5,
        };
        let rotator = PairRotator::new(&cfg);
        let scores = vec![PairScore {
            symbol: "BTC/USD".into(),
            realized_pnl: -5.0,
            unrealized_pnl: -1.0,
            trade_count: 10,
            trend: Trend::Down,
            score: -6.5,
        }];
        let paused = rotator.pairs_to_pause(&scores);
        assert_eq!(paused, vec!["BTC/USD".to_string()]);
        assert!(rotator.is_paused("BTC/USD"));
        // Second evaluation against the same score must not re-pause.
        let paused_again = rotator.pairs_to_pause(&scores);
        assert!(paused_again.is_empty());
    }
}
