//! Pooled, multi-pair position and P&L tracker (§4.6, §3).
//!
//! Grounded on `original_source/src/position/tracker.py`. The Python
//! original keeps a venue handle for ticker polling; here the orchestrator
//! owns that call and pushes last prices in, which keeps this module free of
//! any `ExchangeAdapter` dependency.

use crate::errors::InvariantError;
use crate::exchange::OrderSide;
use crate::journal::{Journal, SnapshotRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PairPositionState {
    pub symbol: String,
    pub base_balance: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub trade_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolState {
    pub available_quote: f64,
    pub secured_profits: f64,
    pub total_fees: f64,
    pub total_trade_count: u64,
}

pub struct PositionTracker {
    journal: Arc<Journal>,
    pool: Mutex<PoolState>,
    pairs: Mutex<HashMap<String, PairPositionState>>,
}

impl PositionTracker {
    pub fn new(symbols: &[String], initial_quote: f64, journal: Arc<Journal>) -> Self {
        let pairs = symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    PairPositionState {
                        symbol: s.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            journal,
            pool: Mutex::new(PoolState {
                available_quote: initial_quote,
                ..Default::default()
            }),
            pairs: Mutex::new(pairs),
        }
    }

    /// Applies one fill's ledger effects (§4.6, §3's pool invariant). Buys
    /// grow `base_balance` and recompute the weighted-average entry price;
    /// sells realize P&L and, on a profitable close, move that profit out of
    /// `available_quote` into `secured_profits` so available funds never
    /// double-count gains already retained (§9).
    pub async fn record_fill(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
        fee: f64,
    ) -> Result<(), InvariantError> {
        let mut pairs = self.pairs.lock().unwrap();
        let pair = pairs
            .entry(symbol.to_string())
            .or_insert_with(|| PairPositionState {
                symbol: symbol.to_string(),
                ..Default::default()
            });
        let mut pool = self.pool.lock().unwrap();

        match side {
            OrderSide::Buy => {
                let cost_before = pair.base_balance * pair.avg_entry_price;
                let cost_new = amount * price;
                pair.base_balance += amount;
                pool.available_quote -= amount * price + fee;
                if pair.base_balance > 0.0 {
                    pair.avg_entry_price = (cost_before + cost_new) / pair.base_balance;
                }
            }
            OrderSide::Sell => {
                let profit = (price - pair.avg_entry_price) * amount - fee;
                pair.realized_pnl += profit;
                pair.base_balance -= amount;
                pool.available_quote += amount * price - fee;
                if profit > 0.0 {
                    pool.secured_profits += profit;
                    pool.available_quote -= profit;
                }
                if pair.base_balance < -1e-9 {
                    return Err(InvariantError::Violated(format!(
                        "{symbol}: base_balance went negative ({})",
                        pair.base_balance
                    )));
                }
                if pair.base_balance <= 0.0 {
                    pair.base_balance = pair.base_balance.max(0.0);
                    pair.avg_entry_price = 0.0;
                }
            }
        }

        pool.total_fees += fee;
        pair.trade_count += 1;
        pool.total_trade_count += 1;

        let (symbol, price, amount, fee, realized_pnl) = (
            symbol.to_string(),
            price,
            amount,
            fee,
            pair.realized_pnl,
        );
        drop(pairs);
        drop(pool);
        if let Err(e) = self
            .journal
            .insert_trade(symbol, price, amount, fee, realized_pnl)
            .await
        {
            log::warn!("trade_journal_write_failed error={e}");
        }
        Ok(())
    }

    pub fn can_afford_buy(&self, cost_quote: f64) -> bool {
        self.pool.lock().unwrap().available_quote >= cost_quote
    }

    pub fn update_unrealized(&self, symbol: &str, last_price: f64) -> f64 {
        let mut pairs = self.pairs.lock().unwrap();
        let pair = pairs.entry(symbol.to_string()).or_default();
        pair.unrealized_pnl = if pair.base_balance > 0.0 {
            (last_price - pair.avg_entry_price) * pair.base_balance
        } else {
            0.0
        };
        pair.unrealized_pnl
    }

    pub fn pair_state(&self, symbol: &str) -> PairPositionState {
        self.pairs
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.lock().unwrap().clone()
    }

    pub fn total_base_value_quote(&self) -> f64 {
        self.pairs
            .lock()
            .unwrap()
            .values()
            .map(|p| p.base_balance * p.avg_entry_price)
            .sum()
    }

    pub fn total_equity_quote(&self) -> f64 {
        let pool = self.pool.lock().unwrap();
        let pairs_value: f64 = self
            .pairs
            .lock()
            .unwrap()
            .values()
            .map(|p| p.base_balance * p.avg_entry_price + p.unrealized_pnl)
            .sum();
        pool.available_quote + pool.secured_profits + pairs_value
    }

    pub async fn save_snapshot(&self, last_prices: &HashMap<String, f64>) {
        let pool = self.pool_state();
        let pairs: Vec<PairPositionState> = self.pairs.lock().unwrap().values().cloned().collect();
        let total_equity = self.total_equity_quote();
        for pair in pairs {
            let price = *last_prices
                .get(&pair.symbol)
                .unwrap_or(&pair.avg_entry_price);
            let record = SnapshotRecord {
                symbol: pair.symbol.clone(),
                base_balance: pair.base_balance,
                quote_balance: pool.available_quote,
                avg_entry_price: pair.avg_entry_price,
                price,
                unrealized_pnl: pair.unrealized_pnl,
                realized_pnl: pair.realized_pnl,
                secured_profits: pool.secured_profits,
                total_equity,
            };
            if let Err(e) = self.journal.insert_snapshot(record).await {
                log::warn!("snapshot_write_failed symbol={} error={e}", pair.symbol);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_tracker(symbols: &[&str], initial_quote: f64) -> PositionTracker {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridbot.db");
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(dir);
        let journal = Arc::new(Journal::open(&path_str).await.unwrap());
        let symbols: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        PositionTracker::new(&symbols, initial_quote, journal)
    }

    #[tokio::test]
    async fn buy_then_sell_moves_profit_into_secured() {
        let tracker = test_tracker(&["BTC/USD"], 10_000.0).await;
        tracker
            .record_fill("BTC/USD", OrderSide::Buy, 0.1, 59_000.0, 5.0)
            .await
            .unwrap();
        let pair = tracker.pair_state("BTC/USD");
        assert!((pair.avg_entry_price - 59_000.0).abs() < 1e-6);

        tracker
            .record_fill("BTC/USD", OrderSide::Sell, 0.1, 61_000.0, 6.0)
            .await
            .unwrap();
        let pool = tracker.pool_state();
        assert!(pool.secured_profits > 0.0);
        let pair = tracker.pair_state("BTC/USD");
        assert_eq!(pair.base_balance, 0.0);
        assert_eq!(pair.trade_count, 2);
    }

    #[tokio::test]
    async fn ledger_conserves_cash_across_a_sequence_of_fills() {
        // available + secured must always equal initial plus net cash flow
        // from every fill (proceeds minus costs minus fees) -- this holds
        // unconditionally, independent of whether the trades were profitable.
        let initial = 10_000.0;
        let tracker = test_tracker(&["BTC/USD"], initial).await;
        let fills = [
            (OrderSide::Buy, 0.05, 58_000.0, 3.0),
            (OrderSide::Buy, 0.05, 59_000.0, 3.0),
            (OrderSide::Sell, 0.05, 60_000.0, 3.0),
            (OrderSide::Sell, 0.05, 61_000.0, 3.0),
        ];
        let mut net_cash_flow = 0.0;
        for (side, amount, price, fee) in fills {
            tracker.record_fill("BTC/USD", side, amount, price, fee).await.unwrap();
            net_cash_flow += match side {
                OrderSide::Buy => -(amount * price + fee),
                OrderSide::Sell => amount * price - fee,
            };
        }
        let pool = tracker.pool_state();
        let wealth = pool.available_quote + pool.secured_profits;
        assert!(
            (wealth - (initial + net_cash_flow)).abs() < 1e-6,
            "wealth={wealth} expected={}",
            initial + net_cash_flow
        );
        // Every trade's fee was deducted exactly once into total_fees.
        assert!((pool.total_fees - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn can_afford_buy_reflects_available_quote() {
        let tracker = test_tracker(&["BTC/USD"], 1000.0).await;
        assert!(tracker.can_afford_buy(999.0));
        assert!(!tracker.can_afford_buy(1000.01));
    }
}
