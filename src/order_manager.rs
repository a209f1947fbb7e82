//! Shared order lifecycle manager (§4.5): placement, fill polling, cancel,
//! reconciliation. One instance serves every pair.
//!
//! Grounded on `original_source/src/orders/manager.py`, translated from its
//! `_open_order_ids: set[str]` to a map so reconciliation and fill-checking
//! can filter by symbol without a second index.

use crate::errors::ManagerError;
use crate::exchange::{ExchangeAdapter, Order, OrderSide};
use crate::journal::Journal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

pub struct OrderManager {
    exchange: Arc<dyn ExchangeAdapter>,
    journal: Arc<Journal>,
    live: Mutex<HashMap<String, String>>,
}

impl OrderManager {
    pub fn new(exchange: Arc<dyn ExchangeAdapter>, journal: Arc<Journal>) -> Self {
        Self {
            exchange,
            journal,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn open_order_count_for_symbol(&self, symbol: &str) -> usize {
        self.live
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.as_str() == symbol)
            .count()
    }

    pub async fn place_grid_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
        grid_level_id: Option<i64>,
    ) -> Result<Order, ManagerError> {
        let order = self.exchange.place_limit(symbol, side, amount, price).await?;
        self.journal
            .insert_order(order.clone(), grid_level_id)
            .await?;
        self.live
            .lock()
            .unwrap()
            .insert(order.venue_order_id.clone(), symbol.to_string());
        log::info!(
            "order_placed side={side} price={price} amount={amount} order_id={}",
            order.venue_order_id
        );
        Ok(order)
    }

    /// Polls every tracked order for `symbol`. Terminal fills are removed
    /// from the live set and returned; partial fills update in place and
    /// stay tracked; any other outcome, including a transient poll error, is
    /// logged and left for the next tick (§7: operation failure does not halt).
    pub async fn check_fills(&self, symbol: &str) -> Vec<Order> {
        let ids: Vec<String> = self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.as_str() == symbol)
            .map(|(id, _)| id.clone())
            .collect();

        let mut filled = Vec::new();
        for id in ids {
            let order = match self.exchange.get_order(&id, symbol).await {
                Ok(o) => o,
                Err(e) => {
                    log::warn!("check_fills_poll_failed order_id={id} error={e}");
                    continue;
                }
            };
            if let Err(e) = self.journal.update_order(order.clone()).await {
                log::warn!("check_fills_journal_update_failed order_id={id} error={e}");
            }
            if order.status.is_terminal() {
                self.live.lock().unwrap().remove(&id);
                if matches!(order.status, crate::exchange::OrderStatus::Filled) {
                    log::info!(
                        "order_filled order_id={id} side={} price={:?}",
                        order.side,
                        order.avg_fill_price
                    );
                    filled.push(order);
                }
            }
        }
        filled
    }

    /// Not-found is treated as already-cancelled, per §4.5/§7.
    pub async fn cancel(&self, order_id: &str, symbol: &str) -> Result<bool, ManagerError> {
        let cancelled = self.exchange.cancel(order_id, symbol).await?;
        self.live.lock().unwrap().remove(order_id);
        if !cancelled {
            log::warn!("cancel_not_found order_id={order_id} symbol={symbol}");
        }
        if let Ok(mut order) = self.exchange.get_order(order_id, symbol).await {
            order.status = crate::exchange::OrderStatus::Cancelled;
            let _ = self.journal.update_order(order).await;
        }
        Ok(true)
    }

    pub async fn reconcile_with_exchange(&self, symbol: &str) -> Result<(), ManagerError> {
        let venue_orders = self.exchange.get_open_orders(symbol).await?;
        let venue_ids: std::collections::HashSet<String> = venue_orders
            .iter()
            .map(|o| o.venue_order_id.clone())
            .collect();

        let stale: Vec<String> = {
            let live = self.live.lock().unwrap();
            live.iter()
                .filter(|(id, s)| s.as_str() == symbol && !venue_ids.contains(*id))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &stale {
            if let Ok(mut order) = self.exchange.get_order(id, symbol).await {
                order.status = crate::exchange::OrderStatus::Cancelled;
                let _ = self.journal.update_order(order).await;
            }
        }

        {
            let mut live = self.live.lock().unwrap();
            live.retain(|_, s| s.as_str() != symbol);
            for id in venue_ids.iter() {
                live.insert(id.clone(), symbol.to_string());
            }
        }

        log::info!(
            "reconciled symbol={symbol} exchange_open={} stale_cancelled={}",
            venue_ids.len(),
            stale.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;

    async fn test_manager() -> (OrderManager, Arc<PaperExchange>) {
        let exchange = Arc::new(PaperExchange::new(10_000.0, 0.0, "BTC/USD", 0.0));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridbot.db");
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(dir);
        let journal = Arc::new(Journal::open(&path_str).await.unwrap());
        (OrderManager::new(exchange.clone(), journal), exchange)
    }

    #[tokio::test]
    async fn place_then_fill_removes_from_live_set() {
        let (mgr, exchange) = test_manager().await;
        exchange.seed_price("BTC/USD", 60_000.0);
        let order = mgr
            .place_grid_order("BTC/USD", OrderSide::Buy, 0.01, 59_000.0, None)
            .await
            .unwrap();
        assert_eq!(mgr.open_order_count(), 1);

        let mut tape = HashMap::new();
        tape.insert("BTC/USD".to_string(), 58_000.0);
        exchange.simulate_prices(&tape);

        let filled = mgr.check_fills("BTC/USD").await;
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].venue_order_id, order.venue_order_id);
        assert_eq!(mgr.open_order_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_drops_ids_missing_at_venue() {
        let (mgr, exchange) = test_manager().await;
        exchange.seed_price("BTC/USD", 60_000.0);
        let order = mgr
            .place_grid_order("BTC/USD", OrderSide::Buy, 0.01, 59_000.0, None)
            .await
            .unwrap();
        // Cancel directly at the venue, bypassing OrderManager, to simulate drift.
        exchange.cancel(&order.venue_order_id, "BTC/USD").await.unwrap();

        mgr.reconcile_with_exchange("BTC/USD").await.unwrap();
        assert_eq!(mgr.open_order_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let (mgr, exchange) = test_manager().await;
        exchange.seed_price("BTC/USD", 60_000.0);
        mgr.place_grid_order("BTC/USD", OrderSide::Buy, 0.01, 59_000.0, None)
            .await
            .unwrap();
        mgr.reconcile_with_exchange("BTC/USD").await.unwrap();
        let after_first = mgr.open_order_count();
        mgr.reconcile_with_exchange("BTC/USD").await.unwrap();
        assert_eq!(mgr.open_order_count(), after_first);
    }
}
