//! Shared state handed to every axum handler (§10.5).
//!
//! Grounded on `betterbot-backend`'s `AppState` (`main.rs`), trimmed to the
//! single `Arc<Orchestrator>` plus the broadcast sender the snapshot loop
//! feeds.

use crate::orchestrator::Orchestrator;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
pub struct PairSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub base_balance: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub trade_count: u64,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: String,
    pub total_equity: f64,
    pub pool_available_quote: f64,
    pub pool_secured_profits: f64,
    pub pool_total_fees: f64,
    pub halted: bool,
    pub pairs: Vec<PairSnapshot>,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub snapshot_tx: broadcast::Sender<StatusSnapshot>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let (snapshot_tx, _) = broadcast::channel(64);
        Self { orchestrator, snapshot_tx }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let status = self.orchestrator.status().await;
        let tracker = self.orchestrator.position_tracker().await;
        let risk = self.orchestrator.risk_supervisor();
        let pool = tracker.pool_state();
        let symbols = self.orchestrator.symbols().await;

        let pairs = symbols
            .iter()
            .map(|symbol| {
                let pair = tracker.pair_state(symbol);
                PairSnapshot {
                    symbol: symbol.clone(),
                    current_price: pair.avg_entry_price,
                    base_balance: pair.base_balance,
                    avg_entry_price: pair.avg_entry_price,
                    realized_pnl: pair.realized_pnl,
                    unrealized_pnl: pair.unrealized_pnl,
                    trade_count: pair.trade_count,
                    halted: risk.is_pair_halted(symbol),
                }
            })
            .collect();

        StatusSnapshot {
            status: format!("{status:?}").to_lowercase(),
            total_equity: tracker.total_equity_quote(),
            pool_available_quote: pool.available_quote,
            pool_secured_profits: pool.secured_profits,
            pool_total_fees: pool.total_fees,
            halted: risk.is_halted(),
            pairs,
        }
    }

    /// Publishes the current snapshot to every `/ws/status` subscriber.
    /// A send error just means nobody is listening right now.
    pub async fn publish_snapshot(&self) {
        let snapshot = self.snapshot().await;
        let _ = self.snapshot_tx.send(snapshot);
    }
}
