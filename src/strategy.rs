//! Pluggable ancillary strategies sharing the pool's allocation alongside
//! the grid (§4.10 point 4, §10.8).
//!
//! Grounded on `original_source/src/strategy/base.py`'s `Strategy`
//! interface. Momentum-rider and dip-sniper are out of scope for this
//! core (§10.8) — only the trait and a no-op default are built, so the
//! orchestrator's tick-ordering is real and testable without them.

use crate::position::PositionTracker;
use async_trait::async_trait;
use std::collections::HashMap;

/// One ancillary strategy's per-tick hook, run after the grid tick and
/// before pair-rotation evaluation (§4.10 point 4).
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn tick(
        &self,
        symbols: &[String],
        last_prices: &HashMap<String, f64>,
        tracker: &PositionTracker,
    );
}

/// Allocation-aware placeholder for momentum-rider/dip-sniper (§10.8):
/// claims its configured slice of the pool but never trades it.
pub struct NoopStrategy {
    name: String,
}

impl NoopStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Strategy for NoopStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tick(&self, symbols: &[String], _last_prices: &HashMap<String, f64>, _tracker: &PositionTracker) {
        log::debug!("strategy_tick_noop name={} symbols={}", self.name, symbols.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;
    use std::sync::Arc;

    async fn test_tracker() -> PositionTracker {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridbot.db");
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(dir);
        let journal = Arc::new(Journal::open(&path_str).await.unwrap());
        PositionTracker::new(&["BTC/USD".to_string()], 1000.0, journal)
    }

    #[tokio::test]
    async fn noop_strategy_ticks_without_touching_the_pool() {
        let tracker = test_tracker().await;
        let strategy = NoopStrategy::new("momentum");
        let mut prices = HashMap::new();
        prices.insert("BTC/USD".to_string(), 60_000.0);

        strategy
            .tick(&["BTC/USD".to_string()], &prices, &tracker)
            .await;

        assert_eq!(strategy.name(), "momentum");
        assert_eq!(tracker.pool_state().available_quote, 1000.0);
    }
}
