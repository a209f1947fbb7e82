//! SMA-crossover trend detection on polled prices (§4.7).
//!
//! Grounded on `original_source/src/strategy/trend_filter.py`: a bounded
//! ring buffer per symbol, short/long SMA crossover, `NEUTRAL` (allow
//! everything) until the long window has filled.

use crate::config::TrendFilterConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

pub struct TrendFilter {
    short_window: usize,
    long_window: usize,
    histories: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl TrendFilter {
    pub fn new(cfg: &TrendFilterConfig) -> Self {
        Self {
            short_window: cfg.short_window,
            long_window: cfg.long_window,
            histories: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_price(&self, symbol: &str, price: f64) {
        let mut histories = self.histories.lock().unwrap();
        let history = histories
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.long_window));
        history.push_back(price);
        while history.len() > self.long_window {
            history.pop_front();
        }
    }

    pub fn data_points(&self, symbol: &str) -> usize {
        self.histories
            .lock()
            .unwrap()
            .get(symbol)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn trend(&self, symbol: &str) -> Trend {
        let histories = self.histories.lock().unwrap();
        let Some(history) = histories.get(symbol) else {
            return Trend::Neutral;
        };
        if history.len() < self.long_window {
            return Trend::Neutral;
        }
        let prices: Vec<f64> = history.iter().copied().collect();
        let long_sma: f64 = prices.iter().sum::<f64>() / self.long_window as f64;
        let short_sma: f64 =
            prices[prices.len() - self.short_window..].iter().sum::<f64>() / self.short_window as f64;
        if short_sma > long_sma {
            Trend::Up
        } else if short_sma < long_sma {
            Trend::Down
        } else {
            Trend::Neutral
        }
    }

    /// Only a confirmed downtrend vetoes a buy (§4.7, §4.9).
    pub fn should_allow_buy(&self, symbol: &str) -> bool {
        let trend = self.trend(symbol);
        if trend == Trend::Down {
            log::info!("trend_filter_blocked_buy symbol={symbol}");
            false
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(short: usize, long: usize) -> TrendFilterConfig {
        TrendFilterConfig {
            enabled: true,
            short_window: short,
            long_window: long,
        }
    }

    #[test]
    fn returns_neutral_until_long_window_fills() {
        let filter = TrendFilter::new(&cfg(2, 5));
        for p in [100.0, 101.0, 102.0] {
            filter.record_price("BTC/USD", p);
        }
        assert_eq!(filter.trend("BTC/USD"), Trend::Neutral);
        assert!(filter.should_allow_buy("BTC/USD"));
    }

    #[test]
    fn detects_uptrend_and_downtrend() {
        let filter = TrendFilter::new(&cfg(2, 4));
        for p in [100.0, 100.0, 110.0, 120.0] {
            filter.record_price("BTC/USD", p);
        }
        assert_eq!(filter.trend("BTC/USD"), Trend::Up);

        let filter2 = TrendFilter::new(&cfg(2, 4));
        for p in [120.0, 110.0, 100.0, 90.0] {
            filter2.record_price("ETH/USD", p);
        }
        assert_eq!(filter2.trend("ETH/USD"), Trend::Down);
        assert!(!filter2.should_allow_buy("ETH/USD"));
    }
}
