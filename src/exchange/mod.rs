//! ExchangeAdapter capability contract (§4.3) and its two implementations.

mod live;
mod paper;
mod rate_limiter;

pub use live::LiveExchange;
pub use paper::PaperExchange;
pub use rate_limiter::RateLimiter;

use crate::errors::ExchangeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl From<crate::grid_math::Side> for OrderSide {
    fn from(s: crate::grid_math::Side) -> Self {
        match s {
            crate::grid_math::Side::Buy => OrderSide::Buy,
            crate::grid_math::Side::Sell => OrderSide::Sell,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub free: HashMap<String, f64>,
    pub used: HashMap<String, f64>,
    pub total: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub venue_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub filled_amount: f64,
    pub avg_fill_price: Option<f64>,
    pub fee: f64,
    pub status: OrderStatus,
    pub ts_ms: i64,
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Uniform contract over a live venue and the deterministic paper simulator (§4.3).
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), ExchangeError>;
    async fn close(&self) -> Result<(), ExchangeError>;
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
    async fn get_balance(&self) -> Result<Balance, ExchangeError>;
    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> Result<Order, ExchangeError>;
    /// Executes immediately at the current price; the returned order MUST
    /// carry `avg_fill_price` (§4.3).
    async fn place_market(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
    ) -> Result<Order, ExchangeError>;
    /// Returns `false` (not an error) when the venue reports the order as
    /// already gone.
    async fn cancel(&self, order_id: &str, symbol: &str) -> Result<bool, ExchangeError>;
    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<Order, ExchangeError>;
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError>;
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError>;
}
