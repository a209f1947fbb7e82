//! HTTP-backed exchange adapter (§4.3): rate-limited, retried venue calls.

use super::{Balance, Candle, ExchangeAdapter, Order, OrderSide, OrderStatus, RateLimiter, Ticker};
use crate::errors::ExchangeError;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Read-path vs mutating-path retry budgets differ (§4.3, §5): reads start
/// their backoff at 0.5s, mutations (place/cancel) at 1s, both capped at 3
/// attempts total.
#[derive(Debug, Clone, Copy)]
enum CallKind {
    Read,
    Mutate,
}

impl CallKind {
    fn base_delay(self) -> Duration {
        match self {
            CallKind::Read => Duration::from_millis(500),
            CallKind::Mutate => Duration::from_secs(1),
        }
    }
}

pub struct LiveExchange {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    limiter: RateLimiter,
}

impl LiveExchange {
    pub fn new(base_url: impl Into<String>, api_key: String, api_secret: String, rate_per_sec: f64, burst: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            api_secret,
            limiter: RateLimiter::new(rate_per_sec, burst),
        }
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-API-KEY", self.api_key.clone()),
            ("X-API-SECRET", self.api_secret.clone()),
        ]
    }

    /// Runs `call` up to 3 attempts total, retrying only transient errors
    /// with exponential backoff plus jitter (§4.3, §7). Non-transient errors
    /// (rejections, not-found) propagate immediately.
    async fn with_retry<T, F, Fut>(&self, kind: CallKind, mut call: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < 2 => {
                    let backoff = kind.base_delay() * 2u32.pow(attempt);
                    let jitter_ms = rand::thread_rng().gen_range(0..100);
                    log::warn!(
                        "exchange_call_retrying attempt={} error={}",
                        attempt + 1,
                        e
                    );
                    tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn map_transport_err(err: reqwest::Error) -> ExchangeError {
        if err.is_timeout() || err.is_connect() {
            ExchangeError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                ExchangeError::Transient(format!("http {status}"))
            } else {
                ExchangeError::Rejected(format!("http {status}: {err}"))
            }
        } else {
            ExchangeError::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    id: String,
    symbol: String,
    side: String,
    price: f64,
    amount: f64,
    filled: f64,
    average: Option<f64>,
    fee: Option<f64>,
    status: String,
    timestamp: i64,
}

impl TryFrom<WireOrder> for Order {
    type Error = ExchangeError;

    fn try_from(w: WireOrder) -> Result<Self, Self::Error> {
        let side = match w.side.as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => return Err(ExchangeError::Rejected(format!("unknown side {other}"))),
        };
        let status = match w.status.as_str() {
            "open" => OrderStatus::Open,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "closed" | "filled" => OrderStatus::Filled,
            "canceled" | "cancelled" => OrderStatus::Cancelled,
            other => return Err(ExchangeError::Rejected(format!("unknown status {other}"))),
        };
        Ok(Order {
            venue_order_id: w.id,
            symbol: w.symbol,
            side,
            price: w.price,
            amount: w.amount,
            filled_amount: w.filled,
            avg_fill_price: w.average,
            fee: w.fee.unwrap_or(0.0),
            status,
            ts_ms: w.timestamp,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for LiveExchange {
    async fn connect(&self) -> Result<(), ExchangeError> {
        self.with_retry(CallKind::Read, || async {
            self.client
                .get(format!("{}/ping", self.base_url))
                .send()
                .await
                .map_err(Self::map_transport_err)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        #[derive(Deserialize)]
        struct WireTicker {
            last: f64,
            bid: f64,
            ask: f64,
            timestamp: i64,
        }
        let url = format!("{}/ticker/{symbol}", self.base_url);
        self.with_retry(CallKind::Read, || async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(Self::map_transport_err)?;
            let t: WireTicker = resp.json().await.map_err(Self::map_transport_err)?;
            Ok(Ticker {
                symbol: symbol.to_string(),
                last: t.last,
                bid: t.bid,
                ask: t.ask,
                ts_ms: t.timestamp,
            })
        })
        .await
    }

    async fn get_balance(&self) -> Result<Balance, ExchangeError> {
        #[derive(Deserialize)]
        struct WireBalance {
            free: HashMap<String, f64>,
            used: HashMap<String, f64>,
            total: HashMap<String, f64>,
        }
        self.with_retry(CallKind::Read, || async {
            let mut req = self.client.get(format!("{}/balance", self.base_url));
            for (k, v) in self.auth_headers() {
                req = req.header(k, v);
            }
            let resp = req.send().await.map_err(Self::map_transport_err)?;
            let b: WireBalance = resp.json().await.map_err(Self::map_transport_err)?;
            Ok(Balance {
                free: b.free,
                used: b.used,
                total: b.total,
            })
        })
        .await
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> Result<Order, ExchangeError> {
        self.with_retry(CallKind::Mutate, || async {
            let mut req = self.client.post(format!("{}/orders", self.base_url)).json(
                &serde_json::json!({
                    "symbol": symbol,
                    "side": side.to_string(),
                    "type": "limit",
                    "amount": amount,
                    "price": price,
                }),
            );
            for (k, v) in self.auth_headers() {
                req = req.header(k, v);
            }
            let resp = req.send().await.map_err(Self::map_transport_err)?;
            let w: WireOrder = resp.json().await.map_err(Self::map_transport_err)?;
            Order::try_from(w)
        })
        .await
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
    ) -> Result<Order, ExchangeError> {
        let order = self
            .with_retry(CallKind::Mutate, || async {
                let mut req = self.client.post(format!("{}/orders", self.base_url)).json(
                    &serde_json::json!({
                        "symbol": symbol,
                        "side": side.to_string(),
                        "type": "market",
                        "amount": amount,
                    }),
                );
                for (k, v) in self.auth_headers() {
                    req = req.header(k, v);
                }
                let resp = req.send().await.map_err(Self::map_transport_err)?;
                let w: WireOrder = resp.json().await.map_err(Self::map_transport_err)?;
                Order::try_from(w)
            })
            .await?;
        if order.avg_fill_price.is_none() {
            return Err(ExchangeError::Rejected(
                "venue returned a market fill with no avg_fill_price".into(),
            ));
        }
        Ok(order)
    }

    async fn cancel(&self, order_id: &str, symbol: &str) -> Result<bool, ExchangeError> {
        let url = format!("{}/orders/{order_id}?symbol={symbol}", self.base_url);
        let result = self
            .with_retry(CallKind::Mutate, || async {
                let mut req = self.client.delete(&url);
                for (k, v) in self.auth_headers() {
                    req = req.header(k, v);
                }
                let resp = req.send().await.map_err(Self::map_transport_err)?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(ExchangeError::OrderNotFound(order_id.to_string()));
                }
                resp.error_for_status()
                    .map_err(Self::map_transport_err)?;
                Ok(())
            })
            .await;
        match result {
            Ok(()) => Ok(true),
            Err(ExchangeError::OrderNotFound(_)) => {
                log::warn!("cancel_not_found order_id={order_id} treating as already cancelled");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_order(&self, order_id: &str, symbol: &str) -> Result<Order, ExchangeError> {
        let url = format!("{}/orders/{order_id}?symbol={symbol}", self.base_url);
        self.with_retry(CallKind::Read, || async {
            let mut req = self.client.get(&url);
            for (k, v) in self.auth_headers() {
                req = req.header(k, v);
            }
            let resp = req.send().await.map_err(Self::map_transport_err)?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ExchangeError::OrderNotFound(order_id.to_string()));
            }
            let w: WireOrder = resp.json().await.map_err(Self::map_transport_err)?;
            Order::try_from(w)
        })
        .await
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        let url = format!("{}/orders?symbol={symbol}&status=open", self.base_url);
        self.with_retry(CallKind::Read, || async {
            let mut req = self.client.get(&url);
            for (k, v) in self.auth_headers() {
                req = req.header(k, v);
            }
            let resp = req.send().await.map_err(Self::map_transport_err)?;
            let wire: Vec<WireOrder> = resp.json().await.map_err(Self::map_transport_err)?;
            wire.into_iter().map(Order::try_from).collect()
        })
        .await
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        #[derive(Deserialize)]
        struct WireCandle {
            timestamp: i64,
            open: f64,
            high: f64,
            low: f64,
            close: f64,
            volume: f64,
        }
        let mut url = format!("{}/ohlcv?symbol={symbol}&timeframe={timeframe}", self.base_url);
        if let Some(since) = since_ms {
            url.push_str(&format!("&since={since}"));
        }
        if let Some(limit) = limit {
            url.push_str(&format!("&limit={limit}"));
        }
        self.with_retry(CallKind::Read, || async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(Self::map_transport_err)?;
            let wire: Vec<WireCandle> = resp.json().await.map_err(Self::map_transport_err)?;
            Ok(wire
                .into_iter()
                .map(|c| Candle {
                    ts_ms: c.timestamp,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                })
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_gives_up_after_three_attempts_on_persistent_transient_error() {
        let ex = LiveExchange::new("http://127.0.0.1:1", String::new(), String::new(), 1000.0, 10);
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), ExchangeError> = ex
            .with_retry(CallKind::Read, || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(ExchangeError::Transient("unreachable".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejected_errors_are_not_retried() {
        let ex = LiveExchange::new("http://127.0.0.1:1", String::new(), String::new(), 1000.0, 10);
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), ExchangeError> = ex
            .with_retry(CallKind::Read, || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(ExchangeError::Rejected("bad request".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
