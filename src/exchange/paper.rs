//! Deterministic in-memory exchange simulator (§4.3).
//!
//! Mirrors `PaperConnector` from the original Python bot: a resting-order
//! book that is walked forward by `simulate_prices`, filling any order whose
//! limit price has been crossed by the supplied price tape.

use super::{Balance, Candle, ExchangeAdapter, Order, OrderSide, OrderStatus, Ticker};
use crate::errors::ExchangeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct PaperOrder {
    order: Order,
}

struct PaperState {
    balances: HashMap<String, f64>,
    orders: HashMap<String, PaperOrder>,
    last_prices: HashMap<String, f64>,
    next_id: u64,
}

pub struct PaperExchange {
    fee_pct: f64,
    state: Mutex<PaperState>,
}

fn base_currency(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

fn quote_currency(symbol: &str) -> &str {
    symbol.split('/').nth(1).unwrap_or("USD")
}

impl PaperExchange {
    pub fn new(initial_quote: f64, initial_base: f64, base_symbol: &str, fee_pct: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_currency(base_symbol).to_string(), initial_quote);
        if initial_base > 0.0 {
            balances.insert(base_currency(base_symbol).to_string(), initial_base);
        }
        Self {
            fee_pct,
            state: Mutex::new(PaperState {
                balances,
                orders: HashMap::new(),
                last_prices: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Seeds or updates the simulator's notion of "current price" for a symbol
    /// without walking the order book (used to center a freshly-initialized
    /// grid around a live reference price, §4.10).
    pub fn seed_price(&self, symbol: &str, price: f64) {
        self.state
            .lock()
            .unwrap()
            .last_prices
            .insert(symbol.to_string(), price);
    }

    /// Walks every open order and fills any whose limit price is crossed by
    /// the supplied tape, deducting the configured fee and updating simulated
    /// balances. Returns the newly-filled orders.
    pub fn simulate_prices(&self, prices: &HashMap<String, f64>) -> Vec<Order> {
        let mut state = self.state.lock().unwrap();
        for (symbol, price) in prices {
            state.last_prices.insert(symbol.clone(), *price);
        }

        let mut filled = Vec::new();
        let ids: Vec<String> = state.orders.keys().cloned().collect();
        for id in ids {
            let Some(price) = state
                .orders
                .get(&id)
                .and_then(|o| prices.get(&o.order.symbol))
                .copied()
            else {
                continue;
            };

            let crosses = {
                let o = &state.orders.get(&id).unwrap().order;
                if o.status.is_terminal() {
                    false
                } else {
                    match o.side {
                        OrderSide::Buy => price <= o.price,
                        OrderSide::Sell => price >= o.price,
                    }
                }
            };
            if !crosses {
                continue;
            }

            let fee_pct = self.fee_pct;
            let entry = state.orders.get_mut(&id).unwrap();
            let o = &mut entry.order;
            let fee = o.amount * o.price * fee_pct;
            let base = base_currency(&o.symbol).to_string();
            let quote = quote_currency(&o.symbol).to_string();

            match o.side {
                OrderSide::Buy => {
                    *state.balances.entry(base).or_insert(0.0) += o.amount;
                    *state.balances.entry(quote).or_insert(0.0) -= o.amount * o.price + fee;
                }
                OrderSide::Sell => {
                    *state.balances.entry(base).or_insert(0.0) -= o.amount;
                    *state.balances.entry(quote).or_insert(0.0) += o.amount * o.price - fee;
                }
            }

            o.filled_amount = o.amount;
            o.avg_fill_price = Some(o.price);
            o.fee = fee;
            o.status = OrderStatus::Filled;
            filled.push(o.clone());
        }
        filled
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    async fn connect(&self) -> Result<(), ExchangeError> {
        log::info!("paper_exchange_connected");
        Ok(())
    }

    async fn close(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let state = self.state.lock().unwrap();
        let price = *state
            .last_prices
            .get(symbol)
            .ok_or_else(|| ExchangeError::NoPrice(symbol.to_string()))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: price,
            bid: price * 0.999,
            ask: price * 1.001,
            ts_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn get_balance(&self) -> Result<Balance, ExchangeError> {
        let state = self.state.lock().unwrap();
        Ok(Balance {
            free: state.balances.clone(),
            used: HashMap::new(),
            total: state.balances.clone(),
        })
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> Result<Order, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        let id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        let order = Order {
            venue_order_id: id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            filled_amount: 0.0,
            avg_fill_price: None,
            fee: 0.0,
            status: OrderStatus::Open,
            ts_ms: chrono::Utc::now().timestamp_millis(),
        };
        log::info!(
            "paper_order_placed order_id={id} side={side} price={price} amount={amount}"
        );
        state.orders.insert(id, PaperOrder { order: order.clone() });
        Ok(order)
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
    ) -> Result<Order, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        let price = *state
            .last_prices
            .get(symbol)
            .ok_or_else(|| ExchangeError::NoPrice(symbol.to_string()))?;
        let fee = amount * price * self.fee_pct;
        let base = base_currency(symbol).to_string();
        let quote = quote_currency(symbol).to_string();

        match side {
            OrderSide::Sell => {
                let have = *state.balances.get(&base).unwrap_or(&0.0);
                if have < amount {
                    return Err(ExchangeError::InsufficientBalance(format!(
                        "{base}: have {have}, need {amount}"
                    )));
                }
                *state.balances.entry(base).or_insert(0.0) -= amount;
                *state.balances.entry(quote).or_insert(0.0) += amount * price - fee;
            }
            OrderSide::Buy => {
                let cost = amount * price + fee;
                let have = *state.balances.get(&quote).unwrap_or(&0.0);
                if have < cost {
                    return Err(ExchangeError::InsufficientBalance(format!(
                        "{quote}: have {have}, need {cost}"
                    )));
                }
                *state.balances.entry(quote).or_insert(0.0) -= cost;
                *state.balances.entry(base).or_insert(0.0) += amount;
            }
        }

        let id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        let order = Order {
            venue_order_id: id,
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            filled_amount: amount,
            avg_fill_price: Some(price),
            fee,
            status: OrderStatus::Filled,
            ts_ms: chrono::Utc::now().timestamp_millis(),
        };
        log::info!(
            "paper_market_order_filled order_id={} side={side} price={price} amount={amount}",
            order.venue_order_id
        );
        Ok(order)
    }

    async fn cancel(&self, order_id: &str, _symbol: &str) -> Result<bool, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        match state.orders.get_mut(order_id) {
            Some(entry) => {
                entry.order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_order(&self, order_id: &str, _symbol: &str) -> Result<Order, ExchangeError> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .get(order_id)
            .map(|e| e.order.clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .values()
            .map(|e| &e.order)
            .filter(|o| o.symbol == symbol && !o.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _since_ms: Option<i64>,
        _limit: Option<usize>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buy_then_sell_roundtrip_fills_and_updates_balances() {
        let ex = PaperExchange::new(10_000.0, 0.0, "BTC/USD", 0.0);
        ex.seed_price("BTC/USD", 60_000.0);

        let buy = ex
            .place_limit("BTC/USD", OrderSide::Buy, 0.1, 59_000.0)
            .await
            .unwrap();
        assert_eq!(buy.status, OrderStatus::Open);

        let mut tape = HashMap::new();
        tape.insert("BTC/USD".to_string(), 58_500.0);
        let fills = ex.simulate_prices(&tape);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, OrderSide::Buy);

        let bal = ex.get_balance().await.unwrap();
        assert!((bal.total["BTC"] - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_returns_false_not_error() {
        let ex = PaperExchange::new(1000.0, 0.0, "BTC/USD", 0.0);
        let ok = ex.cancel("nope", "BTC/USD").await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn market_sell_requires_sufficient_base_balance() {
        let ex = PaperExchange::new(1000.0, 0.0, "BTC/USD", 0.0);
        ex.seed_price("BTC/USD", 100.0);
        let err = ex
            .place_market("BTC/USD", OrderSide::Sell, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance(_)));
    }
}
