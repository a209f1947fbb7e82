//! Historical backtest runner (§10.8): reuses `grid_math` and an in-memory
//! fill engine shaped like `PaperExchange`, but driven by historical OHLCV
//! instead of a live ticker poll. Deliberately has no dependency on the
//! orchestrator or journal — the Non-goals describe this as "reuses the grid
//! math but not the control plane".
//!
//! Grounded on `original_source/src/backtest/engine.py`.

pub mod data_loader;
pub mod report;
pub mod simulator;

pub use data_loader::load_csv;
pub use report::{BacktestReport, BacktestSummary, EquityPoint};
pub use simulator::BacktestSimulator;

use crate::config::GridConfig;
use crate::errors::BacktestError;
use crate::exchange::Candle;
use crate::grid_math::{self, Side};
use report::BacktestTrade;

pub struct BacktestEngine {
    config: GridConfig,
    simulator: BacktestSimulator,
}

impl BacktestEngine {
    pub fn new(
        config: GridConfig,
        fee_pct: f64,
        slippage_bps: f64,
        initial_quote: f64,
        initial_base: f64,
    ) -> Self {
        let mut simulator = BacktestSimulator::new(fee_pct, slippage_bps);
        simulator.set_balances(initial_base, initial_quote);
        Self { config, simulator }
    }

    /// Lays out the initial grid against the first candle's close, then
    /// replays every candle: each fill is journaled as a trade and mirrors
    /// an opposite order at the adjacent level, same index arithmetic as
    /// `GridEngine::on_fill` (§4.8).
    pub fn run(mut self, candles: &[Candle]) -> Result<BacktestReport, BacktestError> {
        if candles.is_empty() {
            return Err(BacktestError::EmptyDataset);
        }

        let prices = grid_math::levels(
            self.config.lower,
            self.config.upper,
            self.config.num_levels,
            self.config.spacing,
        );
        let sided = grid_math::sides(&prices, candles[0].close);

        for (price, side) in sided {
            let amount = grid_math::amount(
                self.config.order_size_quote,
                self.config.order_size_base,
                price,
            )?;
            self.simulator.place_order(side, price, amount);
        }

        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(candles.len());

        for candle in candles {
            let filled = self.simulator.process_candle(candle.high, candle.low);
            for order in filled {
                trades.push(BacktestTrade {
                    ts_ms: candle.ts_ms,
                    side: order.side,
                    price: order.fill_price,
                    amount: order.filled_amount,
                    fee: order.fee,
                });

                let idx = nearest_level_index(order.price, &prices);
                let opposite = order.side.opposite();
                let target_idx = match opposite {
                    Side::Sell => idx + 1,
                    Side::Buy => idx.checked_sub(1).unwrap_or(usize::MAX),
                };
                if target_idx < prices.len() {
                    let amount = grid_math::amount(
                        self.config.order_size_quote,
                        self.config.order_size_base,
                        prices[target_idx],
                    )?;
                    self.simulator.place_order(opposite, prices[target_idx], amount);
                }
            }

            equity_curve.push(EquityPoint {
                ts_ms: candle.ts_ms,
                price: candle.close,
                base_balance: self.simulator.base_balance(),
                quote_balance: self.simulator.quote_balance(),
                total_equity: self.simulator.quote_balance()
                    + self.simulator.base_balance() * candle.close,
            });
        }

        Ok(BacktestReport { equity_curve, trades })
    }
}

fn nearest_level_index(price: f64, levels: &[f64]) -> usize {
    levels
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - price).abs().partial_cmp(&(*b - price).abs()).unwrap()
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_math::Spacing;

    fn candle(ts_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle { ts_ms, open, high, low, close, volume: 0.0 }
    }

    #[test]
    fn oscillating_prices_produce_fills_and_a_nonempty_equity_curve() {
        let config = GridConfig {
            symbol: "BTC/USD".into(),
            lower: 55_000.0,
            upper: 65_000.0,
            num_levels: 5,
            spacing: Spacing::Arithmetic,
            order_size_quote: Some(100.0),
            order_size_base: None,
            trailing: Default::default(),
        };
        let engine = BacktestEngine::new(config, 0.006, 5.0, 10_000.0, 0.0);
        let candles = vec![
            candle(0, 60_000.0, 60_100.0, 59_900.0, 60_000.0),
            candle(1, 60_000.0, 62_100.0, 59_900.0, 62_000.0),
            candle(2, 62_000.0, 62_100.0, 57_900.0, 58_000.0),
        ];
        let report = engine.run(&candles).unwrap();
        assert_eq!(report.equity_curve.len(), 3);
        assert!(!report.trades.is_empty());
    }
}
