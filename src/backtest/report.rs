//! Equity curve and summary statistics for a finished backtest run (§10.8).
//!
//! Grounded on `original_source/src/backtest/report.py`, generalized from
//! pandas `cummax`/`pct_change` into plain running folds over `Vec<f64>`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct EquityPoint {
    pub ts_ms: i64,
    pub price: f64,
    pub base_balance: f64,
    pub quote_balance: f64,
    pub total_equity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestTrade {
    pub ts_ms: i64,
    pub side: crate::grid_math::Side,
    pub price: f64,
    pub amount: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestSummary {
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub total_fees: f64,
    pub sharpe_ratio: f64,
    pub final_equity: f64,
}

pub struct BacktestReport {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<BacktestTrade>,
}

impl BacktestReport {
    pub fn total_return_pct(&self) -> f64 {
        if self.equity_curve.len() < 2 {
            return 0.0;
        }
        let start = self.equity_curve.first().unwrap().total_equity;
        let end = self.equity_curve.last().unwrap().total_equity;
        if start == 0.0 {
            return 0.0;
        }
        (end - start) / start * 100.0
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        if self.equity_curve.len() < 2 {
            return 0.0;
        }
        let mut peak = self.equity_curve[0].total_equity;
        let mut worst = 0.0_f64;
        for point in &self.equity_curve {
            peak = peak.max(point.total_equity);
            if peak > 0.0 {
                let drawdown = (peak - point.total_equity) / peak * 100.0;
                worst = worst.max(drawdown);
            }
        }
        worst
    }

    pub fn total_fees(&self) -> f64 {
        self.trades.iter().map(|t| t.fee).sum()
    }

    /// Annualized Sharpe ratio over per-candle returns, assuming ~252 periods
    /// per year as the Python original does regardless of actual candle
    /// interval (it was written for daily bars; kept unchanged per §10.8).
    pub fn sharpe_ratio(&self) -> f64 {
        if self.equity_curve.len() < 2 {
            return 0.0;
        }
        let returns: Vec<f64> = self
            .equity_curve
            .windows(2)
            .filter_map(|w| {
                if w[0].total_equity == 0.0 {
                    None
                } else {
                    Some((w[1].total_equity - w[0].total_equity) / w[0].total_equity)
                }
            })
            .collect();
        if returns.is_empty() {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return 0.0;
        }
        (mean / std_dev) * 252.0_f64.sqrt()
    }

    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary {
            total_return_pct: self.total_return_pct(),
            max_drawdown_pct: self.max_drawdown_pct(),
            total_trades: self.trades.len(),
            total_fees: self.total_fees(),
            sharpe_ratio: self.sharpe_ratio(),
            final_equity: self.equity_curve.last().map(|p| p.total_equity).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts_ms: i64, total_equity: f64) -> EquityPoint {
        EquityPoint {
            ts_ms,
            price: 0.0,
            base_balance: 0.0,
            quote_balance: total_equity,
            total_equity,
        }
    }

    #[test]
    fn max_drawdown_tracks_the_running_peak() {
        let report = BacktestReport {
            equity_curve: vec![point(0, 10_000.0), point(1, 11_000.0), point(2, 9_900.0)],
            trades: Vec::new(),
        };
        let dd = report.max_drawdown_pct();
        assert!((dd - 10.0).abs() < 1e-6);
    }

    #[test]
    fn total_return_reflects_first_and_last_equity() {
        let report = BacktestReport {
            equity_curve: vec![point(0, 10_000.0), point(1, 10_500.0)],
            trades: Vec::new(),
        };
        assert!((report.total_return_pct() - 5.0).abs() < 1e-6);
    }
}
