//! Per-table repository methods on `Journal` (§4.2, §6).

use super::Journal;
use crate::config::GridConfig;
use crate::errors::JournalError;
use crate::exchange::{Order, OrderSide, OrderStatus};
use crate::grid_math::Side;
use rusqlite::params;

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "open",
        OrderStatus::PartiallyFilled => "partially_filled",
        OrderStatus::Filled => "filled",
        OrderStatus::Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone)]
pub struct GridLevelRow {
    pub id: i64,
    pub level_index: i64,
    pub price: f64,
    pub side: String,
    pub status: String,
    pub venue_order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderRow {
    pub id: i64,
    pub venue_order_id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub symbol: String,
    pub base_balance: f64,
    pub quote_balance: f64,
    pub avg_entry_price: f64,
    pub price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub secured_profits: f64,
    pub total_equity: f64,
}

impl Journal {
    pub async fn insert_grid_config(&self, cfg: GridConfig) -> Result<i64, JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO grid_configs (symbol, lower_price, upper_price, num_levels, spacing, order_size_quote, order_size_base)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    cfg.symbol,
                    cfg.lower,
                    cfg.upper,
                    cfg.num_levels as i64,
                    format!("{:?}", cfg.spacing).to_lowercase(),
                    cfg.order_size_quote,
                    cfg.order_size_base,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_grid_level(
        &self,
        config_id: i64,
        level_index: usize,
        price: f64,
        side: Side,
    ) -> Result<i64, JournalError> {
        let side = side_str(side).to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO grid_levels (config_id, level_index, price, side, status)
                 VALUES (?1, ?2, ?3, ?4, 'pending')",
                params![config_id, level_index as i64, price, side],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_grid_level(
        &self,
        id: i64,
        status: &str,
        venue_order_id: Option<String>,
        side: Option<Side>,
    ) -> Result<(), JournalError> {
        let status = status.to_string();
        let side = side.map(side_str).map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE grid_levels SET status = ?1, venue_order_id = ?2,
                 side = COALESCE(?3, side), updated_at = datetime('now') WHERE id = ?4",
                params![status, venue_order_id, side, id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_grid_levels(&self, config_id: i64) -> Result<Vec<GridLevelRow>, JournalError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level_index, price, side, status, venue_order_id
                 FROM grid_levels WHERE config_id = ?1 ORDER BY level_index",
            )?;
            let rows = stmt
                .query_map(params![config_id], |row| {
                    Ok(GridLevelRow {
                        id: row.get(0)?,
                        level_index: row.get(1)?,
                        price: row.get(2)?,
                        side: row.get(3)?,
                        status: row.get(4)?,
                        venue_order_id: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn insert_order(
        &self,
        order: Order,
        grid_level_id: Option<i64>,
    ) -> Result<i64, JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO orders (venue_order_id, grid_level_id, symbol, side, price, amount,
                 filled_amount, avg_fill_price, fee, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    order.venue_order_id,
                    grid_level_id,
                    order.symbol,
                    order_side_str(order.side),
                    order.price,
                    order.amount,
                    order.filled_amount,
                    order.avg_fill_price,
                    order.fee,
                    status_str(order.status),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_order(&self, order: Order) -> Result<(), JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE orders SET filled_amount = ?1, avg_fill_price = ?2, fee = ?3,
                 status = ?4, updated_at = datetime('now') WHERE venue_order_id = ?5",
                params![
                    order.filled_amount,
                    order.avg_fill_price,
                    order.fee,
                    status_str(order.status),
                    order.venue_order_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn open_orders_for_symbol(&self, symbol: &str) -> Result<Vec<OrderRow>, JournalError> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, venue_order_id, symbol, status FROM orders
                 WHERE symbol = ?1 AND status IN ('open', 'partially_filled')",
            )?;
            let rows = stmt
                .query_map(params![symbol], |row| {
                    Ok(OrderRow {
                        id: row.get(0)?,
                        venue_order_id: row.get(1)?,
                        symbol: row.get(2)?,
                        status: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn insert_trade(
        &self,
        symbol: String,
        price: f64,
        amount: f64,
        fee: f64,
        realized_pnl: f64,
    ) -> Result<(), JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trades (symbol, price, amount, fee, realized_pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![symbol, price, amount, fee, realized_pnl],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_snapshot(&self, snap: SnapshotRecord) -> Result<(), JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO position_snapshots (symbol, base_balance, quote_balance, avg_entry_price,
                 price, unrealized_pnl, realized_pnl, secured_profits, total_equity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    snap.symbol,
                    snap.base_balance,
                    snap.quote_balance,
                    snap.avg_entry_price,
                    snap.price,
                    snap.unrealized_pnl,
                    snap.realized_pnl,
                    snap.secured_profits,
                    snap.total_equity,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_bot_state(&self, key: String, value: String) -> Result<(), JournalError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO bot_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_bot_state(&self, key: String) -> Result<Option<String>, JournalError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM bot_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrailingConfig;
    use crate::grid_math::Spacing;

    async fn test_journal() -> Journal {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridbot.db");
        let path_str = path.to_str().unwrap().to_string();
        std::mem::forget(dir); // keep the temp dir alive for the test's duration
        Journal::open(&path_str).await.unwrap()
    }

    #[tokio::test]
    async fn grid_config_and_levels_round_trip() {
        let journal = test_journal().await;
        let cfg = GridConfig {
            symbol: "BTC/USD".into(),
            lower: 55_000.0,
            upper: 65_000.0,
            num_levels: 5,
            spacing: Spacing::Arithmetic,
            order_size_quote: Some(100.0),
            order_size_base: None,
            trailing: TrailingConfig::default(),
        };
        let config_id = journal.insert_grid_config(cfg).await.unwrap();
        let level_id = journal
            .insert_grid_level(config_id, 0, 55_000.0, Side::Buy)
            .await
            .unwrap();
        journal
            .update_grid_level(level_id, "placed", Some("venue-1".to_string()), None)
            .await
            .unwrap();
        let levels = journal.list_grid_levels(config_id).await.unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].status, "placed");
        assert_eq!(levels[0].venue_order_id.as_deref(), Some("venue-1"));
    }

    #[tokio::test]
    async fn bot_state_upserts() {
        let journal = test_journal().await;
        journal
            .set_bot_state("status".to_string(), "running".to_string())
            .await
            .unwrap();
        journal
            .set_bot_state("status".to_string(), "halted".to_string())
            .await
            .unwrap();
        let value = journal.get_bot_state("status".to_string()).await.unwrap();
        assert_eq!(value.as_deref(), Some("halted"));
    }

    #[tokio::test]
    async fn missing_bot_state_key_returns_none() {
        let journal = test_journal().await;
        let value = journal.get_bot_state("nope".to_string()).await.unwrap();
        assert!(value.is_none());
    }
}
