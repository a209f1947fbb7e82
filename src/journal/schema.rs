//! Schema DDL and forward-only, idempotent migrations (§4.2, §6, §10.4).
//!
//! Grounded on `original_source/src/db/migrations.py`: table shapes and
//! column names are carried over unchanged, translated to `rusqlite`'s
//! synchronous API.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS grid_configs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol          TEXT NOT NULL,
    lower_price     REAL NOT NULL,
    upper_price     REAL NOT NULL,
    num_levels      INTEGER NOT NULL,
    spacing         TEXT NOT NULL DEFAULT 'arithmetic',
    order_size_quote REAL,
    order_size_base REAL,
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    is_active       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS grid_levels (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    config_id           INTEGER NOT NULL REFERENCES grid_configs(id),
    level_index         INTEGER NOT NULL,
    price               REAL NOT NULL,
    side                TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'pending',
    venue_order_id      TEXT,
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS orders (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    venue_order_id      TEXT UNIQUE NOT NULL,
    grid_level_id       INTEGER REFERENCES grid_levels(id),
    symbol              TEXT NOT NULL,
    side                TEXT NOT NULL,
    order_type          TEXT NOT NULL DEFAULT 'limit',
    price               REAL NOT NULL,
    amount              REAL NOT NULL,
    filled_amount        REAL NOT NULL DEFAULT 0.0,
    avg_fill_price       REAL,
    fee                 REAL NOT NULL DEFAULT 0.0,
    status              TEXT NOT NULL DEFAULT 'open',
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS trades (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    buy_order_id    INTEGER REFERENCES orders(id),
    sell_order_id   INTEGER REFERENCES orders(id),
    symbol          TEXT NOT NULL,
    price           REAL NOT NULL,
    amount          REAL NOT NULL,
    fee             REAL NOT NULL,
    realized_pnl    REAL NOT NULL,
    closed_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS position_snapshots (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    ts                  TEXT NOT NULL DEFAULT (datetime('now')),
    symbol              TEXT NOT NULL,
    base_balance        REAL NOT NULL,
    quote_balance       REAL NOT NULL,
    avg_entry_price     REAL,
    price               REAL NOT NULL,
    unrealized_pnl      REAL NOT NULL,
    realized_pnl        REAL NOT NULL,
    secured_profits     REAL NOT NULL DEFAULT 0.0,
    total_equity        REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS bot_state (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders(symbol);
CREATE INDEX IF NOT EXISTS idx_grid_levels_config ON grid_levels(config_id);
CREATE INDEX IF NOT EXISTS idx_position_snapshots_ts ON position_snapshots(ts);
CREATE INDEX IF NOT EXISTS idx_position_snapshots_symbol ON position_snapshots(symbol);
CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);
";

/// Additive, forward-only migrations run after `SCHEMA`. A failing `ALTER`
/// (column already present on a pre-migrated database) is ignored, matching
/// the Python original's idempotent migration runner.
pub const MIGRATIONS: &[&str] = &[];

pub fn run_migrations(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    for sql in MIGRATIONS {
        let _ = conn.execute(sql, []);
    }
    Ok(())
}
