use thiserror::Error;

/// Errors surfaced while loading and validating the YAML configuration tree.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors returned by `ExchangeAdapter` implementations.
///
/// `OrderNotFound` on cancel is not an error path for callers — `OrderManager`
/// treats it as an already-cancelled order — but the adapter still surfaces it
/// distinctly so the distinction isn't lost before reaching that call site.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("transient venue error: {0}")]
    Transient(String),
    #[error("venue rejected request: {0}")]
    Rejected(String),
    #[error("no price available for {0}")]
    NoPrice(String),
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
}

impl ExchangeError {
    /// Transient errors are the only class retried by the live adapter (§4.3, §7).
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}

/// Errors from the durable journal (§4.2).
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("journal task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by pure grid math (§4.1).
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Fatal, ledger-level invariant violations (§7). Always escalate to a global halt.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("invariant violated: {0}")]
    Violated(String),
}

/// Bridges `ExchangeError` and `JournalError` at the `OrderManager` seam,
/// where a single call site can fail either way (§4.5).
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Errors raised loading or running a historical backtest (§10.8).
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("failed to read candle data {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse candle csv {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("candle data is empty")]
    EmptyDataset,
    #[error(transparent)]
    Grid(#[from] GridError),
}
