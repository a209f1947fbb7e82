//! Hierarchical YAML configuration (§6, §10.1).

use crate::errors::ConfigError;
use crate::grid_math::Spacing;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_name")]
    pub name: String,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

fn default_exchange_name() -> String {
    "paper".to_string()
}

fn default_rate_limit_ms() -> u64 {
    100
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: default_exchange_name(),
            sandbox: false,
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrailingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_trigger_pct")]
    pub trigger_pct: f64,
    #[serde(default = "default_rebalance_pct")]
    pub rebalance_pct: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
}

fn default_trigger_pct() -> f64 {
    75.0
}
fn default_rebalance_pct() -> f64 {
    50.0
}
fn default_cooldown_secs() -> f64 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub symbol: String,
    pub lower: f64,
    pub upper: f64,
    pub num_levels: usize,
    #[serde(default = "default_spacing")]
    pub spacing: Spacing,
    #[serde(default)]
    pub order_size_quote: Option<f64>,
    #[serde(default)]
    pub order_size_base: Option<f64>,
    #[serde(default)]
    pub trailing: TrailingConfig,
}

fn default_spacing() -> Spacing {
    Spacing::Arithmetic
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lower > 0.0 && self.lower < self.upper) {
            return Err(ConfigError::Invalid(format!(
                "grid {}: require 0 < lower < upper, got lower={} upper={}",
                self.symbol, self.lower, self.upper
            )));
        }
        if !(2..=200).contains(&self.num_levels) {
            return Err(ConfigError::Invalid(format!(
                "grid {}: num_levels must be in [2, 200], got {}",
                self.symbol, self.num_levels
            )));
        }
        match (self.order_size_quote, self.order_size_base) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "grid {}: exactly one of order_size_quote/order_size_base must be set",
                    self.symbol
                )))
            }
        }
        if self.trailing.enabled
            && !(50.0..=95.0).contains(&self.trailing.trigger_pct)
        {
            return Err(ConfigError::Invalid(format!(
                "grid {}: trailing.trigger_pct must be in [50, 95]",
                self.symbol
            )));
        }
        if self.trailing.enabled
            && !(10.0..=100.0).contains(&self.trailing.rebalance_pct)
        {
            return Err(ConfigError::Invalid(format!(
                "grid {}: trailing.rebalance_pct must be in [10, 100]",
                self.symbol
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_position_quote")]
    pub max_position_quote: f64,
    #[serde(default = "default_max_position_quote_per_pair")]
    pub max_position_quote_per_pair: f64,
    #[serde(default = "default_max_open_orders")]
    pub max_open_orders: usize,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default)]
    pub extreme_fear_threshold: Option<i32>,
}

fn default_max_position_quote() -> f64 {
    5000.0
}
fn default_max_position_quote_per_pair() -> f64 {
    200.0
}
fn default_max_open_orders() -> usize {
    200
}
fn default_stop_loss_pct() -> f64 {
    5.0
}
fn default_take_profit_pct() -> f64 {
    3.0
}
fn default_max_drawdown_pct() -> f64 {
    10.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_quote: default_max_position_quote(),
            max_position_quote_per_pair: default_max_position_quote_per_pair(),
            max_open_orders: default_max_open_orders(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            extreme_fear_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance_quote: f64,
}

fn default_initial_balance() -> f64 {
    1000.0
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_balance_quote: default_initial_balance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTradingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_paper_initial_quote")]
    pub initial_balance_quote: f64,
    #[serde(default)]
    pub initial_balance_base: f64,
    #[serde(default = "default_sim_fee_pct")]
    pub simulated_fee_pct: f64,
}

fn default_paper_initial_quote() -> f64 {
    10_000.0
}
fn default_sim_fee_pct() -> f64 {
    0.006
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_balance_quote: default_paper_initial_quote(),
            initial_balance_base: 0.0,
            simulated_fee_pct: default_sim_fee_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_host")]
    pub host: String,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_controls: bool,
}

fn default_dashboard_host() -> String {
    "127.0.0.1".to_string()
}
fn default_dashboard_port() -> u16 {
    8080
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_dashboard_host(),
            port: default_dashboard_port(),
            enable_controls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    #[serde(default = "default_long_window")]
    pub long_window: usize,
}

fn default_short_window() -> usize {
    10
}
fn default_long_window() -> usize {
    60
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            short_window: default_short_window(),
            long_window: default_long_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStopLossConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stop_loss_threshold_pct")]
    pub threshold_pct: f64,
    #[serde(default = "default_stop_loss_cooldown_secs")]
    pub cooldown_secs: f64,
}

fn default_stop_loss_threshold_pct() -> f64 {
    2.0
}
fn default_stop_loss_cooldown_secs() -> f64 {
    300.0
}

impl Default for PositionStopLossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_pct: default_stop_loss_threshold_pct(),
            cooldown_secs: default_stop_loss_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRotationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rotation_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: f64,
    #[serde(default = "default_min_trades")]
    pub min_trades: u64,
}

fn default_rotation_interval_secs() -> f64 {
    1800.0
}
fn default_pause_threshold() -> f64 {
    -1.0
}
fn default_min_trades() -> u64 {
    5
}

impl Default for PairRotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_rotation_interval_secs(),
            pause_threshold: default_pause_threshold(),
            min_trades: default_min_trades(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAllocationConfig {
    #[serde(default = "default_grid_pct")]
    pub grid_pct: f64,
    #[serde(default)]
    pub momentum_pct: f64,
    #[serde(default)]
    pub dip_sniper_pct: f64,
}

fn default_grid_pct() -> f64 {
    100.0
}

impl Default for StrategyAllocationConfig {
    fn default() -> Self {
        Self {
            grid_pct: default_grid_pct(),
            momentum_pct: 0.0,
            dip_sniper_pct: 0.0,
        }
    }
}

impl StrategyAllocationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let total = self.grid_pct + self.momentum_pct + self.dip_sniper_pct;
        if (total - 100.0).abs() > 0.01 {
            return Err(ConfigError::Invalid(format!(
                "strategy_allocation must sum to 100%, got {total}%"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    pub grids: Vec<GridConfig>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub paper_trading: PaperTradingConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub trend_filter: TrendFilterConfig,
    #[serde(default)]
    pub position_stop_loss: PositionStopLossConfig,
    #[serde(default)]
    pub pair_rotation: PairRotationConfig,
    #[serde(default)]
    pub strategy_allocation: StrategyAllocationConfig,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "gridbot.db".to_string()
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grids.is_empty() {
            return Err(ConfigError::Invalid("at least one grid is required".into()));
        }
        for g in &self.grids {
            g.validate()?;
        }
        self.strategy_allocation.validate()?;
        Ok(())
    }

    /// Layers `GRIDBOT_*` environment overrides on top of the parsed document.
    /// Only `db_path` is overridden this way today; exchange credentials are
    /// read directly by the live adapter at connect time (§6).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = std::env::var("GRIDBOT_DB_PATH") {
            self.db_path = db_path;
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<BotConfig, ConfigError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path_ref.display().to_string(),
                source,
            })?;
        migrate_single_grid(&mut value);
        let mut cfg: BotConfig =
            serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
                path: path_ref.display().to_string(),
                source,
            })?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Accepts the legacy singular `grid:` object transparently wrapped into a
/// one-element `grids: []` list (§6, §10.1), mirroring the Python original's
/// `migrate_single_grid` pre-validator.
fn migrate_single_grid(value: &mut serde_yaml::Value) {
    let serde_yaml::Value::Mapping(map) = value else {
        return;
    };
    let grid_key = serde_yaml::Value::String("grid".to_string());
    let grids_key = serde_yaml::Value::String("grids".to_string());
    if map.contains_key(&grids_key) {
        return;
    }
    if let Some(single) = map.remove(&grid_key) {
        map.insert(grids_key, serde_yaml::Value::Sequence(vec![single]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        let g = GridConfig {
            symbol: "BTC/USD".into(),
            lower: 65_000.0,
            upper: 55_000.0,
            num_levels: 5,
            spacing: Spacing::Arithmetic,
            order_size_quote: Some(100.0),
            order_size_base: None,
            trailing: TrailingConfig::default(),
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn rejects_both_sizes_set() {
        let g = GridConfig {
            symbol: "BTC/USD".into(),
            lower: 1.0,
            upper: 2.0,
            num_levels: 5,
            spacing: Spacing::Arithmetic,
            order_size_quote: Some(100.0),
            order_size_base: Some(1.0),
            trailing: TrailingConfig::default(),
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn strategy_allocation_must_sum_to_100() {
        let alloc = StrategyAllocationConfig {
            grid_pct: 60.0,
            momentum_pct: 25.0,
            dip_sniper_pct: 10.0,
        };
        assert!(alloc.validate().is_err());
        let alloc_ok = StrategyAllocationConfig {
            grid_pct: 60.0,
            momentum_pct: 25.0,
            dip_sniper_pct: 15.0,
        };
        assert!(alloc_ok.validate().is_ok());
    }

    #[test]
    fn migrates_legacy_singular_grid_key() {
        let yaml = r#"
grid:
  symbol: "BTC/USD"
  lower: 55000
  upper: 65000
  num_levels: 5
  order_size_quote: 100
"#;
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        migrate_single_grid(&mut value);
        let cfg: BotConfig = serde_yaml::from_value(value).unwrap();
        assert_eq!(cfg.grids.len(), 1);
        assert_eq!(cfg.grids[0].symbol, "BTC/USD");
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
grids:
  - symbol: "BTC/USD"
    lower: 55000
    upper: 65000
    num_levels: 5
    order_size_quote: 100
"#;
        let cfg: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.grids.len(), 1);
        assert_eq!(cfg.risk.max_open_orders, 200);
    }
}
