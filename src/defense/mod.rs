//! Per-pair defensive signals fed to the risk supervisor (§4.7).

mod pair_rotator;
mod stop_loss;
mod trend_filter;

pub use pair_rotator::{PairRotator, PairScore};
pub use stop_loss::PositionStopLoss;
pub use trend_filter::{Trend, TrendFilter};
