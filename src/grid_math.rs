//! Pure, deterministic, idempotent grid math (§4.1). No I/O, no state.

use crate::errors::GridError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    Arithmetic,
    Geometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// `levels(lower, upper, n, spacing) -> [p0..pn-1]`.
///
/// Arithmetic: `lower + i*(upper-lower)/(n-1)`.
/// Geometric: `lower*(upper/lower)^(i/(n-1))`.
/// `p0 = lower`, `pn-1 = upper` exactly (closed-form endpoints, not accumulated steps).
pub fn levels(lower: f64, upper: f64, n: usize, spacing: Spacing) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![lower];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            if i == 0 {
                return lower;
            }
            if i == n - 1 {
                return upper;
            }
            let t = i as f64 / denom;
            match spacing {
                Spacing::Arithmetic => lower + t * (upper - lower),
                Spacing::Geometric => lower * (upper / lower).powf(t),
            }
        })
        .collect()
}

/// `sides(levels, ref) -> [(p, buy|sell)]`: buy if `p < ref`, else sell.
pub fn sides(levels: &[f64], reference_price: f64) -> Vec<(f64, Side)> {
    levels
        .iter()
        .map(|&p| {
            let side = if p < reference_price {
                Side::Buy
            } else {
                Side::Sell
            };
            (p, side)
        })
        .collect()
}

/// Resolves the per-order base-asset amount from exactly one of `size_quote`/`size_base`.
pub fn amount(
    size_quote: Option<f64>,
    size_base: Option<f64>,
    price: f64,
) -> Result<f64, GridError> {
    match (size_quote, size_base) {
        (None, Some(base)) => Ok(base),
        (Some(quote), None) => Ok(quote / price),
        (None, None) => Err(GridError::InvalidConfig(
            "either order_size_quote or order_size_base must be set".into(),
        )),
        (Some(_), Some(_)) => Err(GridError::InvalidConfig(
            "exactly one of order_size_quote/order_size_base must be set".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_levels_are_strictly_increasing_and_bounded() {
        let lv = levels(55_000.0, 65_000.0, 5, Spacing::Arithmetic);
        assert_eq!(lv.len(), 5);
        assert_eq!(lv[0], 55_000.0);
        assert_eq!(*lv.last().unwrap(), 65_000.0);
        for w in lv.windows(2) {
            assert!(w[1] > w[0]);
        }
        // equal spacing
        let step = lv[1] - lv[0];
        for w in lv.windows(2) {
            assert!((w[1] - w[0] - step).abs() < 1e-6);
        }
    }

    #[test]
    fn geometric_levels_have_constant_ratio() {
        let lv = levels(100.0, 1600.0, 5, Spacing::Geometric);
        assert_eq!(lv[0], 100.0);
        assert!((*lv.last().unwrap() - 1600.0).abs() < 1e-9);
        for w in lv.windows(2) {
            assert!(w[1] > w[0]);
        }
        let ratio = lv[1] / lv[0];
        for w in lv.windows(2) {
            assert!((w[1] / w[0] - ratio).abs() < 1e-6);
        }
    }

    #[test]
    fn sides_split_on_reference_price() {
        let lv = vec![90.0, 100.0, 110.0];
        let s = sides(&lv, 100.0);
        assert_eq!(s[0].1, Side::Buy);
        assert_eq!(s[1].1, Side::Sell); // not strictly less -> sell
        assert_eq!(s[2].1, Side::Sell);
    }

    #[test]
    fn amount_prefers_base_over_quote() {
        assert_eq!(amount(Some(100.0), None, 50.0).unwrap(), 2.0);
        assert_eq!(amount(None, Some(3.0), 50.0).unwrap(), 3.0);
    }

    #[test]
    fn amount_requires_exactly_one_size() {
        assert!(amount(None, None, 50.0).is_err());
        assert!(amount(Some(1.0), Some(1.0), 50.0).is_err());
    }
}
