//! Stock health thresholds
//!
//! Thresholds are relative to the quantity a product started with: the
//! low-stock threshold is 5% of it (at least 1), the alert threshold 10%
//! (at least 2). Both are rounded up.

use crate::models::{Product, ProductHealth, StockHealth, StockLevel};

/// Low-stock threshold: `max(1, ceil(initial * 0.05))`
pub fn low_threshold(initial_quantity: i64) -> i64 {
    ceil_percent(initial_quantity, 5).max(1)
}

/// Alert threshold: `max(2, ceil(initial * 0.10))`
pub fn alert_threshold(initial_quantity: i64) -> i64 {
    ceil_percent(initial_quantity, 10).max(2)
}

fn ceil_percent(value: i64, percent: i64) -> i64 {
    let scaled = i128::from(value.max(0)) * i128::from(percent);
    let ceiled = (scaled + 99) / 100;
    i64::try_from(ceiled).unwrap_or(i64::MAX)
}

/// Current quantity as a whole percentage of the initial one, half rounded up
pub fn stock_percentage(quantity: i64, initial_quantity: i64) -> i64 {
    if initial_quantity <= 0 {
        return 0;
    }
    let q = i128::from(quantity.max(0));
    let initial = i128::from(initial_quantity);
    let rounded = (q * 200 + initial) / (initial * 2);
    i64::try_from(rounded).unwrap_or(i64::MAX)
}

/// Classify a quantity against thresholds derived from the initial quantity.
pub fn stock_health(quantity: i64, initial_quantity: i64) -> StockHealth {
    let low = low_threshold(initial_quantity);
    let alert = alert_threshold(initial_quantity);

    let level = if quantity <= 0 {
        StockLevel::OutOfStock
    } else if quantity <= low {
        StockLevel::Low
    } else if quantity <= alert {
        StockLevel::Alert
    } else {
        StockLevel::Normal
    };

    StockHealth {
        level,
        low_threshold: low,
        alert_threshold: alert,
        percentage: stock_percentage(quantity, initial_quantity),
    }
}

pub fn product_health(product: &Product) -> ProductHealth {
    ProductHealth {
        product_id: product.id,
        name: product.name.clone(),
        unit: product.unit.clone(),
        structure_id: product.structure_id,
        quantity: product.quantity,
        initial_quantity: product.initial_quantity,
        health: stock_health(product.quantity, product.initial_quantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_thresholds_for_hundred() {
        assert_eq!(low_threshold(100), 5);
        assert_eq!(alert_threshold(100), 10);
    }

    #[test]
    fn test_thresholds_have_floors() {
        assert_eq!(low_threshold(0), 1);
        assert_eq!(alert_threshold(0), 2);
        assert_eq!(low_threshold(10), 1);
        assert_eq!(alert_threshold(10), 2);
        // ceil(21 * 0.05) = 2, ceil(21 * 0.10) = 3
        assert_eq!(low_threshold(21), 2);
        assert_eq!(alert_threshold(21), 3);
    }

    #[test]
    fn test_levels_at_boundaries() {
        assert_eq!(stock_health(0, 100).level, StockLevel::OutOfStock);
        assert_eq!(stock_health(1, 100).level, StockLevel::Low);
        assert_eq!(stock_health(5, 100).level, StockLevel::Low);
        assert_eq!(stock_health(6, 100).level, StockLevel::Alert);
        assert_eq!(stock_health(10, 100).level, StockLevel::Alert);
        assert_eq!(stock_health(11, 100).level, StockLevel::Normal);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(stock_percentage(50, 100), 50);
        assert_eq!(stock_percentage(1, 3), 33);
        assert_eq!(stock_percentage(2, 3), 67);
        assert_eq!(stock_percentage(1, 8), 13);
        assert_eq!(stock_percentage(10, 0), 0);
        assert_eq!(stock_percentage(150, 100), 150);
    }

    proptest! {
        #[test]
        fn alert_never_below_low(initial in 0i64..10_000_000) {
            prop_assert!(alert_threshold(initial) >= low_threshold(initial));
            prop_assert!(low_threshold(initial) >= 1);
            prop_assert!(alert_threshold(initial) >= 2);
        }

        #[test]
        fn low_threshold_covers_five_percent(initial in 0i64..10_000_000) {
            let low = low_threshold(initial);
            prop_assert!(low * 100 >= initial * 5);
            prop_assert!(low == 1 || (low - 1) * 100 < initial * 5);
        }

        #[test]
        fn level_is_monotonic_in_quantity(initial in 0i64..100_000, q in 0i64..200_000) {
            let rank = |level: StockLevel| match level {
                StockLevel::OutOfStock => 0,
                StockLevel::Low => 1,
                StockLevel::Alert => 2,
                StockLevel::Normal => 3,
            };
            let here = rank(stock_health(q, initial).level);
            let next = rank(stock_health(q + 1, initial).level);
            prop_assert!(next >= here);
        }

        #[test]
        fn critical_iff_at_or_below_low(initial in 0i64..100_000, q in 0i64..200_000) {
            let health = stock_health(q, initial);
            prop_assert_eq!(health.level.is_critical(), q <= health.low_threshold);
        }
    }
}
