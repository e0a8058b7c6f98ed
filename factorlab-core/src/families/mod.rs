//! Built-in indicator families.
//!
//! The runner treats these exactly like families supplied by an embedder;
//! `builtin` just lists them in their default declaration order.

pub mod alpha158;
pub mod alpha360;
pub mod candlestick;
pub mod financial;
pub mod technical;
pub mod volatility;

use std::sync::Arc;

pub use alpha158::Alpha158;
pub use alpha360::Alpha360;
pub use candlestick::Candlestick;
pub use financial::{Financial, FINANCIAL_COLUMNS};
pub use technical::Technical;
pub use volatility::Volatility;

use crate::data::FinancialStore;
use crate::family::IndicatorFamily;

/// Every built-in family, in declaration order.
pub fn builtin(financials: Arc<dyn FinancialStore>) -> Vec<Arc<dyn IndicatorFamily>> {
    vec![
        Arc::new(Alpha158),
        Arc::new(Alpha360),
        Arc::new(Technical),
        Arc::new(Candlestick),
        Arc::new(Financial::new(financials)),
        Arc::new(Volatility),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NoFinancials;
    use crate::family::{evaluate, FamilyContext};
    use crate::indicators::make_series;
    use crate::registry::IndicatorRegistry;

    #[test]
    fn builtin_order_is_stable() {
        let names: Vec<String> = builtin(Arc::new(NoFinancials))
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(
            names,
            ["Alpha158", "Alpha360", "Technical", "Candlestick", "Financial", "Volatility"]
        );
    }

    #[test]
    fn all_families_share_one_registry_without_collisions() {
        let ctx = FamilyContext::new(Arc::new(make_series("ALL", 120)));
        let registry = IndicatorRegistry::new();
        let mut total = 0;
        for family in builtin(Arc::new(NoFinancials)) {
            let table = evaluate(family.as_ref(), &ctx, &registry).unwrap();
            assert_eq!(table.rows(), 120, "{}", family.name());
            total += table.width();
        }
        assert_eq!(total, registry.len());
        assert!(registry.skipped().is_empty(), "{:?}", registry.skipped());
    }
}
