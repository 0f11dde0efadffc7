use serde::{Deserialize, Serialize};

use super::units::{Quanta, SCALE};

/// Trading pair definition. Immutable at runtime apart from last-price
/// tracking, which lives in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPair {
    pub id: i64,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_quantity: Quanta,
    pub max_quantity: Quanta,
    pub is_active: bool,
}

impl TradingPair {
    /// Smallest representable quantity step in quanta.
    pub fn quantity_step(&self) -> Quanta {
        10i64.pow(SCALE.saturating_sub(self.quantity_precision))
    }

    /// Smallest representable price step in quanta.
    pub fn price_step(&self) -> Quanta {
        10i64.pow(SCALE.saturating_sub(self.price_precision))
    }

    pub fn valid_quantity(&self, quantity: Quanta) -> bool {
        quantity >= self.min_quantity
            && quantity <= self.max_quantity
            && quantity % self.quantity_step() == 0
    }

    pub fn valid_price(&self, price: Quanta) -> bool {
        price > 0 && price % self.price_step() == 0
    }

    /// Truncate a computed quantity down to the pair's precision grid.
    pub fn snap_quantity(&self, quantity: Quanta) -> Quanta {
        quantity - quantity % self.quantity_step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::units::to_quanta;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> TradingPair {
        TradingPair {
            id: 1,
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            price_precision: 2,
            quantity_precision: 6,
            min_quantity: to_quanta(dec!(0.000001)).unwrap(),
            max_quantity: to_quanta(dec!(1000)).unwrap(),
            is_active: true,
        }
    }

    #[test]
    fn test_quantity_validation() {
        let pair = btc_usdt();
        assert!(pair.valid_quantity(to_quanta(dec!(0.5)).unwrap()));
        assert!(!pair.valid_quantity(0));
        // 7 decimals on a 6-decimal pair
        assert!(!pair.valid_quantity(to_quanta(dec!(0.0000015)).unwrap()));
        assert!(!pair.valid_quantity(to_quanta(dec!(1001)).unwrap()));
    }

    #[test]
    fn test_price_validation() {
        let pair = btc_usdt();
        assert!(pair.valid_price(to_quanta(dec!(50000.25)).unwrap()));
        assert!(!pair.valid_price(to_quanta(dec!(50000.255)).unwrap()));
        assert!(!pair.valid_price(0));
    }

    #[test]
    fn test_snap_quantity() {
        let pair = btc_usdt();
        let raw = to_quanta(dec!(0.12345678)).unwrap();
        assert_eq!(pair.snap_quantity(raw), to_quanta(dec!(0.123456)).unwrap());
    }
}
