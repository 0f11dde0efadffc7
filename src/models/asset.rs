use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::units::{from_quanta, Quanta};

/// Per `(userId, currency)` balance row. Mutated only through the settlement
/// scripts during live trading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub user_id: i64,
    pub currency: String,
    pub available: Quanta,
    pub frozen: Quanta,
    pub updated_at: i64,
}

impl Asset {
    pub fn total(&self) -> Quanta {
        self.available + self.frozen
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetResponse {
    pub currency: String,
    pub available: Decimal,
    pub frozen: Decimal,
    pub total: Decimal,
}

impl From<&Asset> for AssetResponse {
    fn from(asset: &Asset) -> Self {
        Self {
            currency: asset.currency.clone(),
            available: from_quanta(asset.available),
            frozen: from_quanta(asset.frozen),
            total: from_quanta(asset.total()),
        }
    }
}
