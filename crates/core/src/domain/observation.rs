use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{market::MarketId, product::ProductId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationId(pub i64);

/// One timestamped report of a product's price at a market. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: ObservationId,
    pub product_id: ProductId,
    pub market_id: MarketId,
    pub price: Decimal,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Observation as the store hands it over, before data-quality screening.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationRow {
    pub id: i64,
    pub product_id: Option<i64>,
    pub market_id: Option<i64>,
    pub price: Option<Decimal>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl ObservationRow {
    /// Returns `None` for rows that cannot take part in pricing: missing
    /// product, missing market, missing or negative price.
    pub fn into_observation(self) -> Option<PriceObservation> {
        let price = self.price.filter(|price| !price.is_sign_negative())?;
        Some(PriceObservation {
            id: ObservationId(self.id),
            product_id: ProductId(self.product_id?),
            market_id: MarketId(self.market_id?),
            price,
            observed_at: self.observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::ObservationRow;

    #[test]
    fn complete_row_converts_to_observation() {
        let row = ObservationRow {
            id: 7,
            product_id: Some(1),
            market_id: Some(2),
            price: Some(Decimal::new(499, 2)),
            observed_at: None,
        };

        let observation = row.into_observation().expect("row is complete");
        assert_eq!(observation.price, Decimal::new(499, 2));
        assert_eq!(observation.market_id.0, 2);
    }

    #[test]
    fn rows_missing_price_or_market_are_rejected() {
        let base = ObservationRow {
            id: 1,
            product_id: Some(1),
            market_id: Some(1),
            price: Some(Decimal::ONE),
            observed_at: None,
        };

        assert!(ObservationRow { price: None, ..base.clone() }.into_observation().is_none());
        assert!(ObservationRow { market_id: None, ..base.clone() }.into_observation().is_none());
        assert!(ObservationRow { product_id: None, ..base.clone() }.into_observation().is_none());
        assert!(ObservationRow { price: Some(Decimal::NEGATIVE_ONE), ..base }
            .into_observation()
            .is_none());
    }
}
