use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    observation::PriceObservation,
    product::{Product, ProductId},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCatalogEntry {
    pub product: Product,
    pub price: Decimal,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Latest observation per product. Undated observations count as oldest;
/// equal timestamps go to the higher observation id.
pub fn latest_prices(observations: &[PriceObservation]) -> BTreeMap<ProductId, &PriceObservation> {
    let mut latest: BTreeMap<ProductId, &PriceObservation> = BTreeMap::new();
    for observation in observations {
        let newer = latest.get(&observation.product_id).map_or(true, |current| {
            (observation.observed_at, observation.id) > (current.observed_at, current.id)
        });
        if newer {
            latest.insert(observation.product_id, observation);
        }
    }
    latest
}

/// Catalog listing for one market, sorted by product name.
pub fn catalog_entries(
    observations: &[PriceObservation],
    products: &[Product],
) -> Vec<MarketCatalogEntry> {
    let latest = latest_prices(observations);
    let mut entries = products
        .iter()
        .filter_map(|product| {
            let observation = latest.get(&product.id)?;
            Some(MarketCatalogEntry {
                product: product.clone(),
                price: observation.price,
                observed_at: observation.observed_at,
            })
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| {
        a.product
            .name
            .to_lowercase()
            .cmp(&b.product.name.to_lowercase())
            .then(a.product.id.cmp(&b.product.id))
    });
    entries
}
