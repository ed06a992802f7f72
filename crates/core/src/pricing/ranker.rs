//! Single-product price ranking across markets.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UnlocatedMarketPolicy;
use crate::domain::{
    market::{GeoPoint, Market, MarketId},
    observation::PriceObservation,
    product::{Product, ProductId},
};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferTier {
    Best,
    Medium,
    High,
}

impl OfferTier {
    /// Index 0 is `best`, indices in the lower half are `medium`, the rest
    /// `high`. "Lower half" is `index < total / 2` with real division.
    pub fn for_rank(index: usize, total: usize) -> Self {
        if index == 0 {
            Self::Best
        } else if index * 2 < total {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductQuery {
    Id(ProductId),
    /// Case-insensitive substring of the product name or brand.
    Text(String),
}

impl ProductQuery {
    pub fn from_parts(id: Option<i64>, text: Option<&str>) -> Result<Self, DomainError> {
        match (id, text.map(str::trim).filter(|text| !text.is_empty())) {
            (Some(id), _) => Ok(Self::Id(ProductId(id))),
            (None, Some(text)) => Ok(Self::Text(text.to_string())),
            (None, None) => Err(DomainError::InvalidRequest(
                "a product id or a product name is required".into(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketOffer {
    pub market: Market,
    pub price: Decimal,
    pub observed_at: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
    pub tier: OfferTier,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPriceRanking {
    /// First product that matched the query.
    pub product: Option<Product>,
    pub offers: Vec<MarketOffer>,
}

/// Ranks the lowest price each market charges, cheapest first.
///
/// Observations for markets missing from `markets` are ignored. With a user
/// location, markets without coordinates follow `unlocated`.
pub fn rank_offers(
    observations: &[PriceObservation],
    markets: &HashMap<MarketId, Market>,
    user_location: Option<GeoPoint>,
    unlocated: &UnlocatedMarketPolicy,
) -> Vec<MarketOffer> {
    let mut lowest: BTreeMap<MarketId, (Decimal, Option<DateTime<Utc>>)> = BTreeMap::new();
    for observation in observations {
        if !markets.contains_key(&observation.market_id) {
            continue;
        }
        match lowest.get(&observation.market_id) {
            Some((price, _)) if *price <= observation.price => {}
            _ => {
                lowest.insert(observation.market_id, (observation.price, observation.observed_at));
            }
        }
    }

    let mut offers = Vec::new();
    for (market_id, (price, observed_at)) in lowest {
        let Some(market) = markets.get(&market_id) else { continue };

        let distance_km = match user_location {
            None => None,
            Some(user) => match (market.location, unlocated) {
                (Some(location), _) => Some(user.distance_km(&location)),
                (None, UnlocatedMarketPolicy::ExcludeUnlocated) => continue,
                (None, UnlocatedMarketPolicy::FallbackToRegionCenter(center)) => {
                    Some(user.distance_km(center))
                }
            },
        };

        offers.push((market.clone(), price, observed_at, distance_km));
    }

    // stable: equal prices keep market id order
    offers.sort_by(|a, b| a.1.cmp(&b.1));

    let total = offers.len();
    offers
        .into_iter()
        .enumerate()
        .map(|(index, (market, price, observed_at, distance_km))| MarketOffer {
            market,
            price,
            observed_at,
            distance_km,
            tier: OfferTier::for_rank(index, total),
        })
        .collect()
}
