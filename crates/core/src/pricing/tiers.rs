//! Buckets markets by how their average price compares to the global mean.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregator::{global_average, LowestPriceIndex};
use crate::domain::{market::Market, observation::PriceObservation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketTier {
    Cheap,
    Medium,
    Expensive,
    NoData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketTierEntry {
    pub market: Market,
    pub avg_price: Option<Decimal>,
    pub product_count: usize,
    pub tier: MarketTier,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketTierList {
    pub markets: Vec<MarketTierEntry>,
    pub global_avg_price: Decimal,
}

/// `ratio <= 0.9` is cheap, `ratio <= 1.1` is medium, anything above is
/// expensive. Compared as `avg * 10` against `global * 9|11` so the
/// boundaries are exact.
pub fn classify_tier(avg_price: Option<Decimal>, global_avg: Decimal) -> MarketTier {
    let Some(avg_price) = avg_price else {
        return MarketTier::NoData;
    };
    if global_avg <= Decimal::ZERO {
        return MarketTier::NoData;
    }

    let scaled = avg_price * Decimal::TEN;
    if scaled <= global_avg * Decimal::from(9) {
        MarketTier::Cheap
    } else if scaled <= global_avg * Decimal::from(11) {
        MarketTier::Medium
    } else {
        MarketTier::Expensive
    }
}

/// Classifies every market in `markets` against the global average over
/// `observations`. Observations for markets outside the list still count
/// toward the global average.
pub fn classify_market_tiers(
    markets: &[Market],
    observations: &[PriceObservation],
) -> MarketTierList {
    let global_avg_price = global_average(observations);
    let index = LowestPriceIndex::from_observations(observations);

    let markets = markets
        .iter()
        .map(|market| {
            let summary = index.summarize(market.id);
            MarketTierEntry {
                market: market.clone(),
                avg_price: summary.avg_price,
                product_count: summary.product_count,
                tier: classify_tier(summary.avg_price, global_avg_price),
            }
        })
        .collect();

    MarketTierList { markets, global_avg_price }
}
