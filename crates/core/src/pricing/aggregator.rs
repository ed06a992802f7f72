//! Collapses price observations into one representative price per
//! (market, product) pair.
//!
//! The representative price is the lowest ever observed within the active
//! lookback window. Ties keep the first observation seen.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{market::MarketId, observation::PriceObservation, product::ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowestPrice {
    pub price: Decimal,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Lowest observed price per product, per market. Ordered by id on both
/// levels so every iteration over it is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LowestPriceIndex {
    markets: BTreeMap<MarketId, BTreeMap<ProductId, LowestPrice>>,
}

impl LowestPriceIndex {
    pub fn from_observations<'a>(
        observations: impl IntoIterator<Item = &'a PriceObservation>,
    ) -> Self {
        let mut index = Self::default();
        for observation in observations {
            index.record(observation);
        }
        index
    }

    pub fn record(&mut self, observation: &PriceObservation) {
        let products = self.markets.entry(observation.market_id).or_default();
        match products.get(&observation.product_id) {
            Some(existing) if existing.price <= observation.price => {}
            _ => {
                products.insert(
                    observation.product_id,
                    LowestPrice { price: observation.price, observed_at: observation.observed_at },
                );
            }
        }
    }

    pub fn price(&self, market_id: MarketId, product_id: ProductId) -> Option<Decimal> {
        self.markets.get(&market_id)?.get(&product_id).map(|lowest| lowest.price)
    }

    pub fn products_at(
        &self,
        market_id: MarketId,
    ) -> impl Iterator<Item = (&ProductId, &LowestPrice)> + '_ {
        self.markets.get(&market_id).into_iter().flat_map(|products| products.iter())
    }

    pub fn markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.keys().copied()
    }

    /// Every market that prices `product_id`, in market id order.
    pub fn offers_for(
        &self,
        product_id: ProductId,
    ) -> impl Iterator<Item = (MarketId, &LowestPrice)> + '_ {
        self.markets
            .iter()
            .filter_map(move |(market_id, products)| Some((*market_id, products.get(&product_id)?)))
    }

    pub fn retain_markets(&mut self, mut keep: impl FnMut(MarketId) -> bool) {
        self.markets.retain(|market_id, _| keep(*market_id));
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn summarize(&self, market_id: MarketId) -> MarketPriceSummary {
        let prices = self.products_at(market_id).map(|(_, lowest)| lowest.price).collect::<Vec<_>>();
        let product_count = prices.len();
        let avg_price = (product_count > 0)
            .then(|| prices.iter().copied().sum::<Decimal>() / Decimal::from(product_count));

        MarketPriceSummary { market_id, avg_price, product_count }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPriceSummary {
    pub market_id: MarketId,
    /// Mean of the per-product lowest prices; `None` when nothing is priced.
    pub avg_price: Option<Decimal>,
    /// Distinct products with at least one observation.
    pub product_count: usize,
}

/// Observation-level mean across every market: `sum(prices) / count`.
/// Markets with more observations weigh more. Zero when there is no data.
pub fn global_average(observations: &[PriceObservation]) -> Decimal {
    if observations.is_empty() {
        return Decimal::ZERO;
    }
    observations.iter().map(|observation| observation.price).sum::<Decimal>()
        / Decimal::from(observations.len())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{global_average, LowestPriceIndex};
    use crate::domain::{
        market::MarketId,
        observation::{ObservationId, PriceObservation},
        product::ProductId,
    };

    fn observation(id: i64, market: i64, product: i64, cents: i64) -> PriceObservation {
        PriceObservation {
            id: ObservationId(id),
            product_id: ProductId(product),
            market_id: MarketId(market),
            price: Decimal::new(cents, 2),
            observed_at: None,
        }
    }

    #[test]
    fn keeps_lowest_price_per_market_and_product() {
        let observations = vec![
            observation(1, 1, 10, 500),
            observation(2, 1, 10, 450),
            observation(3, 1, 10, 700),
            observation(4, 2, 10, 390),
        ];

        let index = LowestPriceIndex::from_observations(&observations);

        assert_eq!(index.price(MarketId(1), ProductId(10)), Some(Decimal::new(450, 2)));
        assert_eq!(index.price(MarketId(2), ProductId(10)), Some(Decimal::new(390, 2)));
        assert_eq!(index.price(MarketId(2), ProductId(11)), None);
    }

    #[test]
    fn summary_averages_lowest_prices_over_distinct_products() {
        let observations = vec![
            observation(1, 1, 10, 400),
            observation(2, 1, 10, 800),
            observation(3, 1, 11, 600),
        ];

        let summary = LowestPriceIndex::from_observations(&observations).summarize(MarketId(1));

        assert_eq!(summary.product_count, 2);
        assert_eq!(summary.avg_price, Some(Decimal::new(500, 2)));
    }

    #[test]
    fn market_without_observations_has_no_average() {
        let summary = LowestPriceIndex::default().summarize(MarketId(9));

        assert_eq!(summary.product_count, 0);
        assert_eq!(summary.avg_price, None);
    }

    #[test]
    fn global_average_is_observation_weighted() {
        let observations = vec![
            observation(1, 1, 10, 100),
            observation(2, 1, 11, 100),
            observation(3, 1, 12, 100),
            observation(4, 2, 10, 500),
        ];

        assert_eq!(global_average(&observations), Decimal::new(200, 2));
        assert_eq!(global_average(&[]), Decimal::ZERO);
    }
}
