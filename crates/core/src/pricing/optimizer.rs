//! Multi-item cart optimization.
//!
//! Every market that prices at least one requested product is scored on a
//! weighted blend of coverage (share of cart items it prices) and price
//! competitiveness (its average unit price normalized against the other
//! candidates). Coverage carries most of the weight, so a market stocking the
//! whole cart at moderate prices outranks one that only has the cheapest
//! single item.

use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregator::LowestPriceIndex;
use crate::domain::{
    cart::CartRequest,
    market::{Market, MarketId},
    observation::PriceObservation,
    product::ProductId,
};
use crate::errors::DomainError;

/// Weights for the composite market score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartScoringWeights {
    /// Weight for the share of cart items a market prices (default: 0.70)
    pub availability: f64,
    /// Weight for the normalized average price (default: 0.30)
    pub price: f64,
}

impl Default for CartScoringWeights {
    fn default() -> Self {
        Self { availability: 0.7, price: 0.3 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketScore {
    pub market: Market,
    pub total_price: Decimal,
    pub available_count: usize,
    pub missing_products: Vec<String>,
    pub score: f64,
    pub distance_km: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMarketPrice {
    pub market_id: MarketId,
    pub market_name: String,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBestPrice {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub best_market: Option<BestMarketPrice>,
    /// `(highest market price - best price) * quantity`.
    pub savings: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartOptimization {
    pub best_market: Option<MarketScore>,
    /// Ranked best first, truncated to the configured display limit.
    pub potential_markets: Vec<MarketScore>,
    pub all_products: Vec<ProductBestPrice>,
    pub total_savings: Decimal,
    /// Markets scored before truncation.
    pub markets_evaluated: usize,
}

#[derive(Clone, Debug, Default)]
pub struct CartOptimizer {
    weights: CartScoringWeights,
    top_markets_limit: Option<usize>,
}

impl CartOptimizer {
    pub fn new(top_markets_limit: usize) -> Self {
        Self { weights: CartScoringWeights::default(), top_markets_limit: Some(top_markets_limit) }
    }

    pub fn with_weights(mut self, weights: CartScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Scores every market in `markets` that prices at least one requested
    /// product. Observations for unknown markets are ignored.
    pub fn optimize(
        &self,
        request: &CartRequest,
        observations: &[PriceObservation],
        markets: &HashMap<MarketId, Market>,
    ) -> Result<CartOptimization, DomainError> {
        request.validate()?;

        let requested = request.product_ids();
        let mut index = LowestPriceIndex::from_observations(
            observations.iter().filter(|observation| requested.contains(&observation.product_id)),
        );
        index.retain_markets(|market_id| markets.contains_key(&market_id));

        let mut scores = self.score_markets(request, &index, markets);
        scores.sort_by(compare_scores);
        let markets_evaluated = scores.len();

        let all_products = best_prices_per_product(request, &index, markets);
        let total_savings = all_products.iter().map(|product| product.savings).sum();

        if let Some(limit) = self.top_markets_limit {
            scores.truncate(limit);
        }

        Ok(CartOptimization {
            best_market: scores.first().cloned(),
            potential_markets: scores,
            all_products,
            total_savings,
            markets_evaluated,
        })
    }

    fn score_markets(
        &self,
        request: &CartRequest,
        index: &LowestPriceIndex,
        markets: &HashMap<MarketId, Market>,
    ) -> Vec<MarketScore> {
        let requested_count = request.items.len();
        let mut scores = Vec::new();

        for market_id in index.markets() {
            let Some(market) = markets.get(&market_id) else { continue };

            let mut total_price = Decimal::ZERO;
            let mut available_count = 0;
            let mut missing_products = Vec::new();

            for item in &request.items {
                match index.price(market_id, item.product_id) {
                    Some(price) => {
                        total_price += price * Decimal::from(item.quantity);
                        available_count += 1;
                    }
                    None => missing_products.push(item.name.clone()),
                }
            }

            if available_count == 0 {
                continue;
            }

            let distance_km = request
                .user_location
                .zip(market.location)
                .map(|(user, location)| user.distance_km(&location));

            let availability = available_count as f64 / requested_count as f64;

            scores.push(MarketScore {
                market: market.clone(),
                total_price,
                available_count,
                missing_products,
                score: availability * self.weights.availability,
                distance_km,
            });
        }

        self.apply_price_scores(&mut scores);
        scores
    }

    /// Adds `price_score * weight`, where `price_score` is 1 for the
    /// cheapest average unit price and 0 for the most expensive. A zero
    /// spread is treated as 1 so identical prices all score 1.
    fn apply_price_scores(&self, scores: &mut [MarketScore]) {
        let averages = scores.iter().map(average_unit_price).collect::<Vec<Decimal>>();
        let (Some(min), Some(max)) =
            (averages.iter().copied().min(), averages.iter().copied().max())
        else {
            return;
        };

        let spread = if max == min { Decimal::ONE } else { max - min };
        for (score, average) in scores.iter_mut().zip(averages) {
            let price_score = Decimal::ONE - (average - min) / spread;
            score.score += price_score.to_f64().unwrap_or_default() * self.weights.price;
        }
    }
}

fn average_unit_price(score: &MarketScore) -> Decimal {
    score.total_price / Decimal::from(score.available_count)
}

/// Highest score first; ties go to better coverage, then lower total, then
/// market id.
fn compare_scores(a: &MarketScore, b: &MarketScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.available_count.cmp(&a.available_count))
        .then_with(|| a.total_price.cmp(&b.total_price))
        .then_with(|| a.market.id.cmp(&b.market.id))
}

fn best_prices_per_product(
    request: &CartRequest,
    index: &LowestPriceIndex,
    markets: &HashMap<MarketId, Market>,
) -> Vec<ProductBestPrice> {
    request
        .items
        .iter()
        .map(|item| {
            let mut best: Option<(MarketId, Decimal)> = None;
            let mut highest = Decimal::ZERO;

            for (market_id, lowest) in index.offers_for(item.product_id) {
                if best.map_or(true, |(_, price)| lowest.price < price) {
                    best = Some((market_id, lowest.price));
                }
                highest = highest.max(lowest.price);
            }

            let quantity = Decimal::from(item.quantity);
            let best_market = best.map(|(market_id, unit_price)| BestMarketPrice {
                market_id,
                market_name: markets
                    .get(&market_id)
                    .map(|market| market.name.clone())
                    .unwrap_or_default(),
                unit_price,
                total: unit_price * quantity,
            });
            let savings = best.map_or(Decimal::ZERO, |(_, price)| (highest - price) * quantity);

            ProductBestPrice {
                product_id: item.product_id,
                name: item.name.clone(),
                quantity: item.quantity,
                best_market,
                savings,
            }
        })
        .collect()
}
