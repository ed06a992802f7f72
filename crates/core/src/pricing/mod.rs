//! Price aggregation and market ranking.
//!
//! Every component follows the same convention: a market's current price for
//! a product is the lowest price observed there within the lookback window.

pub mod aggregator;
pub mod engine;
pub mod listing;
pub mod optimizer;
pub mod ranker;
pub mod tiers;

use chrono::{DateTime, Duration, Utc};

use crate::config::{PricingConfig, UnlocatedPolicyKind};
use crate::domain::market::GeoPoint;

pub use aggregator::{global_average, LowestPrice, LowestPriceIndex, MarketPriceSummary};
pub use engine::PriceEngine;
pub use listing::{latest_prices, MarketCatalogEntry};
pub use optimizer::{
    BestMarketPrice, CartOptimization, CartOptimizer, CartScoringWeights, MarketScore,
    ProductBestPrice,
};
pub use ranker::{rank_offers, MarketOffer, OfferTier, ProductPriceRanking, ProductQuery};
pub use tiers::{classify_market_tiers, classify_tier, MarketTier, MarketTierEntry, MarketTierList};

pub const DEFAULT_PAGE_SIZE: usize = 1_000;
pub const DEFAULT_TOP_MARKETS: usize = 20;

/// What distance-aware views do with markets that have no coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum UnlocatedMarketPolicy {
    ExcludeUnlocated,
    /// Measure distance to a fixed reference point instead.
    FallbackToRegionCenter(GeoPoint),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricingPolicy {
    pub page_size: usize,
    pub top_markets_limit: usize,
    /// Observations older than this are ignored. `None` looks back forever.
    pub max_observation_age: Option<Duration>,
    pub unlocated: UnlocatedMarketPolicy,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            top_markets_limit: DEFAULT_TOP_MARKETS,
            max_observation_age: None,
            unlocated: UnlocatedMarketPolicy::ExcludeUnlocated,
        }
    }
}

impl PricingPolicy {
    pub fn observed_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_observation_age.map(|age| now - age)
    }
}

impl From<&PricingConfig> for PricingPolicy {
    fn from(config: &PricingConfig) -> Self {
        let unlocated = match config.unlocated_policy {
            UnlocatedPolicyKind::ExcludeUnlocated => UnlocatedMarketPolicy::ExcludeUnlocated,
            UnlocatedPolicyKind::FallbackToRegionCenter => {
                UnlocatedMarketPolicy::FallbackToRegionCenter(GeoPoint::new(
                    config.region_center_lat,
                    config.region_center_lng,
                ))
            }
        };

        Self {
            page_size: config.page_size,
            top_markets_limit: config.top_markets_limit,
            max_observation_age: config
                .max_observation_age_days
                .map(|days| Duration::days(i64::from(days))),
            unlocated,
        }
    }
}
