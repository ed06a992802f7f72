//! Store-backed entry points for the pricing components.
//!
//! A `PriceEngine` is built per request around an injected store handle. It
//! holds no mutable state, so concurrent requests never share anything but
//! the store's own connection pool. Dropping a returned future stops any
//! further store queries; nothing needs rolling back since nothing is written.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::info;

use super::{
    listing::{catalog_entries, MarketCatalogEntry},
    optimizer::{CartOptimization, CartOptimizer},
    ranker::{rank_offers, ProductPriceRanking, ProductQuery},
    tiers::{classify_market_tiers, MarketTierList},
    PricingPolicy,
};
use crate::domain::{
    cart::CartRequest,
    market::{GeoPoint, Market, MarketId},
    observation::PriceObservation,
    product::{Product, ProductId},
};
use crate::errors::{ApplicationError, DomainError};
use crate::store::{fetch_all_observations, CatalogStore, MarketFilter, ObservationFilter};

pub struct PriceEngine<S> {
    store: S,
    policy: PricingPolicy,
}

impl<S> PriceEngine<S>
where
    S: CatalogStore,
{
    pub fn new(store: S, policy: PricingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lowest price per market for the product(s) matching `query`,
    /// cheapest first. No matching product yields an empty ranking.
    pub async fn rank_product_prices(
        &self,
        query: &ProductQuery,
        user_location: Option<GeoPoint>,
    ) -> Result<ProductPriceRanking, ApplicationError> {
        validate_location(user_location)?;

        let products = match query {
            ProductQuery::Id(id) => self.store.products_by_ids(&[*id]).await?,
            ProductQuery::Text(text) => self.store.search_products(text, usize::MAX).await?,
        };
        let Some(first) = products.first().cloned() else {
            return Ok(ProductPriceRanking::default());
        };

        let product_ids = products.iter().map(|product| product.id).collect::<Vec<_>>();
        let observations = self.observations(ObservationFilter::for_products(product_ids)).await?;
        let markets = self.markets_for(&observations).await?;

        let offers = rank_offers(&observations, &markets, user_location, &self.policy.unlocated);
        info!(
            event_name = "pricing.rank.completed",
            matched_products = products.len(),
            observations = observations.len(),
            offers = offers.len(),
            "ranked product prices"
        );

        Ok(ProductPriceRanking { product: Some(first), offers })
    }

    /// Scores every market against the cart. An empty cart is rejected
    /// before the store is touched.
    pub async fn optimize_cart(
        &self,
        request: &CartRequest,
    ) -> Result<CartOptimization, ApplicationError> {
        request.validate()?;

        let observations =
            self.observations(ObservationFilter::for_products(request.product_ids())).await?;
        let markets = self.markets_for(&observations).await?;

        let result = CartOptimizer::new(self.policy.top_markets_limit).optimize(
            request,
            &observations,
            &markets,
        )?;
        info!(
            event_name = "pricing.cart.optimized",
            requested_items = request.items.len(),
            markets_evaluated = result.markets_evaluated,
            best_market_id = result.best_market.as_ref().map(|score| score.market.id.0),
            "cart optimized"
        );

        Ok(result)
    }

    /// Tier for every located market, against the global observation mean.
    pub async fn market_tier_overview(&self) -> Result<MarketTierList, ApplicationError> {
        let markets = self.store.markets(&MarketFilter::Located).await?;
        let observations = self.observations(ObservationFilter::all()).await?;

        let list = classify_market_tiers(&markets, &observations);
        info!(
            event_name = "pricing.tiers.classified",
            markets = list.markets.len(),
            observations = observations.len(),
            global_avg_price = %list.global_avg_price,
            "market tiers classified"
        );

        Ok(list)
    }

    /// Latest price of every product observed at `market_id`.
    pub async fn market_catalog(
        &self,
        market_id: MarketId,
    ) -> Result<Vec<MarketCatalogEntry>, ApplicationError> {
        let observations = self.observations(ObservationFilter::for_market(market_id)).await?;
        if observations.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids = observations
            .iter()
            .map(|observation| observation.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<ProductId>>();
        let products = self.store.products_by_ids(&product_ids).await?;

        Ok(catalog_entries(&observations, &products))
    }

    pub async fn search_products(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Product>, ApplicationError> {
        if limit == 0 {
            return Err(DomainError::InvalidRequest("limit must be at least 1".into()).into());
        }
        Ok(self.store.search_products(query.trim(), limit).await?)
    }

    async fn observations(
        &self,
        filter: ObservationFilter,
    ) -> Result<Vec<PriceObservation>, ApplicationError> {
        if self.policy.page_size == 0 {
            return Err(ApplicationError::Configuration(
                "pricing page size must be at least 1".into(),
            ));
        }
        let filter = filter.since(self.policy.observed_since(Utc::now()));
        let batch = fetch_all_observations(&self.store, &filter, self.policy.page_size).await?;
        Ok(batch.observations)
    }

    async fn markets_for(
        &self,
        observations: &[PriceObservation],
    ) -> Result<HashMap<MarketId, Market>, ApplicationError> {
        let ids = observations
            .iter()
            .map(|observation| observation.market_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let markets = self.store.markets(&MarketFilter::Ids(ids)).await?;
        Ok(markets.into_iter().map(|market| (market.id, market)).collect())
    }
}

fn validate_location(location: Option<GeoPoint>) -> Result<(), DomainError> {
    match location {
        Some(point) if !point.is_valid() => Err(DomainError::InvalidRequest(
            "user location must be a valid latitude/longitude pair".into(),
        )),
        _ => Ok(()),
    }
}
