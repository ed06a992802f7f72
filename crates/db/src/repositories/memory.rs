use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use temtudo_core::domain::{
    market::{Market, MarketId},
    observation::ObservationRow,
    product::{Product, ProductId},
};
use temtudo_core::store::{
    CatalogStore, MarketFilter, ObservationFilter, PageRequest, SearchEventRecord, StoreError,
};

#[derive(Default)]
struct Catalog {
    markets: BTreeMap<MarketId, Market>,
    products: BTreeMap<ProductId, Product>,
    observations: BTreeMap<i64, ObservationRow>,
    /// Insertion order is recording order.
    search_events: Vec<SearchEventRecord>,
}

/// Catalog held in process memory. Pages are capped at `page_cap` rows
/// regardless of the requested limit.
pub struct InMemoryCatalogStore {
    catalog: RwLock<Catalog>,
    page_cap: usize,
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self { catalog: RwLock::new(Catalog::default()), page_cap: usize::MAX }
    }

    pub fn with_page_cap(page_cap: usize) -> Self {
        Self { catalog: RwLock::new(Catalog::default()), page_cap: page_cap.max(1) }
    }

    pub async fn insert_market(&self, market: Market) {
        self.catalog.write().await.markets.insert(market.id, market);
    }

    pub async fn insert_product(&self, product: Product) {
        self.catalog.write().await.products.insert(product.id, product);
    }

    pub async fn insert_observation(&self, row: ObservationRow) {
        self.catalog.write().await.observations.insert(row.id, row);
    }

    pub async fn insert_observations(&self, rows: impl IntoIterator<Item = ObservationRow>) {
        let mut catalog = self.catalog.write().await;
        for row in rows {
            catalog.observations.insert(row.id, row);
        }
    }

    pub async fn record_search_event(&self, event: SearchEventRecord) {
        self.catalog.write().await.search_events.push(event);
    }
}

fn matches(filter: &ObservationFilter, row: &ObservationRow) -> bool {
    let product_ok = filter.product_ids.as_ref().map_or(true, |ids| {
        row.product_id.is_some_and(|id| ids.contains(&ProductId(id)))
    });
    let market_ok = filter.market_id.map_or(true, |market_id| row.market_id == Some(market_id.0));
    let recency_ok = filter
        .observed_since
        .map_or(true, |since| row.observed_at.is_some_and(|observed_at| observed_at >= since));
    product_ok && market_ok && recency_ok
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    fn max_page_size(&self) -> usize {
        self.page_cap
    }

    async fn observation_page(
        &self,
        filter: &ObservationFilter,
        page: PageRequest,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .observations
            .values()
            .filter(|row| matches(filter, row))
            .skip(page.offset)
            .take(page.limit.min(self.page_cap))
            .cloned()
            .collect())
    }

    async fn markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .markets
            .values()
            .filter(|market| match filter {
                MarketFilter::All => true,
                MarketFilter::Located => market.is_located(),
                MarketFilter::Ids(ids) => ids.contains(&market.id),
            })
            .cloned()
            .collect())
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.products.values().filter(|product| ids.contains(&product.id)).cloned().collect())
    }

    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>, StoreError> {
        let needle = query.trim().to_lowercase();
        let catalog = self.catalog.read().await;
        Ok(catalog
            .products
            .values()
            .filter(|product| {
                needle.is_empty()
                    || product.name.to_lowercase().contains(&needle)
                    || product.brand.as_ref().is_some_and(|brand| brand.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_observations_for_market(
        &self,
        market_id: MarketId,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        let catalog = self.catalog.read().await;
        let mut rows = catalog
            .observations
            .values()
            .filter(|row| row.market_id == Some(market_id.0))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.observed_at.cmp(&a.observed_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_search_events(&self, limit: usize) -> Result<Vec<SearchEventRecord>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.search_events.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use temtudo_core::domain::{
        market::{GeoPoint, Market, MarketId},
        observation::ObservationRow,
        product::{Product, ProductId},
    };
    use temtudo_core::pricing::{classify_market_tiers, PriceEngine, PricingPolicy};
    use temtudo_core::store::{
        fetch_all_observations, screen_rows, CatalogStore, MarketFilter, ObservationFilter,
        SearchEventRecord,
    };

    use super::InMemoryCatalogStore;

    fn market(id: i64, located: bool) -> Market {
        Market {
            id: MarketId(id),
            name: format!("Mercado {id}"),
            address: None,
            neighborhood: None,
            city: Some("Rio de Janeiro".to_string()),
            state: Some("RJ".to_string()),
            location: located.then(|| GeoPoint::new(-22.9 - id as f64 / 100.0, -43.2)),
            phone: None,
            website: None,
        }
    }

    fn rows(count: i64) -> Vec<ObservationRow> {
        (1..=count)
            .map(|id| ObservationRow {
                id,
                product_id: Some(id % 11),
                market_id: Some(id % 5 + 1),
                price: Some(Decimal::new(150 + (id * 53) % 2_000, 2)),
                observed_at: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn page_cap_bounds_every_page() {
        let store = InMemoryCatalogStore::with_page_cap(1_000);
        store.insert_observations(rows(2_500)).await;

        let batch = fetch_all_observations(&store, &ObservationFilter::all(), 10_000)
            .await
            .expect("fetch succeeds");

        assert_eq!(batch.pages, 3);
        assert_eq!(batch.observations.len(), 2_500);
    }

    #[tokio::test]
    async fn paginated_tiers_match_unpaginated_computation() {
        let store = InMemoryCatalogStore::with_page_cap(1_000);
        for id in 1..=5 {
            store.insert_market(market(id, true)).await;
        }
        store.insert_observations(rows(2_500)).await;

        let engine = PriceEngine::new(store, PricingPolicy::default());
        let paged = engine.market_tier_overview().await.expect("overview");

        let markets = engine.store().markets(&MarketFilter::All).await.expect("markets");
        let (observations, _) = screen_rows(rows(2_500));
        let expected = classify_market_tiers(&markets, &observations);

        assert_eq!(paged, expected);
    }

    #[tokio::test]
    async fn search_and_recent_reads_follow_store_contract() {
        let store = InMemoryCatalogStore::new();
        store
            .insert_product(Product {
                id: ProductId(2),
                name: "Café Torrado".to_string(),
                brand: Some("Pilão".to_string()),
                category: None,
            })
            .await;
        store
            .insert_product(Product {
                id: ProductId(1),
                name: "Açúcar".to_string(),
                brand: Some("União".to_string()),
                category: None,
            })
            .await;
        for (kind, payload) in [("search", "{}"), ("cart", "[]")] {
            store
                .record_search_event(SearchEventRecord {
                    kind: kind.to_string(),
                    payload: Some(payload.to_string()),
                    recorded_at: None,
                })
                .await;
        }

        let found = store.search_products("PILÃO", 10).await.expect("search");
        assert_eq!(found.iter().map(|p| p.id.0).collect::<Vec<_>>(), vec![2]);

        let all = store.search_products("", 10).await.expect("search");
        assert_eq!(all.iter().map(|p| p.id.0).collect::<Vec<_>>(), vec![1, 2]);

        let events = store.recent_search_events(1).await.expect("events");
        assert_eq!(events[0].kind, "cart");

        assert!(store.markets(&MarketFilter::Located).await.expect("markets").is_empty());
        store.insert_market(market(1, false)).await;
        store.insert_market(market(2, true)).await;
        let located = store.markets(&MarketFilter::Located).await.expect("markets");
        assert_eq!(located.iter().map(|m| m.id.0).collect::<Vec<_>>(), vec![2]);
    }
}
