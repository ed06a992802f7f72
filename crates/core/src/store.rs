//! Read-only contract for the persisted price catalog.
//!
//! The engine never writes through this trait. Implementations live in
//! `temtudo-db`; the core only depends on the query shapes below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    market::{Market, MarketId},
    observation::{ObservationRow, PriceObservation},
    product::{Product, ProductId},
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Unavailable(String),
    #[error("store returned undecodable data: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    pub product_ids: Option<Vec<ProductId>>,
    pub market_id: Option<MarketId>,
    pub observed_since: Option<DateTime<Utc>>,
}

impl ObservationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_products(product_ids: Vec<ProductId>) -> Self {
        Self { product_ids: Some(product_ids), ..Self::default() }
    }

    pub fn for_market(market_id: MarketId) -> Self {
        Self { market_id: Some(market_id), ..Self::default() }
    }

    pub fn since(mut self, observed_since: Option<DateTime<Utc>>) -> Self {
        self.observed_since = observed_since;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketFilter {
    All,
    /// Only markets with stored coordinates.
    Located,
    Ids(Vec<MarketId>),
}

/// A logged search interaction. `payload` is the raw JSON text as stored;
/// its shape is not trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchEventRecord {
    pub kind: String,
    pub payload: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Largest page the backend will return for a single query.
    fn max_page_size(&self) -> usize {
        usize::MAX
    }

    /// One page of observations ordered by observation id ascending.
    async fn observation_page(
        &self,
        filter: &ObservationFilter,
        page: PageRequest,
    ) -> Result<Vec<ObservationRow>, StoreError>;

    async fn markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, StoreError>;

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// Case-insensitive substring match on product name or brand. A blank
    /// query matches every product.
    async fn search_products(&self, query: &str, limit: usize)
        -> Result<Vec<Product>, StoreError>;

    /// Newest first.
    async fn recent_observations_for_market(
        &self,
        market_id: MarketId,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError>;

    /// Newest first.
    async fn recent_search_events(&self, limit: usize)
        -> Result<Vec<SearchEventRecord>, StoreError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationBatch {
    pub observations: Vec<PriceObservation>,
    pub skipped_rows: usize,
    pub pages: usize,
}

/// Screens raw rows, dropping the ones that cannot be priced.
pub fn screen_rows(rows: impl IntoIterator<Item = ObservationRow>) -> (Vec<PriceObservation>, usize) {
    let mut skipped = 0;
    let observations = rows
        .into_iter()
        .filter_map(|row| {
            let observation = row.into_observation();
            if observation.is_none() {
                skipped += 1;
            }
            observation
        })
        .collect();
    (observations, skipped)
}

/// Pages through every observation matching `filter`.
///
/// Pages are requested in order and concatenated; the loop only stops on a
/// page shorter than the effective page size. Any failed page fails the whole
/// fetch so callers never aggregate over a truncated set.
pub async fn fetch_all_observations<S>(
    store: &S,
    filter: &ObservationFilter,
    page_size: usize,
) -> Result<ObservationBatch, StoreError>
where
    S: CatalogStore + ?Sized,
{
    let limit = page_size.min(store.max_page_size()).max(1);
    let mut batch = ObservationBatch::default();
    let mut offset = 0;

    loop {
        let rows = store.observation_page(filter, PageRequest { offset, limit }).await?;
        let returned = rows.len();
        batch.pages += 1;
        offset += returned;

        let (observations, skipped) = screen_rows(rows);
        batch.observations.extend(observations);
        batch.skipped_rows += skipped;

        debug!(
            event_name = "pricing.store.page_fetched",
            page = batch.pages,
            offset,
            returned,
            limit,
            "observation page fetched"
        );

        if returned < limit {
            break;
        }
    }

    if batch.skipped_rows > 0 {
        warn!(
            event_name = "pricing.store.rows_skipped",
            skipped_rows = batch.skipped_rows,
            kept_rows = batch.observations.len(),
            "skipped observation rows missing price, market or product"
        );
    }

    Ok(batch)
}
