//! SQLite-backed price catalog.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};
use temtudo_core::domain::{
    market::{GeoPoint, Market, MarketId},
    observation::ObservationRow,
    product::{Product, ProductId},
};
use temtudo_core::store::{
    CatalogStore, MarketFilter, ObservationFilter, PageRequest, SearchEventRecord, StoreError,
};
use tracing::debug;

use super::RepositoryError;
use crate::DbPool;

const MARKET_COLUMNS: &str = "SELECT id, name, address, neighborhood, city, state, latitude, \
                              longitude, phone, website FROM markets";
const PRODUCT_COLUMNS: &str = "SELECT id, name, brand, category FROM products";
// Ids stored with a non-integer type come back NULL so the row is screened
// instead of failing the page.
const OBSERVATION_COLUMNS: &str = "SELECT id, \
     CASE WHEN typeof(product_id) = 'integer' THEN product_id END AS product_id, \
     CASE WHEN typeof(market_id) = 'integer' THEN market_id END AS market_id, \
     CAST(price AS TEXT) AS price_text, \
     CASE WHEN typeof(observed_at) = 'text' THEN observed_at END AS observed_at \
     FROM price_observations";

#[derive(Clone)]
pub struct SqlCatalogStore {
    pool: DbPool,
    page_cap: usize,
}

impl SqlCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, page_cap: usize::MAX }
    }

    /// Caps the rows returned by a single observation page.
    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap.max(1);
        self
    }

    async fn load_observation_page(
        &self,
        filter: &ObservationFilter,
        page: PageRequest,
    ) -> Result<Vec<ObservationRow>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(OBSERVATION_COLUMNS);
        builder.push(" WHERE 1=1");

        if let Some(product_ids) = &filter.product_ids {
            if product_ids.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND product_id IN (");
            let mut separated = builder.separated(", ");
            for product_id in product_ids {
                separated.push_bind(product_id.0);
            }
            builder.push(")");
        }
        if let Some(market_id) = filter.market_id {
            builder.push(" AND market_id = ");
            builder.push_bind(market_id.0);
        }
        // Stored timestamps mix offsets and separators; julianday normalizes both
        // sides. Rows with unparseable timestamps fall outside any window.
        if let Some(since) = filter.observed_since {
            builder.push(" AND julianday(observed_at) >= julianday(");
            builder.push_bind(format_timestamp(since));
            builder.push(")");
        }

        let limit = page.limit.min(self.page_cap);
        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(to_sql_limit(limit));
        builder.push(" OFFSET ");
        builder.push_bind(to_sql_limit(page.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(
            event_name = "db.catalog.observation_page",
            offset = page.offset,
            limit,
            returned = rows.len(),
            "observation page loaded"
        );

        rows.iter().map(observation_from_row).collect()
    }

    async fn load_markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(MARKET_COLUMNS);
        match filter {
            MarketFilter::All => {}
            MarketFilter::Located => {
                builder.push(" WHERE latitude IS NOT NULL AND longitude IS NOT NULL");
            }
            MarketFilter::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" WHERE id IN (");
                let mut separated = builder.separated(", ");
                for id in ids {
                    separated.push_bind(id.0);
                }
                builder.push(")");
            }
        }
        builder.push(" ORDER BY id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let markets = rows.iter().map(market_from_row).collect::<Result<Vec<_>, _>>()?;

        // Coordinates that are out of range do not count as a location.
        Ok(match filter {
            MarketFilter::Located => markets.into_iter().filter(Market::is_located).collect(),
            _ => markets,
        })
    }

    async fn load_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(PRODUCT_COLUMNS);
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        builder.push(") ORDER BY id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn load_matching_products(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let needle = query.trim().to_lowercase();
        let mut builder = QueryBuilder::<Sqlite>::new(PRODUCT_COLUMNS);
        if !needle.is_empty() {
            let pattern = format!("%{}%", escape_like(&needle));
            builder.push(" WHERE LOWER(name) LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR LOWER(COALESCE(brand, '')) LIKE ");
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\'");
        }
        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(to_sql_limit(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn load_recent_observations(
        &self,
        market_id: MarketId,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, RepositoryError> {
        let sql = format!(
            "{OBSERVATION_COLUMNS} WHERE market_id = ? ORDER BY julianday(observed_at) DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(market_id.0)
            .bind(to_sql_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(observation_from_row).collect()
    }

    async fn load_recent_search_events(
        &self,
        limit: usize,
    ) -> Result<Vec<SearchEventRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT kind, payload, recorded_at
             FROM search_events
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?",
        )
        .bind(to_sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SearchEventRecord {
                    kind: row.try_get("kind")?,
                    payload: row.try_get("payload")?,
                    recorded_at: parse_optional_timestamp(row.try_get("recorded_at")?),
                })
            })
            .collect()
    }
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    fn max_page_size(&self) -> usize {
        self.page_cap
    }

    async fn observation_page(
        &self,
        filter: &ObservationFilter,
        page: PageRequest,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        Ok(self.load_observation_page(filter, page).await?)
    }

    async fn markets(&self, filter: &MarketFilter) -> Result<Vec<Market>, StoreError> {
        Ok(self.load_markets(filter).await?)
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        Ok(self.load_products_by_ids(ids).await?)
    }

    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>, StoreError> {
        Ok(self.load_matching_products(query, limit).await?)
    }

    async fn recent_observations_for_market(
        &self,
        market_id: MarketId,
        limit: usize,
    ) -> Result<Vec<ObservationRow>, StoreError> {
        Ok(self.load_recent_observations(market_id, limit).await?)
    }

    async fn recent_search_events(&self, limit: usize) -> Result<Vec<SearchEventRecord>, StoreError> {
        Ok(self.load_recent_search_events(limit).await?)
    }
}

fn observation_from_row(row: &SqliteRow) -> Result<ObservationRow, RepositoryError> {
    let price_text = row.try_get::<Option<String>, _>("price_text")?;
    Ok(ObservationRow {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        market_id: row.try_get("market_id")?,
        // Unparseable prices are left empty and screened out downstream.
        price: price_text.and_then(|text| Decimal::from_str(text.trim()).ok()),
        observed_at: parse_optional_timestamp(row.try_get("observed_at")?),
    })
}

fn market_from_row(row: &SqliteRow) -> Result<Market, RepositoryError> {
    let latitude = row.try_get::<Option<f64>, _>("latitude")?;
    let longitude = row.try_get::<Option<f64>, _>("longitude")?;
    let location = latitude
        .zip(longitude)
        .map(|(lat, lng)| GeoPoint::new(lat, lng))
        .filter(GeoPoint::is_valid);

    Ok(Market {
        id: MarketId(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        neighborhood: row.try_get("neighborhood")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        location,
        phone: row.try_get("phone")?,
        website: row.try_get("website")?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        brand: row.try_get("brand")?,
        category: row.try_get("category")?,
    })
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS` (taken as UTC).
/// Anything else is treated as unknown.
fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn to_sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
