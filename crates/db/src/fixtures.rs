use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Row counts the seed dataset is expected to produce.
const EXPECTED_MARKETS: i64 = 5;
const EXPECTED_LOCATED_MARKETS: i64 = 4;
const EXPECTED_PRODUCTS: i64 = 8;
const EXPECTED_OBSERVATIONS: i64 = 27;
/// Rows deliberately missing a price or a market.
const EXPECTED_MALFORMED_OBSERVATIONS: i64 = 2;
const EXPECTED_SEARCH_EVENTS: i64 = 6;

/// Deterministic demo catalog for local runs and integration tests.
pub struct CatalogSeedDataset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub markets: i64,
    pub products: i64,
    pub observations: i64,
    pub search_events: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl CatalogSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/catalog_seed.sql");

    /// Loads the dataset. Re-running replaces the seeded rows in place.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            markets: count(pool, "SELECT COUNT(1) FROM markets").await?,
            products: count(pool, "SELECT COUNT(1) FROM products").await?,
            observations: count(pool, "SELECT COUNT(1) FROM price_observations").await?,
            search_events: count(pool, "SELECT COUNT(1) FROM search_events").await?,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let markets = count(pool, "SELECT COUNT(1) FROM markets WHERE id BETWEEN 1 AND 5").await?;
        checks.push(("markets", markets == EXPECTED_MARKETS));

        let located = count(
            pool,
            "SELECT COUNT(1) FROM markets
             WHERE id BETWEEN 1 AND 5 AND latitude IS NOT NULL AND longitude IS NOT NULL",
        )
        .await?;
        checks.push(("located-markets", located == EXPECTED_LOCATED_MARKETS));

        let products = count(pool, "SELECT COUNT(1) FROM products WHERE id BETWEEN 1 AND 8").await?;
        checks.push(("products", products == EXPECTED_PRODUCTS));

        let observations =
            count(pool, "SELECT COUNT(1) FROM price_observations WHERE id BETWEEN 1 AND 27").await?;
        checks.push(("price-observations", observations == EXPECTED_OBSERVATIONS));

        let malformed = count(
            pool,
            "SELECT COUNT(1) FROM price_observations
             WHERE id BETWEEN 1 AND 27 AND (price IS NULL OR market_id IS NULL)",
        )
        .await?;
        checks.push(("malformed-observations", malformed == EXPECTED_MALFORMED_OBSERVATIONS));

        let events = count(pool, "SELECT COUNT(1) FROM search_events WHERE id BETWEEN 1 AND 6").await?;
        checks.push(("search-events", events == EXPECTED_SEARCH_EVENTS));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

async fn count(pool: &DbPool, sql: &str) -> Result<i64, RepositoryError> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::CatalogSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies_idempotently() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = CatalogSeedDataset::load(&pool).await.expect("first load");
        let second = CatalogSeedDataset::load(&pool).await.expect("second load");
        assert_eq!(first, second);
        assert_eq!(first.observations, 27);

        let verification = CatalogSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);
    }

    #[tokio::test]
    async fn verify_reports_missing_seed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let verification = CatalogSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }
}
