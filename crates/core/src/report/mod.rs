//! Market report context.
//!
//! Assembles the aggregated statistics handed to the external text
//! generator: category price averages over a recent window, the most
//! expensive products currently priced at the market, and the most searched
//! terms. No text is generated here.

mod search_log;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ReportConfig;
use crate::domain::{
    market::{Market, MarketId},
    product::{Product, ProductId, UNCATEGORIZED},
};
use crate::errors::ApplicationError;
use crate::store::{screen_rows, CatalogStore, MarketFilter};

pub use search_log::{count_search_terms, SearchEventPayload, SearchTermCount};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportSettings {
    pub recent_observation_window: usize,
    pub search_event_window: usize,
    pub top_search_terms: usize,
    pub most_expensive_limit: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            recent_observation_window: 100,
            search_event_window: 50,
            top_search_terms: 10,
            most_expensive_limit: 5,
        }
    }
}

impl From<&ReportConfig> for ReportSettings {
    fn from(config: &ReportConfig) -> Self {
        Self {
            recent_observation_window: config.recent_observation_window,
            search_event_window: config.search_event_window,
            top_search_terms: config.top_search_terms,
            most_expensive_limit: config.most_expensive_limit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: String,
    /// Rounded to cents.
    pub mean_price: Decimal,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketReportContext {
    pub market_id: MarketId,
    pub market_name: String,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    /// Observations inside the recent window.
    pub total_observations: usize,
    pub category_stats: Vec<CategoryStat>,
    pub most_expensive: Vec<PricedProduct>,
    pub top_search_terms: Vec<SearchTermCount>,
}

/// Builds the report context for `market_id`. Returns `Ok(None)` when the
/// market does not exist.
pub async fn build_report_context<S>(
    store: &S,
    market_id: MarketId,
    settings: &ReportSettings,
) -> Result<Option<MarketReportContext>, ApplicationError>
where
    S: CatalogStore + ?Sized,
{
    let markets = store.markets(&MarketFilter::Ids(vec![market_id])).await?;
    let Some(market) = markets.into_iter().find(|market| market.id == market_id) else {
        return Ok(None);
    };

    let rows =
        store.recent_observations_for_market(market_id, settings.recent_observation_window).await?;
    let (observations, skipped) = screen_rows(rows);

    let product_ids = observations
        .iter()
        .map(|observation| observation.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let products = if product_ids.is_empty() {
        HashMap::new()
    } else {
        store
            .products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect::<HashMap<_, _>>()
    };

    let mut by_category: BTreeMap<String, (Decimal, usize)> = BTreeMap::new();
    let mut lowest: BTreeMap<ProductId, Decimal> = BTreeMap::new();
    for observation in &observations {
        let category = products
            .get(&observation.product_id)
            .map_or(UNCATEGORIZED, Product::category_or_default);
        let entry = by_category.entry(category.to_string()).or_insert((Decimal::ZERO, 0));
        entry.0 += observation.price;
        entry.1 += 1;

        lowest
            .entry(observation.product_id)
            .and_modify(|price| *price = (*price).min(observation.price))
            .or_insert(observation.price);
    }

    let category_stats = by_category
        .into_iter()
        .map(|(category, (sum, count))| CategoryStat {
            category,
            mean_price: (sum / Decimal::from(count)).round_dp(2),
            count,
        })
        .collect();

    let most_expensive = most_expensive(&lowest, &products, settings.most_expensive_limit);

    let events = store.recent_search_events(settings.search_event_window).await?;
    let top_search_terms = count_search_terms(
        events.iter().map(|event| SearchEventPayload::parse(event.payload.as_deref())),
        settings.top_search_terms,
    );

    info!(
        event_name = "report.context.built",
        market_id = market_id.0,
        observations = observations.len(),
        skipped_rows = skipped,
        search_events = events.len(),
        "report context built"
    );

    Ok(Some(context_header(market, observations.len(), category_stats, most_expensive, top_search_terms)))
}

fn most_expensive(
    lowest: &BTreeMap<ProductId, Decimal>,
    products: &HashMap<ProductId, Product>,
    limit: usize,
) -> Vec<PricedProduct> {
    let mut priced = lowest
        .iter()
        .map(|(product_id, price)| PricedProduct {
            product_id: *product_id,
            name: products
                .get(product_id)
                .map(|product| product.name.clone())
                .unwrap_or_else(|| format!("product #{}", product_id.0)),
            price: *price,
        })
        .collect::<Vec<_>>();
    priced.sort_by(|a, b| b.price.cmp(&a.price).then_with(|| a.product_id.cmp(&b.product_id)));
    priced.truncate(limit);
    priced
}

fn context_header(
    market: Market,
    total_observations: usize,
    category_stats: Vec<CategoryStat>,
    most_expensive: Vec<PricedProduct>,
    top_search_terms: Vec<SearchTermCount>,
) -> MarketReportContext {
    MarketReportContext {
        market_id: market.id,
        market_name: market.name,
        neighborhood: market.neighborhood,
        city: market.city,
        total_observations,
        category_stats,
        most_expensive,
        top_search_terms,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{build_report_context, ReportSettings};
    use crate::domain::{
        market::{Market, MarketId},
        observation::ObservationRow,
        product::{Product, ProductId},
    };
    use crate::store::{testing::FakeStore, SearchEventRecord};

    fn market() -> Market {
        Market {
            id: MarketId(1),
            name: "Mercado Copacabana".to_string(),
            address: None,
            neighborhood: Some("Copacabana".to_string()),
            city: Some("Rio de Janeiro".to_string()),
            state: Some("RJ".to_string()),
            location: None,
            phone: None,
            website: None,
        }
    }

    fn product(id: i64, name: &str, category: Option<&str>) -> Product {
        Product {
            id: ProductId(id),
            name: name.to_string(),
            brand: None,
            category: category.map(str::to_string),
        }
    }

    fn row(id: i64, product: i64, cents: i64) -> ObservationRow {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp");
        ObservationRow {
            id,
            product_id: Some(product),
            market_id: Some(1),
            price: Some(Decimal::new(cents, 2)),
            observed_at: Some(base + Duration::minutes(id)),
        }
    }

    fn event(payload: &str) -> SearchEventRecord {
        SearchEventRecord {
            kind: "search".to_string(),
            payload: Some(payload.to_string()),
            recorded_at: None,
        }
    }

    fn store() -> FakeStore {
        FakeStore {
            markets: vec![market()],
            products: vec![
                product(1, "Arroz 5kg", Some("mercearia")),
                product(2, "Feijão 1kg", Some("mercearia")),
                product(3, "Picanha 1kg", Some("açougue")),
                product(4, "Sabão", None),
            ],
            rows: vec![row(1, 1, 2000), row(2, 2, 800), row(3, 3, 7990), row(4, 4, 500), row(5, 1, 1800)],
            events: vec![
                event(r#"{"productName":"arroz"}"#),
                event(r#"{"produtos":["arroz","café"]}"#),
                event("not json"),
                event(r#"{"products":[{"nome_produto":"café"}]}"#),
            ],
            ..FakeStore::default()
        }
    }

    #[tokio::test]
    async fn assembles_category_stats_and_terms() {
        let context = build_report_context(&store(), MarketId(1), &ReportSettings::default())
            .await
            .expect("context builds")
            .expect("market exists");

        assert_eq!(context.neighborhood.as_deref(), Some("Copacabana"));
        assert_eq!(context.total_observations, 5);

        let stats = context
            .category_stats
            .iter()
            .map(|stat| (stat.category.as_str(), stat.mean_price, stat.count))
            .collect::<Vec<_>>();
        assert_eq!(
            stats,
            vec![
                ("açougue", Decimal::new(7990, 2), 1),
                ("mercearia", Decimal::new(1533, 2), 3),
                ("uncategorized", Decimal::new(500, 2), 1),
            ]
        );

        let terms = context
            .top_search_terms
            .iter()
            .map(|term| (term.term.as_str(), term.count))
            .collect::<Vec<_>>();
        assert_eq!(terms, vec![("arroz", 2), ("café", 2)]);
    }

    #[tokio::test]
    async fn most_expensive_uses_lowest_price_per_product() {
        let settings = ReportSettings { most_expensive_limit: 2, ..ReportSettings::default() };

        let context = build_report_context(&store(), MarketId(1), &settings)
            .await
            .expect("context builds")
            .expect("market exists");

        let top = context
            .most_expensive
            .iter()
            .map(|product| (product.product_id.0, product.price))
            .collect::<Vec<_>>();
        assert_eq!(top, vec![(3, Decimal::new(7990, 2)), (1, Decimal::new(1800, 2))]);
    }

    #[tokio::test]
    async fn recent_window_bounds_the_statistics() {
        let settings = ReportSettings { recent_observation_window: 2, ..ReportSettings::default() };

        let context = build_report_context(&store(), MarketId(1), &settings)
            .await
            .expect("context builds")
            .expect("market exists");

        assert_eq!(context.total_observations, 2);
    }

    #[tokio::test]
    async fn unknown_market_has_no_context() {
        let context = build_report_context(&store(), MarketId(99), &ReportSettings::default())
            .await
            .expect("lookup succeeds");

        assert!(context.is_none());
    }
}
