//! End-to-end checks of the pricing engine over the seeded SQLite catalog.

use rust_decimal::Decimal;
use temtudo_core::domain::{
    cart::{CartItem, CartRequest},
    market::{GeoPoint, MarketId},
    product::ProductId,
};
use temtudo_core::pricing::{MarketTier, OfferTier, PriceEngine, PricingPolicy, ProductQuery};
use temtudo_core::report::{build_report_context, ReportSettings};
use temtudo_db::{connect_with_settings, migrations, CatalogSeedDataset, DbPool, SqlCatalogStore};

type TestResult<T = ()> = Result<T, String>;

async fn seeded_pool() -> TestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|e| e.to_string())?;
    migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;
    CatalogSeedDataset::load(&pool).await.map_err(|e| e.to_string())?;
    Ok(pool)
}

fn engine(pool: &DbPool) -> PriceEngine<SqlCatalogStore> {
    PriceEngine::new(SqlCatalogStore::new(pool.clone()), PricingPolicy::default())
}

#[tokio::test]
async fn ranking_uses_lowest_price_per_market() -> TestResult {
    let pool = seeded_pool().await?;

    let ranking = engine(&pool)
        .rank_product_prices(&ProductQuery::Id(ProductId(1)), None)
        .await
        .map_err(|e| e.to_string())?;

    let offers = ranking
        .offers
        .iter()
        .map(|offer| (offer.market.id.0, offer.price, offer.tier))
        .collect::<Vec<_>>();
    assert_eq!(
        offers,
        vec![
            (3, Decimal::new(2199, 2), OfferTier::Best),
            (2, Decimal::new(2450, 2), OfferTier::Medium),
            (1, Decimal::new(2650, 2), OfferTier::High),
            (4, Decimal::new(2990, 2), OfferTier::High),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn ranking_by_brand_text_resolves_product() -> TestResult {
    let pool = seeded_pool().await?;

    let ranking = engine(&pool)
        .rank_product_prices(&ProductQuery::Text("pilão".into()), Some(GeoPoint::new(-22.97, -43.18)))
        .await
        .map_err(|e| e.to_string())?;

    assert_eq!(ranking.product.map(|p| p.id), Some(ProductId(3)));
    assert_eq!(ranking.offers.first().map(|o| o.market.id), Some(MarketId(3)));
    assert!(ranking.offers.iter().all(|offer| offer.distance_km.is_some()));
    Ok(())
}

#[tokio::test]
async fn cart_optimization_prefers_full_coverage() -> TestResult {
    let pool = seeded_pool().await?;
    let request = CartRequest::new(
        vec![
            CartItem { product_id: ProductId(1), name: "Arroz".into(), quantity: 1 },
            CartItem { product_id: ProductId(2), name: "Feijão".into(), quantity: 2 },
            CartItem { product_id: ProductId(4), name: "Leite".into(), quantity: 6 },
        ],
        None,
    );

    let result = engine(&pool).optimize_cart(&request).await.map_err(|e| e.to_string())?;

    let best = result.best_market.ok_or("expected a best market")?;
    assert_eq!(best.market.id, MarketId(3));
    assert_eq!(best.available_count, 3);
    // 21.99 + 2 * 6.89 + 6 * 4.29
    assert_eq!(best.total_price, Decimal::new(6151, 2));
    for score in &result.potential_markets {
        assert_eq!(score.available_count + score.missing_products.len(), 3);
    }
    Ok(())
}

#[tokio::test]
async fn tier_overview_skips_unlocated_markets() -> TestResult {
    let pool = seeded_pool().await?;

    let list = engine(&pool).market_tier_overview().await.map_err(|e| e.to_string())?;

    assert_eq!(list.markets.len(), 4);
    assert!(list.markets.iter().all(|entry| entry.market.id != MarketId(5)));
    assert!(list.markets.iter().all(|entry| entry.tier != MarketTier::NoData));
    assert!(list.global_avg_price > Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn report_context_counts_search_terms() -> TestResult {
    let pool = seeded_pool().await?;
    let store = SqlCatalogStore::new(pool);

    let context = build_report_context(&store, MarketId(1), &ReportSettings::default())
        .await
        .map_err(|e| e.to_string())?
        .ok_or("market 1 should exist")?;

    assert_eq!(context.neighborhood.as_deref(), Some("Copacabana"));
    assert_eq!(context.top_search_terms.first().map(|t| (t.term.as_str(), t.count)), Some(("arroz", 3)));
    assert_eq!(context.most_expensive.first().map(|p| p.product_id), Some(ProductId(8)));
    Ok(())
}
