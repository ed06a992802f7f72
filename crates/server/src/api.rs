//! JSON routes over the pricing engine.
//!
//! Every response carries a `success` flag. Failures add a user-facing
//! `error` message and the request's `correlation_id`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use temtudo_core::{
    config::AppConfig,
    domain::{
        cart::{CartItem, CartRequest},
        market::{GeoPoint, MarketId},
        product::{Product, ProductId},
    },
    errors::{ApplicationError, DomainError, InterfaceError},
    pricing::{
        CartOptimization, MarketCatalogEntry, MarketOffer, MarketTierEntry, PriceEngine,
        PricingPolicy, ProductQuery,
    },
    report::{build_report_context, MarketReportContext, ReportSettings},
};
use temtudo_db::{DbPool, SqlCatalogStore};
use tracing::{error, info, warn};
use uuid::Uuid;

const AUTOCOMPLETE_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
    policy: PricingPolicy,
    report: ReportSettings,
}

impl ApiState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            db_pool,
            policy: PricingPolicy::from(&config.pricing),
            report: ReportSettings::from(&config.report),
        }
    }

    fn store(&self) -> SqlCatalogStore {
        SqlCatalogStore::new(self.db_pool.clone())
    }

    fn engine(&self) -> PriceEngine<SqlCatalogStore> {
        PriceEngine::new(self.store(), self.policy.clone())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/search-prices", post(search_prices))
        .route("/api/products", get(search_products))
        .route("/api/cart-optimize", post(optimize_cart))
        .route("/api/markets", get(market_tiers))
        .route("/api/markets/{id}/products", get(market_products))
        .route("/api/markets/{id}/report-context", get(report_context))
        .with_state(state)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPricesRequest {
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub user_lat: Option<f64>,
    pub user_lng: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchPricesResponse {
    pub success: bool,
    pub product: Option<Product>,
    pub markets: Vec<MarketOffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductSearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductSearchResponse {
    pub success: bool,
    pub products: Vec<Product>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProductInput {
    pub product_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartOptimizeRequest {
    #[serde(default)]
    pub products: Vec<CartProductInput>,
    pub user_lat: Option<f64>,
    pub user_lng: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartOptimizeResponse {
    pub success: bool,
    pub result: CartOptimization,
}

#[derive(Clone, Debug, Serialize)]
pub struct MarketTiersResponse {
    pub success: bool,
    pub markets: Vec<MarketTierEntry>,
    pub global_avg_price: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct MarketProductsResponse {
    pub success: bool,
    pub market_id: MarketId,
    pub products: Vec<MarketCatalogEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportContextResponse {
    pub success: bool,
    pub context: MarketReportContext,
}

pub async fn search_prices(
    State(state): State<ApiState>,
    body: Result<Json<SearchPricesRequest>, JsonRejection>,
) -> ApiResult<SearchPricesResponse> {
    let correlation_id = new_correlation_id();
    let Json(request) = body.map_err(|rejection| malformed(&correlation_id, &rejection))?;

    let query = ProductQuery::from_parts(request.product_id, request.product_name.as_deref())
        .map_err(|error| reject(&correlation_id, error.into()))?;
    let location = user_location(request.user_lat, request.user_lng);

    let ranking = state
        .engine()
        .rank_product_prices(&query, location)
        .await
        .map_err(|error| reject(&correlation_id, error))?;

    info!(
        event_name = "api.search_prices.completed",
        correlation_id = %correlation_id,
        product_id = ranking.product.as_ref().map(|product| product.id.0),
        markets = ranking.offers.len(),
        "price search served"
    );

    let message = ranking.product.is_none().then_some("no product matched the query");
    Ok(Json(SearchPricesResponse {
        success: true,
        product: ranking.product,
        markets: ranking.offers,
        message,
    }))
}

pub async fn search_products(
    State(state): State<ApiState>,
    params: Result<Query<ProductSearchParams>, QueryRejection>,
) -> ApiResult<ProductSearchResponse> {
    let correlation_id = new_correlation_id();
    let Query(params) = params.map_err(|rejection| malformed(&correlation_id, &rejection))?;

    let products = state
        .engine()
        .search_products(&params.q, AUTOCOMPLETE_LIMIT)
        .await
        .map_err(|error| reject(&correlation_id, error))?;

    Ok(Json(ProductSearchResponse { success: true, products }))
}

pub async fn optimize_cart(
    State(state): State<ApiState>,
    body: Result<Json<CartOptimizeRequest>, JsonRejection>,
) -> ApiResult<CartOptimizeResponse> {
    let correlation_id = new_correlation_id();
    let Json(request) = body.map_err(|rejection| malformed(&correlation_id, &rejection))?;

    let items = request
        .products
        .into_iter()
        .map(|input| CartItem {
            product_id: ProductId(input.product_id),
            name: input.name,
            quantity: input.quantity,
        })
        .collect::<Vec<_>>();
    let cart = CartRequest::new(items, user_location(request.user_lat, request.user_lng));

    let result =
        state.engine().optimize_cart(&cart).await.map_err(|error| reject(&correlation_id, error))?;

    info!(
        event_name = "api.cart_optimize.completed",
        correlation_id = %correlation_id,
        items = cart.items.len(),
        markets_evaluated = result.markets_evaluated,
        "cart optimization served"
    );

    Ok(Json(CartOptimizeResponse { success: true, result }))
}

pub async fn market_tiers(State(state): State<ApiState>) -> ApiResult<MarketTiersResponse> {
    let correlation_id = new_correlation_id();

    let list = state
        .engine()
        .market_tier_overview()
        .await
        .map_err(|error| reject(&correlation_id, error))?;

    Ok(Json(MarketTiersResponse {
        success: true,
        markets: list.markets,
        global_avg_price: list.global_avg_price,
    }))
}

pub async fn market_products(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<MarketProductsResponse> {
    let correlation_id = new_correlation_id();
    let Path(id) = id.map_err(|rejection| malformed(&correlation_id, &rejection))?;
    let market_id = MarketId(id);

    let products = state
        .engine()
        .market_catalog(market_id)
        .await
        .map_err(|error| reject(&correlation_id, error))?;

    Ok(Json(MarketProductsResponse { success: true, market_id, products }))
}

pub async fn report_context(
    State(state): State<ApiState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ReportContextResponse> {
    let correlation_id = new_correlation_id();
    let Path(id) = id.map_err(|rejection| malformed(&correlation_id, &rejection))?;

    let context = build_report_context(&state.store(), MarketId(id), &state.report)
        .await
        .map_err(|error| reject(&correlation_id, error))?;

    match context {
        Some(context) => Ok(Json(ReportContextResponse { success: true, context })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                success: false,
                error: format!("market {id} not found"),
                correlation_id,
            }),
        )),
    }
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// A location is only used when both coordinates are present.
fn user_location(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng))
}

fn malformed(correlation_id: &str, rejection: &dyn std::fmt::Display) -> ApiError {
    reject(correlation_id, DomainError::InvalidRequest(rejection.to_string()).into())
}

fn reject(correlation_id: &str, error: ApplicationError) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { message, .. } => {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                error = %message,
                "request rejected"
            );
            StatusCode::BAD_REQUEST
        }
        InterfaceError::ServiceUnavailable { message, .. } => {
            error!(
                event_name = "api.store.unavailable",
                correlation_id = %correlation_id,
                error = %message,
                "catalog store unavailable"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %message,
                "request failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorBody {
            success: false,
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::{Path, Query, State},
        http::{Request, StatusCode},
        Json,
    };
    use rust_decimal::Decimal;
    use temtudo_core::{
        config::AppConfig,
        domain::{market::MarketId, product::ProductId},
    };
    use temtudo_db::{connect_with_settings, migrations, CatalogSeedDataset, DbPool};
    use tower::ServiceExt;

    use crate::api::{
        market_products, optimize_cart, report_context, router, search_prices, search_products,
        ApiState, CartOptimizeRequest, CartProductInput, ProductSearchParams,
        SearchPricesRequest,
    };

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        CatalogSeedDataset::load(&pool).await.expect("seed");
        pool
    }

    async fn state() -> ApiState {
        ApiState::new(seeded_pool().await, &AppConfig::default())
    }

    fn cart_item(product_id: i64, name: &str, quantity: u32) -> CartProductInput {
        CartProductInput { product_id, name: name.to_string(), quantity }
    }

    #[tokio::test]
    async fn search_prices_ranks_markets_by_lowest_price() {
        let request = SearchPricesRequest { product_id: Some(1), ..SearchPricesRequest::default() };

        let Json(response) =
            search_prices(State(state().await), Ok(Json(request))).await.expect("ranking");

        assert!(response.success);
        assert_eq!(response.product.map(|product| product.id), Some(ProductId(1)));
        let markets = response.markets.iter().map(|offer| offer.market.id.0).collect::<Vec<_>>();
        assert_eq!(markets, vec![3, 2, 1, 4]);
        assert_eq!(response.markets[0].price, Decimal::new(2199, 2));
        assert!(response.message.is_none());
    }

    #[tokio::test]
    async fn search_prices_without_product_is_bad_request() {
        let (status, Json(body)) =
            search_prices(State(state().await), Ok(Json(SearchPricesRequest::default())))
                .await
                .expect_err("missing product should be rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.correlation_id.starts_with("req-"));
    }

    #[tokio::test]
    async fn search_prices_for_unknown_name_succeeds_with_empty_markets() {
        let request = SearchPricesRequest {
            product_name: Some("caviar".to_string()),
            ..SearchPricesRequest::default()
        };

        let Json(response) =
            search_prices(State(state().await), Ok(Json(request))).await.expect("empty ranking");

        assert!(response.success);
        assert!(response.product.is_none());
        assert!(response.markets.is_empty());
        assert!(response.message.is_some());
    }

    #[tokio::test]
    async fn invalid_user_location_is_bad_request() {
        let request = SearchPricesRequest {
            product_id: Some(1),
            user_lat: Some(123.0),
            user_lng: Some(-43.2),
            ..SearchPricesRequest::default()
        };

        let (status, _) = search_prices(State(state().await), Ok(Json(request)))
            .await
            .expect_err("latitude out of range");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn product_autocomplete_lists_catalog_for_blank_terms() {
        let state = state().await;

        let Json(blank) = search_products(
            State(state.clone()),
            Ok(Query(ProductSearchParams { q: "   ".to_string() })),
        )
        .await
        .expect("blank search");
        assert_eq!(blank.products.len(), 8);
        assert_eq!(blank.products.first().map(|product| product.id), Some(ProductId(1)));

        let Json(found) = search_products(
            State(state),
            Ok(Query(ProductSearchParams { q: "pilão".to_string() })),
        )
        .await
        .expect("brand search");
        assert_eq!(found.products.first().map(|product| product.id), Some(ProductId(3)));
    }

    #[tokio::test]
    async fn cart_optimize_picks_full_coverage_market() {
        let request = CartOptimizeRequest {
            products: vec![
                cart_item(1, "Arroz", 1),
                cart_item(2, "Feijão", 2),
                cart_item(4, "Leite", 6),
            ],
            user_lat: None,
            user_lng: None,
        };

        let Json(response) =
            optimize_cart(State(state().await), Ok(Json(request))).await.expect("optimization");

        let best = response.result.best_market.expect("best market");
        assert_eq!(best.market.id, MarketId(3));
        assert_eq!(best.total_price, Decimal::new(6151, 2));
    }

    #[tokio::test]
    async fn empty_cart_is_bad_request() {
        let (status, Json(body)) =
            optimize_cart(State(state().await), Ok(Json(CartOptimizeRequest::default())))
                .await
                .expect_err("empty cart");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "The request could not be processed. Check inputs and try again.");
    }

    #[tokio::test]
    async fn market_products_lists_latest_prices() {
        let Json(response) = market_products(State(state().await), Ok(Path(1)))
            .await
            .expect("market catalog");

        assert_eq!(response.market_id, MarketId(1));
        assert!(!response.products.is_empty());
        assert!(response.products.iter().all(|entry| entry.price > Decimal::ZERO));
    }

    #[tokio::test]
    async fn report_context_for_unknown_market_is_not_found() {
        let (status, Json(body)) = report_context(State(state().await), Ok(Path(999)))
            .await
            .expect_err("unknown market");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn store_failure_maps_to_service_unavailable() {
        let pool = seeded_pool().await;
        let state = ApiState::new(pool.clone(), &AppConfig::default());
        pool.close().await;

        let (status, Json(body)) = market_products(State(state), Ok(Path(1)))
            .await
            .expect_err("closed pool");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.error, "Price data is temporarily unavailable. Please retry shortly.");
    }

    #[tokio::test]
    async fn router_serves_market_tiers() {
        let app = router(state().await);

        let response = app
            .oneshot(Request::builder().uri("/api/markets").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["success"], serde_json::Value::Bool(true));
        assert_eq!(payload["markets"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn router_wraps_malformed_json_in_error_envelope() {
        let app = router(state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cart-optimize")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["success"], serde_json::Value::Bool(false));
        assert!(payload["correlation_id"].as_str().is_some_and(|id| id.starts_with("req-")));
    }
}
