use temtudo_core::domain::market::GeoPoint;
use temtudo_core::pricing::{PriceEngine, PricingPolicy, ProductQuery};
use temtudo_db::SqlCatalogStore;

use crate::commands::{application_failure, open_catalog, prepare, CommandResult};

pub fn run(
    product_id: Option<i64>,
    name: Option<&str>,
    user_location: Option<GeoPoint>,
) -> CommandResult {
    let query = match ProductQuery::from_parts(product_id, name) {
        Ok(query) => query,
        Err(error) => return CommandResult::failure("rank", "invalid_request", error.to_string(), 1),
    };

    let (config, runtime) = match prepare("rank") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_catalog(&config).await?;
        let engine = PriceEngine::new(
            SqlCatalogStore::new(pool.clone()),
            PricingPolicy::from(&config.pricing),
        );
        let ranking = engine.rank_product_prices(&query, user_location).await;
        pool.close().await;
        ranking.map_err(application_failure)
    });

    match result {
        Ok(ranking) => {
            let message = match &ranking.product {
                Some(product) => {
                    format!("{} priced at {} markets", product.name, ranking.offers.len())
                }
                None => "no product matched the query".to_string(),
            };
            CommandResult::success_with_data("rank", message, &ranking)
        }
        Err(failure) => CommandResult::from_failure("rank", failure),
    }
}
