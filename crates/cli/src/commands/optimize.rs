use std::collections::HashMap;

use temtudo_core::domain::{
    cart::{CartItem, CartRequest},
    market::GeoPoint,
    product::ProductId,
};
use temtudo_core::pricing::{PriceEngine, PricingPolicy};
use temtudo_core::store::CatalogStore;
use temtudo_db::SqlCatalogStore;

use crate::commands::{application_failure, open_catalog, prepare, CommandResult};

/// One `--item` argument: a product id with an optional `:quantity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemSpec {
    pub product_id: i64,
    pub quantity: u32,
}

/// Parses `ID` or `ID:QUANTITY`. Quantity defaults to 1.
pub fn parse_item_spec(raw: &str) -> Result<ItemSpec, String> {
    let (id, quantity) = match raw.split_once(':') {
        Some((id, quantity)) => (id, Some(quantity)),
        None => (raw, None),
    };

    let product_id =
        id.trim().parse::<i64>().map_err(|_| format!("`{id}` is not a valid product id"))?;
    let quantity = match quantity {
        Some(quantity) => quantity
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("`{quantity}` is not a valid quantity"))?,
        None => 1,
    };

    Ok(ItemSpec { product_id, quantity })
}

pub fn run(items: &[ItemSpec], user_location: Option<GeoPoint>) -> CommandResult {
    let (config, runtime) = match prepare("optimize") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_catalog(&config).await?;
        let engine = PriceEngine::new(
            SqlCatalogStore::new(pool.clone()),
            PricingPolicy::from(&config.pricing),
        );

        let optimization = async {
            let ids = items.iter().map(|item| ProductId(item.product_id)).collect::<Vec<_>>();
            let names = engine
                .store()
                .products_by_ids(&ids)
                .await?
                .into_iter()
                .map(|product| (product.id, product.name))
                .collect::<HashMap<_, _>>();

            let cart = CartRequest::new(
                items
                    .iter()
                    .map(|item| {
                        let product_id = ProductId(item.product_id);
                        CartItem {
                            product_id,
                            name: names
                                .get(&product_id)
                                .cloned()
                                .unwrap_or_else(|| format!("product {}", item.product_id)),
                            quantity: item.quantity,
                        }
                    })
                    .collect(),
                user_location,
            );
            engine.optimize_cart(&cart).await
        }
        .await;

        pool.close().await;
        optimization.map_err(application_failure)
    });

    match result {
        Ok(optimization) => {
            let message = match &optimization.best_market {
                Some(best) => format!(
                    "best market {} covers {} of {} items for {}",
                    best.market.name,
                    best.available_count,
                    items.len(),
                    best.total_price
                ),
                None => "no market prices any requested product".to_string(),
            };
            CommandResult::success_with_data("optimize", message, &optimization)
        }
        Err(failure) => CommandResult::from_failure("optimize", failure),
    }
}
