use temtudo_core::pricing::{PriceEngine, PricingPolicy};
use temtudo_db::SqlCatalogStore;

use crate::commands::{application_failure, open_catalog, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("tiers") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_catalog(&config).await?;
        let engine = PriceEngine::new(
            SqlCatalogStore::new(pool.clone()),
            PricingPolicy::from(&config.pricing),
        );
        let tiers = engine.market_tier_overview().await;
        pool.close().await;
        tiers.map_err(application_failure)
    });

    match result {
        Ok(tiers) => CommandResult::success_with_data(
            "tiers",
            format!(
                "classified {} markets against a global average of {}",
                tiers.markets.len(),
                tiers.global_avg_price
            ),
            &tiers,
        ),
        Err(failure) => CommandResult::from_failure("tiers", failure),
    }
}
