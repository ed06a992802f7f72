pub mod config;
pub mod domain;
pub mod errors;
pub mod geo;
pub mod pricing;
pub mod report;
pub mod store;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::cart::{CartItem, CartRequest};
pub use domain::market::{GeoPoint, Market, MarketId};
pub use domain::observation::{ObservationId, ObservationRow, PriceObservation};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{
    CartOptimization, MarketTier, MarketTierList, PriceEngine, PricingPolicy, ProductPriceRanking,
    ProductQuery,
};
pub use report::{build_report_context, MarketReportContext, ReportSettings};
pub use store::{CatalogStore, StoreError};
