// Storage module - local caches shared by every mission

pub mod market_store;
pub mod ops_store;

pub use market_store::{MarketPriceRecord, MarketStore};
pub use ops_store::OpsStore;
