pub mod config;
pub mod error;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;

pub use config::CrawlConfig;
pub use error::CertwatchError;
pub use store::RecordStore;
pub use types::*;
