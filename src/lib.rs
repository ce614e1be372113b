pub mod alerts;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod monitor;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use monitor::{Monitor, MonitorConfig};
pub use store::PriceStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
