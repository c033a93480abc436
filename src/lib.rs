pub mod aggregator;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod registry;
pub mod utils;
pub mod worker;

// Re-export commonly used types
pub use aggregator::{AggregateConfig, AggregationController};
pub use config::AppConfig;
pub use extractor::{DigitPolicy, Extractor, extract};
pub use fetcher::Fetcher;
pub use models::{AggregateReport, ExtractionOutcome, NewSite, Site, SiteId};
pub use registry::{InMemoryRegistry, SiteRegistry, SqliteRegistry};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
