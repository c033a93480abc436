use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::utils::error::{FetchError, Result};

pub mod http;
pub mod retry;

pub use http::HttpFetcher;
pub use retry::RetryingFetcher;

/// Retrieves raw page content. Implementations make one request per call
/// and keep no shared mutable state; retries belong in a decorator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// `timeout` bounds a single request.
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError>;

    /// Longest one `fetch` call may take when each request runs to `timeout`.
    fn time_budget(&self, timeout: Duration) -> Duration {
        timeout
    }
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError> {
        (**self).fetch(url, timeout).await
    }

    fn time_budget(&self, timeout: Duration) -> Duration {
        (**self).time_budget(timeout)
    }
}

/// The HTTP fetcher described by `config`, wrapped for retries when
/// `retry_attempts` is non-zero.
pub fn from_config(config: &ScraperConfig) -> Result<Arc<dyn Fetcher>> {
    let http = HttpFetcher::new(&config.user_agent)?;
    if config.retry_attempts == 0 {
        return Ok(Arc::new(http));
    }

    Ok(Arc::new(RetryingFetcher::new(
        http,
        config.retry_attempts,
        Duration::from_millis(config.retry_delay_ms),
    )))
}
