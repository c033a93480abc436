use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;

use super::Fetcher;
use crate::utils::error::FetchError;

/// Retries transient failures (network, timeout) of the wrapped fetcher
/// with a fixed delay. Status-code failures are returned immediately. Each
/// attempt is bounded by the request timeout on its own.
pub struct RetryingFetcher<F> {
    inner: F,
    retries: usize,
    delay: Duration,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, retries: usize, delay: Duration) -> Self {
        Self { inner, retries, delay }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let strategy = FixedInterval::new(self.delay).take(self.retries);

        RetryIf::spawn(
            strategy,
            || {
                tracing::trace!(url, "fetch attempt");
                let attempt = self.inner.fetch(url, timeout);
                async move {
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout),
                    }
                }
            },
            |err: &FetchError| {
                let retry = err.is_transient();
                if retry {
                    tracing::debug!(url, error = %err, "retrying fetch");
                }
                retry
            },
        )
        .await
    }

    fn time_budget(&self, timeout: Duration) -> Duration {
        let retries = u32::try_from(self.retries).unwrap_or(u32::MAX);
        self.inner
            .time_budget(timeout)
            .saturating_mul(retries.saturating_add(1))
            .saturating_add(self.delay.saturating_mul(retries))
    }
}
