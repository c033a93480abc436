use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::models::{ExtractionOutcome, Site};
use crate::utils::error::{FetchError, SiteError};

/// Fetches one site and extracts its price. Every failure comes back as an
/// `ExtractionOutcome::Failure`; `run` itself cannot fail.
pub struct ExtractionWorker {
    fetcher: Arc<dyn Fetcher>,
    extractor: Extractor,
}

impl ExtractionWorker {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Extractor) -> Self {
        Self { fetcher, extractor }
    }

    pub async fn run(&self, site: &Site, timeout: Duration) -> ExtractionOutcome {
        let result = self.fetch(site, timeout).await.and_then(|content| {
            self.extractor
                .extract(&content, &site.rule)
                .map_err(SiteError::from)
        });

        match result {
            Ok(price) => {
                debug!(site_id = %site.id, url = %site.url, price, "Extracted price");
                counter!("price_average_extractions_total", "outcome" => "success").increment(1);
                ExtractionOutcome::Success {
                    site_id: site.id,
                    title: site.title.clone(),
                    price,
                }
            }
            Err(error) => {
                warn!(site_id = %site.id, url = %site.url, error = %error, "Failed to extract price");
                counter!("price_average_extractions_total", "outcome" => error.kind()).increment(1);
                ExtractionOutcome::Failure {
                    site_id: site.id,
                    title: site.title.clone(),
                    error,
                }
            }
        }
    }

    // Bounds the fetch even when the fetcher ignores `timeout`. A retrying
    // fetcher gets room for all of its attempts.
    async fn fetch(&self, site: &Site, timeout: Duration) -> Result<String, SiteError> {
        let started = Instant::now();
        let budget = self.fetcher.time_budget(timeout);
        let result = match tokio::time::timeout(budget, self.fetcher.fetch(&site.url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };
        histogram!("price_average_fetch_duration_seconds").record(started.elapsed().as_secs_f64());

        result.map_err(SiteError::from)
    }
}
