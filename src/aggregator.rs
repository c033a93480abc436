use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::models::{AggregateReport, ExtractionOutcome, Site};
use crate::registry::SiteRegistry;
use crate::utils::error::{AppError, Result, SiteError};
use crate::worker::ExtractionWorker;

/// Limits for one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateConfig {
    /// Upper bound on fetches in flight at once.
    pub concurrency_limit: usize,
    pub per_fetch_timeout: Duration,
    /// When set, sites still unfinished once this much time has passed are
    /// reported as `DeadlineExceeded`.
    pub batch_deadline: Option<Duration>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            per_fetch_timeout: Duration::from_secs(10),
            batch_deadline: None,
        }
    }
}

impl AggregateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(AppError::InvalidSettings(
                "concurrency_limit must be greater than 0".to_string(),
            ));
        }
        if self.per_fetch_timeout.is_zero() {
            return Err(AppError::InvalidSettings(
                "per_fetch_timeout must be greater than 0".to_string(),
            ));
        }
        if self.batch_deadline.is_some_and(|d| d.is_zero()) {
            return Err(AppError::InvalidSettings(
                "batch_deadline must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aborts every task still running when the run is dropped.
struct TaskGuard(Vec<JoinHandle<ExtractionOutcome>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs an `ExtractionWorker` per site under a concurrency bound and folds
/// the outcomes into an `AggregateReport`.
pub struct AggregationController {
    worker: Arc<ExtractionWorker>,
}

impl AggregationController {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: Extractor) -> Self {
        Self {
            worker: Arc::new(ExtractionWorker::new(fetcher, extractor)),
        }
    }

    pub async fn aggregate_registry(
        &self,
        registry: &dyn SiteRegistry,
        config: &AggregateConfig,
    ) -> Result<AggregateReport> {
        let sites = registry.list_sites().await?;
        self.aggregate(&sites, config).await
    }

    /// Processes every site at most once. Per-site failures end up in the
    /// report; only invalid settings fail the call.
    pub async fn aggregate(&self, sites: &[Site], config: &AggregateConfig) -> Result<AggregateReport> {
        config.validate()?;

        if sites.is_empty() {
            info!("No sites registered, nothing to aggregate");
            return Ok(AggregateReport::empty());
        }

        info!(
            sites = sites.len(),
            concurrency_limit = config.concurrency_limit,
            timeout_ms = config.per_fetch_timeout.as_millis() as u64,
            "Starting price aggregation"
        );

        let deadline = config.batch_deadline.map(|d| Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(config.concurrency_limit));
        let mut tasks = TaskGuard(Vec::with_capacity(sites.len()));

        for site in sites {
            let permit = match acquire(&semaphore, deadline).await {
                Some(permit) => permit,
                None => break,
            };

            let worker = Arc::clone(&self.worker);
            let site = site.clone();
            let timeout = config.per_fetch_timeout;
            tasks.0.push(tokio::spawn(async move {
                let _permit = permit;
                worker.run(&site, timeout).await
            }));
        }

        if tasks.0.len() < sites.len() {
            warn!(
                dispatched = tasks.0.len(),
                total = sites.len(),
                "Batch deadline reached before every site was dispatched"
            );
        }

        let mut outcomes = Vec::with_capacity(sites.len());
        for (index, site) in sites.iter().enumerate() {
            let outcome = match tasks.0.get_mut(index) {
                Some(handle) => collect(handle, site, deadline).await,
                None => failure(site, SiteError::DeadlineExceeded),
            };
            outcomes.push(outcome);
        }

        let report = AggregateReport::from_outcomes(outcomes);
        counter!("price_average_runs_total").increment(1);
        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            average = ?report.average,
            "Finished price aggregation"
        );

        Ok(report)
    }
}

async fn acquire(
    semaphore: &Arc<Semaphore>,
    deadline: Option<Instant>,
) -> Option<tokio::sync::OwnedSemaphorePermit> {
    let acquire = Arc::clone(semaphore).acquire_owned();
    let permit = match deadline {
        Some(deadline) => {
            if Instant::now() >= deadline {
                return None;
            }
            timeout_at(deadline, acquire).await.ok()?
        }
        None => acquire.await,
    };
    // the semaphore is never closed
    permit.ok()
}

async fn collect(
    handle: &mut JoinHandle<ExtractionOutcome>,
    site: &Site,
    deadline: Option<Instant>,
) -> ExtractionOutcome {
    let joined = match deadline {
        Some(deadline) => match timeout_at(deadline, &mut *handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                debug!(site_id = %site.id, "Site unfinished at batch deadline");
                return failure(site, SiteError::DeadlineExceeded);
            }
        },
        None => (&mut *handle).await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(site_id = %site.id, error = %e, "Extraction task did not complete");
            failure(site, SiteError::WorkerAborted(e.to_string()))
        }
    }
}

fn failure(site: &Site, error: SiteError) -> ExtractionOutcome {
    counter!("price_average_extractions_total", "outcome" => error.kind()).increment(1);
    ExtractionOutcome::Failure {
        site_id: site.id,
        title: site.title.clone(),
        error,
    }
}
