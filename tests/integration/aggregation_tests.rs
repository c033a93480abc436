use super::*;
use price_average::models::{ExtractionOutcome, ReportStatus};
use price_average::utils::error::{AppError, ExtractionError, SiteError};
use price_average::{AggregateConfig, AggregationController, Extractor, InMemoryRegistry, SiteRegistry};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::Instant;

fn controller(fetcher: Arc<ScriptedFetcher>) -> AggregationController {
    AggregationController::new(fetcher, Extractor::default())
}

#[tokio::test]
async fn test_mixed_outcomes_scenario() -> anyhow::Result<()> {
    let sites = vec![
        Site::new(1, "A", "https://a.example.com", "//span[@class='price']"),
        Site::new(2, "B", "https://b.example.com", "//span[@class='price']"),
        Site::new(3, "C", "https://c.example.com", "//span[@class='price']"),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond("https://a.example.com", Ok(price_page("1 234 руб.")))
            .respond("https://b.example.com", Ok(price_page("999")))
            .respond_after("https://c.example.com", Duration::from_secs(5), Ok(price_page("1"))),
    );

    let config = AggregateConfig {
        concurrency_limit: 5,
        per_fetch_timeout: Duration::from_millis(200),
        batch_deadline: None,
    };
    let started = Instant::now();
    let report = controller(fetcher.clone()).aggregate(&sites, &config).await?;

    assert_eq!(report.average, Some(Decimal::new(11165, 1)));
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].title, "C");
    assert_eq!(report.errors[0].error, SiteError::Fetch(FetchError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));

    Ok(())
}

#[tokio::test]
async fn test_failure_is_isolated() -> anyhow::Result<()> {
    let sites = test_sites(3);
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond(&sites[0].url, Ok(price_page("100")))
            .respond(&sites[1].url, Ok("<p>sold out</p>".to_string()))
            .respond(&sites[2].url, Ok(price_page("300"))),
    );

    let report = controller(fetcher).aggregate(&sites, &AggregateConfig::default()).await?;

    assert_eq!(report.average, Some(Decimal::from(200)));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].title, "Shop 2");
    assert!(matches!(
        report.errors[0].error,
        SiteError::Extraction(ExtractionError::RuleNotFound { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_zero_price_is_reported_as_failure() -> anyhow::Result<()> {
    let sites = vec![
        Site::new(1, "A", "https://a.example.com", "//span[@class='price']"),
        Site::new(2, "B", "https://b.example.com", "//span[@class='price']"),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond("https://a.example.com", Ok(price_page("0")))
            .respond("https://b.example.com", Ok(price_page("100"))),
    );

    let report = controller(fetcher).aggregate(&sites, &AggregateConfig::default()).await?;

    assert_eq!(report.average, Some(Decimal::from(100)));
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].title, "A");
    assert!(matches!(
        report.errors[0].error,
        SiteError::Extraction(ExtractionError::NonPositivePrice { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_every_site_fetched_exactly_once() -> anyhow::Result<()> {
    let sites = test_sites(8);
    let mut fetcher = ScriptedFetcher::new();
    for site in &sites {
        fetcher = fetcher.respond(&site.url, Ok(price_page("10")));
    }
    let fetcher = Arc::new(fetcher);

    let config = AggregateConfig {
        concurrency_limit: 3,
        ..Default::default()
    };
    let report = controller(fetcher.clone()).aggregate(&sites, &config).await?;

    assert_eq!(report.succeeded + report.failed(), sites.len());
    assert_eq!(fetcher.total_calls(), sites.len());
    for site in &sites {
        assert_eq!(fetcher.calls(&site.url), 1);
    }

    Ok(())
}

#[tokio::test]
async fn test_errors_follow_site_order_not_completion_order() -> anyhow::Result<()> {
    let sites = test_sites(4);
    // earlier sites finish later
    let mut fetcher = ScriptedFetcher::new();
    for (i, site) in sites.iter().enumerate() {
        let delay = Duration::from_millis(40 * (sites.len() - i) as u64);
        fetcher = fetcher.respond_after(&site.url, delay, Err(FetchError::HttpStatus(404)));
    }

    let report = controller(Arc::new(fetcher))
        .aggregate(&sites, &AggregateConfig::default())
        .await?;

    let titles: Vec<&str> = report.errors.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Shop 1", "Shop 2", "Shop 3", "Shop 4"]);
    assert_eq!(report.status(), ReportStatus::AllFailed);
    assert_eq!(report.average, None);

    Ok(())
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() -> anyhow::Result<()> {
    let sites = test_sites(5);
    let mut fetcher = ScriptedFetcher::new();
    for site in &sites {
        fetcher = fetcher.respond_after(&site.url, Duration::from_millis(100), Ok(price_page("1")));
    }
    let fetcher = Arc::new(fetcher);

    let config = AggregateConfig {
        concurrency_limit: 2,
        ..Default::default()
    };
    let started = Instant::now();
    let report = controller(fetcher.clone()).aggregate(&sites, &config).await?;
    let elapsed = started.elapsed();

    assert_eq!(report.succeeded, 5);
    assert_eq!(fetcher.max_in_flight(), 2);
    // three waves of 100ms; running them one at a time would take 500ms
    assert!(elapsed >= Duration::from_millis(300), "finished in {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(450), "finished in {:?}", elapsed);

    Ok(())
}

#[tokio::test]
async fn test_concurrency_limit_of_one_is_sequential() -> anyhow::Result<()> {
    let sites = test_sites(3);
    let mut fetcher = ScriptedFetcher::new();
    for site in &sites {
        fetcher = fetcher.respond_after(&site.url, Duration::from_millis(20), Ok(price_page("7")));
    }
    let fetcher = Arc::new(fetcher);

    let config = AggregateConfig {
        concurrency_limit: 1,
        ..Default::default()
    };
    let report = controller(fetcher.clone()).aggregate(&sites, &config).await?;

    assert_eq!(report.average, Some(Decimal::from(7)));
    assert_eq!(fetcher.max_in_flight(), 1);

    Ok(())
}

#[tokio::test]
async fn test_zero_concurrency_rejected_before_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let config = AggregateConfig {
        concurrency_limit: 0,
        ..Default::default()
    };

    let result = controller(fetcher.clone()).aggregate(&test_sites(2), &config).await;

    assert!(matches!(result, Err(AppError::InvalidSettings(_))));
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_batch_deadline_marks_unfinished_sites() -> anyhow::Result<()> {
    let sites = test_sites(3);
    let mut fetcher = ScriptedFetcher::new();
    for site in &sites {
        fetcher = fetcher.respond_after(&site.url, Duration::from_millis(300), Ok(price_page("50")));
    }

    let config = AggregateConfig {
        concurrency_limit: 1,
        per_fetch_timeout: Duration::from_secs(5),
        batch_deadline: Some(Duration::from_millis(500)),
    };
    let started = Instant::now();
    let report = controller(Arc::new(fetcher)).aggregate(&sites, &config).await?;

    // the first site finishes at ~300ms, the second is cut off, the third never starts
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.average, Some(Decimal::from(50)));
    let errors: Vec<(&str, &SiteError)> = report
        .errors
        .iter()
        .map(|e| (e.title.as_str(), &e.error))
        .collect();
    assert_eq!(
        errors,
        vec![
            ("Shop 2", &SiteError::DeadlineExceeded),
            ("Shop 3", &SiteError::DeadlineExceeded),
        ]
    );
    assert!(started.elapsed() < Duration::from_secs(2));

    Ok(())
}

#[tokio::test]
async fn test_aggregate_from_in_memory_registry() -> anyhow::Result<()> {
    let registry = InMemoryRegistry::with_sites(test_sites(2));
    let sites = registry.list_sites().await?;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond(&sites[0].url, Ok(price_page("1 000")))
            .respond(&sites[1].url, Ok(price_page("2 001"))),
    );

    let report = controller(fetcher)
        .aggregate_registry(&registry, &AggregateConfig::default())
        .await?;

    assert_eq!(report.average, Some(Decimal::new(15005, 1)));
    assert_eq!(report.status(), ReportStatus::Complete);

    Ok(())
}

#[tokio::test]
async fn test_integer_part_policy_through_controller() -> anyhow::Result<()> {
    let sites = test_sites(2);
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .respond(&sites[0].url, Ok(price_page("19.99")))
            .respond(&sites[1].url, Ok(price_page("21,00 руб."))),
    );

    let controller = AggregationController::new(fetcher, Extractor::new(DigitPolicy::IntegerPart));
    let report = controller.aggregate(&sites, &AggregateConfig::default()).await?;

    assert_eq!(report.average, Some(Decimal::from(20)));

    Ok(())
}

#[tokio::test]
async fn test_worker_outcomes_carry_site_identity() {
    let site = Site::new(42, "Answer", "https://answer.example.com", "//span[@class='price']");
    let fetcher = ScriptedFetcher::new().respond(&site.url, Ok(price_page("42")));
    let worker = price_average::worker::ExtractionWorker::new(Arc::new(fetcher), Extractor::default());

    let outcome = worker.run(&site, Duration::from_secs(1)).await;

    assert_eq!(
        outcome,
        ExtractionOutcome::Success {
            site_id: site.id,
            title: "Answer".to_string(),
            price: 42,
        }
    );
}
