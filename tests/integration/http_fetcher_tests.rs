use super::*;
use price_average::fetcher::{self, HttpFetcher, RetryingFetcher};
use price_average::{AggregationController, Extractor};
use rust_decimal::Decimal;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_returns_body() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string(price_page("1 234")))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new("PriceAverage-Test/1.0")?;
    let body = fetcher
        .fetch(&format!("{}/item", server.uri()), Duration::from_secs(2))
        .await?;

    assert!(body.contains("1 234"));
    Ok(())
}

#[tokio::test]
async fn test_fetch_sends_user_agent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "PriceAverage-Test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new("PriceAverage-Test/1.0")?;
    fetcher.fetch(&server.uri(), Duration::from_secs(2)).await?;

    Ok(())
}

#[tokio::test]
async fn test_non_success_status() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new("PriceAverage-Test/1.0")?;
    let result = fetcher.fetch(&server.uri(), Duration::from_secs(2)).await;

    assert_eq!(result, Err(FetchError::HttpStatus(404)));
    Ok(())
}

#[tokio::test]
async fn test_slow_response_times_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new("PriceAverage-Test/1.0")?;
    let result = fetcher.fetch(&server.uri(), Duration::from_millis(200)).await;

    assert_eq!(result, Err(FetchError::Timeout));
    Ok(())
}

#[tokio::test]
async fn test_retry_does_not_repeat_status_failures() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = RetryingFetcher::new(
        HttpFetcher::new("PriceAverage-Test/1.0")?,
        3,
        Duration::from_millis(10),
    );
    let result = fetcher.fetch(&server.uri(), Duration::from_secs(2)).await;

    assert_eq!(result, Err(FetchError::HttpStatus(503)));
    Ok(())
}

#[tokio::test]
async fn test_retry_repeats_timeouts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = RetryingFetcher::new(
        HttpFetcher::new("PriceAverage-Test/1.0")?,
        2,
        Duration::from_millis(10),
    );
    let result = fetcher.fetch(&server.uri(), Duration::from_millis(100)).await;

    assert_eq!(result, Err(FetchError::Timeout));
    Ok(())
}

#[tokio::test]
async fn test_configured_retries_recover_from_a_stalled_response() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(price_page("1"))
                .set_delay(Duration::from_secs(5)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(price_page("250")))
        .mount(&server)
        .await;

    let mut config = get_test_config();
    config.scraper.request_timeout = 1;
    config.scraper.retry_attempts = 2;
    let sites = vec![Site::new(1, "Slow shop", server.uri(), "//span[@class='price']")];

    let controller = AggregationController::new(fetcher::from_config(&config.scraper)?, Extractor::default());
    let report = controller
        .aggregate(&sites, &config.scraper.aggregate_config())
        .await?;

    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.average, Some(Decimal::from(250)));

    Ok(())
}
