use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::Fetcher;
use crate::utils::error::{FetchError, Result};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::Network(format!("invalid url '{}': {}", url, e)))?;
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // Body download counts against the same request timeout.
        Ok(response.text().await?)
    }
}
