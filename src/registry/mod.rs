//! Where registered sites come from. The aggregation core only ever reads
//! the ordered site list; registration happens out of band.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

use crate::models::{NewSite, Site, SiteId, validate_batch};
use crate::utils::error::{AppError, Result};

pub mod sqlite;

pub use sqlite::SqliteRegistry;

#[async_trait]
pub trait SiteRegistry: Send + Sync {
    /// Every registered site, in registration order.
    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Validates and registers a batch. Either the whole batch is stored or
    /// nothing is.
    async fn insert_sites(&self, sites: Vec<NewSite>) -> Result<Vec<Site>>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
    sites: RwLock<Vec<Site>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: Vec<Site>) -> Self {
        Self {
            sites: RwLock::new(sites),
        }
    }
}

#[async_trait]
impl SiteRegistry for InMemoryRegistry {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        Ok(self.sites.read().await.clone())
    }

    async fn insert_sites(&self, sites: Vec<NewSite>) -> Result<Vec<Site>> {
        validate_batch(&sites)?;

        let mut stored = self.sites.write().await;
        let existing: HashSet<&str> = stored.iter().map(|s| s.url.as_str()).collect();
        reject_registered(&sites, &existing)?;

        let mut next_id = stored.iter().map(|s| s.id.0).max().unwrap_or(0) + 1;
        let inserted: Vec<Site> = sites
            .into_iter()
            .map(|new| {
                let site = Site {
                    id: SiteId(next_id),
                    title: new.title,
                    url: new.url,
                    rule: new.rule,
                };
                next_id += 1;
                site
            })
            .collect();

        stored.extend(inserted.iter().cloned());
        Ok(inserted)
    }
}

pub(crate) fn reject_registered(sites: &[NewSite], existing: &HashSet<&str>) -> Result<()> {
    match sites.iter().position(|s| existing.contains(s.url.as_str())) {
        Some(row) => Err(AppError::Validation(format!(
            "row {}: url {} is already registered",
            row + 1,
            sites[row].url
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct SitesFile {
    sites: Vec<NewSite>,
}

/// Reads a batch of sites for import. `.json` files hold an array of sites,
/// `.toml` files a `[[sites]]` table array.
pub async fn load_sites_file(path: &Path) -> Result<Vec<NewSite>> {
    let content = tokio::fs::read_to_string(path).await?;

    let sites: Vec<NewSite> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        Some("toml") => toml::from_str::<SitesFile>(&content)?.sites,
        _ => {
            return Err(AppError::Validation(format!(
                "unsupported sites file '{}', expected .json or .toml",
                path.display()
            )));
        }
    };

    Ok(sites
        .into_iter()
        .map(|s| NewSite::new(s.title, s.url, s.rule))
        .collect())
}
