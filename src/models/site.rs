use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;
use std::fmt;
use validator::Validate;

use crate::utils::error::{AppError, Result};

/// Registry-assigned identifier. Opaque to the extraction core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SiteId(pub i64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered page and the XPath-style rule locating its price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Site {
    pub id: SiteId,
    pub title: String,
    pub url: String,
    #[sqlx(rename = "xpath")]
    pub rule: String,
}

impl Site {
    pub fn new(id: i64, title: impl Into<String>, url: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            id: SiteId(id),
            title: title.into(),
            url: url.into(),
            rule: rule.into(),
        }
    }
}

/// A site as submitted for registration, before it has an id.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
pub struct NewSite {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,

    #[validate(url(message = "url must be a valid absolute URL"))]
    pub url: String,

    #[serde(alias = "xpath")]
    #[validate(length(min = 1, message = "rule must not be empty"))]
    pub rule: String,
}

impl NewSite {
    pub fn new(title: impl Into<String>, url: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            title: title.into().trim().to_string(),
            url: url.into().trim().to_string(),
            rule: rule.into().trim().to_string(),
        }
    }
}

/// Ingestion-time checks: every field present and well formed, urls unique.
/// Nothing is registered from a batch that fails.
pub fn validate_batch(sites: &[NewSite]) -> Result<()> {
    if sites.is_empty() {
        return Err(AppError::Validation("no sites to register".to_string()));
    }

    let mut seen = HashSet::new();
    for (row, site) in sites.iter().enumerate() {
        site.validate()
            .map_err(|e| AppError::Validation(format!("row {}: {}", row + 1, e)))?;

        if !seen.insert(site.url.as_str()) {
            return Err(AppError::Validation(format!(
                "row {}: duplicate url {}",
                row + 1,
                site.url
            )));
        }
    }

    Ok(())
}
