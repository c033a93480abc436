use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::info;

use super::{SiteRegistry, reject_registered};
use crate::config::DatabaseConfig;
use crate::models::{NewSite, Site, SiteId, validate_batch};
use crate::utils::error::Result;

const CREATE_SITES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sites (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url   TEXT NOT NULL UNIQUE,
    xpath TEXT NOT NULL
)
"#;

/// Site registry backed by a single `sites` table.
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(url = %config.url, "Connected to site registry");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self) -> Result<()> {
        sqlx::query(CREATE_SITES_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SiteRegistry for SqliteRegistry {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>("SELECT id, title, url, xpath FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sites)
    }

    async fn insert_sites(&self, sites: Vec<NewSite>) -> Result<Vec<Site>> {
        validate_batch(&sites)?;

        let mut tx = self.pool.begin().await?;

        let registered: Vec<String> = sqlx::query_scalar("SELECT url FROM sites")
            .fetch_all(&mut *tx)
            .await?;
        let existing: HashSet<&str> = registered.iter().map(String::as_str).collect();
        reject_registered(&sites, &existing)?;

        let mut inserted = Vec::with_capacity(sites.len());
        for site in sites {
            let result = sqlx::query("INSERT INTO sites (title, url, xpath) VALUES (?, ?, ?)")
                .bind(&site.title)
                .bind(&site.url)
                .bind(&site.rule)
                .execute(&mut *tx)
                .await?;

            inserted.push(Site {
                id: SiteId(result.last_insert_rowid()),
                title: site.title,
                url: site.url,
                rule: site.rule,
            });
        }

        tx.commit().await?;
        info!(count = inserted.len(), "Registered sites");
        Ok(inserted)
    }
}
