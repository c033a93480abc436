use super::*;
use price_average::models::NewSite;
use price_average::registry::{SiteRegistry, load_sites_file};
use price_average::utils::error::AppError;
use std::fs;

#[tokio::test]
async fn test_file_backed_registry_persists() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("sites.db").display()),
        max_connections: 2,
    };

    {
        let registry = SqliteRegistry::connect(&config).await?;
        registry.create_table().await?;
        registry
            .insert_sites(vec![
                NewSite::new("Shop A", "https://a.example.com/item", "//span[@class='price']"),
                NewSite::new("Shop B", "https://b.example.com/item", "//div[@id='cost']/text()"),
            ])
            .await?;
    }

    let reopened = SqliteRegistry::connect(&config).await?;
    let sites = reopened.list_sites().await?;

    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].title, "Shop A");
    assert_eq!(sites[1].rule, "//div[@id='cost']/text()");
    Ok(())
}

#[tokio::test]
async fn test_import_from_toml_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("sites.toml");
    fs::write(
        &file,
        r#"
[[sites]]
title = "Shop A"
url = "https://a.example.com/item"
xpath = "//span[@class='price']/text()"

[[sites]]
title = "Shop B"
url = "https://b.example.com/item"
rule = "//b"
"#,
    )?;

    let registry = create_test_registry().await?;
    let inserted = registry.insert_sites(load_sites_file(&file).await?).await?;

    assert_eq!(inserted.len(), 2);
    assert_eq!(registry.list_sites().await?, inserted);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_urls_in_batch_store_nothing() -> anyhow::Result<()> {
    let registry = create_test_registry().await?;
    let result = registry
        .insert_sites(vec![
            NewSite::new("Shop A", "https://a.example.com", "//b"),
            NewSite::new("Shop A again", "https://a.example.com", "//i"),
        ])
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(registry.list_sites().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_row_reports_position() -> anyhow::Result<()> {
    let registry = create_test_registry().await?;
    let err = registry
        .insert_sites(vec![
            NewSite::new("Shop A", "https://a.example.com", "//b"),
            NewSite::new("Shop B", "b.example.com", "//b"),
        ])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("row 2"));
    Ok(())
}
