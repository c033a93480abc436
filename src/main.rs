use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use price_average::config::AppConfig;
use price_average::models::{AggregateReport, ReportStatus};
use price_average::registry::{self, SiteRegistry, SqliteRegistry};
use price_average::{AggregationController, Extractor, fetcher};

#[derive(Parser)]
#[command(name = "price-average", version, about = "Average the prices found on registered pages")]
struct Cli {
    /// Directory holding default.toml, {RUN_MODE}.toml and local.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the sites table
    Init,
    /// Register sites from a .json or .toml file
    Import { file: PathBuf },
    /// Show registered sites
    List,
    /// Fetch every registered site and report the average price
    Average {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout is kept for command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("price_average=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config_dir {
        Some(dir) => {
            let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
            AppConfig::load(dir, &run_mode)
        }
        None => AppConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    let registry = SqliteRegistry::connect(&config.database)
        .await
        .context("Failed to open site registry")?;
    registry.create_table().await?;

    match cli.command {
        Command::Init => {
            info!(url = %config.database.url, "Sites table ready");
        }
        Command::Import { file } => {
            let sites = registry::load_sites_file(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            for site in registry.insert_sites(sites).await? {
                println!("{}\t{}\t{}\t{}", site.id, site.title, site.url, site.rule);
            }
        }
        Command::List => {
            let sites = registry.list_sites().await?;
            if sites.is_empty() {
                println!("No sites registered");
            }
            for site in sites {
                println!("{}\t{}\t{}\t{}", site.id, site.title, site.url, site.rule);
            }
        }
        Command::Average { json } => {
            let fetcher = fetcher::from_config(&config.scraper)?;
            let controller = AggregationController::new(fetcher, Extractor::new(config.scraper.digit_policy));
            let report = controller
                .aggregate_registry(&registry, &config.scraper.aggregate_config())
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn print_report(report: &AggregateReport) {
    if report.status() == ReportStatus::NoSites {
        println!("No sites registered");
        return;
    }

    for error in &report.errors {
        println!("{}: {}", error.title, error.error);
    }

    match report.average {
        Some(average) => println!("Average price: {:.2}", average),
        None => println!("Could not obtain any prices"),
    }
}
