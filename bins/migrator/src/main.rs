//! Database maintenance runner for Tally.
//!
//! Usage:
//!   migrator up         - Apply pending migrations and seed the administrator
//!   migrator status     - List applied migrations
//!   migrator reconcile  - Compare every cached stock balance with its movements
//!
//! The administrator password is read from `TALLY__SEED__ADMIN_PASSWORD`.

use anyhow::{Context, bail};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_db::{Store, migration};
use tally_shared::AppConfig;

/// Log directives used when `RUST_LOG` is unset. Targets are crate names.
const DEFAULT_LOG_FILTER: &str = "migrator=info,tally_db=info,tally_shared=info,sea_orm_migration=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());

    match command.as_str() {
        "up" => {
            let store = Store::open(&config).await?;
            let applied = migration::applied_migrations(store.connection()).await?;
            info!(migrations = applied.len(), path = %config.database.path, "Database ready");
        }
        "status" => {
            let db = tally_db::connect(&config.database).await?;
            for name in migration::applied_migrations(&db).await? {
                println!("{name}");
            }
        }
        "reconcile" => {
            let store = Store::open(&config).await?;
            let outcomes = store.inventory.reconcile_all().await?;
            let drifted: Vec<_> = outcomes.iter().filter_map(|o| o.warning()).collect();
            for warning in &drifted {
                println!("{warning}");
            }
            if drifted.is_empty() {
                info!(items = outcomes.len(), "All stock balances match their movements");
            } else {
                warn!(items = drifted.len(), "Stock balances drifted");
                std::process::exit(2);
            }
        }
        other => bail!("Unknown command '{other}', expected one of: up, status, reconcile"),
    }

    Ok(())
}
