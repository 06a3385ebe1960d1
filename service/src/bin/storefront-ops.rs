//! Administrative tasks against the live stores.
//!
//! ```text
//! storefront-ops migrate
//! storefront-ops reset-cache
//! storefront-ops restore-cart --user <uuid>
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use storefront_core::ids::UserId;
use storefront_service::backup::BackupWorkers;
use storefront_service::bootstrap::Resources;
use storefront_service::{CartStore, Config, ProductCache};

#[derive(Parser)]
#[command(name = "storefront-ops", about = "Storefront maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Drop every cached product entry
    ResetCache,
    /// Rebuild a user's cart from the relational mirror
    RestoreCart {
        /// User whose cart to restore
        #[arg(long)]
        user: UserId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    storefront_service::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env();
    let resources = Resources::connect(&config)
        .await
        .context("failed to connect infrastructure")?;
    let span = tracing::info_span!("storefront_ops");

    match cli.command {
        Command::Migrate => {
            resources.store.migrate().await.context("migration failed")?;
            tracing::info!("Migrations applied");
        },
        Command::ResetCache => {
            let cache = ProductCache::new(resources.store, resources.cache, config.cache, span);
            let removed = cache.invalidate_all().await.context("cache reset failed")?;
            tracing::info!(removed, "Product cache cleared");
        },
        Command::RestoreCart { user } => {
            let (workers, queue) =
                BackupWorkers::start(resources.store.clone(), &config.cart, span.clone());
            let carts = CartStore::new(resources.carts, queue, config.cart.ttl, span);
            let restored = carts
                .restore_from_mirror(&resources.store, user)
                .await
                .context("cart restore failed")?;
            workers.shutdown().await;
            tracing::info!(user_id = %user, lines = restored, "Cart restored");
        },
    }

    Ok(())
}
