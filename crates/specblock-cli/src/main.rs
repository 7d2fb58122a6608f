mod lookup;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "specblock-cli")]
#[command(about = "Specblock template lookup maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Rebuild a shop's lookup table from its assignments
    RebuildLookup {
        /// Shop domain (e.g. example.myshopify.com)
        #[arg(long)]
        shop: String,
    },
    /// Resolve the template for a product and/or collection
    Resolve {
        #[arg(long)]
        shop: String,
        /// Product id, bare or as a resource URI
        #[arg(long)]
        product: Option<String>,
        /// Collection id, bare or as a resource URI
        #[arg(long)]
        collection: Option<String>,
    },
    /// Print a shop's lookup rows
    Lookup {
        #[arg(long)]
        shop: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("specblock-cli: run with --help for available commands");
        return Ok(());
    };

    let config = specblock_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = specblock_db::PoolConfig::from_app_config(&config);
    let pool = specblock_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = specblock_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::RebuildLookup { shop } => lookup::run_rebuild(&pool, &shop).await?,
        Commands::Resolve {
            shop,
            product,
            collection,
        } => lookup::run_resolve(&pool, &shop, product.as_deref(), collection.as_deref()).await?,
        Commands::Lookup { shop } => lookup::run_dump(&pool, &shop).await?,
    }

    Ok(())
}
