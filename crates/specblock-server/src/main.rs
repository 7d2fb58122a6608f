mod api;
mod middleware;
mod shop_cache;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState, RateLimits},
    middleware::AuthState,
    shop_cache::ShopCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = specblock_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = specblock_db::PoolConfig::from_app_config(&config);
    let pool = specblock_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = specblock_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let auth = AuthState::new(&config.api_keys, config.is_development())?;
    let state = AppState {
        pool,
        shops: ShopCache::new(),
    };
    let app = build_app(
        state,
        auth,
        RateLimits::from_storefront_limit(config.storefront_rate_limit_per_min),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "specblock-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
