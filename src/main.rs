use anyhow::Context;
use clap::Parser;
use recipe_backend::{
    config::Config,
    observability,
    recipe_backend_core::{CachedRecipes, RecipeService, SessionStore, UserService},
    recipe_backend_sqlx_store::{connect_pool, PoolSettings},
    router, AppState, Argon2Hasher, CookieConfig, PostgresRecipeStore, PostgresUserStore,
    RedisCache,
};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; anything else about it is not.
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to load .env file");
        }
    }

    let config = Config::parse();
    observability::init_tracing(&config.log_level);

    let pool = connect_pool(
        &config.database_url,
        PoolSettings {
            max_connections: config.database_max_connections,
            ..PoolSettings::default()
        },
    )
    .await
    .context("failed to connect to the database")?;
    let store = PostgresRecipeStore::new(pool.clone());
    store
        .migrate()
        .await
        .context("failed to migrate the recipes table")?;
    let user_store = PostgresUserStore::new(pool);
    user_store
        .migrate()
        .await
        .context("failed to migrate the users table")?;

    let cache = RedisCache::connect(&config.redis_url)
        .await
        .context("failed to connect to redis")?;

    let cookie_config = CookieConfig::default().with_secure(!config.is_development());
    let state = AppState::new(
        CachedRecipes::new(cache.clone(), RecipeService::new(store)),
        UserService::new(user_store, Argon2Hasher::new()),
        SessionStore::new(cache),
        cookie_config,
    );

    let app = router(state)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.http_server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_server_addr))?;
    tracing::info!(addr = %config.http_server_addr, env = ?config.app_env, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(err = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
