use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use qupid_api::app::build_router;
use qupid_api::config::AppConfig;
use qupid_api::services::rate_limiter::RedisRateCounter;
use qupid_api::AppState;
use qupid_shared::clients::db::{create_pool, DbPool};
use qupid_shared::clients::redis::RedisClient;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// The email window is the longest one the limiter tracks.
const RATE_LIMIT_RETENTION: Duration = Duration::from_secs(3600);
const RATE_LIMIT_CLEANUP_EVERY: Duration = Duration::from_secs(300);

fn run_migrations(db: &DbPool) -> anyhow::Result<()> {
    let mut conn = db.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    tracing::info!(count = applied.len(), "database migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qupid_shared::middleware::init_tracing("qupid-api");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url, config.db_pool_size)?;
    run_migrations(&db)?;

    let metrics_handle = qupid_shared::middleware::init_metrics()?;

    let redis_url = config.redis_url.clone();
    let mut state = AppState::new(config, db, metrics_handle);
    if let Some(url) = redis_url.as_deref() {
        match RedisClient::connect(url).await {
            Ok(client) => {
                state = state.with_rate_limiter(Arc::new(RedisRateCounter::new(client)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "redis unavailable, using in-memory rate limiting");
            }
        }
    }

    state.uploads.ensure_dirs().await?;
    tracing::info!(root = %state.uploads.root().display(), "upload directories ready");

    if state.email.is_none() {
        tracing::warn!("email delivery disabled, verification codes will only be logged");
    }

    let state = Arc::new(state);

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_EVERY);
        loop {
            ticker.tick().await;
            cleanup_state.rate_limiter.cleanup(RATE_LIMIT_RETENTION);
        }
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "qupid-api starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
