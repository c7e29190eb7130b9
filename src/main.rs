use exam_attempt_backend::{
    config::{get_config, init_config, LogFormat},
    database::{
        memory::MemoryStore,
        pool::{create_pool, run_migrations},
        postgres::PgStore,
        store::{AttemptStore, TestCatalog},
    },
    routes,
    utils::time::{Clock, SystemClock},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let (store, tests): (Arc<dyn AttemptStore>, Arc<dyn TestCatalog>) = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            info!("Using Postgres attempt store");
            let store = Arc::new(PgStore::new(pool));
            (store.clone() as Arc<dyn AttemptStore>, store as Arc<dyn TestCatalog>)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, attempts are kept in memory only");
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn AttemptStore>, store as Arc<dyn TestCatalog>)
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = AppState::new(config.clone(), store, tests, clock);

    if config.sweep_enabled {
        let sweeper = app_state.auto_submit_service.clone();
        let interval = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                if let Err(e) = sweeper.sweep_stale().await {
                    tracing::error!("Stale attempt sweep error: {:?}", e);
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
