use exam_session_backend::{
    config::{get_config, init_config},
    database::{
        pool::create_pool,
        store::{KeyValueStore, MemoryKeyValueStore, PgKeyValueStore},
    },
    routes, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    if config.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let (store, store_kind): (Arc<dyn KeyValueStore>, &'static str) = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            (Arc::new(PgKeyValueStore::new(pool)), "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, staged answers are kept in memory only");
            (Arc::new(MemoryKeyValueStore::new()), "memory")
        }
    };

    let app_state = AppState::from_config(store, store_kind, config)?;

    {
        let runner = app_state.runner.clone();
        let retention = config.staging_retention();
        tokio::spawn(async move {
            loop {
                match runner.sweep_expired(retention).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Retention sweep removed expired sessions"),
                    Err(e) => tracing::error!(error = ?e, "Retention sweep failed"),
                }
                tokio::time::sleep(SWEEP_INTERVAL).await;
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
