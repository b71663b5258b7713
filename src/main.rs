use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use gymintel_backend::config;
use gymintel_backend::db::{self, GymStore, SqliteGymStore};
use gymintel_backend::discovery::SearchDriver;
use gymintel_backend::geocoding::{Geocoder, GeocodingService};
use gymintel_backend::progress::SearchProgressManager;
use gymintel_backend::sources;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymintel_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    let app_config = config::load_config()?;
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let pool = SqlitePool::connect(&app_config.get_database_url()).await?;
    db::run_migrations(&pool).await?;

    let store: Arc<dyn GymStore> = Arc::new(SqliteGymStore::new(pool));
    let geocoder: Arc<dyn Geocoder> =
        Arc::new(GeocodingService::new(&app_config.geocoding, &app_config.sources)?);

    // 数据源按配置的 API key 启用
    let sources = sources::configured_sources(&app_config.sources)?;

    let progress = SearchProgressManager::with_cleanup_delay(Duration::from_secs(
        app_config.search.cleanup_delay_secs,
    ));
    let driver = SearchDriver::new(progress.clone(), geocoder.clone(), store.clone(), sources)
        .with_timeout(Duration::from_secs(app_config.search.timeout_secs));

    let bind_addr = app_config.get_bind_address();
    let state = Arc::new(AppState {
        config: app_config,
        progress,
        driver,
        store,
        geocoder,
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
