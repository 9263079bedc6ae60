use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use identity_service::{
    build_router,
    config::{Config, StoreBackend},
    providers::ProviderRegistry,
    store::{AuthStore, MemoryStore, MongoStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid.
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let store: Arc<dyn AuthStore> = match config.store.backend {
        StoreBackend::Mongo => {
            let store = MongoStore::connect(&config.store).await?;
            store.initialize_indexes().await?;
            tracing::info!("MongoDB store initialized");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("In-memory store selected; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let providers = ProviderRegistry::from_config(&config.providers)?;
    let state = AppState::new(config.clone(), store, providers);
    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
