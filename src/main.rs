use chat_service::{
    config::Config,
    db, error, logging, maintenance, routes,
    state::AppState,
    store::{ChatStore, PgChatStore},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Embedded migrations are idempotent; a schema mismatch is fatal.
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let store: Arc<dyn ChatStore> = Arc::new(PgChatStore::new(pool));
    let registry = ConnectionRegistry::new();

    // Reconciles last-message pointers that a failed second write left stale.
    let _repair = maintenance::spawn_last_message_repair(
        store.clone(),
        Duration::from_secs(cfg.repair_interval_secs),
    );

    let state = AppState {
        store,
        registry,
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;
    axum::serve(listener, routes::build_router(state))
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
