//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        build_http_client, DbAdapter, FsReportStore, HttpAnalysisAdapter, HttpInterviewAdapter,
        InMemoryDb, ModelRouter, PdfReportRenderer, ReportAssets, WhisperSstAdapter,
    },
    config::Config,
    error::ApiError,
    web::{self, auth::TokenKeys, AppState, ChatLocks},
};
use mindspark_core::ports::DatabaseService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set; users and chats are kept in memory and lost on restart.");
            Arc::new(InMemoryDb::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let http_client = build_http_client(config.upstream_timeout)?;
    let model_router = ModelRouter::new(config.model_urls.clone());

    let sst_adapter = Arc::new(WhisperSstAdapter::new(
        http_client.clone(),
        config.transcription_url.clone(),
        config.hf_access_token.clone(),
    ));
    let interview_adapter = Arc::new(HttpInterviewAdapter::new(
        http_client.clone(),
        model_router.clone(),
    ));
    let analysis_adapter = Arc::new(HttpAnalysisAdapter::new(http_client, model_router));
    let report_renderer = Arc::new(PdfReportRenderer::new(ReportAssets::under(&config.assets_dir)));
    let report_store = Arc::new(FsReportStore::new(config.reports_dir.clone()));
    info!(
        "Upstream failure policy: {:?}; reports stored in {}",
        config.upstream_failure_policy,
        config.reports_dir.display()
    );

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        tokens: TokenKeys::from_secret(config.jwt_secret.as_bytes()),
        config: config.clone(),
        sst_adapter,
        interview_adapter,
        analysis_adapter,
        report_renderer,
        report_store,
        chat_locks: ChatLocks::new(),
    });

    // --- 5. Create the Web Router ---
    let app = web::router(app_state).layer(web::cors_layer(&config)?);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
