use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use cirrus_api::{AppState, AppStateInner};
use cirrus_core::auth::AuthService;
use cirrus_core::blobstore::FsBlobStore;
use cirrus_core::ledger::FileLedger;
use cirrus_core::mailer::LogMailer;
use cirrus_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cirrus=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("CIRRUS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CIRRUS_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("CIRRUS_DB_PATH")
        .unwrap_or_else(|_| "cirrus.db".into())
        .into();
    let blob_dir: PathBuf = std::env::var("CIRRUS_BLOB_DIR")
        .unwrap_or_else(|_| "./blob-storage".into())
        .into();
    let verify_base_url = std::env::var("CIRRUS_VERIFY_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{}", port));
    let cookie_secure: bool = std::env::var("CIRRUS_COOKIE_SECURE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(true);
    let cors_origin = std::env::var("CIRRUS_CORS_ORIGIN").ok();
    let max_upload_bytes: usize = std::env::var("CIRRUS_MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(128 * 1024 * 1024);

    // Init storage
    let db = Arc::new(Database::open(&db_path)?);
    let store = Arc::new(FsBlobStore::new(blob_dir).await?);

    let state: AppState = Arc::new(AppStateInner {
        auth: AuthService::new(db.clone(), Arc::new(LogMailer), verify_base_url),
        ledger: FileLedger::new(db, store),
        cookie_secure,
    });

    // CORS: session cookies need credentials, which rules out a wildcard
    // origin. No configured origin means same-origin only.
    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin.parse()?))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, COOKIE])
            .allow_credentials(true),
        None => CorsLayer::new(),
    };

    let app = cirrus_api::router(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Cirrus server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
