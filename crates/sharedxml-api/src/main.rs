#![forbid(unsafe_code)]

use std::sync::Arc;

use sharedxml::{Config, Loader, LocalDocumentService};
use sharedxml_api::{router, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    info!("serving xml files from {}", config.data_dir.display());
    let loader = Loader::new(config, Arc::new(LocalDocumentService::default()));
    let app = router(AppState::new(loader));

    let host = std::env::var("SHAREDXML_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("SHAREDXML_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{host}:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            return;
        }
    };
    info!("listening on {addr}");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    {
        error!("server error: {err}");
    }
}
