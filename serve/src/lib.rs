//! HTTP prediction service for the leaf disease classifier.

mod common;
pub mod config;
pub mod error;
pub mod routes;
pub mod service;

use crate::{common::*, config::Config, service::InferenceService};

/// Loads the models and serves requests until the server stops.
pub async fn start(config: Arc<Config>) -> Result<()> {
    let service = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || InferenceService::load(&config)).await??
    };
    info!(
        "loaded models: {}",
        service.variants().map(|variant| variant.to_string()).collect::<Vec<_>>().join(", ")
    );

    let addr = config.server.addr()?;
    let app = routes::router(service, config.server.max_upload_size);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind '{}'", addr))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
