use std::net::Ipv4Addr;
use std::sync::Arc;

use proposal_analyzer::{api, config, logging, processing};
use tokio::net::TcpListener;

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: std::ops::RangeInclusive<u16> = 8000..=8099;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();
    let service = processing::AnalysisService::from_config(config)
        .expect("Failed to initialize analysis service");
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!(
        port,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        max_upload_bytes = config.max_upload_bytes,
        "Proposal analyzer listening on http://0.0.0.0:{port}"
    );
    axum::serve(listener, app).await.expect("server error");
}

/// An explicit port is the only candidate; otherwise walk the fallback range.
fn candidate_ports(configured: Option<u16>) -> Vec<u16> {
    match configured {
        Some(port) => vec![port],
        None => FALLBACK_PORTS.collect(),
    }
}

async fn bind_listener(configured: Option<u16>) -> std::io::Result<(TcpListener, u16)> {
    let candidates = candidate_ports(configured);
    let last = candidates.len().saturating_sub(1);
    for (attempt, port) in candidates.into_iter().enumerate() {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            // An explicitly configured port surfaces its own error.
            Err(err) if configured.is_some() || attempt == last => return Err(err),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port taken, trying the next one");
            }
            Err(err) => return Err(err),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "no candidate port to bind",
    ))
}
