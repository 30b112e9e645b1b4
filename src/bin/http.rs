#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;

    use frostline::http_api::{self, AppState};
    use frostline::{EngineConfig, InMemoryStore, MaintenanceEngine, TaskCatalog};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("frostline=info")),
        )
        .init();

    let addr: SocketAddr = std::env::var("FROSTLINE_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;
    let config = match std::env::var("FROSTLINE_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(path)?,
        Err(_) => EngineConfig::default(),
    };
    let store = match std::env::var("FROSTLINE_SNAPSHOT") {
        Ok(path) => frostline::persistence::load_store_from_json(path)?,
        Err(_) => InMemoryStore::new(),
    };

    let engine = MaintenanceEngine::new(store, TaskCatalog::cold_climate_defaults(), config);
    tracing::info!(target: "frostline", event = "http_listening", %addr);
    http_api::serve(addr, AppState::new(engine)).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
