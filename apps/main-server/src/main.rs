//! Taskboard Server binary.

use std::net::SocketAddr;

use task_store::MemoryTaskStore;
use taskboard_server::{config::Config, create_app, create_state, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_format);

    tracing::info!(
        environment = ?config.environment,
        relay_enforce_room_access = config.relay_enforce_room_access,
        "Starting Taskboard Server"
    );

    let store = MemoryTaskStore::new();
    let state = create_state(config.clone(), store)?;
    let app = create_app(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(addr = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
