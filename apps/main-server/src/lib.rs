//! Taskboard Server
//!
//! Serves the Taskboard HTTP API (identity, projects, tasks and users) and
//! the real-time relay that fans project events out to connected clients.

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod services;
pub mod state;
pub mod validation;
pub mod websocket;

use axum::{Router, extract::DefaultBodyLimit, http::HeaderValue};
use task_store::TaskStore;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::LogFormat;
pub use crate::state::{SharedState, create_state, create_state_with_relay};

/// Creates the application router with all routes configured.
pub fn create_app<S: TaskStore + 'static>(state: SharedState<S>) -> Router {
    let origin = match state
        .config
        .client_url
        .as_deref()
        .map(HeaderValue::from_str)
    {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(_)) => {
            tracing::warn!("CLIENT_URL is not a valid origin, allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_body_bytes;
    let development = state.config.is_development();

    let mut app = api::create_router(state);
    if development {
        app = app.layer(axum::middleware::from_fn(error::expose_error_details));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Initializes tracing with the given log level and output format.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}
