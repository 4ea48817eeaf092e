use axum::http::{header, HeaderValue, Method};
use console::actors::trace_store::{TraceStoreActor, TraceStoreArguments};
use console::api;
use console::app_state::AppState;
use ractor::Actor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use trace_types::EventSource;

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load .env values early so storage paths are available before spawn.
    // Search the current directory and ancestors so running from `console/`
    // still picks up a repo-root `.env`.
    load_env_file();

    tracing::info!("Starting Kautio Console diagnostics server");

    // Use configurable path for the trace database
    let db_path =
        std::env::var("TRACE_DB_PATH").unwrap_or_else(|_| "data/trace-events.db".to_string());
    let db_path = std::path::PathBuf::from(db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create data directory");
    }

    // Create TraceStoreActor (foundation of the diagnostics subsystem)
    // libsql takes a plain file path (not a sqlite:// URL)
    let db_path_str = db_path.to_str().expect("Invalid database path");
    tracing::info!("Connecting to trace database: {}", db_path_str);
    let (trace_store, _handle) = Actor::spawn(
        None,
        TraceStoreActor,
        TraceStoreArguments::File(db_path_str.to_string()),
    )
    .await
    .expect("Failed to create trace store");

    tracing::info!("TraceStoreActor started");

    let app_state = Arc::new(AppState::new(trace_store.clone()));

    // Log a startup connectivity probe; the reconstruction pipeline treats
    // these as noise, so they never show up in cycle counts.
    app_state.recorder(EventSource::Web).connectivity_probe();

    // Configure CORS to allow known admin-UI origins
    let allowed_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]
        .iter()
        .map(|origin| HeaderValue::from_str(origin).expect("Invalid CORS origin"))
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    let api_state = api::ApiState { app_state };

    let app = api::router().with_state(api_state).layer(cors);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!("Starting HTTP server on http://{bind_addr}");

    let listener = TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await
}
