use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Level};

use merchpay_backend::DbConnection;

// Application state shared across handlers. The transport layer builds its
// Engine from the same connection; this binary only provisions the schema
// and serves the health endpoint.
struct AppState {
    db: DbConnection,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Setting up database");
    let db = DbConnection::init().await?;
    let state = Arc::new(AppState { db });

    let cors = CorsLayer::new().allow_origin(Any);
    let app = Router::new()
        .route("/health", get(health))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(state.db.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
