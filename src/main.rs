use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use whisperpair::{api, chat, storage::Storage, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("whisperpair=info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://whisperpair.db?mode=rwc".to_owned());
    let storage = Storage::connect(&database_url).await?;
    let chat = Arc::new(chat::ChatService::new(storage.clone()));

    let app = Router::new()
        .route("/ws", get(chat::ws::chat_ws))
        .nest("/api", api::router())
        .layer(CorsLayer::permissive())
        .with_state(AppState { storage, chat });

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
