pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod execute;
pub mod models;
pub mod reconcile;
pub mod sessions;
pub mod stream;
pub mod sync;
pub mod users;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use error::{AppError, AppJson, AppResult};
pub use sessions::{SessionService, LIST_LIMIT};

use execute::PistonClient;
use stream::ChatDirectory;
use sync::SyncQueue;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub sessions: SessionService,
    pub chat: Arc<dyn ChatDirectory>,
    pub sync: SyncQueue,
    pub piston: PistonClient,
}

/// All routes, without state or the cookie session layer.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/session", sessions::router())
        .nest("/chat", chat::router())
        .nest("/execute", execute::router())
        .nest("/webhooks", sync::router());

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .nest("/api", api)
}

pub fn app(state: AppState, cookie_secure: bool) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(cookie_secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    routes()
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("expected string field {field} in response"))?
            .to_owned()
        )
    }
}
