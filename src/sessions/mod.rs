mod list;
mod members;
mod new;
mod service;
mod status;
pub(crate) mod store;

use axum::{
    routing::{get, patch, post},
    Router,
};
use uuid::Uuid;

use crate::{AppError, AppState};

pub use service::{SessionService, LIST_LIMIT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new::create_session))
        .route("/active", get(list::active_sessions))
        .route("/recent", get(list::recent_sessions))
        .route("/{session_id}", get(list::session_by_id))
        .route("/{session_id}/participants", post(members::join_session))
        .route("/{session_id}/status", patch(status::end_session))
}

/// Ids that do not parse cannot name a session.
pub(crate) fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Session not found".to_owned()))
}
