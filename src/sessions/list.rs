use axum::{
    debug_handler,
    extract::{Path, State},
};
use serde::Serialize;

use crate::{auth::CurrentUser, models::SessionView, AppJson, AppResult, AppState};

use super::{parse_session_id, SessionService};

#[derive(Serialize)]
pub(crate) struct SessionList {
    sessions: Vec<SessionView>,
}

#[derive(Serialize)]
pub(crate) struct SessionBody {
    pub(crate) session: SessionView,
}

#[debug_handler(state = AppState)]
pub(crate) async fn active_sessions(
    State(sessions): State<SessionService>,
    CurrentUser(_): CurrentUser,
) -> AppResult<AppJson<SessionList>> {
    Ok(AppJson(SessionList {
        sessions: sessions.list_active().await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn recent_sessions(
    State(sessions): State<SessionService>,
    CurrentUser(user): CurrentUser,
) -> AppResult<AppJson<SessionList>> {
    Ok(AppJson(SessionList {
        sessions: sessions.list_recent(&user).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn session_by_id(
    Path(session_id): Path<String>,
    State(sessions): State<SessionService>,
    CurrentUser(_): CurrentUser,
) -> AppResult<AppJson<SessionBody>> {
    let session = sessions.get(parse_session_id(&session_id)?).await?;
    Ok(AppJson(SessionBody { session }))
}
