use axum::{
    debug_handler,
    extract::{Path, State},
};

use crate::{auth::CurrentUser, AppJson, AppResult, AppState};

use super::{list::SessionBody, parse_session_id, SessionService};

#[debug_handler(state = AppState)]
pub(crate) async fn join_session(
    Path(session_id): Path<String>,
    State(sessions): State<SessionService>,
    CurrentUser(user): CurrentUser,
) -> AppResult<AppJson<SessionBody>> {
    let session = sessions.join(&user, parse_session_id(&session_id)?).await?;
    Ok(AppJson(SessionBody { session }))
}
