use axum::{
    debug_handler,
    extract::{Path, State},
};

use crate::{auth::CurrentUser, AppJson, AppResult, AppState};

use super::{list::SessionBody, parse_session_id, SessionService};

/// The only status change a client can ask for is ending the session.
#[debug_handler(state = AppState)]
pub(crate) async fn end_session(
    Path(session_id): Path<String>,
    State(sessions): State<SessionService>,
    CurrentUser(user): CurrentUser,
) -> AppResult<AppJson<SessionBody>> {
    let session = sessions.end(&user, parse_session_id(&session_id)?).await?;
    Ok(AppJson(SessionBody { session }))
}
