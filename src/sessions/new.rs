use axum::{debug_handler, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::{auth::CurrentUser, models::SessionView, AppJson, AppResult, AppState};

use super::SessionService;

#[derive(Debug, Deserialize)]
pub(crate) struct NewSessionBody {
    #[serde(default)]
    problem: String,
    #[serde(default)]
    difficulty: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewSessionResponse {
    message: &'static str,
    call_id: String,
    session: SessionView,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_session(
    State(sessions): State<SessionService>,
    CurrentUser(user): CurrentUser,
    AppJson(NewSessionBody { problem, difficulty }): AppJson<NewSessionBody>,
) -> AppResult<(StatusCode, AppJson<NewSessionResponse>)> {
    let session = sessions.create(&user, &problem, &difficulty).await?;

    Ok((
        StatusCode::CREATED,
        AppJson(NewSessionResponse {
            message: "Session created",
            call_id: session.call_id.clone(),
            session,
        }),
    ))
}
