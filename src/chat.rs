use std::sync::Arc;

use axum::{debug_handler, extract::State, routing::get, Router};
use serde::Serialize;

use crate::{auth::CurrentUser, stream::ChatDirectory, AppJson, AppResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatToken {
    token: String,
    user_id: String,
    username: String,
    avatar: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/token", get(chat_token))
}

/// A real-time platform token for the signed-in user.
#[debug_handler(state = AppState)]
pub(crate) async fn chat_token(
    State(chat): State<Arc<dyn ChatDirectory>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<AppJson<ChatToken>> {
    let token = chat.user_token(&user.external_id)?;

    Ok(AppJson(ChatToken {
        token,
        user_id: user.external_id,
        username: user.name,
        avatar: user.avatar,
    }))
}
