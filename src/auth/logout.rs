use axum::{
    debug_handler,
    extract::{Query, State},
    response::Redirect,
};
use tower_sessions::Session;

use crate::{AppResult, AppState};

use super::{login::ReturnTo, Clients};

/// Drops the whole cookie session, not just the identity.
#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    Query(ReturnTo { return_to }): Query<ReturnTo>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    session.flush().await?;
    Ok(Redirect::to(&clients.return_target(return_to.as_deref())))
}
