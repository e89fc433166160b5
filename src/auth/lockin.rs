use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Redirect,
};
use oauth2::{AuthorizationCode, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{AppError, AppResult, AppState};

use super::{clients::ClientProvider, Clients, CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID};

#[derive(Deserialize)]
pub(crate) struct Callback {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

/// OAuth callback. Trades the code for a provider token, asks the identity
/// provider which account it belongs to, and pins that account id to the
/// cookie session under a fresh session id.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(callback): Query<Callback>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    // Single use, whatever happens next.
    let stored_state = session.remove::<String>(CSRF_STATE).await?;
    let verifier = session.remove::<String>(PKCE_VERIFIER).await?;
    let return_to = session
        .remove::<String>(RETURN_URL)
        .await?
        .unwrap_or_else(|| clients.return_target(None));

    if let Some(error) = callback.error {
        warn!(%provider, %error, "provider refused sign-in");
        return Ok(Redirect::to(&return_to));
    }

    let (Some(state), Some(code)) = (callback.state, callback.code) else {
        return Err(AppError::Validation("OAuth callback without state or code".to_owned()));
    };
    if stored_state.as_deref() != Some(state.as_str()) {
        return Err(AppError::Forbidden("OAuth state mismatch".to_owned()));
    }
    let Some(verifier) = verifier else {
        return Err(AppError::Forbidden("OAuth flow was not started here".to_owned()));
    };

    let token = clients
        .get_client(provider)?
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(PkceCodeVerifier::new(verifier))
        .request_async(&clients.http_client)
        .await?;

    let external_id = clients
        .resolve_account(provider, token.access_token().secret())
        .await?;

    session.cycle_id().await?;
    session.insert(USER_ID, &external_id).await?;
    info!(%external_id, %provider, "signed in");

    Ok(Redirect::to(&return_to))
}
