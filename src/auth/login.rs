use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::Redirect,
};
use oauth2::{CsrfToken, PkceCodeChallenge};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::debug;

use crate::{AppResult, AppState};

use super::{clients::ClientProvider, Clients, CSRF_STATE, PKCE_VERIFIER, RETURN_URL};

/// `?return_to=/some/client/path`, honoured after sign-in and sign-out.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReturnTo {
    pub(crate) return_to: Option<String>,
}

/// Starts the PKCE round trip. CSRF state, verifier and the resolved return
/// target wait in the cookie session until the provider calls back.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(ReturnTo { return_to }): Query<ReturnTo>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Redirect> {
    let client = clients.get_client(provider)?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(provider.scopes())
        .set_pkce_challenge(challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, verifier.secret()).await?;
    session
        .insert(RETURN_URL, clients.return_target(return_to.as_deref()))
        .await?;

    debug!(%provider, "redirecting to provider");
    Ok(Redirect::to(authorize_url.as_str()))
}
