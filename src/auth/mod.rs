//! Identity provider adapter.
//!
//! Sign-in is an OAuth2 PKCE round trip to an upstream provider; the identity
//! provider then resolves the provider token to a stable account id, which is
//! kept in the cookie session. [`CurrentUser`] turns that id back into a local
//! [`User`](crate::models::User) on every protected request.

mod clients;
mod current_user;
mod login;
mod lockin;
mod logout;

use axum::{routing::get, Router};

use crate::AppState;

pub use clients::{ClientProvider, Clients};
pub use current_user::CurrentUser;

pub const USER_ID: &str = "user_id";
pub(crate) const CSRF_STATE: &str = "csrf_state";
pub(crate) const PKCE_VERIFIER: &str = "pkce_verifier";
pub(crate) const RETURN_URL: &str = "return_url";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}
