use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{models::User, users, AppError};

use super::USER_ID;

/// The signed-in user, resolved against the user directory.
///
/// Rejects with 401 when the request carries no identity and 404 when the
/// identity has not been synced into the directory yet.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| unauthorized())?;

        let Some(external_id) = session.get::<String>(USER_ID).await? else {
            return Err(unauthorized());
        };

        let db_pool = SqlitePool::from_ref(state);
        let user = users::find_by_external_id(&db_pool, &external_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;

        Ok(CurrentUser(user))
    }
}

fn unauthorized() -> AppError {
    AppError::Unauthenticated("Unauthorized".to_owned())
}
