//! User directory: the local mirror of identity provider accounts.
//!
//! Rows are only written by identity lifecycle events (see [`crate::sync`]).

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::now_millis,
    models::{User, UserRow},
};

const USER_COLUMNS: &str = "id,external_id,email,name,avatar,created_at,updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// Inserts the user, or refreshes name, email and avatar of the row with the
/// same external id. The local id and external id never change.
pub async fn upsert(db_pool: &SqlitePool, user: &NewUser) -> anyhow::Result<User> {
    let now = now_millis();
    let row: UserRow = sqlx::query_as(&format!(
        "INSERT INTO users ({USER_COLUMNS}) VALUES (?,?,?,?,?,?,?) \
         ON CONFLICT(external_id) DO UPDATE SET \
            email=excluded.email, name=excluded.name, avatar=excluded.avatar, updated_at=excluded.updated_at \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::now_v7().to_string())
    .bind(&user.external_id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.avatar.as_deref().unwrap_or_default())
    .bind(now)
    .bind(now)
    .fetch_one(db_pool)
    .await?;

    let user = User::try_from(row)?;
    info!(user_id = %user.id, external_id = %user.external_id, "user synced");
    Ok(user)
}

/// Returns whether a row was removed. A missing row is not an error.
pub async fn delete_by_external_id(db_pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE external_id=?")
        .bind(external_id)
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_by_external_id(db_pool: &SqlitePool, external_id: &str) -> anyhow::Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE external_id=?"
    ))
    .bind(external_id)
    .fetch_optional(db_pool)
    .await?;

    row.map(User::try_from).transpose()
}

pub async fn find(db_pool: &SqlitePool, id: Uuid) -> anyhow::Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id=?"))
        .bind(id.to_string())
        .fetch_optional(db_pool)
        .await?;

    row.map(User::try_from).transpose()
}
