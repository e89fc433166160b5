use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Resources, Session, SessionRow, SessionStatus, SessionView, SessionViewRow};

const SESSION_COLUMNS: &str =
    "s.id,s.problem,s.difficulty,s.status,s.call_id,s.host_id,s.participant_id,s.resources,s.created_at,s.updated_at";

const MEMBER_COLUMNS: &str = "h.name AS host_name,h.avatar AS host_avatar,h.external_id AS host_external_id,h.email AS host_email,\
     p.name AS participant_name,p.avatar AS participant_avatar,p.external_id AS participant_external_id,p.email AS participant_email";

const MEMBER_JOINS: &str = "LEFT JOIN users h ON h.id=s.host_id LEFT JOIN users p ON p.id=s.participant_id";

pub(crate) async fn insert(db_pool: &SqlitePool, session: &Session, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (id,problem,difficulty,status,call_id,host_id,participant_id,resources,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(session.id.to_string())
    .bind(&session.problem)
    .bind(session.difficulty.as_str())
    .bind(session.status.as_str())
    .bind(&session.call_id)
    .bind(session.host_id.to_string())
    .bind(session.participant_id.map(|id| id.to_string()))
    .bind(session.resources.as_str())
    .bind(now)
    .bind(now)
    .execute(db_pool)
    .await?;

    Ok(())
}

pub(crate) async fn find(db_pool: &SqlitePool, id: Uuid) -> anyhow::Result<Option<Session>> {
    let row: Option<SessionRow> = sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id=?"))
        .bind(id.to_string())
        .fetch_optional(db_pool)
        .await?;

    row.map(Session::try_from).transpose()
}

pub(crate) async fn find_view(db_pool: &SqlitePool, id: Uuid) -> anyhow::Result<Option<SessionView>> {
    let row: Option<SessionViewRow> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS},{MEMBER_COLUMNS} FROM sessions s {MEMBER_JOINS} WHERE s.id=?"
    ))
    .bind(id.to_string())
    .fetch_optional(db_pool)
    .await?;

    row.map(|row| row.into_view(true)).transpose()
}

pub(crate) async fn list_by_status(
    db_pool: &SqlitePool,
    status: SessionStatus,
    limit: i64,
) -> anyhow::Result<Vec<SessionView>> {
    let rows: Vec<SessionViewRow> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS},{MEMBER_COLUMNS} FROM sessions s {MEMBER_JOINS} \
         WHERE s.status=? ORDER BY s.created_at DESC, s.id DESC LIMIT ?"
    ))
    .bind(status.as_str())
    .bind(limit)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(|row| row.into_view(false)).collect()
}

pub(crate) async fn list_by_status_for_member(
    db_pool: &SqlitePool,
    status: SessionStatus,
    user_id: Uuid,
    limit: i64,
) -> anyhow::Result<Vec<SessionView>> {
    let user_id = user_id.to_string();
    let rows: Vec<SessionViewRow> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS},{MEMBER_COLUMNS} FROM sessions s {MEMBER_JOINS} \
         WHERE s.status=? AND (s.host_id=? OR s.participant_id=?) \
         ORDER BY s.created_at DESC, s.id DESC LIMIT ?"
    ))
    .bind(status.as_str())
    .bind(&user_id)
    .bind(&user_id)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(|row| row.into_view(false)).collect()
}

/// Claims the participant seat in one statement. Returns `false` when the
/// session is missing, no longer active, or already has a participant.
pub(crate) async fn claim_participant(
    db_pool: &SqlitePool,
    id: Uuid,
    user_id: Uuid,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions SET participant_id=?, updated_at=? \
         WHERE id=? AND status='active' AND participant_id IS NULL",
    )
    .bind(user_id.to_string())
    .bind(now)
    .bind(id.to_string())
    .execute(db_pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// `active -> completed`, at most once.
pub(crate) async fn complete(db_pool: &SqlitePool, id: Uuid, now: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET status='completed', updated_at=? WHERE id=? AND status='active'")
        .bind(now)
        .bind(id.to_string())
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn set_resources(db_pool: &SqlitePool, id: Uuid, resources: Resources) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sessions SET resources=? WHERE id=?")
        .bind(resources.as_str())
        .bind(id.to_string())
        .execute(db_pool)
        .await?;

    Ok(())
}

/// Active sessions created before `cutoff` whose call and channel were never
/// confirmed, with the host's external id when the host still exists.
pub(crate) async fn unprovisioned(
    db_pool: &SqlitePool,
    cutoff: i64,
) -> anyhow::Result<Vec<(Session, Option<String>)>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        session: SessionRow,
        host_external_id: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS},h.external_id AS host_external_id FROM sessions s \
         LEFT JOIN users h ON h.id=s.host_id \
         WHERE s.status='active' AND s.resources='pending' AND s.created_at<=?"
    ))
    .bind(cutoff)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|row| Ok((Session::try_from(row.session)?, row.host_external_id)))
        .collect()
}

/// Completed sessions last touched before `cutoff` whose teardown never
/// succeeded.
pub(crate) async fn unreleased(db_pool: &SqlitePool, cutoff: i64) -> anyhow::Result<Vec<Session>> {
    let rows: Vec<SessionRow> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions s \
         WHERE s.status='completed' AND s.resources!='released' AND s.updated_at<=?"
    ))
    .bind(cutoff)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter().map(Session::try_from).collect()
}
