use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::from_millis, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        use Difficulty::*;
        match self {
            Easy => "easy",
            Medium => "medium",
            Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(AppError::Validation(
                "difficulty must be one of easy, medium, hard".to_owned(),
            )),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(anyhow!("unknown session status {other:?}")),
        }
    }
}

/// Whether the external call and channel of a session are believed to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resources {
    Pending,
    Provisioned,
    Released,
}

impl Resources {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resources::Pending => "pending",
            Resources::Provisioned => "provisioned",
            Resources::Released => "released",
        }
    }
}

impl FromStr for Resources {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Resources::Pending),
            "provisioned" => Ok(Resources::Provisioned),
            "released" => Ok(Resources::Released),
            other => Err(anyhow!("unknown resource state {other:?}")),
        }
    }
}

/// Local mirror of an identity provider account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            external_id: None,
            email: None,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    external_id: String,
    email: String,
    name: String,
    avatar: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: Uuid::parse_str(&row.id)?,
            external_id: row.external_id,
            email: row.email,
            name: row.name,
            avatar: row.avatar,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

/// The part of a user that is shown next to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub problem: String,
    pub difficulty: Difficulty,
    pub status: SessionStatus,
    pub call_id: String,
    pub host_id: Uuid,
    pub participant_id: Option<Uuid>,
    pub resources: Resources,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    id: String,
    problem: String,
    difficulty: String,
    status: String,
    call_id: String,
    host_id: String,
    participant_id: Option<String>,
    resources: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: Uuid::parse_str(&row.id)?,
            problem: row.problem,
            difficulty: row
                .difficulty
                .parse()
                .map_err(|_| anyhow!("unknown difficulty {:?}", row.difficulty))?,
            status: row.status.parse()?,
            call_id: row.call_id,
            host_id: Uuid::parse_str(&row.host_id)?,
            participant_id: row
                .participant_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()?,
            resources: row.resources.parse()?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

/// A session as returned over HTTP, with its members summarised.
///
/// `host` is `None` only when the host's account has since been deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub problem: String,
    pub difficulty: Difficulty,
    pub status: SessionStatus,
    pub call_id: String,
    pub host: Option<UserSummary>,
    pub participant: Option<UserSummary>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SessionView {
    pub fn new(session: Session, host: Option<UserSummary>, participant: Option<UserSummary>) -> Self {
        SessionView {
            id: session.id,
            problem: session.problem,
            difficulty: session.difficulty,
            status: session.status,
            call_id: session.call_id,
            host,
            participant,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Session row joined with its host and participant.
#[derive(sqlx::FromRow)]
pub(crate) struct SessionViewRow {
    #[sqlx(flatten)]
    session: SessionRow,
    host_name: Option<String>,
    host_avatar: Option<String>,
    host_external_id: Option<String>,
    host_email: Option<String>,
    participant_name: Option<String>,
    participant_avatar: Option<String>,
    participant_external_id: Option<String>,
    participant_email: Option<String>,
}

impl SessionViewRow {
    /// `detailed` also exposes email and external id of both members.
    pub(crate) fn into_view(self, detailed: bool) -> anyhow::Result<SessionView> {
        let session = Session::try_from(self.session)?;

        let host = summarise(
            Some(session.host_id),
            self.host_name,
            self.host_avatar,
            self.host_external_id,
            self.host_email,
            detailed,
        );
        let participant = summarise(
            session.participant_id,
            self.participant_name,
            self.participant_avatar,
            self.participant_external_id,
            self.participant_email,
            detailed,
        );

        Ok(SessionView::new(session, host, participant))
    }
}

fn summarise(
    id: Option<Uuid>,
    name: Option<String>,
    avatar: Option<String>,
    external_id: Option<String>,
    email: Option<String>,
    detailed: bool,
) -> Option<UserSummary> {
    Some(UserSummary {
        id: id?,
        name: name?,
        avatar: avatar.unwrap_or_default(),
        external_id: external_id.filter(|_| detailed),
        email: email.filter(|_| detailed),
    })
}

/// Identifier shared by a session's video call and chat channel.
///
/// UUIDv7 is monotonic within the process and carries 74 random bits, and the
/// column is `UNIQUE` besides.
pub fn new_call_id() -> String {
    format!("session_{}", Uuid::now_v7().simple())
}
