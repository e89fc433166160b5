use std::{future::Future, sync::Arc, time::Duration};

use anyhow::anyhow;
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::{from_millis, now_millis},
    models::{new_call_id, Difficulty, Resources, Session, SessionStatus, SessionView, User},
    stream::{CallMetadata, Provisioner},
    AppError, AppResult,
};

use super::store;

/// Page size of the session listings.
pub const LIST_LIMIT: i64 = 20;

/// Session lifecycle: create, join, end, and the queries around them.
///
/// The store is always written before the platform is touched. A platform
/// failure after that write is reported to the caller and left for
/// [`crate::reconcile`] to repair; nothing here retries or rolls back.
#[derive(Clone)]
pub struct SessionService {
    db_pool: SqlitePool,
    provisioner: Arc<dyn Provisioner>,
    adapter_timeout: Duration,
}

impl SessionService {
    pub fn new(db_pool: SqlitePool, provisioner: Arc<dyn Provisioner>, adapter_timeout: Duration) -> Self {
        SessionService {
            db_pool,
            provisioner,
            adapter_timeout,
        }
    }

    pub async fn create(&self, host: &User, problem: &str, difficulty: &str) -> AppResult<SessionView> {
        let problem = problem.trim();
        if problem.is_empty() || difficulty.trim().is_empty() {
            return Err(AppError::Validation("problem and difficulty are required".to_owned()));
        }
        let difficulty: Difficulty = difficulty.parse()?;

        let now = now_millis();
        let created_at = from_millis(now)?;
        let mut session = Session {
            id: Uuid::now_v7(),
            problem: problem.to_owned(),
            difficulty,
            status: SessionStatus::Active,
            call_id: new_call_id(),
            host_id: host.id,
            participant_id: None,
            resources: Resources::Pending,
            created_at,
            updated_at: created_at,
        };
        store::insert(&self.db_pool, &session, now).await?;
        info!(session_id = %session.id, call_id = %session.call_id, host = %host.id, "session created");

        if let Err(err) = self.provision(&session, &host.external_id).await {
            error!(session_id = %session.id, call_id = %session.call_id, error = ?err, "provisioning failed");
            return Err(AppError::Provisioning(
                "Session was saved but its call could not be set up".to_owned(),
            ));
        }

        session.resources = Resources::Provisioned;
        Ok(SessionView::new(session, Some(host.summary()), None))
    }

    /// Newest active sessions.
    pub async fn list_active(&self) -> AppResult<Vec<SessionView>> {
        Ok(store::list_by_status(&self.db_pool, SessionStatus::Active, LIST_LIMIT).await?)
    }

    /// Newest completed sessions `user` hosted or joined.
    pub async fn list_recent(&self, user: &User) -> AppResult<Vec<SessionView>> {
        Ok(store::list_by_status_for_member(&self.db_pool, SessionStatus::Completed, user.id, LIST_LIMIT).await?)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<SessionView> {
        store::find_view(&self.db_pool, id).await?.ok_or_else(session_not_found)
    }

    /// Takes the single participant seat. Of several concurrent joins exactly
    /// one claims it; the rest get `Conflict`.
    ///
    /// The host is not barred from joining their own session.
    pub async fn join(&self, requester: &User, id: Uuid) -> AppResult<SessionView> {
        if !store::claim_participant(&self.db_pool, id, requester.id, now_millis()).await? {
            let session = store::find(&self.db_pool, id).await?.ok_or_else(session_not_found)?;
            if session.status != SessionStatus::Active {
                return Err(AppError::InvalidState("Session is not active".to_owned()));
            }
            return Err(AppError::Conflict("Session is full".to_owned()));
        }

        let session = self.get(id).await?;
        info!(session_id = %id, participant = %requester.id, "session joined");

        if let Err(err) = self
            .bounded(self.provisioner.add_member(&session.call_id, &requester.external_id))
            .await
        {
            error!(session_id = %id, call_id = %session.call_id, error = ?err, "adding channel member failed");
            return Err(AppError::Provisioning(
                "Joined the session but could not be added to its chat".to_owned(),
            ));
        }

        Ok(session)
    }

    /// Host-only `active -> completed`, then teardown of the call and channel.
    ///
    /// A teardown failure is reported but the session stays completed.
    pub async fn end(&self, requester: &User, id: Uuid) -> AppResult<SessionView> {
        let session = store::find(&self.db_pool, id).await?.ok_or_else(session_not_found)?;

        if session.host_id != requester.id {
            return Err(AppError::Forbidden("Only host can end session".to_owned()));
        }
        if session.status == SessionStatus::Completed || !store::complete(&self.db_pool, id, now_millis()).await? {
            return Err(AppError::InvalidState("Session is already completed".to_owned()));
        }
        info!(session_id = %id, call_id = %session.call_id, "session completed");

        if let Err(err) = self.teardown(&session).await {
            error!(session_id = %id, call_id = %session.call_id, error = ?err, "teardown failed");
            return Err(AppError::Teardown(
                "Session ended but its call could not be removed".to_owned(),
            ));
        }

        self.get(id).await
    }

    /// Creates the call and the channel, then records them as provisioned.
    /// Safe to repeat for a session that is already provisioned.
    pub(crate) async fn provision(&self, session: &Session, host_external_id: &str) -> anyhow::Result<()> {
        let metadata = CallMetadata {
            problem: session.problem.clone(),
            difficulty: session.difficulty,
            session_id: session.id,
            created_by: host_external_id.to_owned(),
        };

        self.bounded(self.provisioner.create_call(&session.call_id, &metadata))
            .await?;
        self.bounded(self.provisioner.create_channel(
            &session.call_id,
            &metadata,
            &[host_external_id.to_owned()],
        ))
        .await?;

        store::set_resources(&self.db_pool, session.id, Resources::Provisioned).await?;
        Ok(())
    }

    /// Deletes the call and the channel; both are attempted even if one fails.
    pub(crate) async fn teardown(&self, session: &Session) -> anyhow::Result<()> {
        let (call, channel) = futures_util::future::join(
            self.bounded(self.provisioner.delete_call(&session.call_id)),
            self.bounded(self.provisioner.delete_channel(&session.call_id)),
        )
        .await;

        if let Err(err) = &call {
            warn!(call_id = %session.call_id, error = ?err, "call deletion failed");
        }
        if let Err(err) = &channel {
            warn!(call_id = %session.call_id, error = ?err, "channel deletion failed");
        }
        call?;
        channel?;

        store::set_resources(&self.db_pool, session.id, Resources::Released).await?;
        Ok(())
    }

    pub(crate) fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    async fn bounded<T>(&self, call: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        tokio::time::timeout(self.adapter_timeout, call)
            .await
            .map_err(|_| anyhow!("real-time platform call timed out after {:?}", self.adapter_timeout))?
    }
}

fn session_not_found() -> AppError {
    AppError::NotFound("Session not found".to_owned())
}
