//! Background sync of identity provider accounts.
//!
//! The provider delivers lifecycle events at least once, in any order, through
//! [`webhook`]. Events are queued and applied by a single consumer task so the
//! request path never waits on the database or the chat platform. Both
//! operations are idempotent: creation is an upsert keyed by external id and
//! deletion of a missing row succeeds.
//!
//! An event that fails (an email still held by an account whose deletion has
//! not arrived yet, a busy database) is retried with backoff. Later events for
//! the same account wait behind it so they are applied in arrival order.

mod consumer;
mod webhook;

use std::sync::Arc;

use axum::{routing::post, Router};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    stream::{ChatDirectory, ChatUser},
    users::{self, NewUser},
    AppState,
};

pub use consumer::{spawn_consumer, RetryPolicy};
pub use webhook::IdentityWebhook;

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    UserCreated(NewUser),
    UserDeleted { external_id: String },
}

impl IdentityEvent {
    pub fn external_id(&self) -> &str {
        match self {
            IdentityEvent::UserCreated(user) => &user.external_id,
            IdentityEvent::UserDeleted { external_id } => external_id,
        }
    }
}

/// Producer half of the event queue, shared by webhook handlers.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<IdentityEvent>,
    secret: Arc<str>,
}

impl SyncQueue {
    pub fn new(secret: &str) -> (SyncQueue, mpsc::Receiver<IdentityEvent>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (SyncQueue { tx, secret: secret.into() }, rx)
    }

    pub async fn push(&self, event: IdentityEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("identity sync consumer has stopped"))
    }

    pub(crate) fn secret_matches(&self, presented: &str) -> bool {
        let expected = self.secret.as_bytes();
        let presented = presented.as_bytes();

        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/identity", post(webhook::identity_webhook))
}

/// Applies one event to the directory, then mirrors it to the chat platform.
/// Chat platform failures are logged and do not fail the event.
pub async fn apply(db_pool: &SqlitePool, chat: &dyn ChatDirectory, event: &IdentityEvent) -> anyhow::Result<()> {
    match event {
        IdentityEvent::UserCreated(new_user) => {
            let user = users::upsert(db_pool, new_user).await?;

            let chat_user = ChatUser {
                id: user.external_id.clone(),
                name: user.name.clone(),
                image: Some(user.avatar.clone()).filter(|avatar| !avatar.is_empty()),
                email: Some(user.email.clone()),
            };
            if let Err(err) = chat.upsert_user(&chat_user).await {
                warn!(external_id = %user.external_id, error = ?err, "chat user upsert failed");
            }
        }
        IdentityEvent::UserDeleted { external_id } => {
            let removed = users::delete_by_external_id(db_pool, external_id).await?;
            info!(%external_id, removed, "user removed");

            if let Err(err) = chat.delete_user(external_id).await {
                warn!(%external_id, error = ?err, "chat user delete failed");
            }
        }
    }
    Ok(())
}
