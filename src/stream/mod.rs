//! Real-time platform integration: video calls, chat channels and the chat
//! user directory.
//!
//! The service layers only see the [`Provisioner`] and [`ChatDirectory`]
//! traits. [`StreamClient`] is the production implementation; it is built once
//! in `main` and shared behind an `Arc`.

mod client;
mod token;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::Difficulty;

pub use client::StreamClient;
pub use token::TokenSigner;

/// Custom data attached to a session's call and channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub problem: String,
    pub difficulty: Difficulty,
    pub session_id: Uuid,
    #[serde(skip)]
    pub created_by: String,
}

/// Creates and tears down the call + channel pair keyed by a call id.
///
/// Each operation may fail independently and none of them is retried here.
/// Creation is get-or-create and deletion of something already gone succeeds,
/// so repeating an operation is safe.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_call(&self, call_id: &str, metadata: &CallMetadata) -> anyhow::Result<()>;

    async fn create_channel(
        &self,
        call_id: &str,
        metadata: &CallMetadata,
        members: &[String],
    ) -> anyhow::Result<()>;

    async fn add_member(&self, call_id: &str, user_id: &str) -> anyhow::Result<()>;

    async fn delete_call(&self, call_id: &str) -> anyhow::Result<()>;

    async fn delete_channel(&self, call_id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The chat platform's own user list, and tokens for its clients.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn upsert_user(&self, user: &ChatUser) -> anyhow::Result<()>;

    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()>;

    /// A token the browser uses to connect to the platform as `user_id`.
    fn user_token(&self, user_id: &str) -> anyhow::Result<String>;
}
