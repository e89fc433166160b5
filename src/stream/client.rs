use std::{collections::HashMap, time::Duration};

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Method, RequestBuilder, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::config::StreamConfig;

use super::{CallMetadata, ChatDirectory, ChatUser, Provisioner, TokenSigner};

const CALL_TYPE: &str = "default";
const CHANNEL_TYPE: &str = "messaging";

/// REST client for the video and chat APIs of the real-time platform.
#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    api_key: String,
    signer: TokenSigner,
    video_url: String,
    chat_url: String,
}

impl StreamClient {
    /// Every request made through the client is bounded by `timeout`.
    pub fn new(config: &StreamConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building real-time platform http client")?;

        Ok(StreamClient {
            http,
            api_key: config.api_key.clone(),
            signer: TokenSigner::new(&config.api_secret),
            video_url: config.video_url.trim_end_matches('/').to_owned(),
            chat_url: config.chat_url.trim_end_matches('/').to_owned(),
        })
    }

    fn video(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}/api/v2/video{path}", self.video_url))
    }

    fn chat(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.chat_url))
    }

    /// Sends with server credentials. With `missing_ok`, a 404 counts as done.
    async fn send(&self, request: RequestBuilder, missing_ok: bool) -> anyhow::Result<()> {
        let response = request
            .query(&[("api_key", self.api_key.as_str())])
            .header(AUTHORIZATION, self.signer.server_token()?)
            .header("stream-auth-type", "jwt")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || (missing_ok && status == StatusCode::NOT_FOUND) {
            debug!(%status, "real-time platform request done");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        bail!("real-time platform returned {status}: {body}")
    }
}

#[async_trait]
impl Provisioner for StreamClient {
    async fn create_call(&self, call_id: &str, metadata: &CallMetadata) -> anyhow::Result<()> {
        let request = self
            .video(Method::POST, &format!("/call/{CALL_TYPE}/{call_id}"))
            .json(&json!({
                "data": {
                    "created_by_id": metadata.created_by,
                    "custom": metadata,
                }
            }));

        self.send(request, false)
            .await
            .with_context(|| format!("creating call {call_id}"))
    }

    async fn create_channel(
        &self,
        call_id: &str,
        metadata: &CallMetadata,
        members: &[String],
    ) -> anyhow::Result<()> {
        let request = self
            .chat(Method::POST, &format!("/channels/{CHANNEL_TYPE}/{call_id}/query"))
            .json(&json!({
                "data": {
                    "name": format!("{} Session", metadata.problem),
                    "created_by_id": metadata.created_by,
                    "members": members,
                    "problem": metadata.problem,
                    "difficulty": metadata.difficulty,
                    "sessionId": metadata.session_id,
                }
            }));

        self.send(request, false)
            .await
            .with_context(|| format!("creating channel {call_id}"))
    }

    async fn add_member(&self, call_id: &str, user_id: &str) -> anyhow::Result<()> {
        let request = self
            .chat(Method::POST, &format!("/channels/{CHANNEL_TYPE}/{call_id}"))
            .json(&json!({ "add_members": [user_id] }));

        self.send(request, false)
            .await
            .with_context(|| format!("adding {user_id} to channel {call_id}"))
    }

    async fn delete_call(&self, call_id: &str) -> anyhow::Result<()> {
        let request = self
            .video(Method::POST, &format!("/call/{CALL_TYPE}/{call_id}/delete"))
            .json(&json!({ "hard": true }));

        self.send(request, true)
            .await
            .with_context(|| format!("deleting call {call_id}"))
    }

    async fn delete_channel(&self, call_id: &str) -> anyhow::Result<()> {
        let request = self.chat(Method::DELETE, &format!("/channels/{CHANNEL_TYPE}/{call_id}"));

        self.send(request, true)
            .await
            .with_context(|| format!("deleting channel {call_id}"))
    }
}

#[async_trait]
impl ChatDirectory for StreamClient {
    async fn upsert_user(&self, user: &ChatUser) -> anyhow::Result<()> {
        let users = HashMap::from([(user.id.as_str(), user)]);
        let request = self.chat(Method::POST, "/users").json(&json!({ "users": users }));

        self.send(request, false)
            .await
            .with_context(|| format!("upserting chat user {}", user.id))
    }

    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()> {
        let request = self.chat(Method::DELETE, &format!("/users/{user_id}"));

        self.send(request, true)
            .await
            .with_context(|| format!("deleting chat user {user_id}"))
    }

    fn user_token(&self, user_id: &str) -> anyhow::Result<String> {
        self.signer.user_token(user_id)
    }
}
