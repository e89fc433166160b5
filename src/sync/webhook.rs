use axum::{
    debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::debug;

use crate::{users::NewUser, AppError, AppJson, AppResult, AppState};

use super::{IdentityEvent, SyncQueue};

pub(crate) const SECRET_HEADER: &str = "x-webhook-secret";

/// Envelope of an identity provider webhook.
#[derive(Debug, Deserialize)]
pub struct IdentityWebhook {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct EmailAddress {
    email_address: String,
}

#[derive(Deserialize)]
struct CreatedUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct DeletedUser {
    id: String,
}

impl IdentityWebhook {
    /// `Ok(None)` for event types this service does not track.
    pub fn into_event(self) -> AppResult<Option<IdentityEvent>> {
        match self.kind.as_str() {
            "user.created" => {
                let data: CreatedUser = serde_json::from_value(self.data)
                    .map_err(|e| AppError::Validation(format!("malformed user.created payload: {e}")))?;

                let email = data
                    .email_addresses
                    .into_iter()
                    .next()
                    .map(|address| address.email_address)
                    .ok_or_else(|| AppError::Validation("user.created without an email address".to_owned()))?;
                let name = format!(
                    "{} {}",
                    data.first_name.unwrap_or_default(),
                    data.last_name.unwrap_or_default()
                )
                .trim()
                .to_owned();

                Ok(Some(IdentityEvent::UserCreated(NewUser {
                    external_id: data.id,
                    email,
                    name,
                    avatar: data.image_url,
                })))
            }
            "user.deleted" => {
                let data: DeletedUser = serde_json::from_value(self.data)
                    .map_err(|e| AppError::Validation(format!("malformed user.deleted payload: {e}")))?;

                Ok(Some(IdentityEvent::UserDeleted { external_id: data.id }))
            }
            _ => Ok(None),
        }
    }
}

/// Accepts an event for background processing.
#[debug_handler(state = AppState)]
pub(crate) async fn identity_webhook(
    State(queue): State<SyncQueue>,
    headers: HeaderMap,
    AppJson(payload): AppJson<IdentityWebhook>,
) -> AppResult<StatusCode> {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !queue.secret_matches(presented) {
        return Err(AppError::Unauthenticated("Unauthorized".to_owned()));
    }

    let kind = payload.kind.clone();
    match payload.into_event()? {
        Some(event) => queue.push(event).await?,
        None => debug!(%kind, "ignoring identity event"),
    }

    Ok(StatusCode::ACCEPTED)
}
