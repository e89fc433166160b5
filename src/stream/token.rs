use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

#[derive(Serialize)]
struct ServerClaims {
    server: bool,
}

#[derive(Serialize)]
struct UserClaims<'a> {
    user_id: &'a str,
}

/// HS256 tokens signed with the platform API secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: EncodingKey,
}

impl TokenSigner {
    pub fn new(api_secret: &str) -> Self {
        TokenSigner {
            key: EncodingKey::from_secret(api_secret.as_bytes()),
        }
    }

    /// Authenticates server-side API calls.
    pub fn server_token(&self) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), &ServerClaims { server: true }, &self.key)?)
    }

    pub fn user_token(&self, user_id: &str) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), &UserClaims { user_id }, &self.key)?)
    }
}
