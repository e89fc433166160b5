use std::{fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct IdpConfig {
    pub firebase_api_key: String,
    pub public_url: String,
    pub client_url: String,
    pub google: Option<OAuthClientConfig>,
    pub github: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub api_key: String,
    pub api_secret: String,
    pub video_url: String,
    pub chat_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub cookie_secure: bool,
    pub adapter_timeout: Duration,
    pub stream: StreamConfig,
    pub idp: IdpConfig,
    pub piston_url: String,
    pub webhook_secret: String,
    pub reconcile_interval: Duration,
    pub reconcile_grace: Duration,
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("PORT", "8080")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "16")?,
            cookie_secure: try_load("COOKIE_SECURE", "false")?,
            adapter_timeout: Duration::from_secs(try_load("ADAPTER_TIMEOUT_SECS", "12")?),
            stream: StreamConfig {
                api_key: required("STREAM_API_KEY")?,
                api_secret: required("STREAM_API_SECRET")?,
                video_url: try_load("STREAM_VIDEO_URL", "https://video.stream-io-api.com")?,
                chat_url: try_load("STREAM_CHAT_URL", "https://chat.stream-io-api.com")?,
            },
            idp: IdpConfig {
                firebase_api_key: required("FIREBASE_API_KEY")?,
                public_url: try_load("PUBLIC_URL", "http://localhost:8080")?,
                client_url: try_load("CLIENT_URL", "http://localhost:5173")?,
                google: oauth_client("GOOGLE")?,
                github: oauth_client("GITHUB")?,
            },
            piston_url: try_load("PISTON_URL", "https://emkc.org/api/v2/piston")?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            reconcile_interval: Duration::from_secs(try_load("RECONCILE_INTERVAL_SECS", "300")?),
            reconcile_grace: Duration::from_secs(try_load("RECONCILE_GRACE_SECS", "60")?),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    dotenv::var(key).with_context(|| format!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = dotenv::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse()
        .map_err(|e| anyhow!("invalid {key} value {raw:?}: {e}"))
}

// Both halves or neither.
fn oauth_client(prefix: &str) -> anyhow::Result<Option<OAuthClientConfig>> {
    let id = dotenv::var(format!("{prefix}_CLIENT_ID")).ok();
    let secret = dotenv::var(format!("{prefix}_CLIENT_SECRET")).ok();

    match (id, secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuthClientConfig {
            client_id,
            client_secret,
        })),
        (None, None) => Ok(None),
        _ => Err(anyhow!(
            "{prefix}_CLIENT_ID and {prefix}_CLIENT_SECRET must be set together"
        )),
    }
}
