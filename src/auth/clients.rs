use std::fmt;

use anyhow::Context;
use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
use serde::{Deserialize, Serialize};

use crate::{
    config::{IdpConfig, OAuthClientConfig},
    AppError, AppResult, GetField,
};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id as the identity provider knows it.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    /// Enough for the identity provider to read a name, an email and an avatar.
    pub fn scopes(&self) -> Vec<Scope> {
        use ClientProvider::*;
        let scopes: &[&str] = match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        };
        scopes.iter().map(|scope| Scope::new((*scope).to_owned())).collect()
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdp {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// OAuth clients for the upstream providers plus the identity provider
/// endpoint that turns their access tokens into stable account ids.
#[derive(Clone)]
pub struct Clients {
    idp_url: String,
    client_url: String,
    pub(crate) http_client: reqwest::Client,
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    pub fn from_config(config: &IdpConfig) -> anyhow::Result<Clients> {
        let idp_url = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
            config.firebase_api_key
        );
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let google_client = config
            .google
            .as_ref()
            .map(|keys| {
                build_client(
                    keys,
                    "https://accounts.google.com/o/oauth2/auth",
                    "https://oauth2.googleapis.com/token",
                    &config.public_url,
                    ClientProvider::Google,
                )
            })
            .transpose()?;
        let github_client = config
            .github
            .as_ref()
            .map(|keys| {
                build_client(
                    keys,
                    "https://github.com/login/oauth/authorize",
                    "https://github.com/login/oauth/access_token",
                    &config.public_url,
                    ClientProvider::Github,
                )
            })
            .transpose()?;

        Ok(Clients {
            idp_url,
            client_url: config.client_url.trim_end_matches('/').to_owned(),
            http_client,
            google_client,
            github_client,
        })
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }
        .ok_or_else(|| AppError::NotFound(format!("OAuth provider {provider} is not configured")))
    }

    /// Asks the identity provider which account a provider access token
    /// belongs to. The returned id is what the user directory is keyed by.
    pub(crate) async fn resolve_account(&self, provider: ClientProvider, access_token: &str) -> AppResult<String> {
        let body: serde_json::Value = self
            .http_client
            .post(&self.idp_url)
            .json(&SignInWithIdp {
                post_body: format!("access_token={access_token}&providerId={}", provider.id()),
                request_uri: self.client_url.clone(),
                return_idp_credential: true,
                return_secure_token: true,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.get_str_field("localId")
    }

    /// Where to send the browser after signing in or out. Only paths on the
    /// client are honoured; anything else lands on the client's root.
    pub fn return_target(&self, requested: Option<&str>) -> String {
        match requested {
            Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
                format!("{}{path}", self.client_url)
            }
            _ => format!("{}/", self.client_url),
        }
    }
}

fn build_client(
    keys: &OAuthClientConfig,
    auth_url: &str,
    token_url: &str,
    public_url: &str,
    provider: ClientProvider,
) -> anyhow::Result<HappyClient> {
    let redirect_url = format!("{}/lockin/{}", public_url.trim_end_matches('/'), provider.slug());

    Ok(BasicClient::new(ClientId::new(keys.client_id.clone()))
        .set_client_secret(ClientSecret::new(keys.client_secret.clone()))
        .set_auth_uri(AuthUrl::new(auth_url.to_owned()).context("auth url")?)
        .set_token_uri(TokenUrl::new(token_url.to_owned()).context("token url")?)
        .set_redirect_uri(RedirectUrl::new(redirect_url).context("redirect url")?))
}
