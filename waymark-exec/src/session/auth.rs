//! Authorization schemes.
//!
//! An [`Authorizer`] mutates the outgoing header map; credentials live in
//! [`SecretString`] so they never show up in `Debug` output or events. Token
//! traffic for OAuth2 goes through the engine's own [`HttpClient`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;
use zeroize::Zeroize;

use crate::http::{HttpClient, HttpError, HttpRequestParts};

/// How long before expiry a cached OAuth2 token is refreshed.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Fallback token lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token URL '{url}': {source}")]
    BadTokenUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("token request to '{url}' failed: {source}")]
    TokenRequest {
        url: String,
        #[source]
        source: HttpError,
    },
    #[error("token endpoint '{url}' returned HTTP {status}")]
    TokenStatus { url: String, status: u16 },
    #[error("token endpoint '{url}' returned an unusable body: {message}")]
    TokenBody { url: String, message: String },
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn apply(&self, headers: &mut BTreeMap<String, String>) -> Result<(), AuthError>;
}

pub struct BearerAuth {
    token: SecretString,
}

impl BearerAuth {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Authorizer for BearerAuth {
    async fn apply(&self, headers: &mut BTreeMap<String, String>) -> Result<(), AuthError> {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.token.expose_secret()),
        );
        Ok(())
    }
}

pub struct BasicAuth {
    username: SecretString,
    password: SecretString,
}

impl BasicAuth {
    pub fn new(username: SecretString, password: SecretString) -> Self {
        Self { username, password }
    }
}

#[async_trait]
impl Authorizer for BasicAuth {
    async fn apply(&self, headers: &mut BTreeMap<String, String>) -> Result<(), AuthError> {
        let mut raw = format!(
            "{}:{}",
            self.username.expose_secret(),
            self.password.expose_secret()
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
        raw.zeroize();
        headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        Ok(())
    }
}

pub struct ApiKeyAuth {
    header: String,
    value: SecretString,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, value: SecretString) -> Self {
        Self {
            header: header.into(),
            value,
        }
    }
}

#[async_trait]
impl Authorizer for ApiKeyAuth {
    async fn apply(&self, headers: &mut BTreeMap<String, String>) -> Result<(), AuthError> {
        headers.insert(
            self.header.clone(),
            self.value.expose_secret().to_string(),
        );
        Ok(())
    }
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// `client_credentials` grant against `token_url`, with the access token
/// cached until shortly before its reported expiry.
pub struct OAuth2ClientCredentials {
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    scope: Option<String>,
    http: Arc<dyn HttpClient>,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

impl OAuth2ClientCredentials {
    pub fn new(
        token_url: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        scope: Option<String>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, AuthError> {
        let parsed = Url::parse(token_url).map_err(|source| AuthError::BadTokenUrl {
            url: token_url.to_string(),
            source,
        })?;
        Ok(Self {
            token_url: parsed,
            client_id: client_id.into(),
            client_secret,
            scope,
            http,
            cached: Mutex::new(None),
        })
    }

    async fn bearer_header(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < entry.expires_at {
                return Ok(format!("Bearer {}", entry.token.expose_secret()));
            }
        }

        let fetched = self.fetch_token().await?;
        let header = format!("Bearer {}", fetched.token.expose_secret());
        *cached = Some(fetched);
        Ok(header)
    }

    async fn fetch_token(&self) -> Result<CachedToken, AuthError> {
        let mut form = format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.client_secret.expose_secret()),
        );
        if let Some(scope) = &self.scope {
            form.push_str("&scope=");
            form.push_str(&urlencoding::encode(scope));
        }

        let req = HttpRequestParts {
            method: "POST".to_string(),
            url: self.token_url.clone(),
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )]),
            body: Some(form.clone().into_bytes()),
            validate_ssl: true,
        };
        form.zeroize();

        let url = self.token_url.to_string();
        let resp = self
            .http
            .send(req, Duration::from_secs(30))
            .await
            .map_err(|source| AuthError::TokenRequest {
                url: url.clone(),
                source,
            })?;

        if !(200..300).contains(&resp.status) {
            return Err(AuthError::TokenStatus {
                url,
                status: resp.status,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&resp.body).map_err(|e| AuthError::TokenBody {
                url,
                message: e.to_string(),
            })?;
        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl Authorizer for OAuth2ClientCredentials {
    async fn apply(&self, headers: &mut BTreeMap<String, String>) -> Result<(), AuthError> {
        let header = self.bearer_header().await?;
        headers.insert("Authorization".to_string(), header);
        Ok(())
    }
}
