//! Runtime sessions.
//!
//! A [`Session`] is the executable form of a `SessionSpec`: base URL and
//! auth credential templates rendered (with `env.*` available), policies
//! held for per-step merging. Built once per run, before the first phase.

mod auth;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use waymark_core::{
    parse_template, AuthSpec, BreakerSpec, Playbook, RateLimitSpec, RenderError, RetrySpec, Scope,
    SessionSpec, StepSpec,
};

use crate::http::HttpClient;

pub use auth::{
    ApiKeyAuth, AuthError, Authorizer, BasicAuth, BearerAuth, OAuth2ClientCredentials,
};

/// Applied when neither the step nor the session sets a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("step references unknown session '{0}'")]
    Unknown(String),
    #[error("session '{session}': base URL '{url}' does not parse: {source}")]
    BadBaseUrl {
        session: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("session '{session}': {field}: {source}")]
    Render {
        session: String,
        field: &'static str,
        #[source]
        source: RenderError,
    },
    #[error("session '{session}': {source}")]
    Auth {
        session: String,
        #[source]
        source: AuthError,
    },
}

/// Policies a single step execution runs under, after merging step-level
/// overrides onto the session and built-in defaults. A whole spec block at
/// step level replaces the session's block, matching how the documents are
/// written (partial blocks are filled from field defaults, not the session).
#[derive(Debug, Clone)]
pub struct EffectivePolicy {
    pub retry: RetrySpec,
    pub breaker: Option<BreakerSpec>,
    /// Registry key: the session name, or `session/step` when the step
    /// brings its own breaker spec.
    pub breaker_key: String,
    pub rate_limit: RateLimitSpec,
    pub timeout: Duration,
    pub validate_ssl: bool,
}

pub struct Session {
    name: String,
    base_url: Url,
    timeout_seconds: Option<f64>,
    validate_ssl: bool,
    retry: Option<RetrySpec>,
    breaker: Option<BreakerSpec>,
    rate_limit: Option<RateLimitSpec>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl Session {
    pub fn from_spec(
        name: &str,
        spec: &SessionSpec,
        scope: &Scope<'_>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, SessionError> {
        let rendered = render_field(name, "base_url", &spec.base_url, scope)?;
        let base_url = Url::parse(&rendered).map_err(|source| SessionError::BadBaseUrl {
            session: name.to_string(),
            url: rendered.clone(),
            source,
        })?;

        let authorizer = match &spec.auth {
            Some(auth) => Some(build_authorizer(name, auth, scope, http)?),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            base_url,
            timeout_seconds: spec.timeout_seconds,
            validate_ssl: spec.validate_ssl,
            retry: spec.retry.clone(),
            breaker: spec.circuit_breaker.clone(),
            rate_limit: spec.rate_limit.clone(),
            authorizer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attach auth headers. Step-rendered headers are merged in afterwards,
    /// so an explicit step header wins over the session's auth.
    pub async fn authorize(
        &self,
        headers: &mut BTreeMap<String, String>,
    ) -> Result<(), AuthError> {
        match &self.authorizer {
            Some(authorizer) => authorizer.apply(headers).await,
            None => Ok(()),
        }
    }

    pub fn effective_for(&self, step: &StepSpec) -> EffectivePolicy {
        let retry = step
            .retry
            .clone()
            .or_else(|| self.retry.clone())
            .unwrap_or_default();
        let (breaker, breaker_key) = match (&step.circuit_breaker, &self.breaker) {
            (Some(b), _) => (Some(b.clone()), format!("{}/{}", self.name, step.name)),
            (None, Some(b)) => (Some(b.clone()), self.name.clone()),
            (None, None) => (None, self.name.clone()),
        };
        let rate_limit = step
            .rate_limit
            .clone()
            .or_else(|| self.rate_limit.clone())
            .unwrap_or_default();
        let timeout = step
            .timeout_seconds
            .or(self.timeout_seconds)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_TIMEOUT);
        let validate_ssl = step.validate_ssl.unwrap_or(self.validate_ssl);

        EffectivePolicy {
            retry,
            breaker,
            breaker_key,
            rate_limit,
            timeout,
            validate_ssl,
        }
    }
}

/// All sessions of a run, built up front so configuration errors surface
/// before any request is dispatched.
pub struct SessionSet {
    sessions: BTreeMap<String, Arc<Session>>,
}

impl SessionSet {
    pub fn build(
        playbook: &Playbook,
        scope: &Scope<'_>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, SessionError> {
        let mut sessions = BTreeMap::new();
        for (name, spec) in &playbook.sessions {
            let session = Session::from_spec(name, spec, scope, http.clone())?;
            sessions.insert(name.clone(), Arc::new(session));
        }
        Ok(Self { sessions })
    }

    pub fn get(&self, name: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::Unknown(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn render_field(
    session: &str,
    field: &'static str,
    input: &str,
    scope: &Scope<'_>,
) -> Result<String, SessionError> {
    let render = |input: &str| -> Result<String, RenderError> {
        Ok(parse_template(input)?.render(scope)?)
    };
    render(input).map_err(|source| SessionError::Render {
        session: session.to_string(),
        field,
        source,
    })
}

fn build_authorizer(
    session: &str,
    auth: &AuthSpec,
    scope: &Scope<'_>,
    http: Arc<dyn HttpClient>,
) -> Result<Arc<dyn Authorizer>, SessionError> {
    let authorizer: Arc<dyn Authorizer> = match auth {
        AuthSpec::Bearer { token } => {
            let token = render_field(session, "auth.token", token, scope)?;
            Arc::new(BearerAuth::new(SecretString::from(token)))
        }
        AuthSpec::Basic { username, password } => {
            let username = render_field(session, "auth.username", username, scope)?;
            let password = render_field(session, "auth.password", password, scope)?;
            Arc::new(BasicAuth::new(
                SecretString::from(username),
                SecretString::from(password),
            ))
        }
        AuthSpec::ApiKey { header, value } => {
            let value = render_field(session, "auth.value", value, scope)?;
            Arc::new(ApiKeyAuth::new(header.clone(), SecretString::from(value)))
        }
        AuthSpec::Oauth2 {
            token_url,
            client_id,
            client_secret,
            scope: oauth_scope,
        } => {
            let token_url = render_field(session, "auth.token_url", token_url, scope)?;
            let client_id = render_field(session, "auth.client_id", client_id, scope)?;
            let client_secret = render_field(session, "auth.client_secret", client_secret, scope)?;
            let authorizer = OAuth2ClientCredentials::new(
                &token_url,
                client_id,
                SecretString::from(client_secret),
                oauth_scope.clone(),
                http,
            )
            .map_err(|source| SessionError::Auth {
                session: session.to_string(),
                source,
            })?;
            Arc::new(authorizer)
        }
    };
    Ok(authorizer)
}
