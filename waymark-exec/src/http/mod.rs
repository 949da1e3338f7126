//! HTTP boundary for the engine.
//!
//! Everything above this module speaks [`HttpRequestParts`] and
//! [`HttpResponseParts`]; only [`ReqwestHttpClient`] knows about reqwest.
//! Status codes are never errors here; classification happens in
//! [`crate::retry`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HttpRequestParts {
    pub method: String,
    pub url: url::Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub validate_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct HttpResponseParts {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("timeout")]
    Timeout,
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("http error: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        req: HttpRequestParts,
        timeout: Duration,
    ) -> Result<HttpResponseParts, HttpError>;
}

pub struct ReqwestHttpClient {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        // Two pools so `validate_ssl: false` on one step never weakens the
        // verification applied to everything else.
        let client = build_client(true);
        let insecure_client = build_client(false);
        Self {
            client,
            insecure_client,
        }
    }
}

fn build_client(validate_ssl: bool) -> reqwest::Client {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("waymark/", env!("CARGO_PKG_VERSION")));
    if !validate_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    // Builder failure means the TLS backend itself is broken; no request
    // could succeed afterwards, so surface it immediately.
    builder.build().unwrap_or_else(|e| {
        panic!("failed to create reqwest HTTP client: {e}. This is a bug - please report it.");
    })
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        req: HttpRequestParts,
        timeout: Duration,
    ) -> Result<HttpResponseParts, HttpError> {
        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|e: <reqwest::Method as std::str::FromStr>::Err| {
                HttpError::Other(e.to_string())
            })?;
        let pool = if req.validate_ssl {
            &self.client
        } else {
            &self.insecure_client
        };
        let mut rb = pool.request(method, req.url).timeout(timeout);

        for (k, v) in req.headers {
            rb = rb.header(k, v);
        }
        if let Some(body) = req.body {
            rb = rb.body(body);
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();

        let mut headers = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(s) = v.to_str() {
                headers.insert(k.to_string(), s.to_string());
            }
        }

        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(HttpResponseParts {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        return HttpError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return HttpError::Network(e.to_string());
    }
    HttpError::Other(e.to_string())
}
