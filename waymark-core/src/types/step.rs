use std::collections::BTreeMap;

use crate::types::{BreakerSpec, RateLimitSpec, RetrySpec};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,

    /// Session this step's request goes through.
    pub session: String,

    /// `<var> in <collection>` clause; one request per element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterate: Option<String>,

    /// Run iterations concurrently. Meaningless without `iterate`.
    #[serde(default)]
    pub parallel: bool,

    #[serde(default)]
    pub on_error: OnError,

    pub request: RequestSpec,

    /// Variable name (template, optional `+` append suffix) -> extraction path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub store: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate_ssl: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    pub method: HttpMethod,

    /// Path joined onto the session's base URL; templated.
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Query parameters; values are templated.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    /// JSON body; string leaves are templated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "POST")]
    Post,
    #[serde(alias = "PUT")]
    Put,
    #[serde(alias = "PATCH")]
    Patch,
    #[serde(alias = "DELETE")]
    Delete,
    #[serde(alias = "HEAD")]
    Head,
    #[serde(alias = "OPTIONS")]
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// What a step failure does to the run after retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Stop the run; outstanding sibling work is cancelled.
    #[default]
    Abort,
    /// Record the failure and keep going.
    Ignore,
}

impl OnError {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnError::Abort => "abort",
            OnError::Ignore => "ignore",
        }
    }
}
