//! `store:` extraction paths. A path picks one piece of a step response:
//! `status`, `headers.<name>`, `body`, or `body.<jsonpath suffix>`.

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json_path::JsonPath;

#[derive(Debug, Clone)]
pub enum ExtractPath {
    /// Response status code, as a JSON number.
    Status,
    /// A response header, looked up case-insensitively.
    Header(String),
    /// The parsed JSON body as a whole.
    WholeBody,
    /// A JSONPath query into the body. `body.profile.name` compiles to
    /// `$.profile.name`; `body[0].id` compiles to `$[0].id`.
    BodyPath { raw: String, query: JsonPath },
}

impl ExtractPath {
    pub fn parse(input: &str) -> Result<ExtractPath, ExtractParseError> {
        let trimmed = input.trim();
        if trimmed == "status" {
            return Ok(ExtractPath::Status);
        }
        if let Some(name) = trimmed.strip_prefix("headers.") {
            if name.is_empty() {
                return Err(ExtractParseError::EmptyHeaderName);
            }
            return Ok(ExtractPath::Header(name.to_string()));
        }
        if trimmed == "body" {
            return Ok(ExtractPath::WholeBody);
        }
        if let Some(suffix) = trimmed.strip_prefix("body") {
            let jsonpath = if let Some(dotted) = suffix.strip_prefix('.') {
                format!("$.{dotted}")
            } else if suffix.starts_with('[') {
                format!("${suffix}")
            } else {
                return Err(ExtractParseError::UnknownRoot(trimmed.to_string()));
            };
            let query =
                JsonPath::parse(&jsonpath).map_err(|e| ExtractParseError::BadJsonPath {
                    path: trimmed.to_string(),
                    message: e.to_string(),
                })?;
            return Ok(ExtractPath::BodyPath {
                raw: trimmed.to_string(),
                query,
            });
        }
        Err(ExtractParseError::UnknownRoot(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExtractPath::Status => "status",
            ExtractPath::Header(_) => "headers.*",
            ExtractPath::WholeBody => "body",
            ExtractPath::BodyPath { raw, .. } => raw,
        }
    }

    /// Run the extraction against a response. A body query with one match
    /// yields that value; multiple matches yield the list of them; zero is an
    /// error rather than a silent null.
    pub fn extract(
        &self,
        status: u16,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, ExtractionError> {
        match self {
            ExtractPath::Status => Ok(Value::from(status)),
            ExtractPath::Header(name) => headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| Value::String(v.clone()))
                .ok_or_else(|| ExtractionError::MissingHeader { name: name.clone() }),
            ExtractPath::WholeBody => Ok(body.clone()),
            ExtractPath::BodyPath { raw, query } => {
                let matches = query.query(body).all();
                match matches.as_slice() {
                    [] => Err(ExtractionError::NoMatch { path: raw.clone() }),
                    [single] => Ok((*single).clone()),
                    many => Ok(Value::Array(many.iter().map(|v| (*v).clone()).collect())),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractParseError {
    #[error("extraction path must start with 'status', 'headers.', or 'body': {0}")]
    UnknownRoot(String),
    #[error("extraction path 'headers.' is missing a header name")]
    EmptyHeaderName,
    #[error("invalid body query {path}: {message}")]
    BadJsonPath { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction path {path} matched nothing")]
    NoMatch { path: String },
    #[error("response has no {name} header")]
    MissingHeader { name: String },
}
