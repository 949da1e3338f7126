//! Turns a step's request spec into concrete wire parts, with every
//! templated field rendered against the current scope.

use std::collections::BTreeMap;

use url::Url;

use waymark_core::{parse_template, render_json, RenderError, Scope, StepSpec};

use crate::engine::StepError;
use crate::session::Session;

/// A fully rendered request, minus auth headers (those are applied fresh on
/// every attempt so cached tokens can rotate mid-retry).
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub method: String,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

pub(crate) fn build_request(
    spec: &StepSpec,
    session: &Session,
    scope: &Scope<'_>,
) -> Result<PreparedRequest, StepError> {
    let endpoint = render_str(&spec.request.endpoint, scope)?;
    let joined = join_url(session.base_url(), &endpoint);
    let mut url = Url::parse(&joined).map_err(|source| StepError::Url {
        url: joined.clone(),
        source,
    })?;

    if !spec.request.params.is_empty() {
        let mut rendered = Vec::with_capacity(spec.request.params.len());
        for (key, value) in &spec.request.params {
            rendered.push((key.as_str(), render_str(value, scope)?));
        }
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &rendered {
            pairs.append_pair(key, value);
        }
    }

    let mut headers = BTreeMap::new();
    for (key, value) in &spec.request.headers {
        headers.insert(key.clone(), render_str(value, scope)?);
    }

    let body = match &spec.request.body {
        Some(template) => {
            let value = render_json(template, scope)?;
            let bytes =
                serde_json::to_vec(&value).map_err(|e| StepError::BodyEncode(e.to_string()))?;
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
            }
            Some(bytes)
        }
        None => None,
    };

    Ok(PreparedRequest {
        method: spec.request.method.as_str().to_string(),
        url,
        headers,
        body,
    })
}

/// Single-slash join of base URL and endpoint, whatever slashes each side
/// carries. `https://x/v1/` + `/users` and `https://x/v1` + `users` both
/// yield `https://x/v1/users`.
fn join_url(base: &Url, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn render_str(input: &str, scope: &Scope<'_>) -> Result<String, StepError> {
    let rendered = parse_template(input)
        .map_err(RenderError::from)?
        .render(scope)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(join_url(&base, "/users"), "https://api.example.com/v1/users");
        assert_eq!(join_url(&base, "users"), "https://api.example.com/v1/users");

        let bare = Url::parse("https://api.example.com").unwrap();
        assert_eq!(join_url(&bare, "/users"), "https://api.example.com/users");
    }
}
