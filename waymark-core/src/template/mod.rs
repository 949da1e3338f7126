//! `{{ path }}` templates used by endpoints, headers, params, bodies, and
//! store targets. Rendering never substitutes a default: an unresolved
//! reference is an error, so typos fail the step instead of producing a
//! silently wrong request.

mod iterate;
mod path;

use serde_json::Value;

use crate::vars::Scope;

pub use iterate::{parse_iterate, Collection, IterateClause, IterateError};
pub use path::{PathError, PathExpr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Expr(PathExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

pub fn parse_template(input: &str) -> Result<Template, TemplateError> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut rest = input;
    let mut offset = 0usize;

    while let Some(open) = rest.find("{{") {
        buf.push_str(&rest[..open]);
        let expr_offset = offset + open;
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or(TemplateError::UnclosedExpression { offset: expr_offset })?;

        let inner = after[..close].trim();
        if inner.is_empty() {
            return Err(TemplateError::EmptyExpression { offset: expr_offset });
        }
        let path = PathExpr::parse(inner).map_err(|source| TemplateError::InvalidPath {
            offset: expr_offset,
            source,
        })?;

        if !buf.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut buf)));
        }
        segments.push(Segment::Expr(path));

        rest = &after[close + 2..];
        offset = expr_offset + 2 + close + 2;
    }

    buf.push_str(rest);
    if !buf.is_empty() {
        segments.push(Segment::Literal(buf));
    }

    Ok(Template { segments })
}

impl Template {
    /// True when the whole template is a single `{{ expr }}` with no
    /// surrounding literal text.
    pub fn is_whole_expr(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::Expr(_)])
    }

    /// Render to a string. Non-string values stringify as compact JSON.
    pub fn render(&self, scope: &Scope<'_>) -> Result<String, RenderError> {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(path) => match resolve(path, scope)? {
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(out)
    }

    /// Render preserving structure: a whole-expression template yields the
    /// referenced value untouched, so lists and objects survive into bodies
    /// and iterate collections.
    pub fn render_value(&self, scope: &Scope<'_>) -> Result<Value, RenderError> {
        if let [Segment::Expr(path)] = self.segments.as_slice() {
            return resolve(path, scope);
        }
        Ok(Value::String(self.render(scope)?))
    }
}

fn resolve(path: &PathExpr, scope: &Scope<'_>) -> Result<Value, RenderError> {
    scope.lookup_path(path).ok_or_else(|| RenderError::Unresolved {
        expr: path.as_str().to_string(),
    })
}

/// Render every string leaf of a JSON value. Whole-expression leaves are
/// replaced by the referenced value; object keys are left alone.
pub fn render_json(value: &Value, scope: &Scope<'_>) -> Result<Value, RenderError> {
    match value {
        Value::String(s) => parse_template(s)?.render_value(scope),
        Value::Array(items) => items
            .iter()
            .map(|v| render_json(v, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_json(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Parse-check every string leaf of a JSON value without rendering.
pub fn validate_json_templates(value: &Value) -> Result<(), TemplateError> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        Value::String(s) => parse_template(s).map(|_| ()),
        Value::Array(items) => {
            for v in items {
                validate_json_templates(v)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for v in map.values() {
                validate_json_templates(v)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed '{{{{' at byte {offset}")]
    UnclosedExpression { offset: usize },
    #[error("empty expression at byte {offset}")]
    EmptyExpression { offset: usize },
    #[error("invalid path expression at byte {offset}: {source}")]
    InvalidPath { offset: usize, source: PathError },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unresolved reference {{{{ {expr} }}}}")]
    Unresolved { expr: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
}
