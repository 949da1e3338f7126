use serde_json::Value;

use super::json_kind;
use super::path::{PathError, PathExpr};
use crate::vars::Scope;

/// Parsed `<var> in <collection>` clause from a step's `iterate` field.
#[derive(Debug, Clone, PartialEq)]
pub struct IterateClause {
    pub var: String,
    pub collection: Collection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    /// Inline JSON array literal, e.g. `[1, 2, 3]`.
    Inline(Vec<Value>),
    /// Reference to a stored list, e.g. `user_ids` or `{{ user_ids }}`.
    Expr(PathExpr),
}

pub fn parse_iterate(input: &str) -> Result<IterateClause, IterateError> {
    let (var, collection) = input
        .split_once(" in ")
        .ok_or(IterateError::MissingIn)?;

    let var = var.trim();
    if var.is_empty() || !var.chars().enumerate().all(is_ident_char) {
        return Err(IterateError::InvalidVar(var.to_string()));
    }

    let collection = collection.trim();
    if collection.starts_with('[') {
        let items: Vec<Value> = serde_json::from_str(collection)
            .map_err(|e| IterateError::BadLiteral(e.to_string()))?;
        return Ok(IterateClause {
            var: var.to_string(),
            collection: Collection::Inline(items),
        });
    }

    // Accept both `{{ ids }}` and the bare `ids` form.
    let expr_text = collection
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(collection);
    let path = PathExpr::parse(expr_text)?;

    Ok(IterateClause {
        var: var.to_string(),
        collection: Collection::Expr(path),
    })
}

fn is_ident_char((i, c): (usize, char)) -> bool {
    if i == 0 {
        c.is_ascii_alphabetic() || c == '_'
    } else {
        c.is_ascii_alphanumeric() || c == '_'
    }
}

impl IterateClause {
    /// Materialize the collection. Inline literals are taken as-is; expression
    /// collections must resolve to a list.
    pub fn resolve(&self, scope: &Scope<'_>) -> Result<Vec<Value>, IterateError> {
        match &self.collection {
            Collection::Inline(items) => Ok(items.clone()),
            Collection::Expr(path) => {
                let value = scope
                    .lookup_path(path)
                    .ok_or_else(|| IterateError::Unresolved(path.as_str().to_string()))?;
                match value {
                    Value::Array(items) => Ok(items),
                    other => Err(IterateError::NotAList {
                        expr: path.as_str().to_string(),
                        found: json_kind(&other),
                    }),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IterateError {
    #[error("iterate clause must look like '<var> in <collection>'")]
    MissingIn,
    #[error("invalid loop variable name: {0:?}")]
    InvalidVar(String),
    #[error("invalid inline list: {0}")]
    BadLiteral(String),
    #[error("invalid collection expression: {0}")]
    BadExpr(#[from] PathError),
    #[error("unresolved collection expression: {0}")]
    Unresolved(String),
    #[error("collection expression {expr} is not a list (found {found})")]
    NotAList { expr: String, found: &'static str },
}
