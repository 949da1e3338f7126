use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*|\[[0-9]+\])*$")
        .expect("valid regex")
});

/// A dotted/indexed variable reference: `user.profile.name`, `items[2].id`.
///
/// The first segment names a stored variable; the rest walk into its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Field(String),
    Index(usize),
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<PathExpr, PathError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if !PATH_RE.is_match(trimmed) {
            return Err(PathError::InvalidSyntax(trimmed.to_string()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            segments.push(PathSegment::Field(name.to_string()));
            while let Some(stripped) = rest.strip_prefix('[') {
                // The regex guarantees a closing bracket; the parse can still
                // overflow usize on absurd indices.
                let end = stripped.find(']').ok_or_else(|| invalid(trimmed))?;
                let idx: usize = stripped[..end].parse().map_err(|_| invalid(trimmed))?;
                segments.push(PathSegment::Index(idx));
                rest = &stripped[end + 1..];
            }
        }

        Ok(PathExpr {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Name of the stored variable this path starts from.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Field(name)) => name,
            _ => "",
        }
    }

    /// For a reserved `env.NAME` reference, the environment variable name.
    pub(crate) fn env_var_name(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [PathSegment::Field(root), PathSegment::Field(name)] if root == "env" => Some(name),
            _ => None,
        }
    }

    /// Walk every segment after the root through `root_value`.
    pub fn resolve_in(&self, root_value: &Value) -> Option<Value> {
        let mut current = root_value;
        for seg in self.segments.iter().skip(1) {
            current = match seg {
                PathSegment::Field(name) => current.get(name.as_str())?,
                PathSegment::Index(i) => current.get(*i)?,
            };
        }
        Some(current.clone())
    }
}

fn invalid(expr: &str) -> PathError {
    PathError::InvalidSyntax(expr.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path expression")]
    Empty,
    #[error("invalid path expression: {0}")]
    InvalidSyntax(String),
}
