#![forbid(unsafe_code)]

pub mod error;
pub mod extract;
pub mod parser;
pub mod template;
pub mod types;
pub mod validate;
pub mod vars;

pub use crate::error::{ParseError, ValidationError, Violation, WaymarkError};
pub use crate::extract::{ExtractParseError, ExtractPath, ExtractionError};
pub use crate::parser::{detect_format, parse_playbook_str, DocumentFormat};
pub use crate::template::{
    parse_iterate, parse_template, render_json, Collection, IterateClause, IterateError, PathError,
    PathExpr, RenderError, Segment, Template, TemplateError,
};
pub use crate::types::{
    AuthSpec, BreakerSpec, HttpMethod, OnError, PhaseSpec, Playbook, RateLimitSpec, RequestSpec,
    RetrySpec, SessionSpec, StepSpec,
};
pub use crate::validate::{validate_playbook, Validate};
pub use crate::vars::{Scope, VariableStore};
