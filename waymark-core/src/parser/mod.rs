use std::path::Path;

use crate::error::ParseError;
use crate::types::Playbook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
    Auto,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Yaml => "yaml",
            DocumentFormat::Auto => "auto",
        }
    }
}

/// Pick a format from the file extension, falling back to Auto.
pub fn detect_format(path: &Path) -> DocumentFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => DocumentFormat::Json,
        Some("yaml") | Some("yml") => DocumentFormat::Yaml,
        _ => DocumentFormat::Auto,
    }
}

pub fn parse_playbook_str(input: &str, format: DocumentFormat) -> Result<Playbook, ParseError> {
    match format {
        DocumentFormat::Json => Ok(serde_json::from_str::<Playbook>(input)?),
        DocumentFormat::Yaml => Ok(serde_yaml::from_str::<Playbook>(input)?),
        DocumentFormat::Auto => parse_playbook_auto(input),
    }
}

fn parse_playbook_auto(input: &str) -> Result<Playbook, ParseError> {
    // Heuristic: JSON always starts with `{` or `[` after trimming.
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Playbook>(input) {
            Ok(playbook) => return Ok(playbook),
            Err(e) => {
                // YAML is a superset of JSON in spirit but not in serde_yaml
                // practice; give it a chance before reporting the JSON error.
                if let Ok(playbook) = serde_yaml::from_str::<Playbook>(input) {
                    return Ok(playbook);
                }
                return Err(ParseError::Json(e));
            }
        }
    }

    match serde_yaml::from_str::<Playbook>(input) {
        Ok(playbook) => Ok(playbook),
        Err(e) => {
            if let Ok(playbook) = serde_json::from_str::<Playbook>(input) {
                return Ok(playbook);
            }
            Err(ParseError::Yaml(e))
        }
    }
}
