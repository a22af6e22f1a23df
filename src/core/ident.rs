//! Identifier validation for projects, stages and debaters.
//!
//! Project ids double as file names, and dependency lists are comma
//! separated on the command line, so all ids share one conservative shape.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Alphanumeric first character, then letters, digits, `.`, `_` or `-`.
static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("identifier pattern is valid")
});

/// Validate an identifier, naming its `kind` ("project", "stage", ...) in the error.
pub fn validate_id(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} id must not be empty", kind)));
    }
    if !ID_RE.is_match(value) {
        return Err(Error::Validation(format!(
            "invalid {} id '{}': use letters, digits, '.', '_' or '-' (max 128 chars)",
            kind, value
        )));
    }
    Ok(())
}

/// Split a comma separated id list, dropping blanks and duplicates while keeping order.
pub fn parse_id_list(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !ids.iter().any(|existing| existing == part) {
            ids.push(part.to_string());
        }
    }
    ids
}
