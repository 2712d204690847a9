//! Shared validation helpers enforced at store boundaries.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{1,200}$").unwrap_or_else(|_| unreachable!()))
}

fn project_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,150}$").unwrap_or_else(|_| unreachable!()))
}

/// Validate a symbolic fact key: `^[A-Za-z0-9_.-]{1,200}$`.
pub fn validate_fact_key(key: &str) -> Result<()> {
    if key_regex().is_match(key) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("Malformed fact key: {key:?}")))
    }
}

/// Validate a free-form project id: `^[A-Za-z0-9_-]{1,150}$`.
///
/// Registry-known ids are validated by the `ProjectManager`; this covers ids
/// accepted without a registry row.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id_regex().is_match(project_id) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "Malformed project id: {project_id:?}"
        )))
    }
}

/// Validate a confidence value: must lie in [0.0, 1.0].
pub fn validate_confidence(confidence: f64) -> Result<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "Confidence out of range [0.0, 1.0]: {confidence}"
        )))
    }
}

/// Validate a project name: 1-100 chars, trimmed, no `/\:*?"<>|`.
pub fn validate_project_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 100 {
        return Err(Error::InvalidArgument(
            "Project name must be 1-100 characters".to_string(),
        ));
    }
    if name != name.trim() {
        return Err(Error::InvalidArgument(
            "Project name cannot start or end with spaces".to_string(),
        ));
    }
    for ch in ['/', '\\', ':', '*', '?', '"', '<', '>', '|'] {
        if name.contains(ch) {
            return Err(Error::InvalidArgument(format!(
                "Project name cannot contain {ch:?}"
            )));
        }
    }
    Ok(())
}
