//! Scope string helpers
//!
//! Scopes are `:`-separated paths such as `datasources:uid:abc`. A trailing
//! `*` segment turns a grant into a namespace wildcard.

use std::collections::HashMap;

use crate::error::ResolutionError;

const SEPARATOR: char = ':';
const WILDCARD: char = '*';

/// Resolver prefixes never span more than two segments
const MAX_PREFIX_PARTS: usize = 2;

/// Join segments into a scope: `scope(&["users", "id", "7"]) == "users:id:7"`
pub fn scope(parts: &[&str]) -> String {
    parts.join(":")
}

/// Prefix a wildcard grant covers, or `None` for a concrete scope
///
/// `*` covers everything, `users:*` covers `users:`. A `*` anywhere other
/// than a whole trailing segment does not make a wildcard.
pub fn wildcard_prefix(scope: &str) -> Option<&str> {
    let prefix = scope.strip_suffix(WILDCARD)?;
    if prefix.contains(WILDCARD) {
        return None;
    }
    if prefix.is_empty() || prefix.ends_with(SEPARATOR) {
        Some(prefix)
    } else {
        None
    }
}

/// Whether a granted scope satisfies a required one
pub fn grant_matches(granted: &str, required: &str) -> bool {
    if let Some(prefix) = wildcard_prefix(granted) {
        if required.starts_with(prefix) {
            return true;
        }
    }
    granted == required
}

/// Resolver registration key for a scope
///
/// Keeps at most two segments: `datasources:name:prod` → `datasources:name:`,
/// `dashboards:abc` → `dashboards:`.
pub fn scope_prefix(scope: &str) -> String {
    let parts: Vec<&str> = scope.split(SEPARATOR).collect();
    let keep = (parts.len() - 1).min(MAX_PREFIX_PARTS);

    let mut prefix = parts[..keep].join(":");
    if keep > 0 {
        prefix.push(SEPARATOR);
    }
    prefix
}

/// Values substituted into parameterized scopes
///
/// `{org_id}` expands to `org_id`; any other `{name}` is looked up in
/// `url_params`.
#[derive(Debug, Clone, Default)]
pub struct ScopeParams {
    pub org_id: i64,
    pub url_params: HashMap<String, String>,
}

impl ScopeParams {
    pub fn new(org_id: i64) -> Self {
        Self {
            org_id,
            url_params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.url_params.insert(name.into(), value.into());
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if name == "org_id" {
            return Some(self.org_id.to_string());
        }
        self.url_params.get(name).cloned()
    }
}

/// Expand `{...}` placeholders in a scope template
pub fn inject_params(template: &str, params: &ScopeParams) -> Result<String, ResolutionError> {
    if !template.contains('{') {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| ResolutionError::MalformedTemplate(template.to_string()))?;

        let name = after[..close].trim();
        let value = params.lookup(name).ok_or_else(|| {
            ResolutionError::MissingParameter(template.to_string(), name.to_string())
        })?;
        out.push_str(&value);

        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
