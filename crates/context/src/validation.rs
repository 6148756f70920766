//! Identifier and metadata rules applied when a context is built.

use serde_json::{Map, Value};

use rf_domain::error::ValidationError;

/// Deepest allowed chain of child contexts.
pub const MAX_OPERATION_DEPTH: u32 = 10;

/// Identifiers at least this long are treated as genuine even when they
/// start with a placeholder-like prefix.
pub const GENUINE_ID_MIN_LEN: usize = 20;

/// Values that are never accepted as identifiers (compared case-insensitively).
const FORBIDDEN_VALUES: &[&str] = &[
    "registry",
    "placeholder",
    "default",
    "temp",
    "none",
    "null",
    "undefined",
    "0",
    "1",
    "xxx",
    "yyy",
    "example",
    "test",
    "demo",
    "sample",
    "template",
    "mock",
    "fake",
    "dummy",
];

const PLACEHOLDER_PREFIXES: &[&str] = &[
    "placeholder_",
    "registry_",
    "default_",
    "temp_",
    "example_",
    "demo_",
    "sample_",
    "template_",
    "mock_",
    "fake_",
    "dummy_",
];

/// Metadata keys that would shadow context fields.
pub const RESERVED_KEYS: &[&str] = &[
    "user_id",
    "thread_id",
    "run_id",
    "request_id",
    "created_at",
    "operation_depth",
    "parent_request_id",
    "websocket_client_id",
    "storage_handle",
];

/// Check one required identifier and return its trimmed form.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }

    let lower = trimmed.to_ascii_lowercase();
    if FORBIDDEN_VALUES.contains(&lower.as_str()) {
        return Err(ValidationError::PlaceholderValue {
            field,
            value: trimmed.to_owned(),
        });
    }

    if trimmed.len() < GENUINE_ID_MIN_LEN
        && PLACEHOLDER_PREFIXES.iter().any(|p| lower.starts_with(p))
    {
        return Err(ValidationError::PlaceholderPattern {
            field,
            value: trimmed.to_owned(),
        });
    }

    Ok(trimmed.to_owned())
}

/// Reject metadata maps that use a reserved key.
pub fn validate_metadata_keys(
    map_name: &'static str,
    map: &Map<String, Value>,
) -> Result<(), ValidationError> {
    match map.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
        Some(key) => Err(ValidationError::ReservedKey {
            map: map_name,
            key: key.clone(),
        }),
        None => Ok(()),
    }
}
