//! # Request Field Sanitization
//!
//! Agent-proposed fields are untrusted. [`FieldSanitizer`] cleans them
//! before any rule sees them; malformed input is repaired, never raised.
//!
//! - Strings lose ASCII control characters (tab and newline survive) and
//!   markup tags, then are trimmed.
//! - Object keys are restricted to `[A-Za-z0-9_.-]`; keys left empty are
//!   dropped.
//! - Nesting deeper than the configured depth is dropped.
//! - A non-object top level becomes an empty object.

use serde_json::{Map, Value};

/// Default maximum nesting depth for request fields.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Recursive cleaner for request field maps.
#[derive(Debug, Clone, Copy)]
pub struct FieldSanitizer {
    max_depth: usize,
}

impl FieldSanitizer {
    /// Create a sanitizer with the given maximum nesting depth.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Sanitize a request field map.
    pub fn sanitize(&self, fields: &Value) -> Value {
        match fields {
            Value::Object(map) => Value::Object(self.sanitize_map(map, 1)),
            _ => Value::Object(Map::new()),
        }
    }

    fn sanitize_map(&self, map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in map {
            let key = sanitize_key(key);
            if key.is_empty() {
                continue;
            }
            if let Some(v) = self.sanitize_value(value, depth) {
                out.insert(key, v);
            }
        }
        out
    }

    fn sanitize_value(&self, value: &Value, depth: usize) -> Option<Value> {
        match value {
            Value::String(s) => Some(Value::String(sanitize_text(s))),
            Value::Object(map) => {
                if depth >= self.max_depth {
                    return None;
                }
                Some(Value::Object(self.sanitize_map(map, depth + 1)))
            }
            Value::Array(items) => {
                if depth >= self.max_depth {
                    return None;
                }
                Some(Value::Array(
                    items
                        .iter()
                        .filter_map(|item| self.sanitize_value(item, depth + 1))
                        .collect(),
                ))
            }
            other => Some(other.clone()),
        }
    }
}

impl Default for FieldSanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// Strip control characters and markup tags from a string, then trim.
///
/// A `<` only opens a tag when followed by a letter, `/` or `!`, so plain
/// comparisons such as `a < b` survive.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let opens_tag = chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!'));
            if opens_tag {
                for inner in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                }
                continue;
            }
        }
        if c.is_control() && c != '\n' && c != '\t' {
            continue;
        }
        out.push(c);
    }
    out.trim().to_string()
}
