//! Fixture naming helpers: filename sanitizing, content hashing, URL parts.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use url::Url;

/// Longest sanitized path segment.
const MAX_SEGMENT_LEN: usize = 100;

/// Hex characters kept from a content hash.
const HASH_LEN: usize = 16;

/// Make `input` safe to use as a single path segment.
///
/// Path separators, reserved characters and control characters become `_`.
/// Trailing dots and spaces are trimmed and the result is capped in length.
pub fn sanitize_filename(input: &str) -> String {
    let mut out: String = input
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    while out.ends_with('.') || out.ends_with(' ') {
        out.pop();
    }
    if out.is_empty() && !input.is_empty() {
        out.push('_');
    }

    if out.chars().count() > MAX_SEGMENT_LEN {
        out = out.chars().take(MAX_SEGMENT_LEN).collect();
    }
    out
}

/// Stable content hash of a JSON value. Object keys are sorted first so the
/// hash does not depend on insertion order.
pub fn object_hash(value: Option<&Value>) -> String {
    let canonical = canonicalize(value.unwrap_or(&Value::Null));
    // Serializing a Value cannot fail
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hostname, pathname and query (with its leading `?`) of a request URL.
///
/// Relative URLs resolve against `http://localhost`.
pub struct UrlParts {
    pub hostname: String,
    pub pathname: String,
    pub query: String,
}

impl UrlParts {
    pub fn parse(raw: &str) -> Self {
        let parsed = Url::parse(raw).or_else(|_| {
            Url::parse("http://localhost").and_then(|base| base.join(raw))
        });

        match parsed {
            Ok(url) => UrlParts {
                hostname: url.host_str().unwrap_or_default().to_string(),
                pathname: url.path().to_string(),
                query: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            },
            Err(_) => UrlParts {
                hostname: String::new(),
                pathname: raw.to_string(),
                query: String::new(),
            },
        }
    }
}
