//! Replay-time request matching.
//!
//! Candidates for a request are the stored records with the same method and
//! URL, in recording order. The first candidate whose request body matches
//! structurally wins.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::recording::{HttpMethod, MockRecord};

/// Structural request-body comparison with wildcard keys.
#[derive(Debug, Clone, Default)]
pub struct BodyMatcher {
    ignored: HashSet<String>,
}

impl BodyMatcher {
    pub fn new<I, S>(ignored_attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored_attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether two request bodies match.
    ///
    /// An empty or absent side matches anything. Strings holding JSON are
    /// compared as the JSON they hold. Ignored keys match regardless of
    /// value, at any depth, and whether or not they are present.
    pub fn body_matches(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return true;
        };
        if is_empty(a) || is_empty(b) {
            return true;
        }
        let a = parse_embedded_json(a);
        let b = parse_embedded_json(b);
        self.deep_equals(&a, &b)
    }

    /// First candidate whose stored body matches `body`.
    pub fn select<'a>(
        &self,
        body: Option<&Value>,
        candidates: &'a [MockRecord],
    ) -> Option<&'a MockRecord> {
        candidates
            .iter()
            .find(|candidate| self.body_matches(body, candidate.body.as_ref()))
    }

    fn deep_equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(a), Value::Object(b)) => {
                let keys: HashSet<&String> = a
                    .keys()
                    .chain(b.keys())
                    .filter(|key| !self.ignored.contains(key.as_str()))
                    .collect();
                keys.into_iter().all(|key| match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => self.deep_equals(x, y),
                    _ => false,
                })
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.deep_equals(x, y))
            }
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
            _ => a == b,
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn parse_embedded_json(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        other => other.clone(),
    }
}

/// Stored records grouped by method and URL, each group in recording order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<HttpMethod, IndexMap<String, Vec<MockRecord>>>,
}

impl RouteTable {
    pub fn from_records(records: &[MockRecord]) -> Self {
        let mut routes: HashMap<HttpMethod, IndexMap<String, Vec<MockRecord>>> = HashMap::new();
        for record in records {
            routes
                .entry(record.method)
                .or_default()
                .entry(record.url.clone())
                .or_default()
                .push(record.clone());
        }
        Self { routes }
    }

    /// Candidates for a method and URL; empty when nothing was recorded.
    pub fn candidates(&self, method: HttpMethod, url: &str) -> &[MockRecord] {
        self.routes
            .get(&method)
            .and_then(|by_url| by_url.get(url))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every recorded URL for a method, for miss diagnostics.
    pub fn urls(&self, method: HttpMethod) -> impl Iterator<Item = &str> {
        self.routes
            .get(&method)
            .into_iter()
            .flat_map(|by_url| by_url.keys().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(|by_url| by_url.values().map(Vec::len).sum::<usize>()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
