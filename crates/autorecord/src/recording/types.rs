//! Mock records and the per-spec mock index.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{AutorecordError, Result};

/// Methods the engine records and replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 6] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
    ];

    /// Case-insensitive parse. Returns None for unsupported methods.
    pub fn parse(method: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a mock's response body lives.
#[derive(Debug, Clone, PartialEq)]
pub enum MockPayload {
    Inline(Value),
    /// Stored in `<fixturesDir>/<id>.json`
    External(String),
}

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "MockRecordRepr", into = "MockRecordRepr")]
pub struct MockRecord {
    pub url: String,
    pub method: HttpMethod,
    pub status: u16,
    /// Whitelisted response headers only
    pub headers: IndexMap<String, String>,
    /// Request body
    pub body: Option<Value>,
    pub payload: MockPayload,
}

impl MockRecord {
    pub fn fixture_id(&self) -> Option<&str> {
        match &self.payload {
            MockPayload::External(id) => Some(id),
            MockPayload::Inline(_) => None,
        }
    }

    pub fn response(&self) -> Option<&Value> {
        match &self.payload {
            MockPayload::Inline(value) => Some(value),
            MockPayload::External(_) => None,
        }
    }
}

/// On-disk shape of a mock record.
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct MockRecordRepr {
    #[serde(default)]
    fixture_id: Option<String>,
    url: String,
    method: HttpMethod,
    status: u16,
    #[serde(default)]
    headers: IndexMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

impl TryFrom<MockRecordRepr> for MockRecord {
    type Error = AutorecordError;

    fn try_from(repr: MockRecordRepr) -> Result<Self> {
        let payload = match (repr.fixture_id, repr.response) {
            (Some(id), Some(response)) if !response.is_null() => {
                return Err(AutorecordError::InvalidRecord(format!(
                    "{} {} has both fixtureId '{id}' and an inline response",
                    repr.method, repr.url
                )))
            }
            (Some(id), _) => MockPayload::External(id),
            // A response without a body is stored with no payload at all
            (None, response) => MockPayload::Inline(response.unwrap_or(Value::Null)),
        };

        Ok(MockRecord {
            url: repr.url,
            method: repr.method,
            status: repr.status,
            headers: repr.headers,
            body: repr.body,
            payload,
        })
    }
}

impl From<MockRecord> for MockRecordRepr {
    fn from(record: MockRecord) -> Self {
        let (fixture_id, response) = match record.payload {
            MockPayload::Inline(value) => (None, Some(value)),
            MockPayload::External(id) => (Some(id), None),
        };
        MockRecordRepr {
            fixture_id,
            url: record.url,
            method: record.method,
            status: record.status,
            headers: record.headers,
            body: record.body,
            response,
        }
    }
}

/// Newest index layout this build reads and the one it writes.
pub const INDEX_VERSION: u64 = 1;

/// Reserved top-level key carrying the index layout version.
pub const VERSION_KEY: &str = "$version";

/// Keys starting with `$` are reserved for index metadata, so test names
/// starting with `$` are stored with one more `$`.
fn escape_test_name(name: &str) -> String {
    if name.starts_with('$') {
        format!("${name}")
    } else {
        name.to_string()
    }
}

/// Test name for a stored key, or None for a metadata key.
fn unescape_test_name(key: &str) -> Option<&str> {
    match key.strip_prefix('$') {
        Some(rest) if rest.starts_with('$') => Some(rest),
        Some(_) => None,
        None => Some(key),
    }
}

/// Per-spec mock index: FQTN to the records observed for that test, in
/// observation order. Tests keep the order in which they were first stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockIndex {
    tests: IndexMap<String, Vec<MockRecord>>,
}

impl MockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored index. Files without a version key are layout 1 and
    /// their test names are taken verbatim; in versioned files a leading
    /// `$$` stands for a test name starting with `$`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(AutorecordError::InvalidRecord(
                "mock index must be a JSON object".to_string(),
            ));
        };

        let version = match object.get(VERSION_KEY) {
            // Unversioned file with a test literally named `$version`
            Some(Value::Array(_)) | None => None,
            Some(version) => Some(version.as_u64().ok_or_else(|| {
                AutorecordError::InvalidRecord(format!("'{VERSION_KEY}' must be a number"))
            })?),
        };
        if let Some(found) = version {
            if found > INDEX_VERSION {
                return Err(AutorecordError::UnsupportedVersion {
                    found,
                    supported: INDEX_VERSION,
                });
            }
            object.shift_remove(VERSION_KEY);
        }
        let versioned = version.is_some();

        let mut tests = IndexMap::with_capacity(object.len());
        for (name, records) in object {
            let name = if versioned {
                match unescape_test_name(&name) {
                    Some(name) => name.to_string(),
                    None => continue,
                }
            } else {
                name
            };
            let records: Vec<MockRecord> = serde_json::from_value(records)?;
            tests.insert(name, records);
        }
        Ok(MockIndex { tests })
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut object = Map::with_capacity(self.tests.len() + 1);
        object.insert(VERSION_KEY.to_string(), Value::from(INDEX_VERSION));
        for (name, records) in &self.tests {
            object.insert(escape_test_name(name), serde_json::to_value(records)?);
        }
        Ok(Value::Object(object))
    }

    pub fn get(&self, fqtn: &str) -> Option<&[MockRecord]> {
        self.tests.get(fqtn).map(Vec::as_slice)
    }

    pub fn contains(&self, fqtn: &str) -> bool {
        self.tests.contains_key(fqtn)
    }

    /// Replace a test's records, keeping its position if it already existed.
    pub fn insert(&mut self, fqtn: impl Into<String>, records: Vec<MockRecord>) {
        self.tests.insert(fqtn.into(), records);
    }

    /// Keep only the tests accepted by `keep`; returns the dropped entries.
    pub fn retain_tests<F>(&mut self, mut keep: F) -> Vec<(String, Vec<MockRecord>)>
    where
        F: FnMut(&str) -> bool,
    {
        let mut dropped = Vec::new();
        let tests = std::mem::take(&mut self.tests);
        for (name, records) in tests {
            if keep(&name) {
                self.tests.insert(name, records);
            } else {
                dropped.push((name, records));
            }
        }
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MockRecord])> {
        self.tests
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Every (FQTN, fixture id) pair referenced by this index.
    pub fn fixture_refs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().flat_map(|(name, records)| {
            records
                .iter()
                .filter_map(move |record| record.fixture_id().map(|id| (name, id)))
        })
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
