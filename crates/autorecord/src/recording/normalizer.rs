//! Turns observed exchanges into canonical mock records.

use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use super::naming::{object_hash, sanitize_filename, UrlParts};
use super::types::{HttpMethod, MockPayload, MockRecord};
use crate::config::CompiledConfig;
use crate::error::Result;
use crate::interception::ResponseBody;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// One request/response pair captured while recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub url: String,
    pub method: HttpMethod,
    pub status: u16,
    /// Response body in plain form
    pub data: Value,
    /// Request body
    pub body: Option<Value>,
    /// Whitelisted response headers
    pub headers: IndexMap<String, String>,
}

/// A normalized record plus the external fixture it needs, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record: MockRecord,
    pub fixture: Option<(String, Value)>,
}

/// Convert a response body to a JSON value.
///
/// UTF-8 payloads are parsed as JSON when possible and kept as text
/// otherwise; other bytes are base64 encoded.
pub fn plain_data(body: ResponseBody) -> Value {
    match body {
        ResponseBody::Json(value) => value,
        ResponseBody::Text(text) => Value::String(text),
        ResponseBody::Binary(bytes) => match String::from_utf8(bytes) {
            Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Err(err) => Value::String(
                base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
            ),
        },
    }
}

/// Keep only the headers whose names match a whitelist regex.
pub fn filter_headers(
    headers: &IndexMap<String, String>,
    config: &CompiledConfig,
) -> IndexMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| config.keeps_header(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Approximate in-memory size of a value: UTF-16 code units of its
/// serialized form, in MiB.
pub fn size_in_mib(value: &Value) -> Result<f64> {
    let serialized = serde_json::to_string(value)?;
    let units = serialized.encode_utf16().count();
    Ok(units as f64 / BYTES_PER_MIB)
}

/// Deterministic fixture id for separate-file mode.
pub fn separate_fixture_id(
    url: &str,
    method: HttpMethod,
    status: u16,
    body: Option<&Value>,
    data: &Value,
) -> String {
    let parts = UrlParts::parse(url);
    let sub_folder = sanitize_filename(&parts.hostname);
    let name = format!(
        "{}_{}",
        sanitize_filename(&parts.pathname.replace(',', "")),
        sanitize_filename(&parts.query)
    );

    let mut fixture_id = format!("{sub_folder}/{name}_{method}_{status}");

    // Same request body is assumed to produce the same response
    if method != HttpMethod::Get {
        fixture_id = format!(
            "{fixture_id}_{}_{}",
            object_hash(body),
            object_hash(Some(data))
        );
    }
    fixture_id
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    separate_files: bool,
    inline_limit_mib: f64,
}

impl Normalizer {
    pub fn new(separate_files: bool, inline_limit_mib: f64) -> Self {
        Self {
            separate_files,
            inline_limit_mib,
        }
    }

    pub fn from_config(config: &CompiledConfig) -> Self {
        Self::new(
            config.options.separate_mock_files,
            config.options.max_inline_size_mb,
        )
    }

    pub fn normalize(&self, observation: Observation) -> Result<NormalizedRecord> {
        let oversized = size_in_mib(&observation.data)? > self.inline_limit_mib;

        let mut fixture_id = oversized.then(|| Uuid::new_v4().to_string());

        if self.separate_files {
            fixture_id = Some(separate_fixture_id(
                &observation.url,
                observation.method,
                observation.status,
                observation.body.as_ref(),
                &observation.data,
            ));
        }

        let (payload, fixture) = match fixture_id {
            Some(id) => (
                MockPayload::External(id.clone()),
                Some((id, observation.data)),
            ),
            None => (MockPayload::Inline(observation.data), None),
        };

        Ok(NormalizedRecord {
            record: MockRecord {
                url: observation.url,
                method: observation.method,
                status: observation.status,
                headers: observation.headers,
                body: observation.body,
                payload,
            },
            fixture,
        })
    }
}
