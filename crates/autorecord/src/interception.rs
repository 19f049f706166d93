//! Message contract between the host's request interceptor and the engine.
//!
//! The host delivers a [`RequestEvent`] for every request its interceptor
//! sees and, for requests the engine asked to observe, a [`ResponseEvent`]
//! once the real response arrives. The engine answers each request with an
//! [`Interception`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Host-assigned identifier pairing a response with its request.
pub type RequestId = u64;

/// Header carried by the host runner's own traffic.
pub const RUNNER_HEADER: &str = "x-cypress-authorization";

/// Status of the synthetic reply to an unmatched request in replay mode.
pub const UNMATCHED_STATUS: u16 = 408;

/// Body of the synthetic reply to an unmatched request in replay mode.
pub const UNMATCHED_BODY: &str = "cypress-autorecord forced 408 Request Timeout";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub id: RequestId,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl RequestEvent {
    /// Whether this request belongs to the host runner itself.
    pub fn is_runner_traffic(&self) -> bool {
        self.headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(RUNNER_HEADER))
    }
}

/// Response body as the host received it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    pub request_id: RequestId,
    pub status: u16,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    pub body: ResponseBody,
}

/// The engine's answer to an intercepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    /// Answer the request without contacting the network.
    Reply(Reply),
    /// Let the request reach the network. When `observe` is set the host
    /// must deliver the matching [`ResponseEvent`].
    Passthrough { observe: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: ReplyBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Inline(Value),
    /// Serve the external fixture stored at `path`
    Fixture { fixture_id: String, path: PathBuf },
}

impl Reply {
    /// The 408 sentinel sent for unmatched requests in replay mode.
    pub fn unmatched() -> Self {
        Reply {
            status: UNMATCHED_STATUS,
            headers: IndexMap::new(),
            body: ReplyBody::Inline(Value::String(UNMATCHED_BODY.to_string())),
        }
    }
}
