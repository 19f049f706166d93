//! Options surfaced under the `autorecord` namespace of the host config.

use serde::{Deserialize, Serialize};

/// Record/replay options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutorecordConfig {
    /// Prune index entries for tests that no longer exist
    #[serde(default)]
    pub clean_mocks: bool,

    /// Wipe every mock and external fixture at process start
    #[serde(default)]
    pub force_record: bool,

    /// Tests forced into recording mode even if mocks exist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub record_tests: Vec<String>,

    /// Prefix test titles with their group chain
    #[serde(default = "default_true")]
    pub include_parent_test_name: bool,

    /// Store every response body in a deterministic external fixture
    #[serde(default, alias = "seperateMockFiles")]
    pub separate_mock_files: bool,

    /// URL substrings that are neither recorded nor stubbed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist_routes: Vec<String>,

    /// Regexes of response header names kept in recorded mocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whitelist_headers: Vec<String>,

    /// Request body keys the matcher treats as wildcards
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_request_body_attributes: Vec<String>,

    /// URLs the interceptor binds to: a glob, or `/regex/flags`
    #[serde(default = "default_intercept_pattern")]
    pub intercept_pattern: String,

    /// Methods the interceptor binds to (regex)
    #[serde(default = "default_intercept_method")]
    pub intercept_method: String,

    /// Response bodies larger than this many MiB are stored externally
    #[serde(default = "default_max_inline_size_mb")]
    pub max_inline_size_mb: f64,

    #[serde(default)]
    pub stringify_options: StringifyOptions,

    /// Emit match/miss diagnostics
    #[serde(default)]
    pub debug: bool,
}

impl Default for AutorecordConfig {
    fn default() -> Self {
        Self {
            clean_mocks: false,
            force_record: false,
            record_tests: Vec::new(),
            include_parent_test_name: true,
            separate_mock_files: false,
            blacklist_routes: Vec::new(),
            whitelist_headers: Vec::new(),
            ignored_request_body_attributes: Vec::new(),
            intercept_pattern: default_intercept_pattern(),
            intercept_method: default_intercept_method(),
            max_inline_size_mb: default_max_inline_size_mb(),
            stringify_options: StringifyOptions::default(),
            debug: false,
        }
    }
}

/// Options for the pretty-compact JSON writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringifyOptions {
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Containers that fit on one line within this width stay compact
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for StringifyOptions {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            max_length: default_max_length(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_intercept_pattern() -> String {
    "*".to_string()
}

fn default_intercept_method() -> String {
    ".*".to_string()
}

fn default_max_inline_size_mb() -> f64 {
    70.0
}

fn default_indent() -> usize {
    2
}

fn default_max_length() -> usize {
    80
}
