//! Fully-qualified test names.

use serde::{Deserialize, Serialize};

/// Title marker forcing a test into recording mode.
pub const FORCE_RECORD_MARKER: &str = "[r]";

const PARENT_SEPARATOR: &str = " > ";

/// Test metadata delivered by the host at each test boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    /// Stable across retries of the same test
    pub id: String,
    pub title: String,
    /// Enclosing group titles, outermost first
    #[serde(default)]
    pub parents: Vec<String>,
    /// Zero for the first attempt
    #[serde(default)]
    pub attempt: u32,
}

impl TestInfo {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parents: Vec::new(),
            attempt: 0,
        }
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn retry(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Key a test's mocks are stored under, plus whether it was force-recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestKey {
    pub fqtn: String,
    pub force_record: bool,
}

/// Derive the key for a first attempt.
///
/// Every `[r]` is stripped from the title, along with the whitespace it
/// leaves at either end. With `include_parents` the
/// non-empty group titles are prepended as `G1 > G2 > title`.
pub fn derive_key(test: &TestInfo, include_parents: bool) -> TestKey {
    let force_record = test.title.contains(FORCE_RECORD_MARKER);
    let title = if force_record {
        test.title.replace(FORCE_RECORD_MARKER, "").trim().to_string()
    } else {
        test.title.clone()
    };

    let fqtn = if include_parents {
        let mut fqtn = String::new();
        for parent in test.parents.iter().filter(|p| !p.is_empty()) {
            fqtn.push_str(parent);
            fqtn.push_str(PARENT_SEPARATOR);
        }
        fqtn.push_str(&title);
        fqtn
    } else {
        title
    };

    TestKey { fqtn, force_record }
}
