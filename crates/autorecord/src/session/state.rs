//! Per-test lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AutorecordError, Result};

/// How a test's traffic is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestMode {
    /// Requests reach the network and responses are captured
    Recording,
    /// Requests are answered from stored mocks
    Replaying,
}

/// Lifecycle of one FQTN within a spec run.
///
/// `Unknown -> Recording | Replaying -> Persisted`. A retry of a persisted
/// test starts again from `Persisted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestPhase {
    #[default]
    Unknown,
    Recording,
    Replaying,
    Persisted,
}

impl TestPhase {
    pub fn begin(self, mode: TestMode) -> Result<TestPhase> {
        let next = match mode {
            TestMode::Recording => TestPhase::Recording,
            TestMode::Replaying => TestPhase::Replaying,
        };
        match self {
            TestPhase::Unknown | TestPhase::Persisted => Ok(next),
            from => Err(AutorecordError::transition(from.to_string(), next.to_string())),
        }
    }

    pub fn persist(self) -> Result<TestPhase> {
        match self {
            TestPhase::Recording | TestPhase::Replaying => Ok(TestPhase::Persisted),
            from => Err(AutorecordError::transition(
                from.to_string(),
                TestPhase::Persisted.to_string(),
            )),
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestMode::Recording => write!(f, "recording"),
            TestMode::Replaying => write!(f, "replaying"),
        }
    }
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestPhase::Unknown => write!(f, "unknown"),
            TestPhase::Recording => write!(f, "recording"),
            TestPhase::Replaying => write!(f, "replaying"),
            TestPhase::Persisted => write!(f, "persisted"),
        }
    }
}

/// Lifecycle of the spec run itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecPhase {
    Created,
    Running,
    Finished,
}

impl fmt::Display for SpecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecPhase::Created => write!(f, "created"),
            SpecPhase::Running => write!(f, "running"),
            SpecPhase::Finished => write!(f, "finished"),
        }
    }
}
