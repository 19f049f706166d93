//! Host Task Bridge: the operations the host runner performs for the engine.
//!
//! Every file-system interaction of the engine goes through [`HostTasks`].
//! Backends live in `crate::backends`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Folders the host works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub fixtures_dir: PathBuf,
    /// Sibling `mocks` folder of the fixtures folder
    pub mocks_dir: PathBuf,
    pub integration_dir: PathBuf,
}

impl HostLayout {
    pub fn new(fixtures_dir: impl Into<PathBuf>, integration_dir: impl Into<PathBuf>) -> Self {
        let fixtures_dir = fixtures_dir.into();
        let mocks_dir = match fixtures_dir.parent() {
            Some(parent) => parent.join("mocks"),
            None => PathBuf::from("../mocks"),
        };
        Self {
            fixtures_dir,
            mocks_dir,
            integration_dir: integration_dir.into(),
        }
    }

    pub fn index_path(&self, spec_name: &str) -> PathBuf {
        self.mocks_dir.join(format!("{spec_name}.json"))
    }

    pub fn fixture_path(&self, fixture_id: &str) -> PathBuf {
        self.fixtures_dir.join(format!("{fixture_id}.json"))
    }
}

/// Console colour of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Data,
    Log,
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogMessage {
    pub msg: String,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl LogMessage {
    pub fn new(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            level,
            params: Vec::new(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, msg)
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, msg)
    }
}

/// `fixtureId`s referenced by a raw mock index.
fn referenced_fixtures(index: &Value) -> impl Iterator<Item = &str> {
    index
        .as_object()
        .into_iter()
        .flat_map(|tests| tests.values())
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|record| record.get("fixtureId").and_then(Value::as_str))
}

/// Base name of a file up to its first `.`.
fn stem_before_first_dot(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

#[async_trait]
pub trait HostTasks: Send + Sync {
    fn layout(&self) -> &HostLayout;

    /// Parsed JSON, or None when the file does not exist. Malformed JSON
    /// is an error.
    async fn read_file(&self, path: &Path) -> Result<Option<Value>>;

    /// Entry names in a directory; empty when it does not exist.
    async fn read_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// Write a text file, creating parent directories.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Delete a file or directory. Returns false when nothing existed.
    async fn delete_file(&self, path: &Path) -> Result<bool>;

    async fn log(&self, message: LogMessage) -> Result<()>;

    /// Delete every mock index whose spec no longer exists, along with the
    /// external fixtures it references. Fixtures still referenced by the
    /// index of an existing spec are kept.
    async fn clean_mocks(&self) -> Result<()> {
        let layout = self.layout().clone();
        let spec_files = self.read_dir(&layout.integration_dir).await?;
        let mock_files = self.read_dir(&layout.mocks_dir).await?;

        let (surviving, orphaned): (Vec<String>, Vec<String>) =
            mock_files.into_iter().partition(|mock_name| {
                let base = stem_before_first_dot(mock_name);
                spec_files
                    .iter()
                    .any(|spec| stem_before_first_dot(spec) == base)
            });

        let mut in_use = HashSet::new();
        for mock_name in &surviving {
            if let Some(index) = self.read_file(&layout.mocks_dir.join(mock_name)).await? {
                in_use.extend(referenced_fixtures(&index).map(str::to_string));
            }
        }

        for mock_name in orphaned {
            let index_path = layout.mocks_dir.join(&mock_name);
            if let Some(index) = self.read_file(&index_path).await? {
                for fixture_id in referenced_fixtures(&index) {
                    if in_use.contains(fixture_id) {
                        tracing::debug!(fixture = %fixture_id, index = %mock_name, "Fixture still referenced, keeping it");
                        continue;
                    }
                    self.delete_file(&layout.fixture_path(fixture_id)).await?;
                }
            }

            tracing::info!(index = %mock_name, "Removing mock index for deleted spec");
            self.delete_file(&index_path).await?;
        }
        Ok(())
    }

    /// Delete every external fixture and every mock index.
    async fn remove_all_mocks(&self) -> Result<()> {
        let layout = self.layout().clone();
        for name in self.read_dir(&layout.fixtures_dir).await? {
            self.delete_file(&layout.fixtures_dir.join(name)).await?;
        }
        for name in self.read_dir(&layout.mocks_dir).await? {
            self.delete_file(&layout.mocks_dir.join(name)).await?;
        }
        Ok(())
    }
}
