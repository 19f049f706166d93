use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{AutorecordError, Result};
use crate::host::{HostLayout, HostTasks, LogMessage};

/// In-memory implementation of HostTasks
///
/// Files are kept as text keyed by path; directories exist implicitly as
/// path prefixes. Logged messages are captured for inspection. Clones share
/// the same tree.
#[derive(Debug, Clone)]
pub struct InMemoryHost {
    layout: HostLayout,
    files: Arc<Mutex<BTreeMap<PathBuf, String>>>,
    logs: Arc<Mutex<Vec<LogMessage>>>,
}

impl InMemoryHost {
    pub fn new(layout: HostLayout) -> Self {
        Self {
            layout,
            files: Arc::new(Mutex::new(BTreeMap::new())),
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Store a JSON file directly, bypassing the task interface.
    pub fn insert_json(&self, path: impl AsRef<Path>, value: &Value) {
        let text = serde_json::to_string_pretty(value).unwrap_or_default();
        self.files.lock().insert(normalize(path.as_ref()), text);
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.lock().get(&normalize(path.as_ref())).cloned()
    }

    pub fn json(&self, path: impl AsRef<Path>) -> Option<Value> {
        self.contents(path)
            .and_then(|text| serde_json::from_str(&text).ok())
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.files.lock().contains_key(&normalize(path.as_ref()))
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    pub fn logs(&self) -> Vec<LogMessage> {
        self.logs.lock().clone()
    }
}

/// Resolve `.` and `..` lexically so `fixtures/../mocks` and `mocks` agree.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[async_trait]
impl HostTasks for InMemoryHost {
    fn layout(&self) -> &HostLayout {
        &self.layout
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Value>> {
        let Some(text) = self.contents(path) else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| AutorecordError::MalformedArtifact {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        let dir = normalize(path);
        let files = self.files.lock();
        let names: BTreeSet<String> = files
            .keys()
            .filter_map(|file| file.strip_prefix(&dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| first.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.files
            .lock()
            .insert(normalize(path), contents.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<bool> {
        let target = normalize(path);
        let mut files = self.files.lock();
        if files.remove(&target).is_some() {
            return Ok(true);
        }
        let before = files.len();
        files.retain(|file, _| !file.starts_with(&target));
        Ok(files.len() != before)
    }

    async fn log(&self, message: LogMessage) -> Result<()> {
        self.logs.lock().push(message);
        Ok(())
    }
}
