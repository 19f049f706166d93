//! Fixture Store: mock indexes and external fixture blobs.
//!
//! Layout on disk:
//! - `<mocksDir>/<specBase>.json` - one mock index per spec
//! - `<fixturesDir>/<fixtureId>.json` - external fixtures, shared across tests

mod format;

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::StringifyOptions;
use crate::error::{AutorecordError, Result};
use crate::host::{HostLayout, HostTasks, LogMessage};
use crate::recording::MockIndex;

pub use format::stringify;

/// Base name of a spec file without its final extension
/// (`cypress/integration/login.spec.js` is `login.spec`).
pub fn spec_base_name(spec: impl AsRef<Path>) -> String {
    spec.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct FixtureStore {
    host: Arc<dyn HostTasks>,
    stringify: StringifyOptions,
}

impl std::fmt::Debug for FixtureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureStore")
            .field("layout", self.host.layout())
            .field("stringify", &self.stringify)
            .finish()
    }
}

impl FixtureStore {
    pub fn new(host: Arc<dyn HostTasks>, stringify: StringifyOptions) -> Self {
        Self { host, stringify }
    }

    pub fn host(&self) -> &Arc<dyn HostTasks> {
        &self.host
    }

    pub fn layout(&self) -> &HostLayout {
        self.host.layout()
    }

    pub fn fixture_path(&self, fixture_id: &str) -> PathBuf {
        self.layout().fixture_path(fixture_id)
    }

    /// Read a spec's mock index. A missing file is an empty index.
    pub async fn read_index(&self, spec_name: &str) -> Result<MockIndex> {
        let path = self.layout().index_path(spec_name);
        match self.host.read_file(&path).await? {
            Some(value) => {
                let index = MockIndex::from_value(value).map_err(|err| match err {
                    AutorecordError::Serialization(source) => {
                        AutorecordError::MalformedArtifact { path, source }
                    }
                    other => other,
                })?;
                debug!(spec = spec_name, tests = index.len(), "Loaded mock index");
                Ok(index)
            }
            None => {
                debug!(spec = spec_name, "Mock index does not exist, starting fresh");
                Ok(MockIndex::new())
            }
        }
    }

    /// Spec names of every mock index in the mocks directory.
    pub async fn list_index_specs(&self) -> Result<Vec<String>> {
        let names = self.host.read_dir(&self.layout().mocks_dir).await?;
        Ok(names
            .into_iter()
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .collect())
    }

    pub async fn write_index(&self, spec_name: &str, index: &MockIndex) -> Result<()> {
        let path = self.layout().index_path(spec_name);
        let text = stringify(&index.to_value()?, &self.stringify);
        self.host.write_file(&path, &text).await?;
        debug!(spec = spec_name, tests = index.len(), path = %path.display(), "Wrote mock index");
        Ok(())
    }

    pub async fn read_fixture(&self, fixture_id: &str) -> Result<Option<Value>> {
        self.host.read_file(&self.fixture_path(fixture_id)).await
    }

    pub async fn write_fixture(&self, fixture_id: &str, data: &Value) -> Result<()> {
        let text = stringify(data, &self.stringify);
        self.host
            .write_file(&self.fixture_path(fixture_id), &text)
            .await
    }

    /// Returns false when the fixture did not exist.
    pub async fn delete_fixture(&self, fixture_id: &str) -> Result<bool> {
        let deleted = self.host.delete_file(&self.fixture_path(fixture_id)).await?;
        debug!(fixture = fixture_id, deleted, "Deleted external fixture");
        Ok(deleted)
    }

    pub async fn log(&self, message: LogMessage) -> Result<()> {
        self.host.log(message).await
    }
}
