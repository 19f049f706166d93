//! Per-spec reconciliation and the process-level mock maintenance tasks.
//!
//! Everything a spec run decides about fixtures is staged in [`Staging`]
//! during the run and flushed by [`reconcile`] at spec end, the only place
//! bulk writes happen.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::AutorecordConfig;
use crate::error::{AutorecordError, Result};
use crate::fixture_index::LazyFixtureIndex;
use crate::host::{HostTasks, LogMessage};
use crate::recording::MockIndex;
use crate::store::FixtureStore;

/// Fixture writes and deletions decided during a spec run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Staging {
    additions: IndexMap<String, Value>,
    removals: IndexSet<String>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a fixture write. A later write to the same id wins.
    pub fn add(&mut self, fixture_id: impl Into<String>, data: Value) {
        self.additions.insert(fixture_id.into(), data);
    }

    pub fn remove(&mut self, fixture_id: impl Into<String>) {
        self.removals.insert(fixture_id.into());
    }

    pub fn additions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.additions.iter().map(|(id, data)| (id.as_str(), data))
    }

    pub fn removals(&self) -> impl Iterator<Item = &str> {
        self.removals.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// What a spec-end reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Tests pruned from the index in clean mode
    pub dropped_tests: Vec<String>,
    pub deleted_fixtures: Vec<String>,
    /// Fixtures whose deletion was skipped because something still uses them
    pub kept_fixtures: Vec<String>,
    pub written_fixtures: Vec<String>,
    /// Tests in the written index
    pub tests: usize,
}

/// Flush a spec run. `index` is left as written.
///
/// With `retain` set (clean mode), only the listed tests survive and the
/// fixtures of dropped tests are deleted unless the remaining index or
/// another spec still references them. Staged deletions are flushed next,
/// then the index is written, then staged fixtures. A staged deletion of a
/// fixture the written index references is skipped, and a staged write of
/// a fixture it does not reference is dropped.
pub async fn reconcile(
    store: &FixtureStore,
    spec_name: &str,
    index: &mut MockIndex,
    staging: Staging,
    retain: Option<&HashSet<String>>,
    cross_spec: &mut LazyFixtureIndex,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    let dropped = match retain {
        Some(keep) => index.retain_tests(|fqtn| keep.contains(fqtn)),
        None => Vec::new(),
    };

    let referenced: HashSet<String> = index
        .fixture_refs()
        .map(|(_, id)| id.to_string())
        .collect();

    let mut deleted: HashSet<String> = HashSet::new();
    for (fqtn, records) in &dropped {
        info!(spec = spec_name, test = %fqtn, "Pruning mocks of test that no longer exists");
        summary.dropped_tests.push(fqtn.clone());
        for fixture_id in records.iter().filter_map(|r| r.fixture_id()) {
            if deleted.contains(fixture_id) {
                continue;
            }
            let elsewhere = cross_spec.get(store, spec_name).await?;
            if referenced.contains(fixture_id) || elsewhere.is_referenced(fixture_id) {
                debug!(fixture = fixture_id, "Fixture of pruned test is still referenced");
                summary.kept_fixtures.push(fixture_id.to_string());
                continue;
            }
            store.delete_fixture(fixture_id).await?;
            deleted.insert(fixture_id.to_string());
            summary.deleted_fixtures.push(fixture_id.to_string());
        }
    }

    for fixture_id in staging.removals() {
        if referenced.contains(fixture_id) {
            debug!(fixture = fixture_id, "Staged deletion skipped, fixture is still referenced");
            summary.kept_fixtures.push(fixture_id.to_string());
            continue;
        }
        if deleted.insert(fixture_id.to_string()) {
            store.delete_fixture(fixture_id).await?;
            summary.deleted_fixtures.push(fixture_id.to_string());
        }
    }

    store.write_index(spec_name, index).await?;
    summary.tests = index.len();

    for (fixture_id, data) in staging.additions() {
        if !referenced.contains(fixture_id) {
            debug!(fixture = fixture_id, "Staged fixture is no longer referenced, not writing");
            continue;
        }
        store.write_fixture(fixture_id, data).await?;
        summary.written_fixtures.push(fixture_id.to_string());
    }

    info!(
        spec = spec_name,
        tests = summary.tests,
        written = summary.written_fixtures.len(),
        deleted = summary.deleted_fixtures.len(),
        "Reconciled mocks"
    );
    Ok(summary)
}

/// Once-per-process maintenance: prune indexes of deleted specs when
/// `cleanMocks` is on, wipe everything when `forceRecord` is on.
pub async fn prepare_run(options: &AutorecordConfig, host: &dyn HostTasks) -> Result<()> {
    if options.clean_mocks {
        info!("Cleaning mocks of deleted specs");
        host.clean_mocks().await?;
    }
    if options.force_record {
        info!("Force record enabled, removing all mocks");
        host.remove_all_mocks().await?;
        host.log(LogMessage::info("Removed all mocks and fixtures"))
            .await?;
    }
    Ok(())
}

/// A fixture reference whose file is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingFixture {
    pub spec: String,
    pub test: String,
    pub fixture_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub specs: usize,
    pub tests: usize,
    pub fixture_refs: usize,
    pub dangling: Vec<DanglingFixture>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Check every mock index for references to missing fixture files.
pub async fn audit(store: &FixtureStore) -> Result<AuditReport> {
    let mut report = AuditReport::default();
    for spec in store.list_index_specs().await? {
        let index = store.read_index(&spec).await?;
        report.specs += 1;
        report.tests += index.len();
        for (test, fixture_id) in index.fixture_refs() {
            report.fixture_refs += 1;
            let exists = match store.read_fixture(fixture_id).await {
                Ok(found) => found.is_some(),
                Err(AutorecordError::MalformedArtifact { .. }) => true,
                Err(e) => return Err(e),
            };
            if !exists {
                warn!(spec = %spec, test, fixture = fixture_id, "Dangling fixture reference");
                report.dangling.push(DanglingFixture {
                    spec: spec.clone(),
                    test: test.to_string(),
                    fixture_id: fixture_id.to_string(),
                });
            }
        }
    }
    Ok(report)
}
