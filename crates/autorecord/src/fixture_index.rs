//! Cross-spec fixture index.
//!
//! Maps every external fixture id to the tests that reference it, across the
//! mock indexes of all other specs. Built once per spec run, on first need,
//! and never refreshed.

use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::Result;
use crate::recording::MockIndex;
use crate::store::FixtureStore;

/// A test that references an external fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureHolder {
    pub spec: String,
    pub test: String,
}

impl fmt::Display for FixtureHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({})", self.test, self.spec)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureIndex {
    holders: HashMap<String, Vec<FixtureHolder>>,
}

impl FixtureIndex {
    /// Read every mock index except `current_spec`'s own.
    pub async fn build(store: &FixtureStore, current_spec: &str) -> Result<Self> {
        let mut index = FixtureIndex::default();
        for spec in store.list_index_specs().await? {
            if spec == current_spec {
                continue;
            }
            let mocks = store.read_index(&spec).await?;
            index.add_spec(&spec, &mocks);
        }
        debug!(
            spec = current_spec,
            fixtures = index.holders.len(),
            "Built cross-spec fixture index"
        );
        Ok(index)
    }

    pub fn add_spec(&mut self, spec: &str, mocks: &MockIndex) {
        for (test, fixture_id) in mocks.fixture_refs() {
            let holders = self.holders.entry(fixture_id.to_string()).or_default();
            let holder = FixtureHolder {
                spec: spec.to_string(),
                test: test.to_string(),
            };
            if !holders.contains(&holder) {
                holders.push(holder);
            }
        }
    }

    pub fn holders(&self, fixture_id: &str) -> &[FixtureHolder] {
        self.holders
            .get(fixture_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_referenced(&self, fixture_id: &str) -> bool {
        !self.holders(fixture_id).is_empty()
    }
}

/// A [`FixtureIndex`] built on first access and memoized for the spec run.
#[derive(Debug, Default)]
pub struct LazyFixtureIndex {
    inner: Option<FixtureIndex>,
}

impl LazyFixtureIndex {
    pub async fn get(&mut self, store: &FixtureStore, current_spec: &str) -> Result<&FixtureIndex> {
        let index = match self.inner.take() {
            Some(index) => index,
            None => FixtureIndex::build(store, current_spec).await?,
        };
        Ok(self.inner.insert(index))
    }

    pub fn is_built(&self) -> bool {
        self.inner.is_some()
    }
}
