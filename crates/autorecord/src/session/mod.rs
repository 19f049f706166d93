//! Per-spec record/replay session.
//!
//! A [`SpecSession`] is created for one spec file and driven by the host's
//! lifecycle hooks:
//!
//! 1. [`SpecSession::before_spec`] loads the spec's mock index
//! 2. [`SpecSession::before_each`] derives the test key and picks a mode
//! 3. [`SpecSession::on_request`] / [`SpecSession::on_response`] handle
//!    intercepted traffic
//! 4. [`SpecSession::after_each`] stages the test's new mocks
//! 5. [`SpecSession::after_spec`] reconciles and writes everything
//!
//! Only one test is live at a time. Interceptor callbacks never fail: they
//! reply, pass the request through, or drop the observation.

mod state;
mod title;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::CompiledConfig;
use crate::error::{AutorecordError, Result};
use crate::fixture_index::{FixtureHolder, LazyFixtureIndex};
use crate::host::{HostTasks, LogMessage};
use crate::interception::{
    Interception, Reply, ReplyBody, RequestEvent, RequestId, ResponseEvent,
};
use crate::matcher::{BodyMatcher, RouteTable};
use crate::recording::{
    filter_headers, plain_data, HttpMethod, MockIndex, MockPayload, MockRecord, Normalizer,
    Observation,
};
use crate::reconciler::{self, ReconcileSummary, Staging};
use crate::store::{spec_base_name, FixtureStore};

use state::SpecPhase;
pub use state::{TestMode, TestPhase};
pub use title::{derive_key, TestInfo, TestKey, FORCE_RECORD_MARKER};

/// Uncaught errors raised by requests answered with the 408 sentinel.
static SENTINEL_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)request failed with status code 408").expect("sentinel regex is valid")
});

/// Match/miss diagnostics: `info` with `debug: true`, `debug` otherwise.
macro_rules! diag {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

#[derive(Debug)]
struct PendingRequest {
    url: String,
    method: HttpMethod,
    body: Option<Value>,
}

#[derive(Debug)]
struct ActiveTest {
    key: TestKey,
    mode: TestMode,
    /// Recording: observations in arrival order, duplicates coalesced
    routes: Vec<Observation>,
    /// Recording: requests awaiting their response
    pending: HashMap<RequestId, PendingRequest>,
    /// Replaying: stored mocks grouped by method and URL
    table: RouteTable,
}

/// Result of one test attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub fqtn: String,
    pub mode: TestMode,
    /// Records produced by recording
    pub recorded: usize,
    /// Whether an existing entry was replaced
    pub replaced: bool,
}

#[derive(Debug)]
pub struct SpecSession {
    config: Arc<CompiledConfig>,
    store: FixtureStore,
    spec_name: String,
    normalizer: Normalizer,
    matcher: BodyMatcher,
    index: MockIndex,
    staging: Staging,
    /// Clean mode: FQTNs seen this run
    observed: HashSet<String>,
    /// Test id to the key its first attempt used
    first_attempts: HashMap<String, TestKey>,
    phases: IndexMap<String, TestPhase>,
    active: Option<ActiveTest>,
    phase: SpecPhase,
    cross_spec: LazyFixtureIndex,
    uncaught_filter: bool,
}

impl SpecSession {
    pub fn new(
        config: Arc<CompiledConfig>,
        host: Arc<dyn HostTasks>,
        spec: impl AsRef<Path>,
    ) -> Self {
        let store = FixtureStore::new(host, config.options.stringify_options);
        let matcher = BodyMatcher::new(config.options.ignored_request_body_attributes.iter().cloned());
        Self {
            normalizer: Normalizer::from_config(&config),
            matcher,
            store,
            spec_name: spec_base_name(spec),
            index: MockIndex::new(),
            staging: Staging::new(),
            observed: HashSet::new(),
            first_attempts: HashMap::new(),
            phases: IndexMap::new(),
            active: None,
            phase: SpecPhase::Created,
            cross_spec: LazyFixtureIndex::default(),
            uncaught_filter: false,
            config,
        }
    }

    pub fn spec_name(&self) -> &str {
        &self.spec_name
    }

    pub fn config(&self) -> &CompiledConfig {
        &self.config
    }

    pub fn store(&self) -> &FixtureStore {
        &self.store
    }

    /// The in-memory mock index, as it will be written at spec end.
    pub fn index(&self) -> &MockIndex {
        &self.index
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Mode of the live test, if any.
    pub fn mode(&self) -> Option<TestMode> {
        self.active.as_ref().map(|test| test.mode)
    }

    pub fn test_phase(&self, fqtn: &str) -> TestPhase {
        self.phases.get(fqtn).copied().unwrap_or_default()
    }

    fn debug_enabled(&self) -> bool {
        self.config.options.debug
    }

    fn require_spec_phase(&self, expected: SpecPhase, to: &str) -> Result<()> {
        if self.phase != expected {
            return Err(AutorecordError::transition(self.phase.to_string(), to));
        }
        Ok(())
    }

    /// Load the spec's mock index. A missing index is empty.
    pub async fn before_spec(&mut self) -> Result<()> {
        self.require_spec_phase(SpecPhase::Created, "running")?;
        self.index = self.store.read_index(&self.spec_name).await?;
        self.phase = SpecPhase::Running;
        debug!(spec = %self.spec_name, tests = self.index.len(), "Spec started");
        Ok(())
    }

    /// Start a test attempt and choose its mode.
    ///
    /// Replay is chosen only when the test is not listed in `recordTests`,
    /// carries no `[r]` marker, and has stored mocks. Retries reuse the key
    /// of the first attempt with the same id.
    pub fn before_each(&mut self, test: &TestInfo) -> Result<TestMode> {
        self.require_spec_phase(SpecPhase::Running, "test")?;
        if let Some(active) = &self.active {
            return Err(AutorecordError::transition(
                self.test_phase(&active.key.fqtn).to_string(),
                "test",
            ));
        }

        let include_parents = self.config.options.include_parent_test_name;
        let first_attempt = if test.is_retry() {
            self.first_attempts.get(&test.id).cloned()
        } else {
            None
        };
        let key = match first_attempt {
            Some(first) => TestKey {
                fqtn: first.fqtn,
                force_record: false,
            },
            None => {
                let key = derive_key(test, include_parents);
                self.first_attempts.insert(test.id.clone(), key.clone());
                key
            }
        };

        let replay = !self.config.is_record_test(&key.fqtn)
            && !key.force_record
            && self.index.contains(&key.fqtn);
        let mode = if replay {
            TestMode::Replaying
        } else {
            TestMode::Recording
        };

        let phase = self.test_phase(&key.fqtn).begin(mode)?;
        self.phases.insert(key.fqtn.clone(), phase);

        if self.config.options.clean_mocks {
            self.observed.insert(key.fqtn.clone());
        }

        let table = match (mode, self.index.get(&key.fqtn)) {
            (TestMode::Replaying, Some(records)) => RouteTable::from_records(records),
            _ => RouteTable::default(),
        };

        diag!(
            self.debug_enabled(),
            test = %key.fqtn,
            %mode,
            attempt = test.attempt,
            force_record = key.force_record,
            mocks = table.len(),
            "Test started"
        );

        self.active = Some(ActiveTest {
            key,
            mode,
            routes: Vec::new(),
            pending: HashMap::new(),
            table,
        });
        Ok(mode)
    }

    /// Handle an intercepted request.
    pub fn on_request(&mut self, request: RequestEvent) -> Interception {
        let debug_enabled = self.debug_enabled();
        let Some(active) = self.active.as_mut() else {
            debug!(url = %request.url, "Request outside a test, passing through");
            return Interception::Passthrough { observe: false };
        };
        let Some(method) = HttpMethod::parse(&request.method) else {
            return Interception::Passthrough { observe: false };
        };
        if !self.config.binds(method.as_str(), &request.url)
            || request.is_runner_traffic()
            || self.config.is_blacklisted(&request.url)
        {
            return Interception::Passthrough { observe: false };
        }

        match active.mode {
            TestMode::Recording => {
                active.pending.insert(
                    request.id,
                    PendingRequest {
                        url: request.url,
                        method,
                        body: request.body,
                    },
                );
                Interception::Passthrough { observe: true }
            }
            TestMode::Replaying => {
                let candidates = active.table.candidates(method, &request.url);
                match self.matcher.select(request.body.as_ref(), candidates) {
                    Some(mock) => {
                        diag!(
                            debug_enabled,
                            %method,
                            url = %request.url,
                            status = mock.status,
                            fixture = mock.fixture_id().unwrap_or("-"),
                            "Matched mock"
                        );
                        Interception::Reply(reply_for(&self.store, mock))
                    }
                    None => {
                        let stored: Vec<Option<&Value>> =
                            candidates.iter().map(|c| c.body.as_ref()).collect();
                        let known: Vec<&str> = active.table.urls(method).collect();
                        diag!(
                            debug_enabled,
                            %method,
                            url = %request.url,
                            body = ?request.body,
                            candidates = ?stored,
                            known_urls = ?known,
                            "No mock matched, replying 408"
                        );
                        self.uncaught_filter = true;
                        Interception::Reply(Reply::unmatched())
                    }
                }
            }
        }
    }

    /// Capture the response of an observed request.
    pub fn on_response(&mut self, response: ResponseEvent) {
        let debug_enabled = self.debug_enabled();
        let Some(active) = self.active.as_mut() else {
            debug!(request = response.request_id, "Response outside a test, dropping");
            return;
        };
        let Some(request) = active.pending.remove(&response.request_id) else {
            debug!(request = response.request_id, "Response for an unobserved request, dropping");
            return;
        };

        let observation = Observation {
            url: request.url,
            method: request.method,
            status: response.status,
            data: plain_data(response.body),
            body: request.body,
            headers: filter_headers(&response.headers, &self.config),
        };

        let duplicate = active.routes.iter().any(|route| {
            route.url == observation.url
                && route.method == observation.method
                && route.body == observation.body
        });
        if duplicate {
            diag!(
                debug_enabled,
                method = %observation.method,
                url = %observation.url,
                "Duplicate request, keeping first observation"
            );
            return;
        }

        diag!(
            debug_enabled,
            method = %observation.method,
            url = %observation.url,
            status = observation.status,
            "Recorded response"
        );
        active.routes.push(observation);
    }

    /// Whether an uncaught error should be swallowed: only after a 408
    /// sentinel was sent, and only for the error that sentinel causes.
    pub fn should_swallow_uncaught(&self, message: &str) -> bool {
        self.uncaught_filter && SENTINEL_ERROR.is_match(message)
    }

    /// Finish the live test and stage its mocks.
    ///
    /// Nothing is staged in clean mode, after replay, or when recording saw
    /// no traffic. Otherwise the test's entry is replaced and the external
    /// fixtures of the old entry are staged for deletion, except those the
    /// new entry reuses or another test still references.
    pub async fn after_each(&mut self) -> Result<TestOutcome> {
        let active = self
            .active
            .take()
            .ok_or_else(|| AutorecordError::transition("idle", TestPhase::Persisted.to_string()))?;
        let fqtn = active.key.fqtn;

        let phase = self.test_phase(&fqtn).persist()?;
        self.phases.insert(fqtn.clone(), phase);

        if !active.pending.is_empty() {
            debug!(test = %fqtn, pending = active.pending.len(), "Requests without a response were dropped");
        }

        let mut outcome = TestOutcome {
            fqtn: fqtn.clone(),
            mode: active.mode,
            recorded: 0,
            replaced: false,
        };
        if self.config.options.clean_mocks || active.mode == TestMode::Replaying {
            return Ok(outcome);
        }

        let mut records = Vec::with_capacity(active.routes.len());
        let mut fixtures = Vec::new();
        for observation in active.routes {
            let normalized = self.normalizer.normalize(observation)?;
            records.push(normalized.record);
            fixtures.extend(normalized.fixture);
        }
        outcome.recorded = records.len();

        if records.is_empty() {
            diag!(self.debug_enabled(), test = %fqtn, "No traffic recorded, keeping existing mocks");
            return Ok(outcome);
        }

        if let Some(old) = self.index.get(&fqtn) {
            let reused: HashSet<&str> = records.iter().filter_map(MockRecord::fixture_id).collect();
            let mut stale: Vec<String> = Vec::new();
            for id in old.iter().filter_map(MockRecord::fixture_id) {
                if !reused.contains(id) && !stale.iter().any(|s| s == id) {
                    stale.push(id.to_string());
                }
            }

            for fixture_id in stale {
                if let Some(holder) = self.holder_elsewhere(&fqtn, &fixture_id).await? {
                    warn!(fixture = %fixture_id, holder = %holder, "Fixture still in use, not deleting");
                    self.store
                        .log(LogMessage::warn(format!(
                            "{fixture_id} is used in {holder}, not deleting"
                        )))
                        .await?;
                    continue;
                }
                self.staging.remove(fixture_id);
            }
            outcome.replaced = true;
        }

        for (fixture_id, data) in fixtures {
            self.staging.add(fixture_id, data);
        }
        self.index.insert(fqtn, records);
        Ok(outcome)
    }

    /// First test other than `fqtn` that references a fixture: in this spec,
    /// then in any other spec.
    async fn holder_elsewhere(
        &mut self,
        fqtn: &str,
        fixture_id: &str,
    ) -> Result<Option<FixtureHolder>> {
        let local = self
            .index
            .fixture_refs()
            .find(|(test, id)| *test != fqtn && *id == fixture_id)
            .map(|(test, _)| FixtureHolder {
                spec: self.spec_name.clone(),
                test: test.to_string(),
            });
        if local.is_some() {
            return Ok(local);
        }

        let index = self.cross_spec.get(&self.store, &self.spec_name).await?;
        Ok(index.holders(fixture_id).first().cloned())
    }

    /// Flush the spec: prune (clean mode), delete, write the index, write
    /// fixtures.
    pub async fn after_spec(&mut self) -> Result<ReconcileSummary> {
        self.require_spec_phase(SpecPhase::Running, "finished")?;
        if let Some(active) = &self.active {
            return Err(AutorecordError::transition(
                self.test_phase(&active.key.fqtn).to_string(),
                "finished",
            ));
        }
        self.phase = SpecPhase::Finished;

        let retain = self.config.options.clean_mocks.then_some(&self.observed);
        reconciler::reconcile(
            &self.store,
            &self.spec_name,
            &mut self.index,
            std::mem::take(&mut self.staging),
            retain,
            &mut self.cross_spec,
        )
        .await
    }

    /// Read an external fixture.
    pub async fn load_fixture(&self, fixture_id: &str) -> Result<Option<Value>> {
        self.store.read_fixture(fixture_id).await
    }

    /// The body a reply should carry, reading fixtures through the store.
    pub async fn resolve_body(&self, body: &ReplyBody) -> Result<Value> {
        match body {
            ReplyBody::Inline(value) => Ok(value.clone()),
            ReplyBody::Fixture { fixture_id, path } => self
                .load_fixture(fixture_id)
                .await?
                .ok_or_else(|| {
                    AutorecordError::host_task("readFile", format!("{} does not exist", path.display()))
                }),
        }
    }
}

fn reply_for(store: &FixtureStore, mock: &MockRecord) -> Reply {
    let body = match &mock.payload {
        MockPayload::Inline(value) => ReplyBody::Inline(value.clone()),
        MockPayload::External(fixture_id) => ReplyBody::Fixture {
            fixture_id: fixture_id.clone(),
            path: store.fixture_path(fixture_id),
        },
    };
    Reply {
        status: mock.status,
        headers: mock.headers.clone(),
        body,
    }
}
