//! Automatic HTTP record-and-replay for browser-driven end-to-end tests.
//!
//! The first run of a test records its network traffic into a per-spec mock
//! index keyed by the test's fully-qualified name. Later runs answer the same
//! requests from the stored mocks, so the test never reaches the backend.
//!
//! # Module Structure
//!
//! - `session` - Per-spec controller driven by the host's lifecycle hooks
//! - `interception` - Request/response events and the engine's replies
//! - `matcher` - Replay-time request body matching
//! - `recording` - Mock records, the mock index and normalization
//! - `store` - Mock index and external fixture persistence
//! - `fixture_index` - Which tests reference which external fixtures
//! - `reconciler` - Spec-end flush and process-level maintenance
//! - `host` - Host Task Bridge trait; `backends` implements it
//! - `config` - Configuration loading and compiled patterns

pub mod backends;
pub mod config;
pub mod error;
pub mod fixture_index;
pub mod host;
pub mod interception;
pub mod matcher;
pub mod reconciler;
pub mod recording;
pub mod session;
pub mod store;

pub use backends::{FsHost, InMemoryHost};
pub use config::{AutorecordConfig, CompiledConfig, Config};
pub use error::{AutorecordError, Result};
pub use host::{HostLayout, HostTasks, LogLevel, LogMessage};
pub use interception::{Interception, Reply, ReplyBody, RequestEvent, ResponseBody, ResponseEvent};
pub use session::{SpecSession, TestInfo, TestMode, TestOutcome, TestPhase};
