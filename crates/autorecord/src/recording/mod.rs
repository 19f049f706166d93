//! Recording data model and the normalization applied before storage.
//!
//! # Module Structure
//!
//! - `types` - Mock records, HTTP methods and the per-spec mock index
//! - `normalizer` - Observed exchange to mock record, fixture externalization
//! - `naming` - Filename sanitizing, content hashing and URL parts

mod naming;
mod normalizer;
mod types;

pub use naming::{object_hash, sanitize_filename, UrlParts};
pub use normalizer::{
    filter_headers, plain_data, separate_fixture_id, size_in_mib, NormalizedRecord, Normalizer,
    Observation,
};
pub use types::{HttpMethod, MockIndex, MockPayload, MockRecord, INDEX_VERSION, VERSION_KEY};
