//! Host Task Bridge backends.
//!
//! - `fs` - local file system, used by the CLI and by hosts that run the
//!   engine in-process
//! - `inmemory` - in-memory file tree for tests and dry runs

mod fs;
mod inmemory;

pub use fs::FsHost;
pub use inmemory::InMemoryHost;
