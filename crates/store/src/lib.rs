mod error;
mod file;
mod memory;
mod record;
mod traits;

pub mod conformance;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use record::{ms_from_rfc3339, rfc3339_from_ms, SnapshotRecord};
pub use traits::SnapshotStore;
