pub mod manifest;
pub mod records;

// Re-export common types
pub use records::{FsRecordStore, RecordStore};
