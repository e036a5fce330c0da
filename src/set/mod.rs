pub mod core;
pub mod export;
pub mod text;

// Re-export the primary types so callers can use `crate::set::*` directly.
pub use self::core::{CapSet, Diff};
pub use export::{ExportConfig, Exported, EXPORT_VERSION, HEADER_LEN, MIN_EXT_FLAG_SIZE};
