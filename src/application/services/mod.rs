//! Application services
//!
//! Concrete services that orchestrate domain logic. Services depend on I/O
//! boundary traits (FileSystem, FileLister, LensEngine) but are themselves
//! concrete structs, not traits.

mod loader;

pub use loader::{
    record_file_error, FileError, FileErrorKind, LoadReport, LoadSaveController, SaveReport,
    TreeAnchors, BACKUP_SUFFIX, NEWFILE_SUFFIX,
};
