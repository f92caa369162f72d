//! Error conversion helpers for common I/O operations
//!
//! Provides extension traits for cleaner error handling with path context.

use std::io;
use std::path::Path;

use crate::application::ApplicationResult;
use crate::infrastructure::InfraError;

/// Extension trait for converting `io::Result` to `ApplicationResult` with context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    ///
    /// # Example
    /// ```ignore
    /// fs.read_to_string(&path)
    ///     .with_path_context("read", &path)?;
    /// ```
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T> {
        self.map_err(|e| InfraError::io(format!("{}: {}", action, path.display()), e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;

    #[test]
    fn given_io_error_when_adding_context_then_file_access_code() {
        let res: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = res.with_path_context("read", Path::new("/etc/hosts")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileAccess);
        assert_eq!(err.details(), "read: /etc/hosts: gone");
    }
}
