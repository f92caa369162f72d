//! I/O boundary traits for testability
//!
//! These traits abstract the filesystem, file listing and the lens engine,
//! allowing the session to be tested with mock implementations.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::domain::{Fragment, Glob, Transform};
use crate::infrastructure::error::LensError;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write string content to file.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Replace the file with `content` so readers never see a partial write.
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Copy file from source to destination.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Rename/move a file.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Lists the files selected by a transform.
pub trait FileLister: Send + Sync {
    /// Files under `root` matching any include and no exclude pattern.
    ///
    /// Returned paths are relative to `root` but start with `/`
    /// (`/etc/hosts`), sorted.
    fn list_files(&self, root: &Path, include: &[Glob], exclude: &[Glob]) -> io::Result<Vec<String>>;
}

/// Bidirectional text <-> tree transformation, addressed by lens name.
pub trait LensEngine: Send + Sync {
    /// Fails if `lens` is malformed or unknown.
    fn check(&self, lens: &str) -> Result<(), LensError>;

    fn get(&self, lens: &str, text: &str) -> Result<Vec<Fragment>, LensError>;

    /// `original` is the text the fragments were loaded from, if any.
    fn put(&self, lens: &str, fragments: &[Fragment], original: Option<&str>) -> Result<String, LensError>;

    /// Transforms registered automatically when a session opens.
    fn autoload(&self) -> Vec<Transform> {
        Vec::new()
    }

    /// Directories searched for lens modules.
    fn set_search_path(&self, _paths: &[PathBuf]) {}
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        use std::io::Write;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        if let Ok(meta) = std::fs::metadata(path) {
            std::fs::set_permissions(tmp.path(), meta.permissions())?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

/// Walks the directory tree below each include pattern's literal prefix.
#[derive(Debug, Default)]
pub struct WalkDirLister;

impl FileLister for WalkDirLister {
    fn list_files(&self, root: &Path, include: &[Glob], exclude: &[Glob]) -> io::Result<Vec<String>> {
        let mut found = Vec::new();
        for glob in include {
            let prefix = glob.literal_prefix().trim_start_matches('/');
            let start = root.join(prefix);
            if !start.exists() {
                continue;
            }
            for entry in WalkDir::new(&start).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if e.io_error().is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied) => {
                        continue
                    }
                    Err(e) => return Err(io::Error::other(e.to_string())),
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(root) else {
                    continue;
                };
                let rel = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
                if glob.matches(&rel) && !exclude.iter().any(|g| g.matches(&rel)) {
                    found.push(rel);
                }
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn given_globs_when_listing_then_returns_sorted_matches_without_excluded() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("etc/default")).unwrap();
        std::fs::write(tmp.path().join("etc/hosts"), "").unwrap();
        std::fs::write(tmp.path().join("etc/default/grub"), "").unwrap();
        std::fs::write(tmp.path().join("etc/default/grub.bak"), "").unwrap();
        std::fs::write(tmp.path().join("etc/default/locale"), "").unwrap();

        let include = vec![Glob::new("/etc/default/*").unwrap(), Glob::new("/etc/hosts").unwrap()];
        let exclude = vec![Glob::new("*.bak").unwrap()];
        let files = WalkDirLister
            .list_files(tmp.path(), &include, &exclude)
            .unwrap();

        assert_eq!(files, vec!["/etc/default/grub", "/etc/default/locale", "/etc/hosts"]);
    }

    #[test]
    fn given_existing_file_when_writing_atomically_then_content_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hosts");
        std::fs::write(&path, "old\n").unwrap();

        RealFileSystem.write_atomic(&path, "new\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
