use std::path::{Component, Path, PathBuf};

use crate::domain::path::join_labels;

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables are left as written.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

pub trait PathExt {
    /// Resolve a root-relative file path (`/etc/hosts`) below `self`.
    fn join_rooted(&self, file: &str) -> PathBuf;
}

impl PathExt for Path {
    fn join_rooted(&self, file: &str) -> PathBuf {
        let mut out = self.to_path_buf();
        for component in Path::new(file).components() {
            if let Component::Normal(part) = component {
                out.push(part);
            }
        }
        out
    }
}

/// Tree path of a file below `/files`: `/etc/hosts` → `/files/etc/hosts`.
pub fn file_tree_path(file: &str) -> String {
    format!("/files{}", join_labels(file.split('/').filter(|s| !s.is_empty())))
}

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
