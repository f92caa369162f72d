//! Error translation
//!
//! The session writes the outcome of every operation into `/augeas/error`.
//! The tree is the only store of that record: callers reading the subtree
//! and the typed errors returned from the API always agree because both are
//! derived from the same nodes.

use generational_arena::Index;

use crate::application::services::FileErrorKind;
use crate::domain::{ErrorCode, ErrorRecord, Tree};
use crate::error::{AugError, AugResult};

/// Where a failed legacy command points the caller.
pub const ERROR_HINT: &str = "/augeas//error";

pub struct ErrorTranslator;

impl ErrorTranslator {
    /// Overwrite the error subtree at `error` with `record`.
    pub fn project(tree: &mut Tree, error: Index, record: &ErrorRecord) {
        tree.clear_children(error);
        tree.set_value_at(error, Some(record.code.name().to_string()));
        tree.append_child(error, "message", Some(record.message.clone()));
        if let Some(details) = &record.details {
            tree.append_child(error, "details", Some(details.clone()));
        }
    }

    /// Read the record back from the error subtree.
    pub fn read(tree: &Tree, error: Index) -> ErrorRecord {
        let code = tree
            .value(error)
            .and_then(ErrorCode::from_name)
            .unwrap_or(ErrorCode::Internal);
        let child_value = |label: &str| {
            tree.child(error, label)
                .and_then(|c| tree.value(c))
                .map(str::to_string)
        };
        ErrorRecord {
            code,
            message: child_value("message").unwrap_or_else(|| code.message().to_string()),
            details: child_value("details"),
        }
    }

    /// Typed outcome of the last operation from its record and the legacy
    /// result code. A negative `ret` is a failure even when the record says
    /// otherwise.
    pub fn check(tree: &Tree, error: Index, ret: i32) -> AugResult<()> {
        let record = Self::read(tree, error);
        if let Some(err) = AugError::from_code(record.code, record.full_message()) {
            return Err(err);
        }
        if ret < 0 {
            return Err(AugError::CommandExecution(format!(
                "{} (see {ERROR_HINT})",
                ErrorCode::CmdRun.message()
            )));
        }
        Ok(())
    }

    /// Per-file errors recorded under `meta_files`, keyed by root-relative
    /// file path.
    pub fn file_errors(tree: &Tree, meta_files: Index) -> Vec<(String, AugError)> {
        tree.iter(meta_files)
            .filter(|(_, n)| n.label == "error" && n.parent != Some(meta_files))
            .filter_map(|(idx, n)| {
                let kind = n.value.as_deref().and_then(FileErrorKind::from_name)?;
                let message = tree
                    .child(idx, "message")
                    .and_then(|m| tree.value(m))
                    .unwrap_or_default();
                let file = Self::file_of(tree, meta_files, n.parent?);
                let err = AugError::from_code(kind.code(), format!("{kind}: {message}"))?;
                Some((file, err))
            })
            .collect()
    }

    fn file_of(tree: &Tree, meta_files: Index, mut node: Index) -> String {
        let mut labels = Vec::new();
        while node != meta_files {
            labels.push(tree.label(node).to_string());
            match tree.parent(node) {
                Some(parent) => node = parent,
                None => break,
            }
        }
        labels.reverse();
        format!("/{}", labels.join("/"))
    }
}
