//! Load/save controller
//!
//! Keeps `/files` consistent with the files on disk. Per-file failures never
//! abort a load or save; they are collected in the report and projected
//! under `/augeas/files/<file>/error`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use generational_arena::Index;
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

use crate::application::registry::TransformRegistry;
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::SaveMode;
use crate::domain::{ErrorCode, Fragment, Transform, Tree};
use crate::infrastructure::traits::{FileLister, FileSystem, LensEngine};
use crate::infrastructure::LensError;
use crate::util::path::{file_tree_path, with_suffix, PathExt};

/// Suffix of the backup written in [`SaveMode::Backup`].
pub const BACKUP_SUFFIX: &str = ".augsave";
/// Suffix of the file written in [`SaveMode::NewFile`].
pub const NEWFILE_SUFFIX: &str = ".augnew";

/// Why a single file could not be loaded or saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    MxfmLoad,
    ReadFailed,
    ParseFailed,
    LensNotFound,
    LensSyntax,
    MxfmSave,
    PutFailed,
    WriteFailed,
}

impl FileErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            FileErrorKind::MxfmLoad => "mxfm_load",
            FileErrorKind::ReadFailed => "read_failed",
            FileErrorKind::ParseFailed => "parse_failed",
            FileErrorKind::LensNotFound => "lens_not_found",
            FileErrorKind::LensSyntax => "lens_syntax",
            FileErrorKind::MxfmSave => "mxfm_save",
            FileErrorKind::PutFailed => "put_failed",
            FileErrorKind::WriteFailed => "write_failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            FileErrorKind::MxfmLoad,
            FileErrorKind::ReadFailed,
            FileErrorKind::ParseFailed,
            FileErrorKind::LensNotFound,
            FileErrorKind::LensSyntax,
            FileErrorKind::MxfmSave,
            FileErrorKind::PutFailed,
            FileErrorKind::WriteFailed,
        ]
        .into_iter()
        .find(|k| k.name() == name)
    }

    pub fn code(self) -> ErrorCode {
        match self {
            FileErrorKind::MxfmLoad | FileErrorKind::MxfmSave => ErrorCode::MultipleTransforms,
            FileErrorKind::ReadFailed | FileErrorKind::WriteFailed => ErrorCode::FileAccess,
            FileErrorKind::ParseFailed | FileErrorKind::PutFailed => ErrorCode::CmdRun,
            FileErrorKind::LensNotFound => ErrorCode::NoLens,
            FileErrorKind::LensSyntax => ErrorCode::Syntax,
        }
    }

    pub fn is_save_error(self) -> bool {
        matches!(
            self,
            FileErrorKind::MxfmSave | FileErrorKind::PutFailed | FileErrorKind::WriteFailed
        )
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A per-file failure. `file` is root-relative (`/etc/hosts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub file: String,
    pub kind: FileErrorKind,
    pub message: String,
    pub lens: Option<String>,
    pub pos: Option<usize>,
    pub line: Option<usize>,
    pub char: Option<usize>,
}

impl FileError {
    fn new(file: &str, kind: FileErrorKind, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            kind,
            message: message.into(),
            lens: None,
            pos: None,
            line: None,
            char: None,
        }
    }

    fn with_lens(mut self, lens: &str) -> Self {
        self.lens = Some(lens.to_string());
        self
    }

    fn from_lens_error(file: &str, lens: &str, err: LensError, loading: bool) -> Self {
        let kind = match &err {
            LensError::NotFound(_) => FileErrorKind::LensNotFound,
            LensError::Syntax(_) => FileErrorKind::LensSyntax,
            _ if loading => FileErrorKind::ParseFailed,
            _ => FileErrorKind::PutFailed,
        };
        let mut out = FileError::new(file, kind, err.to_string()).with_lens(lens);
        if let LensError::Parse { message, pos, line, char } = err {
            out.message = message;
            out.pos = Some(pos);
            out.line = Some(line);
            out.char = Some(char);
        }
        out
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    /// Root-relative paths of the files now in the tree
    pub loaded: Vec<String>,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Default, Clone)]
pub struct SaveReport {
    /// Tree paths (`/files/etc/hosts`) of the files written
    pub saved: Vec<String>,
    /// Root-relative paths of files deleted because their node was removed
    pub removed: Vec<String>,
    pub errors: Vec<FileError>,
}

/// Where the controller reads and writes inside the session tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeAnchors {
    /// `/files`
    pub files: Index,
    /// `/augeas/files`
    pub meta_files: Index,
    /// `/augeas/events`
    pub events: Index,
}

#[derive(Debug, Clone)]
struct LoadedFile {
    lens: String,
    text: String,
}

pub struct LoadSaveController {
    fs: Arc<dyn FileSystem>,
    lister: Arc<dyn FileLister>,
    lenses: Arc<dyn LensEngine>,
    root: PathBuf,
    enable_span: bool,
    loaded: BTreeMap<String, LoadedFile>,
}

fn labels(file: &str) -> Vec<&str> {
    file.split('/').filter(|s| !s.is_empty()).collect()
}

fn find_labels(tree: &Tree, start: Index, labels: &[&str]) -> Option<Index> {
    labels
        .iter()
        .try_fold(start, |current, label| tree.child(current, label))
}

fn set_filename(fragments: &mut [Fragment], filename: &str) {
    for fragment in fragments {
        if let Some(span) = fragment.span.as_mut() {
            span.filename = filename.to_string();
        }
        set_filename(&mut fragment.children, filename);
    }
}

impl LoadSaveController {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        lister: Arc<dyn FileLister>,
        lenses: Arc<dyn LensEngine>,
        root: impl Into<PathBuf>,
        enable_span: bool,
    ) -> Self {
        Self {
            fs,
            lister,
            lenses,
            root: root.into(),
            enable_span,
            loaded: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lenses(&self) -> &Arc<dyn LensEngine> {
        &self.lenses
    }

    pub fn is_loaded(&self, file: &str) -> bool {
        self.loaded.contains_key(file)
    }

    /// Discard `/files` and reload every file selected by the registry.
    #[instrument(level = "debug", skip_all)]
    pub fn load(
        &mut self,
        tree: &mut Tree,
        registry: &TransformRegistry,
        anchors: TreeAnchors,
    ) -> ApplicationResult<LoadReport> {
        tree.clear_children(anchors.files);
        tree.clear_children(anchors.meta_files);
        self.loaded.clear();

        let mut claims: BTreeMap<String, Vec<&Transform>> = BTreeMap::new();
        for transform in registry.iter() {
            let include = transform.include_globs()?;
            let exclude = transform.exclude_globs()?;
            let files = self
                .lister
                .list_files(&self.root, &include, &exclude)
                .map_err(|e| ApplicationError::CommandFailed {
                    context: format!("listing files for transform {}: {e}", transform.name),
                })?;
            for file in files {
                claims.entry(file).or_default().push(transform);
            }
        }

        let mut report = LoadReport::default();
        for (file, transforms) in claims {
            let result = match transforms.as_slice() {
                [transform] => self.load_file(tree, anchors, &file, &transform.lens),
                _ => Err(FileError::new(
                    &file,
                    FileErrorKind::MxfmLoad,
                    format!(
                        "Lenses {} could be used to load this file",
                        transforms.iter().map(|t| t.lens.as_str()).join(", ")
                    ),
                )),
            };
            match result {
                Ok(()) => report.loaded.push(file),
                Err(err) => {
                    warn!("{}: {} ({})", err.file, err.kind, err.message);
                    record_file_error(tree, anchors.meta_files, &err);
                    report.errors.push(err);
                }
            }
        }

        let root = tree.root();
        tree.clear_dirty(root);
        info!(
            "loaded {} files, {} errors",
            report.loaded.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn load_file(
        &mut self,
        tree: &mut Tree,
        anchors: TreeAnchors,
        file: &str,
        lens: &str,
    ) -> Result<(), FileError> {
        debug!("loading {} with {}", file, lens);
        self.lenses
            .check(lens)
            .map_err(|e| FileError::from_lens_error(file, lens, e, true))?;
        let path = self.root.join_rooted(file);
        let text = self.fs.read_to_string(&path).map_err(|e| {
            FileError::new(file, FileErrorKind::ReadFailed, e.to_string()).with_lens(lens)
        })?;
        let mut fragments = self
            .lenses
            .get(lens, &text)
            .map_err(|e| FileError::from_lens_error(file, lens, e, true))?;
        if self.enable_span {
            set_filename(&mut fragments, &path.to_string_lossy());
        } else {
            fragments.iter_mut().for_each(Fragment::strip_spans);
        }

        let node = tree.ensure_labels(anchors.files, &labels(file));
        tree.graft(node, &fragments);
        self.record_meta(tree, anchors.meta_files, file, lens);
        self.loaded.insert(
            file.to_string(),
            LoadedFile {
                lens: lens.to_string(),
                text,
            },
        );
        Ok(())
    }

    fn record_meta(&self, tree: &mut Tree, meta_files: Index, file: &str, lens: &str) {
        let meta = tree.ensure_labels(meta_files, &labels(file));
        let path = tree.ensure_child(meta, "path");
        tree.set_value_at(path, Some(file_tree_path(file)));
        let lens_node = tree.ensure_child(meta, "lens");
        tree.set_value_at(lens_node, Some(lens.to_string()));
    }

    /// Write every modified file back to disk according to `mode`.
    #[instrument(level = "debug", skip(self, tree, registry, anchors))]
    pub fn save(
        &mut self,
        tree: &mut Tree,
        registry: &TransformRegistry,
        anchors: TreeAnchors,
        mode: SaveMode,
    ) -> ApplicationResult<SaveReport> {
        clear_save_errors(tree, anchors.meta_files);
        tree.clear_children(anchors.events);

        let mut report = SaveReport::default();
        let writes_in_place = matches!(mode, SaveMode::Overwrite | SaveMode::Backup);

        // Files whose node disappeared
        let gone: Vec<String> = self
            .loaded
            .keys()
            .filter(|file| find_labels(tree, anchors.files, &labels(file)).is_none())
            .cloned()
            .collect();
        for file in gone {
            match self.remove_file(&file, mode) {
                Ok(true) => {
                    self.loaded.remove(&file);
                    if let Some(meta) = find_labels(tree, anchors.meta_files, &labels(&file)) {
                        tree.remove_subtree(meta);
                    }
                    report.removed.push(file);
                }
                Ok(false) => {}
                Err(err) => {
                    record_file_error(tree, anchors.meta_files, &err);
                    report.errors.push(err);
                }
            }
        }

        for (file, node) in self.dirty_files(tree, registry, anchors.files) {
            match self.save_file(tree, registry, &file, node, mode) {
                Ok(Some(lens)) => {
                    tree.append_child(anchors.events, "saved", Some(file_tree_path(&file)));
                    self.record_meta(tree, anchors.meta_files, &file, &lens);
                    if writes_in_place {
                        tree.clear_dirty(node);
                    }
                    report.saved.push(file_tree_path(&file));
                }
                Ok(None) => tree.clear_dirty(node),
                Err(err) => {
                    warn!("{}: {} ({})", err.file, err.kind, err.message);
                    record_file_error(tree, anchors.meta_files, &err);
                    report.errors.push(err);
                }
            }
        }

        if report.errors.is_empty() && writes_in_place {
            tree.clear_dirty(anchors.files);
        }
        info!(
            "saved {} files, removed {}, {} errors",
            report.saved.len(),
            report.removed.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Dirty file nodes below `/files`: nodes of loaded files, or nodes whose
    /// path some transform accepts.
    fn dirty_files(&self, tree: &Tree, registry: &TransformRegistry, files: Index) -> Vec<(String, Index)> {
        let mut out = Vec::new();
        let mut stack: Vec<(Index, String)> = tree
            .children(files)
            .iter()
            .rev()
            .map(|&c| (c, format!("/{}", tree.label(c))))
            .collect();
        while let Some((node, file)) = stack.pop() {
            if !tree.is_dirty(node) {
                continue;
            }
            if self.loaded.contains_key(&file) || !registry.accepting(&file).is_empty() {
                out.push((file, node));
                continue;
            }
            for &child in tree.children(node).iter().rev() {
                stack.push((child, format!("{file}/{}", tree.label(child))));
            }
        }
        out
    }

    /// Returns the lens used when the file was written (or would have been,
    /// in noop mode), `None` when the text did not change.
    fn save_file(
        &mut self,
        tree: &Tree,
        registry: &TransformRegistry,
        file: &str,
        node: Index,
        mode: SaveMode,
    ) -> Result<Option<String>, FileError> {
        let (lens, original) = match self.loaded.get(file) {
            Some(loaded) => (loaded.lens.clone(), Some(loaded.text.clone())),
            None => match registry.accepting(file).as_slice() {
                [transform] => (transform.lens.clone(), None),
                many => {
                    return Err(FileError::new(
                        file,
                        FileErrorKind::MxfmSave,
                        format!(
                            "Lenses {} could be used to save this file",
                            many.iter().map(|t| t.lens.as_str()).join(", ")
                        ),
                    ))
                }
            },
        };

        let fragments: Vec<Fragment> = tree
            .children(node)
            .iter()
            .map(|&c| tree.to_fragment(c))
            .collect();
        let text = self
            .lenses
            .put(&lens, &fragments, original.as_deref())
            .map_err(|e| FileError::from_lens_error(file, &lens, e, false))?;
        if original.as_deref() == Some(text.as_str()) {
            debug!("{} unchanged", file);
            return Ok(None);
        }

        let path = self.root.join_rooted(file);
        let write_failed =
            |e: std::io::Error| FileError::new(file, FileErrorKind::WriteFailed, e.to_string()).with_lens(&lens);
        if let Some(parent) = path.parent() {
            if mode != SaveMode::Noop && !self.fs.exists(parent) {
                self.fs.create_dir_all(parent).map_err(write_failed)?;
            }
        }
        match mode {
            SaveMode::Overwrite => self.fs.write_atomic(&path, &text).map_err(write_failed)?,
            SaveMode::Backup => {
                if self.fs.exists(&path) {
                    self.fs
                        .copy(&path, &with_suffix(&path, BACKUP_SUFFIX))
                        .map_err(write_failed)?;
                }
                self.fs.write_atomic(&path, &text).map_err(write_failed)?;
            }
            SaveMode::NewFile => self
                .fs
                .write(&with_suffix(&path, NEWFILE_SUFFIX), &text)
                .map_err(write_failed)?,
            SaveMode::Noop => {}
        }
        debug!("saved {} ({})", file, mode);

        if matches!(mode, SaveMode::Overwrite | SaveMode::Backup) {
            self.loaded.insert(
                file.to_string(),
                LoadedFile {
                    lens: lens.clone(),
                    text,
                },
            );
        }
        Ok(Some(lens))
    }

    /// Delete a loaded file whose node was removed; returns whether the file
    /// is gone from disk now.
    fn remove_file(&self, file: &str, mode: SaveMode) -> Result<bool, FileError> {
        let path = self.root.join_rooted(file);
        let result = match mode {
            SaveMode::Overwrite => self.fs.remove_file(&path),
            SaveMode::Backup => self.fs.rename(&path, &with_suffix(&path, BACKUP_SUFFIX)),
            SaveMode::NewFile | SaveMode::Noop => return Ok(false),
        };
        match result {
            Ok(()) => {
                info!("removed {}", file);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(FileError::new(file, FileErrorKind::WriteFailed, e.to_string())),
        }
    }
}

/// Project `err` under `/augeas/files/<file>/error`.
pub fn record_file_error(tree: &mut Tree, meta_files: Index, err: &FileError) {
    let meta = tree.ensure_labels(meta_files, &labels(&err.file));
    let path = tree.ensure_child(meta, "path");
    tree.set_value_at(path, Some(file_tree_path(&err.file)));
    if let Some(lens) = &err.lens {
        let node = tree.ensure_child(meta, "lens");
        tree.set_value_at(node, Some(lens.clone()));
    }
    if let Some(old) = tree.child(meta, "error") {
        tree.remove_subtree(old);
    }
    let error = tree.append_child(meta, "error", Some(err.kind.name().to_string()));
    tree.append_child(error, "message", Some(err.message.clone()));
    for (label, value) in [("pos", err.pos), ("line", err.line), ("char", err.char)] {
        if let Some(v) = value {
            tree.append_child(error, label, Some(v.to_string()));
        }
    }
}

fn clear_save_errors(tree: &mut Tree, meta_files: Index) {
    let stale: Vec<Index> = tree
        .iter(meta_files)
        .filter(|(_, n)| {
            n.label == "error"
                && n.value
                    .as_deref()
                    .and_then(FileErrorKind::from_name)
                    .is_some_and(FileErrorKind::is_save_error)
        })
        .map(|(idx, _)| idx)
        .collect();
    for idx in stale {
        tree.remove_subtree(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::lenses::BuiltinLenses;
    use crate::infrastructure::traits::{RealFileSystem, WalkDirLister};
    use crate::domain::PathExpr;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> (TempDir, LoadSaveController, Tree, TreeAnchors) {
        let tmp = TempDir::new().unwrap();
        for (file, content) in files {
            let path = tmp.path().join_rooted(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let controller = LoadSaveController::new(
            Arc::new(RealFileSystem),
            Arc::new(WalkDirLister),
            Arc::new(BuiltinLenses::new()),
            tmp.path(),
            false,
        );
        let mut tree = Tree::new();
        let root = tree.root();
        let anchors = TreeAnchors {
            files: tree.ensure_labels(root, &["files"]),
            meta_files: tree.ensure_labels(root, &["augeas", "files"]),
            events: tree.ensure_labels(root, &["augeas", "events"]),
        };
        (tmp, controller, tree, anchors)
    }

    fn hosts_registry() -> TransformRegistry {
        let mut registry = TransformRegistry::new();
        registry
            .register(None, "Hosts.lns", &["/etc/hosts".to_string()], &[])
            .unwrap();
        registry
    }

    #[test]
    fn given_two_transforms_claiming_file_when_loading_then_mxfm_and_not_loaded() {
        let (_tmp, mut controller, mut tree, anchors) = setup(&[("/etc/hosts", "127.0.0.1 localhost\n")]);
        let mut registry = hosts_registry();
        registry
            .register(Some("Other"), "Shellvars.lns", &["/etc/hosts".to_string()], &[])
            .unwrap();

        let report = controller.load(&mut tree, &registry, anchors).unwrap();

        assert!(report.loaded.is_empty());
        assert_eq!(report.errors[0].kind, FileErrorKind::MxfmLoad);
        let root = tree.root();
        let err = PathExpr::parse("/augeas/files/etc/hosts/error").unwrap();
        assert_eq!(tree.get(&err, root).unwrap(), Some("mxfm_load"));
        assert!(tree.children(anchors.files).is_empty());
    }

    #[test]
    fn given_unparseable_file_when_loading_then_parse_failed_with_position() {
        let (_tmp, mut controller, mut tree, anchors) = setup(&[("/etc/hosts", "127.0.0.1\n")]);

        let report = controller.load(&mut tree, &hosts_registry(), anchors).unwrap();

        let err = &report.errors[0];
        assert_eq!(err.kind, FileErrorKind::ParseFailed);
        assert_eq!((err.line, err.char), (Some(1), Some(10)));
        let root = tree.root();
        let line = PathExpr::parse("/augeas/files/etc/hosts/error/line").unwrap();
        assert_eq!(tree.get(&line, root).unwrap(), Some("1"));
    }

    #[test]
    fn given_unchanged_tree_when_saving_then_nothing_written() {
        let (_tmp, mut controller, mut tree, anchors) = setup(&[("/etc/hosts", "127.0.0.1 localhost\n")]);
        let registry = hosts_registry();
        controller.load(&mut tree, &registry, anchors).unwrap();

        let report = controller
            .save(&mut tree, &registry, anchors, SaveMode::Overwrite)
            .unwrap();

        assert!(report.saved.is_empty());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn given_error_kind_names_when_round_tripping_then_identity() {
        for kind in [FileErrorKind::MxfmLoad, FileErrorKind::WriteFailed, FileErrorKind::LensSyntax] {
            assert_eq!(FileErrorKind::from_name(kind.name()), Some(kind));
        }
        assert!(FileErrorKind::PutFailed.is_save_error());
        assert!(!FileErrorKind::ReadFailed.is_save_error());
    }
}
