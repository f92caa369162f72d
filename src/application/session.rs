//! Session facade
//!
//! A [`Session`] owns one tree, one transform registry and one load/save
//! controller. Every public operation ends the same way: its outcome is
//! written to `/augeas/error`, and the [`ErrorTranslator`] turns that record
//! (plus the legacy result code) into the value or error the caller sees.

use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use generational_arena::Index;
use tracing::{debug, instrument, warn};

use crate::application::commands;
use crate::application::registry::TransformRegistry;
use crate::application::services::{LoadSaveController, TreeAnchors};
use crate::application::translate::ErrorTranslator;
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::{SaveMode, Settings};
use crate::domain::{DomainError, ErrorRecord, Fragment, PathExpr, Span, Transform, Tree, TreeNodeConvert};
use crate::error::{AugError, AugResult};
use crate::infrastructure::di::ServiceContainer;

/// Open flags; combine with `|`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Keep the original of every saved file as `<file>.augsave`.
    pub const SAVE_BACKUP: Flags = Flags(1);
    /// Write changes to `<file>.augnew` instead of the file.
    pub const SAVE_NEWFILE: Flags = Flags(2);
    /// Compute changes on save, write nothing.
    pub const SAVE_NOOP: Flags = Flags(16);
    /// Do not load files on open.
    pub const NO_LOAD: Flags = Flags(32);
    /// Do not register the lens engine's default transforms.
    pub const NO_MODL_AUTOLOAD: Flags = Flags(64);
    /// Track source spans while loading.
    pub const ENABLE_SPAN: Flags = Flags(128);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

/// Options captured when a session opens. Unset fields fall back to
/// [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub root: Option<PathBuf>,
    pub loadpath: Vec<PathBuf>,
    pub flags: Flags,
    pub context: Option<String>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn loadpath(mut self, dir: impl Into<PathBuf>) -> Self {
        self.loadpath.push(dir.into());
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Nodes of the reserved `/augeas` subtree the session writes to.
#[derive(Debug, Clone, Copy)]
struct Meta {
    context: Index,
    save: Index,
    error: Index,
    load: Index,
}

pub struct Session {
    tree: Tree,
    registry: TransformRegistry,
    controller: LoadSaveController,
    save_mode: SaveMode,
    enable_span: bool,
    meta: Meta,
    anchors: TreeAnchors,
}

fn parse(path: &str) -> ApplicationResult<PathExpr> {
    Ok(PathExpr::parse(path)?)
}

impl Session {
    /// Open a session with settings loaded from the usual config layers.
    pub fn open(options: OpenOptions) -> AugResult<Self> {
        let settings = Settings::load(None).map_err(|e| AugError::Config {
            message: e.to_string(),
        })?;
        Self::open_with(options, ServiceContainer::new(settings))
    }

    /// Open a session on explicit dependencies.
    #[instrument(level = "debug", skip(container))]
    pub fn open_with(options: OpenOptions, container: ServiceContainer) -> AugResult<Self> {
        let settings = container.settings.as_ref();
        let flags = options.flags;

        let root = options.root.clone().unwrap_or_else(|| settings.root.clone());
        let mut loadpath = options.loadpath.clone();
        loadpath.extend(settings.loadpath.iter().map(PathBuf::from));
        let context = options
            .context
            .clone()
            .unwrap_or_else(|| settings.context.clone());
        let context_expr =
            PathExpr::parse(&context).map_err(|e| AugError::Argument(format!("context: {e}")))?;
        if !context_expr.absolute {
            return Err(AugError::Argument(format!("context must be absolute: {context}")));
        }

        let save_mode = if flags.contains(Flags::SAVE_NOOP) {
            SaveMode::Noop
        } else if flags.contains(Flags::SAVE_NEWFILE) {
            SaveMode::NewFile
        } else if flags.contains(Flags::SAVE_BACKUP) {
            SaveMode::Backup
        } else {
            settings.save_mode
        };
        let enable_span = flags.contains(Flags::ENABLE_SPAN) || settings.enable_span;

        container.lenses.set_search_path(&loadpath);

        let mut tree = Tree::new();
        let top = tree.root();
        let augeas = tree.append_child(top, "augeas", None);
        tree.append_child(augeas, "root", Some(root.to_string_lossy().into_owned()));
        let context_node = tree.append_child(augeas, "context", Some(context));
        let joined = loadpath
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");
        tree.append_child(augeas, "loadpath", Some(joined));
        let save = tree.append_child(augeas, "save", Some(save_mode.to_string()));
        let span_mode = if enable_span { "enable" } else { "disable" };
        tree.append_child(augeas, "span", Some(span_mode.to_string()));
        let error = tree.append_child(augeas, "error", None);
        let load = tree.append_child(augeas, "load", None);
        let meta_files = tree.append_child(augeas, "files", None);
        let events = tree.append_child(augeas, "events", None);
        tree.set_read_only(augeas, true);
        let files = tree.append_child(top, "files", None);

        let controller = LoadSaveController::new(
            container.fs.clone(),
            container.lister.clone(),
            container.lenses.clone(),
            root,
            enable_span,
        );

        let mut registry = TransformRegistry::new();
        if settings.autoload && !flags.contains(Flags::NO_MODL_AUTOLOAD) {
            for t in container.lenses.autoload() {
                if let Err(e) = registry.register(Some(t.name.as_str()), &t.lens, &t.include, &t.exclude) {
                    warn!("skipping autoload transform {}: {}", t.name, e);
                }
            }
        }

        let mut session = Session {
            tree,
            registry,
            controller,
            save_mode,
            enable_span,
            meta: Meta {
                context: context_node,
                save,
                error,
                load,
            },
            anchors: TreeAnchors {
                files,
                meta_files,
                events,
            },
        };
        session.project_registry();
        ErrorTranslator::project(&mut session.tree, error, &ErrorRecord::none());

        if settings.load_on_open && !flags.contains(Flags::NO_LOAD) {
            session.load()?;
        }
        debug!("session open");
        Ok(session)
    }

    // ------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------

    /// Record the outcome of an operation and translate it.
    fn finish<T>(&mut self, result: ApplicationResult<T>, ret: i32) -> AugResult<T> {
        let record = match &result {
            Ok(_) => ErrorRecord::none(),
            Err(e) => ErrorRecord::new(e.code(), Some(e.details())),
        };
        ErrorTranslator::project(&mut self.tree, self.meta.error, &record);
        ErrorTranslator::check(&self.tree, self.meta.error, ret)?;
        result.map_err(|e| AugError::Internal(e.to_string()))
    }

    /// Record a failure that happened outside a regular operation.
    pub(crate) fn record_failure(&mut self, err: &ApplicationError) {
        let record = ErrorRecord::new(err.code(), Some(err.details()));
        ErrorTranslator::project(&mut self.tree, self.meta.error, &record);
    }

    fn project_registry(&mut self) {
        self.registry.project(&mut self.tree, self.meta.load);
    }

    fn context_expr(&self) -> ApplicationResult<PathExpr> {
        let ctx = self.tree.value(self.meta.context).unwrap_or("/files");
        let expr = parse(ctx)?;
        if !expr.absolute {
            return Err(DomainError::BadArgument(format!("context must be absolute: {ctx}")).into());
        }
        Ok(expr)
    }

    /// Node relative paths in `exprs` resolve against, or `None` when one of
    /// them is relative and the context node does not exist.
    fn lookup_context(&self, exprs: &[&PathExpr]) -> ApplicationResult<Option<Index>> {
        let root = self.tree.root();
        if exprs.iter().all(|e| e.absolute) {
            return Ok(Some(root));
        }
        let expr = self.context_expr()?;
        Ok(self.tree.select(&expr, root).first().copied())
    }

    /// Like [`Self::lookup_context`], but creates a missing context node.
    /// Only operations that create nodes go through here.
    fn context(&mut self, exprs: &[&PathExpr]) -> ApplicationResult<Index> {
        let root = self.tree.root();
        if exprs.iter().all(|e| e.absolute) {
            return Ok(root);
        }
        let expr = self.context_expr()?;
        Ok(self.tree.expand(&expr, root)?)
    }

    fn single(&self, path: &str) -> ApplicationResult<Index> {
        let expr = parse(path)?;
        let ctx = self
            .lookup_context(&[&expr])?
            .ok_or_else(|| DomainError::NoMatch(expr.to_string()))?;
        Ok(self.tree.select_one(&expr, ctx)?)
    }

    // ------------------------------------------------------------
    // Tree operations
    // ------------------------------------------------------------

    /// Value of the single node matching `path`.
    pub fn get(&mut self, path: &str) -> AugResult<Option<String>> {
        let result = self.do_get(path);
        self.finish(result, 0)
    }

    fn do_get(&mut self, path: &str) -> ApplicationResult<Option<String>> {
        let idx = self.single(path)?;
        Ok(self.tree.value(idx).map(str::to_string))
    }

    /// Set the value of the single node matching `path`, creating it if
    /// needed.
    pub fn set(&mut self, path: &str, value: Option<&str>) -> AugResult<()> {
        let result = self.do_set(path, value);
        self.finish(result, 0)
    }

    fn do_set(&mut self, path: &str, value: Option<&str>) -> ApplicationResult<()> {
        let expr = parse(path)?;
        let ctx = self.context(&[&expr])?;
        self.tree.set(&expr, ctx, value)?;
        Ok(())
    }

    /// Set the value of `path` to none.
    pub fn clear(&mut self, path: &str) -> AugResult<()> {
        self.set(path, None)
    }

    /// Set `sub` (relative to each match of `base`, or each match itself
    /// when `sub` is `None`); returns the number of nodes changed.
    pub fn setm(&mut self, base: &str, sub: Option<&str>, value: Option<&str>) -> AugResult<usize> {
        let result = self.do_setm(base, sub, value);
        self.finish(result, 0)
    }

    fn do_setm(&mut self, base: &str, sub: Option<&str>, value: Option<&str>) -> ApplicationResult<usize> {
        let base = parse(base)?;
        let sub = sub.map(parse).transpose()?;
        match self.lookup_context(&[&base])? {
            Some(ctx) => Ok(self.tree.setm(&base, sub.as_ref(), ctx, value)?),
            None => Ok(0),
        }
    }

    /// Remove all matches with their subtrees; returns the number of nodes
    /// removed.
    pub fn rm(&mut self, path: &str) -> AugResult<usize> {
        let result = self.do_rm(path);
        self.finish(result, 0)
    }

    fn do_rm(&mut self, path: &str) -> ApplicationResult<usize> {
        let expr = parse(path)?;
        match self.lookup_context(&[&expr])? {
            Some(ctx) => Ok(self.tree.remove(&expr, ctx)?),
            None => Ok(0),
        }
    }

    /// Paths of all nodes matching `path`.
    pub fn matches(&mut self, path: &str) -> AugResult<Vec<String>> {
        let result = self.do_matches(path);
        self.finish(result, 0)
    }

    fn do_matches(&mut self, path: &str) -> ApplicationResult<Vec<String>> {
        let expr = parse(path)?;
        Ok(self
            .lookup_context(&[&expr])?
            .map(|ctx| self.tree.match_paths(&expr, ctx))
            .unwrap_or_default())
    }

    /// Insert a sibling labelled `label` before or after the single match.
    pub fn insert(&mut self, path: &str, label: &str, before: bool) -> AugResult<()> {
        let result = self.do_insert(path, label, before);
        self.finish(result, 0)
    }

    fn do_insert(&mut self, path: &str, label: &str, before: bool) -> ApplicationResult<()> {
        let expr = parse(path)?;
        let ctx = self
            .lookup_context(&[&expr])?
            .ok_or_else(|| DomainError::NoMatch(expr.to_string()))?;
        self.tree.insert(&expr, ctx, label, before)?;
        Ok(())
    }

    /// Move the single match of `src` to `dst`.
    pub fn mv(&mut self, src: &str, dst: &str) -> AugResult<()> {
        let result = self.do_mv(src, dst);
        self.finish(result, 0)
    }

    fn do_mv(&mut self, src: &str, dst: &str) -> ApplicationResult<()> {
        let (src, dst) = (parse(src)?, parse(dst)?);
        if !src.absolute && self.lookup_context(&[&src])?.is_none() {
            return Err(DomainError::NoMatch(src.to_string()).into());
        }
        let ctx = self.context(&[&src, &dst])?;
        self.tree.move_node(&src, &dst, ctx)?;
        Ok(())
    }

    /// Copy the single match of `src` onto `dst`.
    pub fn cp(&mut self, src: &str, dst: &str) -> AugResult<()> {
        let result = self.do_cp(src, dst);
        self.finish(result, 0)
    }

    fn do_cp(&mut self, src: &str, dst: &str) -> ApplicationResult<()> {
        let (src, dst) = (parse(src)?, parse(dst)?);
        if !src.absolute && self.lookup_context(&[&src])?.is_none() {
            return Err(DomainError::NoMatch(src.to_string()).into());
        }
        let ctx = self.context(&[&src, &dst])?;
        self.tree.copy_node(&src, &dst, ctx)?;
        Ok(())
    }

    /// Relabel all matches; returns how many were renamed.
    pub fn rename(&mut self, path: &str, label: &str) -> AugResult<usize> {
        let result = self.do_rename(path, label);
        self.finish(result, 0)
    }

    fn do_rename(&mut self, path: &str, label: &str) -> ApplicationResult<usize> {
        let expr = parse(path)?;
        match self.lookup_context(&[&expr])? {
            Some(ctx) => Ok(self.tree.rename(&expr, ctx, label)?),
            None => Ok(0),
        }
    }

    /// Label of the single match; `None` for the root.
    pub fn label(&mut self, path: &str) -> AugResult<Option<String>> {
        let result = self
            .single(path)
            .map(|idx| Some(self.tree.label(idx).to_string()).filter(|l| !l.is_empty()));
        self.finish(result, 0)
    }

    /// Source location of the single match.
    pub fn span(&mut self, path: &str) -> AugResult<Span> {
        let result = self.do_span(path);
        self.finish(result, 0)
    }

    fn do_span(&mut self, path: &str) -> ApplicationResult<Span> {
        let idx = self.single(path)?;
        if !self.enable_span {
            return Err(DomainError::NoSpan("span tracking is disabled".into()).into());
        }
        self.tree
            .span(idx)
            .cloned()
            .ok_or_else(|| DomainError::NoSpan(self.tree.path_of(idx)).into())
    }

    /// `path = "value"` lines for every match and its subtree.
    pub fn print(&mut self, path: &str) -> AugResult<String> {
        let result = self.do_print(path);
        self.finish(result, 0)
    }

    fn do_print(&mut self, path: &str) -> ApplicationResult<String> {
        let expr = parse(path)?;
        let mut out = String::new();
        let Some(ctx) = self.lookup_context(&[&expr])? else {
            return Ok(out);
        };
        for idx in self.tree.select(&expr, ctx) {
            for line in self.tree.dump(idx) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Box-drawing rendering of the single match and its subtree.
    pub fn tree_view(&mut self, path: &str) -> AugResult<String> {
        let result = self
            .single(path)
            .map(|idx| self.tree.to_tree_string(idx).to_string());
        self.finish(result, 0)
    }

    /// Read-only access to the whole tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Change the context relative paths resolve against.
    pub fn set_context(&mut self, context: &str) -> AugResult<()> {
        let result = parse(context).and_then(|expr| {
            if expr.absolute {
                Ok(())
            } else {
                Err(DomainError::BadArgument(format!("context must be absolute: {context}")).into())
            }
        });
        if result.is_ok() {
            self.tree.set_value_at(self.meta.context, Some(context.to_string()));
        }
        self.finish(result, 0)
    }

    pub fn save_mode(&self) -> SaveMode {
        self.save_mode
    }

    pub fn set_save_mode(&mut self, mode: SaveMode) {
        self.save_mode = mode;
        self.tree.set_value_at(self.meta.save, Some(mode.to_string()));
    }

    // ------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------

    pub fn transforms(&self) -> &TransformRegistry {
        &self.registry
    }

    /// Register (or extend) a transform. Takes effect on the next `load`.
    pub fn register_transform(
        &mut self,
        name: Option<&str>,
        lens: &str,
        include: &[&str],
        exclude: &[&str],
    ) -> AugResult<()> {
        if lens.trim().is_empty() {
            return Err(AugError::Argument("lens must not be empty".into()));
        }
        if include.is_empty() {
            return Err(AugError::Argument(format!(
                "transform for {lens} needs at least one include pattern"
            )));
        }
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        let result = self
            .registry
            .register(name, lens, &include, &exclude)
            .map(|_| ())
            .map_err(ApplicationError::from);
        self.project_registry();
        self.finish(result, 0)
    }

    /// Add `file` to the transform for `lens`, as an exclude when `exclude`
    /// is set.
    pub fn transform(&mut self, lens: &str, file: &str, exclude: bool) -> AugResult<()> {
        let result = self
            .registry
            .transform(lens, file, exclude)
            .map_err(ApplicationError::from);
        self.project_registry();
        self.finish(result, 0)
    }

    /// Drop the transform named `name`; returns whether it existed.
    pub fn remove_transform(&mut self, name: &str) -> AugResult<bool> {
        let removed = self.registry.remove(name);
        self.project_registry();
        self.finish(Ok(removed), 0)
    }

    pub fn clear_transforms(&mut self) -> AugResult<()> {
        self.registry.clear();
        self.project_registry();
        self.finish(Ok(()), 0)
    }

    // ------------------------------------------------------------
    // Load / save
    // ------------------------------------------------------------

    /// Reload every file selected by the registered transforms. Per-file
    /// failures are recorded under `/augeas/files` (see [`Self::file_errors`]).
    #[instrument(level = "debug", skip(self))]
    pub fn load(&mut self) -> AugResult<()> {
        let result = self
            .controller
            .load(&mut self.tree, &self.registry, self.anchors)
            .map(|_| ());
        self.finish(result, 0)
    }

    /// Write modified files back according to the save mode. Any per-file
    /// failure makes this return [`AugError::CommandExecution`].
    #[instrument(level = "debug", skip(self))]
    pub fn save(&mut self) -> AugResult<()> {
        let result = self
            .controller
            .save(&mut self.tree, &self.registry, self.anchors, self.save_mode);
        let ret = match &result {
            Ok(report) if !report.errors.is_empty() => -1,
            _ => 0,
        };
        self.finish(result.map(|_| ()), ret)
    }

    // ------------------------------------------------------------
    // Text lenses
    // ------------------------------------------------------------

    /// Parse the value of `node` with `lens` and put the result at `path`.
    pub fn text_store(&mut self, lens: &str, node: &str, path: &str) -> AugResult<()> {
        let result = self.do_text_store(lens, node, path);
        self.finish(result, 0)
    }

    fn do_text_store(&mut self, lens: &str, node: &str, path: &str) -> ApplicationResult<()> {
        let src = self.single(node)?;
        let text = self
            .tree
            .value(src)
            .ok_or_else(|| DomainError::BadArgument(format!("node {node} has no value")))?
            .to_string();
        let mut fragments = self
            .controller
            .lenses()
            .get(lens, &text)
            .map_err(crate::infrastructure::InfraError::from)?;
        if !self.enable_span {
            fragments.iter_mut().for_each(Fragment::strip_spans);
        }

        let expr = parse(path)?;
        let ctx = self.context(&[&expr])?;
        let target = self.tree.expand(&expr, ctx)?;
        if self.tree.is_read_only(target) {
            return Err(DomainError::ReadOnly(self.tree.path_of(target)).into());
        }
        self.tree.clear_children(target);
        self.tree.graft(target, &fragments);
        self.tree.mark_dirty(target);
        Ok(())
    }

    /// Unparse the subtree at `path` with `lens` into the value of
    /// `node_out`; `node_in`'s value is the original text.
    pub fn text_retrieve(&mut self, lens: &str, node_in: &str, path: &str, node_out: &str) -> AugResult<()> {
        let result = self.do_text_retrieve(lens, node_in, path, node_out);
        self.finish(result, 0)
    }

    fn do_text_retrieve(
        &mut self,
        lens: &str,
        node_in: &str,
        path: &str,
        node_out: &str,
    ) -> ApplicationResult<()> {
        let src = self.single(node_in)?;
        let original = self.tree.value(src).map(str::to_string);
        let subtree = self.single(path)?;
        let fragments: Vec<Fragment> = self
            .tree
            .children(subtree)
            .iter()
            .map(|&c| self.tree.to_fragment(c))
            .collect();
        let text = self
            .controller
            .lenses()
            .put(lens, &fragments, original.as_deref())
            .map_err(crate::infrastructure::InfraError::from)?;

        let out = parse(node_out)?;
        let ctx = self.context(&[&out])?;
        self.tree.set(&out, ctx, Some(&text))?;
        Ok(())
    }

    // ------------------------------------------------------------
    // Legacy channel and diagnostics
    // ------------------------------------------------------------

    /// Run a newline-separated command script. Returns the number of
    /// commands executed, or a negative count when a command failed (the
    /// error record then describes the failure), plus the script's output.
    pub fn srun(&mut self, script: &str) -> (i32, String) {
        commands::run(self, script)
    }

    /// The record of the most recent operation.
    pub fn error_record(&self) -> ErrorRecord {
        ErrorTranslator::read(&self.tree, self.meta.error)
    }

    /// Per-file load and save errors, keyed by root-relative file path.
    pub fn file_errors(&self) -> Vec<(String, AugError)> {
        ErrorTranslator::file_errors(&self.tree, self.anchors.meta_files)
    }

    /// Transforms registered under `name`.
    pub fn transform_named(&self, name: &str) -> Option<&Transform> {
        self.registry.get(name)
    }

    /// Release the session.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session closed ({} nodes)", self.tree.len());
    }
}
