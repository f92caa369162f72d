//! Transform registry
//!
//! The registry is the canonical store of transforms. `/augeas/load` is a
//! projection of it, rewritten through [`TransformRegistry::project`] after
//! every change.

use generational_arena::Index;
use tracing::debug;

use crate::domain::{derive_name, DomainError, DomainResult, Transform, Tree};

#[derive(Debug, Default, Clone)]
pub struct TransformRegistry {
    transforms: Vec<Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.transforms.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.iter().find(|t| t.name == name)
    }

    /// Add a transform, or extend the one already registered under `name`.
    ///
    /// An existing transform keeps its patterns, gains the new ones and takes
    /// the new lens. Conflicts between transforms surface at load time.
    pub fn register(
        &mut self,
        name: Option<&str>,
        lens: &str,
        include: &[String],
        exclude: &[String],
    ) -> DomainResult<&Transform> {
        if lens.trim().is_empty() {
            return Err(DomainError::BadArgument("lens must not be empty".into()));
        }
        if include.is_empty() {
            return Err(DomainError::BadArgument(format!(
                "transform for {lens} needs at least one include pattern"
            )));
        }
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| derive_name(lens));
        debug!("register transform {} ({}): incl={:?} excl={:?}", name, lens, include, exclude);

        let pos = match self.transforms.iter().position(|t| t.name == name) {
            Some(pos) => pos,
            None => {
                self.transforms.push(Transform::new(name, lens));
                self.transforms.len() - 1
            }
        };
        let transform = &mut self.transforms[pos];
        transform.lens = lens.to_string();
        transform.include.extend(include.iter().cloned());
        transform.exclude.extend(exclude.iter().cloned());
        Ok(&self.transforms[pos])
    }

    /// Add a single file to the transform for `lens`, as an exclude pattern
    /// when `exclude` is set.
    pub fn transform(&mut self, lens: &str, file: &str, exclude: bool) -> DomainResult<()> {
        if lens.trim().is_empty() || file.is_empty() {
            return Err(DomainError::BadArgument("lens and file must not be empty".into()));
        }
        let name = derive_name(lens);
        match self.transforms.iter_mut().find(|t| t.name == name) {
            Some(t) => {
                t.lens = lens.to_string();
                if exclude {
                    t.exclude.push(file.to_string());
                } else {
                    t.include.push(file.to_string());
                }
            }
            None => {
                let mut t = Transform::new(name, lens);
                if exclude {
                    t.exclude.push(file.to_string());
                } else {
                    t.include.push(file.to_string());
                }
                self.transforms.push(t);
            }
        }
        Ok(())
    }

    /// Drop the transform named `name`; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.transforms.len();
        self.transforms.retain(|t| t.name != name);
        before != self.transforms.len()
    }

    pub fn clear(&mut self) {
        self.transforms.clear();
    }

    /// Transforms whose patterns accept the root-relative file `path`.
    pub fn accepting(&self, path: &str) -> Vec<&Transform> {
        self.transforms.iter().filter(|t| t.accepts(path)).collect()
    }

    /// Rewrite the subtree at `load` from the registry.
    pub fn project(&self, tree: &mut Tree, load: Index) {
        tree.clear_children(load);
        for t in &self.transforms {
            let node = tree.append_child(load, &t.name, None);
            tree.append_child(node, "lens", Some(t.lens.clone()));
            for incl in &t.include {
                tree.append_child(node, "incl", Some(incl.clone()));
            }
            for excl in &t.exclude {
                tree.append_child(node, "excl", Some(excl.clone()));
            }
        }
    }
}
