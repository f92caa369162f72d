//! Service container for dependency injection
//!
//! Wires up the I/O seams a session depends on.

use std::sync::Arc;

use crate::config::Settings;
use crate::infrastructure::lenses::BuiltinLenses;
use crate::infrastructure::traits::{FileLister, FileSystem, LensEngine, RealFileSystem, WalkDirLister};

/// Container holding everything a session needs from the outside world.
pub struct ServiceContainer {
    /// Session settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Transform file listing
    pub lister: Arc<dyn FileLister>,

    /// Lens engine
    pub lenses: Arc<dyn LensEngine>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(WalkDirLister),
            Arc::new(BuiltinLenses::new()),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        lister: Arc<dyn FileLister>,
        lenses: Arc<dyn LensEngine>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            lister,
            lenses,
        }
    }
}
