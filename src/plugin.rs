//! Resolving a library name at a given version to a [`TagLibrary`].
//!
//! Nothing is loaded from shared objects: libraries are Rust constructors
//! registered by the host. [`PluginDirResolver`] keeps the directory layout
//! convention (`<dir>/<major>.<minor>/<name>*`) as the signal that a library is
//! installed at that version.

use crate::library::TagLibrary;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub type LibraryConstructor = Arc<dyn Fn(PluginVersion) -> TagLibrary + Send + Sync>;

pub trait LibraryResolver: Send + Sync {
    /// The library `name` built for `version`, or `None` if this resolver
    /// has no such library at that version.
    fn resolve(&self, name: &str, version: PluginVersion) -> Option<TagLibrary>;
}

/// In-process table of constructors, keyed by name and optionally by minor
/// version. An unversioned entry answers for every version.
#[derive(Default, Clone)]
pub struct StaticResolver {
    versioned: HashMap<(String, u32), LibraryConstructor>,
    unversioned: HashMap<String, LibraryConstructor>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(
        mut self,
        name: impl Into<String>,
        minor: u32,
        ctor: impl Fn(PluginVersion) -> TagLibrary + Send + Sync + 'static,
    ) -> Self {
        self.versioned.insert((name.into(), minor), Arc::new(ctor));
        self
    }

    pub fn with_any_version(
        mut self,
        name: impl Into<String>,
        ctor: impl Fn(PluginVersion) -> TagLibrary + Send + Sync + 'static,
    ) -> Self {
        self.unversioned.insert(name.into(), Arc::new(ctor));
        self
    }
}

impl LibraryResolver for StaticResolver {
    fn resolve(&self, name: &str, version: PluginVersion) -> Option<TagLibrary> {
        let ctor = self
            .versioned
            .get(&(name.to_string(), version.minor))
            .or_else(|| self.unversioned.get(name))?;
        Some(ctor(version))
    }
}

/// Resolves a library when a file named `<name>*` exists in
/// `<dir>/<major>.<minor>/` for one of the configured directories and a
/// constructor is registered under that name.
#[derive(Default, Clone)]
pub struct PluginDirResolver {
    dirs: Vec<PathBuf>,
    constructors: HashMap<String, LibraryConstructor>,
}

impl PluginDirResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            constructors: HashMap::new(),
        }
    }

    pub fn set_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.dirs = dirs;
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        ctor: impl Fn(PluginVersion) -> TagLibrary + Send + Sync + 'static,
    ) {
        self.constructors.insert(name.into(), Arc::new(ctor));
    }

    /// First matching file for `name` at `version`, searching dirs in order.
    pub fn locate(&self, name: &str, version: PluginVersion) -> Option<PathBuf> {
        self.dirs
            .iter()
            .find_map(|dir| find_prefixed(&dir.join(version.to_string()), name))
    }
}

fn find_prefixed(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

impl LibraryResolver for PluginDirResolver {
    fn resolve(&self, name: &str, version: PluginVersion) -> Option<TagLibrary> {
        let ctor = self.constructors.get(name)?;
        let path = self.locate(name, version)?;
        debug!(library = name, %version, path = %path.display(), "plugin located");
        Some(ctor(version))
    }
}
