//! Template loaders consulted by [`Engine::load_by_name`](crate::Engine::load_by_name).

use crate::engine::Engine;
use crate::error::Result;
use crate::template::{MutableTemplate, Template};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

pub trait TemplateLoader: Send + Sync {
    fn can_load(&self, name: &str) -> bool;

    /// `Ok(None)` when the loader has no template by that name.
    fn load_by_name(&self, name: &str, engine: &Engine) -> Result<Option<Template>>;

    fn load_mutable_by_name(&self, name: &str, engine: &Engine) -> Result<Option<MutableTemplate>> {
        Ok(self.load_by_name(name, engine)?.map(MutableTemplate::new))
    }

    fn media_uri(&self, _file_name: &str) -> Option<String> {
        None
    }
}

/// Serves template sources held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoader {
    sources: HashMap<String, String>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl TemplateLoader for InMemoryLoader {
    fn can_load(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    fn load_by_name(&self, name: &str, engine: &Engine) -> Result<Option<Template>> {
        match self.sources.get(name) {
            Some(source) => engine.new_template(source, name).map(Some),
            None => Ok(None),
        }
    }
}

/// Looks templates up under a list of directories; the first directory that
/// contains the file wins.
#[derive(Debug, Default, Clone)]
pub struct FileSystemLoader {
    dirs: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }
}

impl TemplateLoader for FileSystemLoader {
    fn can_load(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn load_by_name(&self, name: &str, engine: &Engine) -> Result<Option<Template>> {
        let Some(path) = self.find(name) else {
            return Ok(None);
        };
        match std::fs::read_to_string(&path) {
            Ok(source) => engine.new_template(&source, name).map(Some),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "template file unreadable");
                Ok(None)
            }
        }
    }

    fn media_uri(&self, file_name: &str) -> Option<String> {
        self.find(file_name).map(|p| p.display().to_string())
    }
}
