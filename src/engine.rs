use crate::context::Context;
use crate::defaultfilters;
use crate::defaulttags;
use crate::loadertags;
use crate::error::{Error, Result};
use crate::library::{Registry, TagLibrary};
use crate::loader::TemplateLoader;
use crate::plugin::{LibraryResolver, PluginDirResolver, PluginVersion, StaticResolver};
use crate::template::{MutableTemplate, Template};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LIBRARY_VERSION_MAJOR: u32 = 1;
pub const LIBRARY_VERSION_MINOR: u32 = 2;
pub const MIN_PLUGIN_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Unresolved variables raise instead of rendering empty.
    pub strict_variables: bool,
    pub autoescape: bool,
    /// Drop the newline directly after a `%}` block tag.
    pub trim_blocks: bool,
    pub plugin_dirs: Vec<PathBuf>,
    pub version_major: u32,
    pub version_minor: u32,
    /// Lowest minor version tried when searching for a library.
    pub min_plugin_version: u32,
    pub default_libraries: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_variables: false,
            autoescape: true,
            trim_blocks: false,
            plugin_dirs: Vec::new(),
            version_major: LIBRARY_VERSION_MAJOR,
            version_minor: LIBRARY_VERSION_MINOR,
            min_plugin_version: MIN_PLUGIN_VERSION,
            default_libraries: vec![
                defaulttags::LIBRARY_NAME.to_string(),
                loadertags::LIBRARY_NAME.to_string(),
                defaultfilters::LIBRARY_NAME.to_string(),
            ],
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn with_autoescape(mut self, on: bool) -> Self {
        self.autoescape = on;
        self
    }

    pub fn with_trim_blocks(mut self, trim: bool) -> Self {
        self.trim_blocks = trim;
        self
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(dir.into());
        self
    }

    pub fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.version_major = major;
        self.version_minor = minor;
        self
    }

    pub fn with_min_plugin_version(mut self, minor: u32) -> Self {
        self.min_plugin_version = minor;
        self
    }
}

/// Resolver serving the bundled `defaulttags`, `loadertags` and
/// `defaultfilters` libraries at every version.
pub fn builtin_resolver() -> StaticResolver {
    StaticResolver::new()
        .with_any_version(defaulttags::LIBRARY_NAME, |_| defaulttags::library())
        .with_any_version(loadertags::LIBRARY_NAME, |_| loadertags::library())
        .with_any_version(defaultfilters::LIBRARY_NAME, |_| defaultfilters::library())
}

/// Owns the tag/filter registry, template loaders and library resolution.
///
/// Set up once (load libraries, add loaders), then share read-only: parsing
/// and rendering only need `&Engine`.
pub struct Engine {
    config: EngineConfig,
    registry: Registry,
    loaders: Vec<Arc<dyn TemplateLoader>>,
    resolvers: Vec<Box<dyn LibraryResolver>>,
    plugins: PluginDirResolver,
    builtin: StaticResolver,
    libraries: HashMap<String, Arc<TagLibrary>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("loaders", &self.loaders.len())
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// An engine with an empty registry. Call
    /// [`Engine::load_default_libraries`] to populate it.
    pub fn new(config: EngineConfig) -> Self {
        let plugins = PluginDirResolver::new(config.plugin_dirs.clone());
        Self {
            config,
            registry: Registry::new(),
            loaders: Vec::new(),
            resolvers: Vec::new(),
            plugins,
            builtin: builtin_resolver(),
            libraries: HashMap::new(),
        }
    }

    /// Default configuration with the default libraries loaded.
    pub fn with_defaults() -> Self {
        let mut engine = Self::default();
        engine.load_default_libraries();
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A fresh context carrying this engine's strictness and escaping policy.
    pub fn context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.set_strict(self.config.strict_variables);
        ctx.set_autoescape(self.config.autoescape);
        ctx
    }

    /// Like [`Engine::context`], with the engine attached so that `include`
    /// can load templates while rendering.
    pub fn shared_context(self: &Arc<Self>) -> Context {
        let mut ctx = self.context();
        ctx.set_engine(Arc::clone(self));
        ctx
    }

    pub fn add_template_loader(&mut self, loader: impl TemplateLoader + 'static) {
        self.loaders.push(Arc::new(loader));
    }

    pub fn template_loaders(&self) -> &[Arc<dyn TemplateLoader>] {
        &self.loaders
    }

    /// First non-empty media URI any loader reports for `file_name`.
    pub fn media_uri(&self, file_name: &str) -> Option<String> {
        self.loaders
            .iter()
            .filter_map(|loader| loader.media_uri(file_name))
            .find(|uri| !uri.is_empty())
    }

    pub fn set_plugin_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.plugins.set_dirs(dirs.clone());
        self.config.plugin_dirs = dirs;
    }

    /// Register a constructor discovered through the plugin directories.
    pub fn add_plugin(
        &mut self,
        name: impl Into<String>,
        ctor: impl Fn(PluginVersion) -> TagLibrary + Send + Sync + 'static,
    ) {
        self.plugins.register(name, ctor);
    }

    /// Add a resolver consulted after the ones already added. Host resolvers
    /// and plugin directories are tried before the bundled libraries, so a
    /// host can replace `defaulttags` or `defaultfilters`.
    pub fn add_resolver(&mut self, resolver: impl LibraryResolver + 'static) {
        self.resolvers.push(Box::new(resolver));
    }

    pub fn default_libraries(&self) -> &[String] {
        &self.config.default_libraries
    }

    pub fn add_default_library(&mut self, name: impl Into<String>) {
        self.config.default_libraries.push(name.into());
    }

    pub fn remove_default_library(&mut self, name: &str) {
        self.config.default_libraries.retain(|lib| lib != name);
    }

    /// Load and register every default library, in list order. Libraries that
    /// cannot be resolved are skipped.
    pub fn load_default_libraries(&mut self) {
        for name in self.config.default_libraries.clone() {
            match self.load_library(&name) {
                Some(library) => self.registry.register_library(&library),
                None => warn!(library = %name, "default library not found"),
            }
        }
    }

    /// Resolve `name`, trying minor versions from the current one down to the
    /// configured floor. The first hit is cached, so repeated loads return the
    /// same library. `None` when no version resolves.
    pub fn load_library(&mut self, name: &str) -> Option<Arc<TagLibrary>> {
        if let Some(library) = self.libraries.get(name) {
            return Some(Arc::clone(library));
        }

        let major = self.config.version_major;
        for minor in (self.config.min_plugin_version..=self.config.version_minor).rev() {
            let version = PluginVersion::new(major, minor);
            let found = self
                .resolvers
                .iter()
                .find_map(|r| r.resolve(name, version))
                .or_else(|| self.plugins.resolve(name, version))
                .or_else(|| self.builtin.resolve(name, version));
            if let Some(library) = found {
                debug!(library = name, %version, "library resolved");
                let library = Arc::new(library);
                self.libraries.insert(name.to_string(), Arc::clone(&library));
                return Some(library);
            }
            debug!(library = name, %version, "library not available at version");
        }
        None
    }

    /// Merge a library into the registry; its names shadow earlier ones.
    pub fn register_library(&mut self, library: &TagLibrary) {
        self.registry.register_library(library);
    }

    /// Load `name` and register it. Returns whether the library was found.
    pub fn use_library(&mut self, name: &str) -> bool {
        match self.load_library(name) {
            Some(library) => {
                self.registry.register_library(&library);
                true
            }
            None => false,
        }
    }

    pub fn new_template(&self, content: &str, name: &str) -> Result<Template> {
        Template::compile(content, name, &self.registry, self.config.trim_blocks)
    }

    pub fn new_mutable_template(&self, content: &str, name: &str) -> Result<MutableTemplate> {
        self.new_template(content, name).map(MutableTemplate::new)
    }

    /// Recompile `content` into an existing mutable template identity.
    pub fn set_template_content(&self, template: &MutableTemplate, content: &str) -> Result<()> {
        template.set_content(content, &self.registry, self.config.trim_blocks)
    }

    /// Ask loaders in registration order; the first that can load `name` and
    /// produces a template wins.
    pub fn load_by_name(&self, name: &str) -> Result<Option<Template>> {
        for loader in &self.loaders {
            if !loader.can_load(name) {
                continue;
            }
            if let Some(template) = loader.load_by_name(name, self)? {
                return Ok(Some(template));
            }
        }
        debug!(template = name, "no loader produced template");
        Ok(None)
    }

    /// Like [`Engine::load_by_name`], but a miss is an error: the caller needs
    /// a live template identity.
    pub fn load_mutable_by_name(&self, name: &str) -> Result<MutableTemplate> {
        for loader in self.loaders.iter().filter(|l| l.can_load(name)) {
            if let Some(template) = loader.load_mutable_by_name(name, self)? {
                return Ok(template);
            }
        }
        Err(Error::TemplateNotFound {
            name: name.to_string(),
        })
    }
}
