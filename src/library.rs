use crate::filter::Filter;
use crate::node::NodeFactory;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A bundle of tag factories and filters, registered under a library name.
#[derive(Clone, Default)]
pub struct TagLibrary {
    tags: IndexMap<String, Arc<dyn NodeFactory>>,
    filters: IndexMap<String, Arc<dyn Filter>>,
}

impl TagLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, name: impl Into<String>, factory: impl NodeFactory + 'static) -> Self {
        self.tags.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn filter(mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Self {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.filters.is_empty()
    }
}

impl fmt::Debug for TagLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagLibrary")
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The merged tag and filter tables consulted by the parser.
///
/// Registering a library whose names are already present replaces the earlier
/// entries: the latest registration wins.
#[derive(Clone, Default)]
pub struct Registry {
    tags: HashMap<String, Arc<dyn NodeFactory>>,
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_library(&mut self, library: &TagLibrary) {
        for (name, factory) in &library.tags {
            if self.tags.insert(name.clone(), Arc::clone(factory)).is_some() {
                debug!(tag = %name, "tag shadowed by later registration");
            }
        }
        for (name, filter) in &library.filters {
            if self.filters.insert(name.clone(), Arc::clone(filter)).is_some() {
                debug!(filter = %name, "filter shadowed by later registration");
            }
        }
    }

    pub fn lookup_tag(&self, name: &str) -> Option<&dyn NodeFactory> {
        self.tags.get(name).map(|f| &**f)
    }

    pub fn lookup_filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.tags.keys().collect();
        let mut filters: Vec<_> = self.filters.keys().collect();
        tags.sort();
        filters.sort();
        f.debug_struct("Registry")
            .field("tags", &tags)
            .field("filters", &filters)
            .finish()
    }
}
