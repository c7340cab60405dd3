use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::Dependency;
use crate::maven::MavenCoordinate;
use crate::pipeline::PipelineDefinition;
use crate::repository::RepositoryEntry;

/// A module as resolved by the consumer's dependency resolution, with the
/// files backing it and its first-level children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub coordinate: MavenCoordinate,
    pub files: Vec<PathBuf>,
    pub children: Vec<ResolvedModule>,
}

impl ResolvedModule {
    pub fn new(coordinate: MavenCoordinate) -> Self {
        Self {
            coordinate,
            files: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn with_child(mut self, child: ResolvedModule) -> Self {
        self.children.push(child);
        self
    }
}

/// Result of resolving one declared dependency in isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Every file the dependency resolved to
    pub files: Vec<PathBuf>,
    /// First-level modules
    pub modules: Vec<ResolvedModule>,
}

/// Resolves a coordinate the way the consumer's build would.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, coordinate: &MavenCoordinate) -> Result<ResolvedDependency>;
}

/// Adjusts an entry before it is interned.
pub type EntryConfigurator = Arc<dyn Fn(&mut RepositoryEntry) + Send + Sync>;

/// A replacement decided by a handler.
#[derive(Clone)]
pub struct ReplacementResult {
    /// The dependency being replaced; also the dedup key
    pub original: MavenCoordinate,
    pub entry: RepositoryEntry,
    /// Produces the replacement artifact
    pub raw: Arc<PipelineDefinition>,
    pub sources: Option<Arc<PipelineDefinition>>,
    pub configure: Option<EntryConfigurator>,
    pub nested: Vec<Arc<ReplacementResult>>,
    /// Configurations receiving the replacement. Empty means the
    /// configuration the dependency was declared in.
    pub targets: Vec<String>,
}

impl ReplacementResult {
    pub fn new(original: MavenCoordinate, entry: RepositoryEntry, raw: Arc<PipelineDefinition>) -> Self {
        Self {
            original,
            entry,
            raw,
            sources: None,
            configure: None,
            nested: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn key(&self) -> &MavenCoordinate {
        &self.original
    }

    pub fn coordinate(&self) -> &MavenCoordinate {
        &self.entry.coordinate
    }

    /// Entry as it will be interned, after the configurator ran.
    pub fn configured_entry(&self) -> RepositoryEntry {
        let mut entry = self.entry.clone();
        if let Some(configure) = &self.configure {
            configure(&mut entry);
        }
        entry
    }

    /// This result and every nested one, depth first.
    pub fn flatten(self: &Arc<Self>) -> Vec<Arc<ReplacementResult>> {
        let mut all = vec![self.clone()];
        for nested in &self.nested {
            all.extend(nested.flatten());
        }
        all
    }
}

impl fmt::Debug for ReplacementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplacementResult")
            .field("original", &self.original)
            .field("entry", &self.entry)
            .field("raw", &self.raw.key())
            .field("sources", &self.sources.as_ref().map(|s| s.key().clone()))
            .field("nested", &self.nested)
            .field("targets", &self.targets)
            .finish()
    }
}

pub struct ReplacementContext<'a> {
    pub dependency: &'a Dependency,
    pub coordinate: &'a MavenCoordinate,
    pub configuration: &'a str,
}

/// Decides whether a dependency should be replaced.
///
/// `Ok(None)` means no opinion and the next handler is asked. An error
/// aborts resolution of the dependency.
pub trait ReplacementHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first; equal priorities keep registration order.
    fn priority(&self) -> i32 {
        0
    }

    fn try_replace(&self, context: &ReplacementContext<'_>) -> Result<Option<ReplacementResult>>;
}
