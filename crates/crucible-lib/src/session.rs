//! A build session: the settings plus every memo table that lives for one
//! run (shared downloads, definitions, interned entries, registered tasks).
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::ArtifactCache;
use crate::config::Settings;
use crate::models::Side;
use crate::pipeline::{
    graph, ArtifactHandle, DefinitionCache, ExecutorOptions, PipelineConfig, PipelineDefinition, PipelineExecutor,
};
use crate::replacement::{Configurations, Dependency, DependencyReplacementEngine, ReplacementHandler};
use crate::reporter::{ProgressReporter, SilentProgressReporter};
use crate::repository::Repository;

pub struct Session {
    settings: Settings,
    executor: PipelineExecutor,
    definitions: Arc<DefinitionCache>,
    engine: DependencyReplacementEngine,
}

impl Session {
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_reporter(settings, Arc::new(SilentProgressReporter))
    }

    pub fn with_reporter(settings: Settings, reporter: Arc<dyn ProgressReporter>) -> Result<Self> {
        let cache = ArtifactCache::from_settings(&settings)?.with_reporter(reporter.clone());
        let executor = PipelineExecutor::new(Arc::new(cache), ExecutorOptions::from_settings(&settings))
            .with_reporter(reporter);
        let repository = Arc::new(Repository::new(settings.repository_dir.clone()));
        let engine = DependencyReplacementEngine::new(repository, settings.synthetic_group_prefix.clone());
        log::debug!(
            "Session cache at {:?}, repository at {:?}, offline: {}",
            settings.cache_dir,
            settings.repository_dir,
            settings.offline
        );
        Ok(Self {
            settings,
            executor,
            definitions: Arc::new(DefinitionCache::new()),
            engine,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        self.executor.cache()
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn definitions(&self) -> &Arc<DefinitionCache> {
        &self.definitions
    }

    pub fn repository(&self) -> &Arc<Repository> {
        self.engine.repository()
    }

    pub fn engine(&self) -> &DependencyReplacementEngine {
        &self.engine
    }

    pub fn register_handler(&mut self, handler: Arc<dyn ReplacementHandler>) {
        self.engine.register(handler);
    }

    /// The definition for `side` of `config`, built once per session.
    pub fn definition(&self, config: &PipelineConfig, side: Side, variant: &str) -> Result<Arc<PipelineDefinition>> {
        let workspace = self
            .settings
            .workspace_dir
            .join(&config.version)
            .join(side.as_str())
            .join(variant);
        let context = config.context(side, variant, &workspace, &self.settings.cache_dir);
        let key = context.key.clone();
        self.definitions.get_or_build(&key, || {
            let templates = config.templates(side)?;
            graph::build(&templates, &context)
        })
    }

    pub async fn run(&self, definition: &PipelineDefinition) -> Result<ArtifactHandle> {
        self.executor.run(definition).await
    }

    /// Feed a declared dependency through the replacement engine.
    pub fn add_dependency(&self, configurations: &mut Configurations, configuration: &str, dependency: Dependency) -> Result<()> {
        configurations.add(configuration, dependency.clone());
        self.engine.handle(configurations, configuration, &dependency)
    }

    /// Run every registered materialization task and publish its output.
    pub async fn materialize_all(&self) -> Result<Vec<PathBuf>> {
        let mut published = Vec::new();
        for (name, task) in self.engine.tasks().tasks() {
            if self.repository().is_materialized(&task.coordinate) {
                continue;
            }
            log::info!("Running {}", name);
            let output = self
                .executor
                .run(&task.definition)
                .await
                .with_context(|| format!("Task {} failed", name))?;
            published.push(self.repository().materialize(&task.coordinate, &output.path)?);
        }
        Ok(published)
    }
}
