use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::handler::{ReplacementContext, ReplacementHandler, ReplacementResult};
use super::{Configurations, Dependency};
use crate::error::Error;
use crate::maven::MavenCoordinate;
use crate::pipeline::{PipelineDefinition, TaskRegistry};
use crate::repository::Repository;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Copies a pipeline's output into the synthetic repository.
#[derive(Debug, Clone)]
pub struct MaterializationTask {
    pub coordinate: MavenCoordinate,
    pub definition: Arc<PipelineDefinition>,
}

pub fn materialize_task_name(coordinate: &MavenCoordinate) -> String {
    format!("materialize:{}", coordinate)
}

type ResultKey = (Dependency, String);

/// Intercepts declared dependencies and swaps in synthetic replacements.
pub struct DependencyReplacementEngine {
    handlers: Vec<Arc<dyn ReplacementHandler>>,
    synthetic_prefix: String,
    repository: Arc<Repository>,
    tasks: TaskRegistry<MaterializationTask>,
    results: Mutex<HashMap<ResultKey, Option<Arc<ReplacementResult>>>>,
}

impl DependencyReplacementEngine {
    pub fn new(repository: Arc<Repository>, synthetic_prefix: impl Into<String>) -> Self {
        Self {
            handlers: Vec::new(),
            synthetic_prefix: synthetic_prefix.into(),
            repository,
            tasks: TaskRegistry::new(),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Add a handler, keeping the chain ordered by descending priority.
    pub fn register(&mut self, handler: Arc<dyn ReplacementHandler>) {
        let priority = handler.priority();
        let at = self
            .handlers
            .iter()
            .position(|h| h.priority() < priority)
            .unwrap_or(self.handlers.len());
        log::debug!("Registered replacement handler '{}' (priority {})", handler.name(), priority);
        self.handlers.insert(at, handler);
    }

    pub fn handlers(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|h| h.name())
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    pub fn tasks(&self) -> &TaskRegistry<MaterializationTask> {
        &self.tasks
    }

    /// Whether the coordinate already points into the synthetic repository.
    pub fn is_synthetic(&self, coordinate: &MavenCoordinate) -> bool {
        coordinate.group == self.synthetic_prefix
            || coordinate
                .group
                .strip_prefix(self.synthetic_prefix.as_str())
                .map_or(false, |rest| rest.starts_with('.'))
    }

    /// The memoized replacement for `dependency` in `configuration`, asking
    /// the handler chain on first use.
    pub fn resolve(&self, dependency: &Dependency, configuration: &str) -> Result<Option<Arc<ReplacementResult>>> {
        let Some(coordinate) = dependency.coordinate() else {
            return Ok(None);
        };
        if self.is_synthetic(coordinate) {
            return Ok(None);
        }

        let key = (dependency.clone(), configuration.to_string());
        let mut results = lock(&self.results);
        if let Some(known) = results.get(&key) {
            return Ok(known.clone());
        }

        let context = ReplacementContext {
            dependency,
            coordinate,
            configuration,
        };
        let mut found = None;
        for handler in &self.handlers {
            match handler.try_replace(&context) {
                Ok(Some(result)) => {
                    log::info!("{} replaced {} ({})", handler.name(), coordinate, result.coordinate());
                    found = Some(Arc::new(result));
                    break;
                }
                Ok(None) => continue,
                Err(source) => {
                    return Err(Error::HandlerFailed {
                        handler: handler.name().to_string(),
                        dependency: coordinate.to_string(),
                        source,
                    }
                    .into());
                }
            }
        }

        if let Some(result) = &found {
            // transitive results answer for their own coordinates too
            for nested in result.flatten().into_iter().skip(1) {
                results
                    .entry((Dependency::module(nested.original.clone()), configuration.to_string()))
                    .or_insert_with(|| Some(nested.clone()));
            }
        }
        results.insert(key, found.clone());
        Ok(found)
    }

    /// React to `dependency` being added to `configuration`.
    pub fn handle(&self, configurations: &mut Configurations, configuration: &str, dependency: &Dependency) -> Result<()> {
        let Some(result) = self.resolve(dependency, configuration)? else {
            return Ok(());
        };

        configurations.remove(configuration, dependency);
        let mut visited = HashSet::new();
        self.apply(&result, configurations, configuration, &mut visited)
    }

    fn apply(
        &self,
        result: &Arc<ReplacementResult>,
        configurations: &mut Configurations,
        configuration: &str,
        visited: &mut HashSet<MavenCoordinate>,
    ) -> Result<()> {
        if !visited.insert(result.original.clone()) {
            return Ok(());
        }

        let (coordinate, is_new) = self.repository.try_intern(result.configured_entry());
        let raw_task = materialize_task_name(&coordinate);
        if is_new {
            self.tasks.register(
                raw_task.clone(),
                MaterializationTask {
                    coordinate: coordinate.clone(),
                    definition: result.raw.clone(),
                },
            )?;
            if let Some(sources) = &result.sources {
                let sources_coordinate = coordinate.clone().with_classifier("sources");
                self.tasks.register(
                    materialize_task_name(&sources_coordinate),
                    MaterializationTask {
                        coordinate: sources_coordinate,
                        definition: sources.clone(),
                    },
                )?;
            }
        }

        let artifact: PathBuf = self.repository.artifact_path(&coordinate);
        let targets: Vec<&str> = if result.targets.is_empty() {
            vec![configuration]
        } else {
            result.targets.iter().map(String::as_str).collect()
        };
        for target in targets {
            configurations.add(target, Dependency::module(coordinate.clone()));
            configurations.add(
                target,
                Dependency::Files {
                    paths: vec![artifact.clone()],
                    built_by: Some(raw_task.clone()),
                },
            );
        }

        for nested in &result.nested {
            self.apply(nested, configurations, configuration, visited)?;
        }
        Ok(())
    }
}
