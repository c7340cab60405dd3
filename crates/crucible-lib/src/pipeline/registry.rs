//! Session-scoped memo tables for pipeline definitions and named tasks.
//! Entries live until the owning session is dropped.
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::definition::{DefinitionKey, PipelineDefinition};
use crate::error::Error;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One definition per (version, side, variant).
#[derive(Default)]
pub struct DefinitionCache {
    definitions: Mutex<HashMap<DefinitionKey, Arc<PipelineDefinition>>>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached definition for `key`, building it on first request.
    pub fn get_or_build<F>(&self, key: &DefinitionKey, build: F) -> Result<Arc<PipelineDefinition>>
    where
        F: FnOnce() -> Result<PipelineDefinition>,
    {
        let mut definitions = lock(&self.definitions);
        if let Some(existing) = definitions.get(key) {
            log::debug!("Reusing pipeline definition {}", key);
            return Ok(existing.clone());
        }

        let definition = Arc::new(build()?);
        log::debug!("Built pipeline definition {} ({} steps)", key, definition.steps.len());
        definitions.insert(key.clone(), definition.clone());
        Ok(definition)
    }

    pub fn get(&self, key: &DefinitionKey) -> Option<Arc<PipelineDefinition>> {
        lock(&self.definitions).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.definitions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named units of work registered during resolution and run afterwards.
/// Registering a name twice is an error.
pub struct TaskRegistry<T> {
    inner: Mutex<RegistryInner<T>>,
}

struct RegistryInner<T> {
    names: HashSet<String>,
    tasks: Vec<(String, Arc<T>)>,
}

impl<T> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                names: HashSet::new(),
                tasks: Vec::new(),
            }),
        }
    }
}

impl<T> TaskRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, task: T) -> Result<Arc<T>> {
        let name = name.into();
        let mut inner = lock(&self.inner);
        if !inner.names.insert(name.clone()) {
            return Err(Error::DuplicateTaskRegistration { name }.into());
        }
        let task = Arc::new(task);
        log::debug!("Registered task {}", name);
        inner.tasks.push((name, task.clone()));
        Ok(task)
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner).names.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        lock(&self.inner)
            .tasks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.clone())
    }

    /// Registered tasks in registration order.
    pub fn tasks(&self) -> Vec<(String, Arc<T>)> {
        lock(&self.inner).tasks.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
