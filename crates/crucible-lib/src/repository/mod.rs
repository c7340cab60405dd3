//! The synthetic Maven repository replaced artifacts are published into.
mod pom;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::maven::MavenCoordinate;
use crate::utils::fs::{copy_atomically, write_atomically};

pub use pom::render_pom;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A module published into the synthetic repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub coordinate: MavenCoordinate,
    /// Dependencies written into the module's POM, in declaration order
    pub dependencies: Vec<MavenCoordinate>,
    pub description: Option<String>,
}

impl RepositoryEntry {
    pub fn new(coordinate: MavenCoordinate) -> Self {
        Self {
            coordinate,
            dependencies: Vec::new(),
            description: None,
        }
    }

    pub fn with_dependency(mut self, dependency: MavenCoordinate) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// The same module with a classifier, e.g. the `sources` artifact.
    pub fn classified(&self, classifier: &str) -> MavenCoordinate {
        self.coordinate.clone().with_classifier(classifier)
    }
}

pub struct Repository {
    root: PathBuf,
    entries: Mutex<BTreeMap<MavenCoordinate, RepositoryEntry>>,
    materialized: Mutex<HashSet<MavenCoordinate>>,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(BTreeMap::new()),
            materialized: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register `entry`, returning its coordinate. Interning an entry with
    /// the same coordinate again keeps the first one.
    pub fn intern(&self, entry: RepositoryEntry) -> MavenCoordinate {
        self.try_intern(entry).0
    }

    /// Like [`intern`](Self::intern), also reporting whether the entry was new.
    pub fn try_intern(&self, entry: RepositoryEntry) -> (MavenCoordinate, bool) {
        let coordinate = entry.coordinate.clone();
        let mut entries = lock(&self.entries);
        if entries.contains_key(&coordinate) {
            return (coordinate, false);
        }
        log::debug!("Interned synthetic module {}", coordinate);
        entries.insert(coordinate.clone(), entry);
        (coordinate, true)
    }

    pub fn entry(&self, coordinate: &MavenCoordinate) -> Option<RepositoryEntry> {
        lock(&self.entries).get(coordinate).cloned()
    }

    pub fn entries(&self) -> Vec<RepositoryEntry> {
        lock(&self.entries).values().cloned().collect()
    }

    /// `<root>/<group/as/path>/<name>/<version>/<name>-<version>[-<classifier>].<ext>`
    pub fn artifact_path(&self, coordinate: &MavenCoordinate) -> PathBuf {
        coordinate.path_in(&self.root)
    }

    pub fn is_materialized(&self, coordinate: &MavenCoordinate) -> bool {
        lock(&self.materialized).contains(coordinate)
    }

    /// Copy `artifact` into the repository layout for `coordinate` and write
    /// the module POM. Only the first call per coordinate copies anything.
    pub fn materialize(&self, coordinate: &MavenCoordinate, artifact: &Path) -> Result<PathBuf> {
        let target = self.artifact_path(coordinate);
        let mut materialized = lock(&self.materialized);
        if materialized.contains(coordinate) && target.exists() {
            log::debug!("{} is already materialized", coordinate);
            return Ok(target);
        }

        copy_atomically(artifact, &target)
            .with_context(|| format!("Failed to materialize {} from {:?}", coordinate, artifact))?;

        // classified artifacts share the POM of their module
        if coordinate.classifier.is_none() {
            let entry = self
                .entry(coordinate)
                .unwrap_or_else(|| RepositoryEntry::new(coordinate.clone()));
            let xml = render_pom(&entry)?;
            let pom_path = self.artifact_path(&coordinate.pom());
            write_atomically(&pom_path, |file| {
                use std::io::Write;
                file.write_all(xml.as_bytes())?;
                Ok(())
            })?;
        }

        log::info!("Materialized {} at {:?}", coordinate, target);
        materialized.insert(coordinate.clone());
        Ok(target)
    }
}
