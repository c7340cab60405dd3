use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::maven::MavenCoordinate;

/// A dependency declared in a consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Dependency {
    Module { coordinate: MavenCoordinate },
    /// Raw files, optionally produced by a named task
    Files {
        paths: Vec<PathBuf>,
        built_by: Option<String>,
    },
    Project { path: String },
}

impl Dependency {
    pub fn module(coordinate: MavenCoordinate) -> Self {
        Dependency::Module { coordinate }
    }

    pub fn coordinate(&self) -> Option<&MavenCoordinate> {
        match self {
            Dependency::Module { coordinate } => Some(coordinate),
            _ => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Module { coordinate } => write!(f, "{}", coordinate),
            Dependency::Files { paths, built_by } => {
                write!(f, "files(")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                match built_by {
                    Some(task) => write!(f, ") built by {}", task),
                    None => write!(f, ")"),
                }
            }
            Dependency::Project { path } => write!(f, "project({})", path),
        }
    }
}

/// Named dependency sets of a consumer (`implementation`, `runtimeOnly`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configurations {
    sets: BTreeMap<String, Vec<Dependency>>,
}

impl Configurations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `dependency` unless the configuration already has it.
    pub fn add(&mut self, configuration: &str, dependency: Dependency) -> bool {
        let set = self.sets.entry(configuration.to_string()).or_default();
        if set.contains(&dependency) {
            return false;
        }
        set.push(dependency);
        true
    }

    pub fn remove(&mut self, configuration: &str, dependency: &Dependency) -> bool {
        match self.sets.get_mut(configuration) {
            Some(set) => {
                let before = set.len();
                set.retain(|d| d != dependency);
                set.len() != before
            }
            None => false,
        }
    }

    pub fn get(&self, configuration: &str) -> &[Dependency] {
        self.sets.get(configuration).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, configuration: &str, dependency: &Dependency) -> bool {
        self.get(configuration).contains(dependency)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}
