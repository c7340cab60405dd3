use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::template::Operation;
use crate::models::Side;

/// Identifies one definition per (version, side, variant) in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionKey {
    pub version: String,
    pub side: Side,
    pub variant: String,
}

impl DefinitionKey {
    pub fn new(version: impl Into<String>, side: Side, variant: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            side,
            variant: variant.into(),
        }
    }
}

impl fmt::Display for DefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.version, self.side, self.variant)
    }
}

/// Global inputs a pipeline is built against.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub key: DefinitionKey,
    pub workspace: PathBuf,
    /// Root of the shared artifact cache, home of the shared download steps
    pub cache_root: PathBuf,
    /// Values for `{key}` lookups beyond the built-in `version`, `side` and `variant`
    pub values: BTreeMap<String, String>,
}

impl PipelineContext {
    pub fn new(key: DefinitionKey, workspace: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            key,
            workspace: workspace.into(),
            cache_root: cache_root.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "version" => Some(self.key.version.clone()),
            "side" => Some(self.key.side.to_string()),
            "variant" => Some(self.key.variant.clone()),
            _ => self.values.get(key).cloned(),
        }
    }
}

/// A step argument after graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedArg {
    Value(String),
    File(PathBuf),
    StepOutput { step: String, path: PathBuf },
    List(Vec<ResolvedArg>),
}

impl ResolvedArg {
    /// Render as a single command-line style string. Lists join with the
    /// platform path separator.
    pub fn render(&self) -> String {
        match self {
            ResolvedArg::Value(v) => v.clone(),
            ResolvedArg::File(p) | ResolvedArg::StepOutput { path: p, .. } => {
                p.to_string_lossy().to_string()
            }
            ResolvedArg::List(items) => {
                let sep = if cfg!(windows) { ";" } else { ":" };
                items.iter().map(|i| i.render()).collect::<Vec<_>>().join(sep)
            }
        }
    }

    pub fn as_path(&self) -> Option<PathBuf> {
        match self {
            ResolvedArg::Value(v) => Some(PathBuf::from(v)),
            ResolvedArg::File(p) | ResolvedArg::StepOutput { path: p, .. } => Some(p.clone()),
            ResolvedArg::List(_) => None,
        }
    }

    /// Flatten into paths; a single value becomes a one-element list.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            ResolvedArg::List(items) => items.iter().flat_map(|i| i.paths()).collect(),
            other => other.as_path().into_iter().collect(),
        }
    }
}

/// An assembled, immutable pipeline node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub name: String,
    /// Task identity. Shared downloads use `shared:<name>:<version>`.
    pub id: String,
    pub operation: Operation,
    pub args: BTreeMap<String, ResolvedArg>,
    pub output: PathBuf,
    pub output_is_dir: bool,
    /// Names of the steps whose outputs this step consumes, in declaration order
    pub depends_on: Vec<String>,
    pub shared: bool,
}

impl PipelineStep {
    /// Directory holding the step's output, fingerprint and side files.
    pub fn step_dir(&self) -> Option<&Path> {
        if self.shared {
            return None;
        }
        self.output.parent()
    }

    pub fn arg(&self, key: &str) -> Option<&ResolvedArg> {
        self.args.get(key)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub context: PipelineContext,
    /// Steps in execution order
    pub steps: Vec<PipelineStep>,
}

impl PipelineDefinition {
    pub fn key(&self) -> &DefinitionKey {
        &self.context.key
    }

    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// The step whose output is the pipeline's result.
    pub fn final_step(&self) -> Option<&PipelineStep> {
        self.steps.last()
    }
}
