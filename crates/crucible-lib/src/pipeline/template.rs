//! Step templates: the unresolved form of a pipeline step.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::cache::ArtifactKind;
use crate::maven::MavenCoordinate;

/// Names a step whose output is consumed by another step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepRef {
    pub step: String,
}

impl StepRef {
    pub fn new(step: impl Into<String>) -> Self {
        Self { step: step.into() }
    }
}

/// A step argument before graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Literal(String),
    StepOutput(StepRef),
    /// A value looked up in the pipeline context (`{version}`, `{mappings}`)
    Context(String),
    File(PathBuf),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Convert the `{name}` placeholder form.
    ///
    /// `{fooOutput}` references the output of step `foo`; any other `{key}`
    /// is a context lookup. Everything else is a literal.
    pub fn parse(raw: &str) -> Self {
        let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            return ArgValue::Literal(raw.to_string());
        };
        if inner.is_empty() || inner.contains(|c| c == '{' || c == '}') {
            return ArgValue::Literal(raw.to_string());
        }
        match inner.strip_suffix("Output") {
            Some(step) if !step.is_empty() => ArgValue::StepOutput(StepRef::new(step)),
            _ => ArgValue::Context(inner.to_string()),
        }
    }

    pub fn step(name: impl Into<String>) -> Self {
        ArgValue::StepOutput(StepRef::new(name))
    }

    pub fn literal(value: impl Into<String>) -> Self {
        ArgValue::Literal(value.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ArgValue::File(path.into())
    }

    /// Every step this value depends on.
    pub fn step_refs(&self) -> Vec<&StepRef> {
        match self {
            ArgValue::StepOutput(r) => vec![r],
            ArgValue::List(items) => items.iter().flat_map(|i| i.step_refs()).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(raw: &str) -> Self {
        ArgValue::parse(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripMode {
    Whitelist,
    Blacklist,
}

/// Placeholders a tool's command line may name that are filled in when the
/// step runs rather than from its arguments.
pub const RUNTIME_PLACEHOLDERS: &[&str] = &["output", "log"];

/// `{name}` placeholder names in `text`, in order of appearance.
pub fn placeholder_names(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        if !name.is_empty() && !name.contains('{') {
            names.push(name);
        }
        rest = &rest[start + len + 1..];
    }
    names
}

/// An external jar run as `java <jvm args> -jar <jar> <args>`.
///
/// `{name}` placeholders in `args` and `jvm_args` are filled from the
/// step's arguments, plus `{output}` and `{log}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub jar: MavenCoordinate,
    pub repository: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
}

impl ToolFunction {
    /// Placeholders that must be supplied as step arguments.
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.jvm_args
            .iter()
            .chain(self.args.iter())
            .flat_map(|a| placeholder_names(a))
            .filter(|name| !RUNTIME_PLACEHOLDERS.contains(name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    DownloadManifest,
    DownloadVersionJson,
    DownloadArtifact { kind: ArtifactKind },
    ListLibraries,
    ExtractBundle,
    Unpack,
    Repack,
    Inject,
    Patch,
    Strip { mode: StripMode },
    StripSideAnnotations,
    ConcatRules,
    Recompile,
    Tool { function: ToolFunction },
    Provided { path: PathBuf },
}

/// What an operation writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    File { extension: String },
    Directory,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DownloadManifest => "downloadManifest",
            Operation::DownloadVersionJson => "downloadJson",
            Operation::DownloadArtifact { .. } => "downloadArtifact",
            Operation::ListLibraries => "listLibraries",
            Operation::ExtractBundle => "extractBundle",
            Operation::Unpack => "unpack",
            Operation::Repack => "repack",
            Operation::Inject => "inject",
            Operation::Patch => "patch",
            Operation::Strip { .. } => "strip",
            Operation::StripSideAnnotations => "stripSideAnnotations",
            Operation::ConcatRules => "concatRules",
            Operation::Recompile => "recompile",
            Operation::Tool { .. } => "tool",
            Operation::Provided { .. } => "provided",
        }
    }

    pub fn default_output(&self) -> OutputKind {
        let extension = match self {
            Operation::Unpack => return OutputKind::Directory,
            Operation::DownloadManifest | Operation::DownloadVersionJson => "json",
            Operation::DownloadArtifact { kind } => match kind {
                ArtifactKind::Manifest | ArtifactKind::VersionJson => "json",
                ArtifactKind::ClientMappings | ArtifactKind::ServerMappings => "txt",
                ArtifactKind::ClientJar | ArtifactKind::ServerJar | ArtifactKind::Library => "jar",
            },
            Operation::ListLibraries => "txt",
            Operation::ConcatRules => "cfg",
            Operation::Patch | Operation::StripSideAnnotations => "zip",
            Operation::Provided { path } => {
                if path.extension().is_none() && path.is_dir() {
                    return OutputKind::Directory;
                }
                return OutputKind::File {
                    extension: path
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("jar")
                        .to_string(),
                };
            }
            Operation::ExtractBundle
            | Operation::Repack
            | Operation::Inject
            | Operation::Strip { .. }
            | Operation::Recompile
            | Operation::Tool { .. } => "jar",
        };
        OutputKind::File {
            extension: extension.to_string(),
        }
    }

    /// Download operations read through the shared artifact cache.
    pub fn is_download(&self) -> bool {
        matches!(
            self,
            Operation::DownloadManifest
                | Operation::DownloadVersionJson
                | Operation::DownloadArtifact { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,
    pub operation: Operation,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    /// Overrides the operation's default output extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl StepTemplate {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            args: BTreeMap::new(),
            extension: None,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn output_kind(&self) -> OutputKind {
        match (&self.extension, self.operation.default_output()) {
            (Some(ext), OutputKind::File { .. }) => OutputKind::File {
                extension: ext.clone(),
            },
            (_, kind) => kind,
        }
    }

    /// The declared arguments plus one per tool placeholder that no declared
    /// argument covers. `{fooOutput}` becomes a reference to step `foo` and
    /// any other `{key}` a context lookup.
    pub fn effective_args(&self) -> BTreeMap<String, ArgValue> {
        let mut args = self.args.clone();
        if let Operation::Tool { function } = &self.operation {
            for name in function.placeholders() {
                if !args.contains_key(name) {
                    args.insert(name.to_string(), ArgValue::parse(&format!("{{{}}}", name)));
                }
            }
        }
        args
    }

    pub fn step_refs(&self) -> Vec<StepRef> {
        self.effective_args()
            .values()
            .flat_map(|v| v.step_refs().into_iter().cloned().collect::<Vec<_>>())
            .collect()
    }
}
