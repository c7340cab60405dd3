//! Loader for MCPConfig-style `config.json` files.
//!
//! ```json
//! {
//!   "spec": 3, "version": "1.19.2",
//!   "data": { "mappings": "config/joined.tsrg", "patches": { "joined": "patches/joined/" } },
//!   "steps": { "joined": [ { "type": "downloadClient" }, { "type": "rename", "input": "{downloadClientOutput}" } ] },
//!   "functions": { "rename": { "version": "g:n:v:fatjar", "repo": "https://...", "args": ["--input", "{input}"] } }
//! }
//! ```
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::definition::{DefinitionKey, PipelineContext};
use super::graph::shared_kind;
use super::template::{ArgValue, Operation, StepTemplate, StripMode, ToolFunction};
use crate::maven::MavenCoordinate;
use crate::models::Side;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Path(String),
    PerSide(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionSpec {
    pub version: MavenCoordinate,
    pub repo: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub jvmargs: Vec<String>,
    #[serde(default)]
    pub java_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub spec: u32,
    pub version: String,
    #[serde(default)]
    pub java_target: Option<u32>,
    #[serde(default)]
    pub data: BTreeMap<String, DataValue>,
    pub steps: BTreeMap<String, Vec<BTreeMap<String, String>>>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSpec>,
    /// Directory `data` paths are relative to
    #[serde(skip)]
    pub root: PathBuf,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {:?}", path))?;
        let mut config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config {:?}", path))?;
        config.root = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        log::debug!(
            "Loaded pipeline config for {} (spec {}) with sides {:?}",
            config.version,
            config.spec,
            config.steps.keys().collect::<Vec<_>>()
        );
        Ok(config)
    }

    fn data_path(&self, value: &DataValue, side: Side) -> Option<String> {
        let relative = match value {
            DataValue::Path(p) => p,
            DataValue::PerSide(sides) => sides.get(side.as_str())?,
        };
        Some(self.root.join(relative).to_string_lossy().to_string())
    }

    /// Context for `side`, with every data entry resolved to an absolute path.
    pub fn context(&self, side: Side, variant: &str, workspace: &Path, cache_root: &Path) -> PipelineContext {
        let key = DefinitionKey::new(self.version.clone(), side, variant);
        let mut context = PipelineContext::new(key, workspace, cache_root);
        for (name, value) in &self.data {
            if let Some(path) = self.data_path(value, side) {
                context = context.with_value(name.clone(), path);
            }
        }
        context
    }

    /// Step templates for `side`, in declaration order.
    pub fn templates(&self, side: Side) -> Result<Vec<StepTemplate>> {
        let steps = self
            .steps
            .get(side.as_str())
            .with_context(|| format!("Pipeline config {} has no '{}' steps", self.version, side))?;

        steps
            .iter()
            .map(|raw| self.template(raw))
            .collect()
    }

    fn function(&self, name: &str) -> Result<Operation> {
        let spec = self
            .functions
            .get(name)
            .with_context(|| format!("Unknown step type or function '{}'", name))?;
        Ok(Operation::Tool {
            function: ToolFunction {
                jar: spec.version.clone(),
                repository: spec.repo.clone(),
                args: spec.args.clone(),
                jvm_args: spec.jvmargs.clone(),
            },
        })
    }

    fn template(&self, raw: &BTreeMap<String, String>) -> Result<StepTemplate> {
        let kind = raw
            .get("type")
            .context("Pipeline config step has no 'type'")?;
        let name = raw.get("name").unwrap_or(kind).clone();

        let mut template = match kind.as_str() {
            "downloadManifest" => StepTemplate::new(name, Operation::DownloadManifest),
            "downloadJson" => StepTemplate::new(name, Operation::DownloadVersionJson)
                .arg("manifest", ArgValue::step("downloadManifest")),
            "listLibraries" => StepTemplate::new(name, Operation::ListLibraries)
                .arg("json", ArgValue::step("downloadJson")),
            "bundleExtractJar" => StepTemplate::new(name, Operation::ExtractBundle),
            "strip" => StepTemplate::new(name, Operation::Strip { mode: StripMode::Whitelist })
                .arg("mappings", ArgValue::Context("mappings".into())),
            "inject" => StepTemplate::new(name, Operation::Inject)
                .arg("inject", ArgValue::Context("inject".into())),
            "patch" => StepTemplate::new(name, Operation::Patch)
                .arg("patches", ArgValue::Context("patches".into())),
            other => match shared_kind(other) {
                Some(kind) => StepTemplate::new(name, Operation::DownloadArtifact { kind })
                    .arg("json", ArgValue::step("downloadJson")),
                None => StepTemplate::new(name, self.function(other)?),
            },
        };

        for (key, value) in raw {
            if key == "type" || key == "name" {
                continue;
            }
            template = template.arg(key.clone(), ArgValue::parse(value));
        }
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactKind;
    use crate::pipeline::graph;

    const CONFIG: &str = r#"{
        "spec": 3,
        "version": "1.19.2",
        "java_target": 17,
        "data": {
            "mappings": "config/joined.tsrg",
            "inject": "inject/",
            "patches": { "client": "patches/client/", "joined": "patches/joined/" }
        },
        "steps": {
            "joined": [
                { "type": "downloadManifest" },
                { "type": "downloadJson" },
                { "type": "downloadClient" },
                { "type": "strip", "name": "stripClient", "input": "{downloadClientOutput}" },
                { "type": "listLibraries" },
                { "type": "rename", "input": "{stripClientOutput}", "libraries": "{listLibrariesOutput}" },
                { "type": "inject", "input": "{renameOutput}" },
                { "type": "patch", "input": "{injectOutput}" }
            ]
        },
        "functions": {
            "rename": {
                "version": "net.minecraftforge:ForgeAutoRenamingTool:0.1.22:all",
                "repo": "https://maven.minecraftforge.net/",
                "args": ["--input", "{input}", "--output", "{output}", "--map", "{mappings}", "--cfg", "{libraries}"],
                "jvmargs": ["-Xmx2G"]
            }
        }
    }"#;

    fn load(dir: &Path) -> PipelineConfig {
        let path = dir.join("config.json");
        std::fs::write(&path, CONFIG).unwrap();
        PipelineConfig::load(&path).unwrap()
    }

    #[test]
    fn test_templates_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());
        let templates = config.templates(Side::Joined).unwrap();

        let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["downloadManifest", "downloadJson", "downloadClient", "stripClient", "listLibraries", "rename", "inject", "patch"]
        );
        assert_eq!(
            templates[2].operation,
            Operation::DownloadArtifact { kind: ArtifactKind::ClientJar }
        );
        match &templates[5].operation {
            Operation::Tool { function } => {
                assert_eq!(function.jar.name, "ForgeAutoRenamingTool");
                assert_eq!(function.jvm_args, vec!["-Xmx2G"]);
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert!(config.templates(Side::Server).is_err());
    }

    #[test]
    fn test_context_resolves_data_per_side() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());
        let ctx = config.context(Side::Joined, "mcp", &dir.path().join("work"), &dir.path().join("cache"));

        assert_eq!(
            ctx.lookup("patches"),
            Some(dir.path().join("patches/joined/").to_string_lossy().to_string())
        );
        assert_eq!(ctx.lookup("version").as_deref(), Some("1.19.2"));

        let server = config.context(Side::Server, "mcp", dir.path(), dir.path());
        assert_eq!(server.lookup("patches"), None);
    }

    #[test]
    fn test_config_builds_ordered_graph() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path());
        let ctx = config.context(Side::Joined, "mcp", &dir.path().join("work"), &dir.path().join("cache"));
        let definition = graph::build(&config.templates(Side::Joined).unwrap(), &ctx).unwrap();

        assert_eq!(definition.final_step().unwrap().name, "patch");
        assert!(definition.step("downloadClient").unwrap().shared);
        let strip = definition.step("stripClient").unwrap();
        assert_eq!(strip.depends_on, vec!["downloadClient"]);
    }
}
