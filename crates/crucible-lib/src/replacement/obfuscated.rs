//! Replaces dependencies whose jar manifest marks them as obfuscated.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::handler::{DependencyResolver, ReplacementContext, ReplacementHandler, ReplacementResult, ResolvedModule};
use crate::config::{Settings, FORGE_MAVEN_URL};
use crate::error::Error;
use crate::maven::MavenCoordinate;
use crate::models::Side;
use crate::pipeline::{
    graph, ArgValue, DefinitionCache, DefinitionKey, Operation, PipelineContext, PipelineDefinition, StepTemplate,
    ToolFunction,
};
use crate::repository::RepositoryEntry;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const OBFUSCATED_ATTRIBUTE: &str = "Obfuscated";
pub const OBFUSCATED_BY_ATTRIBUTE: &str = "Obfuscated-By";

const RENAME_TOOL: &str = "net.minecraftforge:ForgeAutoRenamingTool:1.0.6:all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationMarker {
    pub obfuscated_by: Option<String>,
}

/// Main-section attributes of a jar manifest. A jar without one yields an
/// empty map.
pub fn read_manifest(jar: &Path) -> Result<BTreeMap<String, String>> {
    let file = std::fs::File::open(jar).with_context(|| format!("Failed to open {:?}", jar))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("Failed to read {:?} as a jar", jar))?;
    let mut text = String::new();
    match archive.by_name(MANIFEST_PATH) {
        Ok(mut entry) => {
            entry
                .read_to_string(&mut text)
                .with_context(|| format!("Failed to read manifest of {:?}", jar))?;
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(BTreeMap::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read manifest of {:?}", jar)),
    }
    Ok(parse_manifest(&text))
}

fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut last: Option<String> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        // 72-byte wrapped values continue on lines starting with a space
        if let Some(continued) = line.strip_prefix(' ') {
            if let Some(value) = last.as_ref().and_then(|k| attributes.get_mut(k)) {
                value.push_str(continued);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            attributes.insert(key.clone(), value.trim_start().to_string());
            last = Some(key);
        }
    }
    attributes
}

pub fn read_marker(jar: &Path) -> Result<Option<ObfuscationMarker>> {
    let manifest = read_manifest(jar)?;
    let marked = manifest
        .get(OBFUSCATED_ATTRIBUTE)
        .map_or(false, |v| v.trim().eq_ignore_ascii_case("true"));
    if !marked {
        return Ok(None);
    }
    Ok(Some(ObfuscationMarker {
        obfuscated_by: manifest.get(OBFUSCATED_BY_ATTRIBUTE).cloned(),
    }))
}

/// Rename tool used when none is configured.
pub fn default_rename_tool() -> Result<ToolFunction> {
    Ok(ToolFunction {
        jar: MavenCoordinate::parse(RENAME_TOOL)?,
        repository: FORGE_MAVEN_URL.to_string(),
        args: ["--input", "{input}", "--output", "{output}", "--names", "{mappings}", "--ann-fix", "--ids-fix", "--src-fix", "--record-fix"]
            .iter()
            .map(|a| a.to_string())
            .collect(),
        jvm_args: Vec::new(),
    })
}

pub struct ObfuscatedDependencyHandler {
    resolver: Arc<dyn DependencyResolver>,
    synthetic_group_root: String,
    workspace: PathBuf,
    cache_root: PathBuf,
    rename: ToolFunction,
    mappings: PathBuf,
    definitions: Arc<DefinitionCache>,
}

impl ObfuscatedDependencyHandler {
    /// `mappings` are the naming channel's mappings handed to the rename tool.
    pub fn new(resolver: Arc<dyn DependencyResolver>, settings: &Settings, mappings: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            resolver,
            synthetic_group_root: settings.synthetic_group_root(),
            workspace: settings.workspace_dir.join("deobf"),
            cache_root: settings.cache_dir.clone(),
            rename: default_rename_tool()?,
            mappings: mappings.into(),
            definitions: Arc::new(DefinitionCache::new()),
        })
    }

    pub fn with_rename_tool(mut self, rename: ToolFunction) -> Self {
        self.rename = rename;
        self
    }

    pub fn with_definitions(mut self, definitions: Arc<DefinitionCache>) -> Self {
        self.definitions = definitions;
        self
    }

    /// `<prefix>.<channel>.<group>:name:version`
    pub fn synthetic_coordinate(&self, original: &MavenCoordinate) -> MavenCoordinate {
        MavenCoordinate {
            group: format!("{}.{}", self.synthetic_group_root, original.group),
            ..original.clone()
        }
    }

    fn raw_pipeline(&self, original: &MavenCoordinate, jar: &Path) -> Result<Arc<PipelineDefinition>> {
        let key = DefinitionKey::new(
            original.version.clone(),
            Side::Joined,
            format!("deobf:{}:{}", original.group, original.name),
        );
        self.definitions.get_or_build(&key, || {
            let workspace = self
                .workspace
                .join(&original.group)
                .join(&original.name)
                .join(&original.version);
            let context = PipelineContext::new(key.clone(), workspace, &self.cache_root)
                .with_value("mappings", self.mappings.to_string_lossy().to_string());
            let templates = [
                StepTemplate::new("provide", Operation::Provided { path: jar.to_path_buf() }),
                StepTemplate::new(
                    "rename",
                    Operation::Tool {
                        function: self.rename.clone(),
                    },
                )
                .arg("input", ArgValue::step("provide")),
            ];
            graph::build(&templates, &context)
        })
    }

    /// The single file behind `module` when it carries the marker.
    fn marked_file(&self, module: &ResolvedModule) -> Result<Option<(PathBuf, ObfuscationMarker)>> {
        let [file] = module.files.as_slice() else {
            log::debug!(
                "{} has {} files, keeping it unchanged",
                module.coordinate,
                module.files.len()
            );
            return Ok(None);
        };
        Ok(read_marker(file)?.map(|marker| (file.clone(), marker)))
    }

    fn build_result(&self, module: &ResolvedModule, jar: &Path, marker: ObfuscationMarker) -> Result<ReplacementResult> {
        let mut entry = RepositoryEntry::new(self.synthetic_coordinate(&module.coordinate));
        let mut nested = Vec::new();

        for child in &module.children {
            match self.marked_file(child)? {
                Some((file, child_marker)) => {
                    let result = self.build_result(child, &file, child_marker)?;
                    entry = entry.with_dependency(result.coordinate().clone());
                    nested.push(Arc::new(result));
                }
                None => entry = entry.with_dependency(child.coordinate.clone()),
            }
        }

        let raw = self.raw_pipeline(&module.coordinate, jar)?;
        let mut result = ReplacementResult::new(module.coordinate.clone(), entry, raw);
        result.nested = nested;
        if let Some(by) = marker.obfuscated_by {
            log::debug!("{} is obfuscated by {}", module.coordinate, by);
            result.configure = Some(Arc::new(move |entry: &mut RepositoryEntry| {
                entry.description = Some(format!("Deobfuscated artifact, originally obfuscated by {}", by));
            }));
        }
        Ok(result)
    }
}

impl ReplacementHandler for ObfuscatedDependencyHandler {
    fn name(&self) -> &str {
        "obfuscated"
    }

    fn try_replace(&self, context: &ReplacementContext<'_>) -> Result<Option<ReplacementResult>> {
        let resolved = self.resolver.resolve(context.coordinate)?;
        let ambiguous = |reason: String| -> anyhow::Error {
            Error::AmbiguousDependencyArtifact {
                dependency: context.coordinate.to_string(),
                reason,
            }
            .into()
        };

        let [file] = resolved.files.as_slice() else {
            return Err(ambiguous(format!("resolved to {} files, expected one", resolved.files.len())));
        };
        let [module] = resolved.modules.as_slice() else {
            return Err(ambiguous(format!(
                "resolved to {} first-level modules, expected one",
                resolved.modules.len()
            )));
        };

        let Some(marker) = read_marker(file)? else {
            log::debug!("{} has no obfuscation marker", context.coordinate);
            return Ok(None);
        };
        self.build_result(module, file, marker).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ops::tests_support::jar;
    use crate::replacement::handler::ResolvedDependency;
    use crate::replacement::Dependency;

    const MARKED: &str = "Manifest-Version: 1.0\nObfuscated: true\nObfuscated-By: ProGuard\n";

    struct FakeResolver {
        modules: BTreeMap<MavenCoordinate, ResolvedModule>,
    }

    impl DependencyResolver for FakeResolver {
        fn resolve(&self, coordinate: &MavenCoordinate) -> Result<ResolvedDependency> {
            Ok(match self.modules.get(coordinate) {
                Some(module) => ResolvedDependency {
                    files: module.files.clone(),
                    modules: vec![module.clone()],
                },
                None => ResolvedDependency::default(),
            })
        }
    }

    fn coordinate(raw: &str) -> MavenCoordinate {
        MavenCoordinate::parse(raw).unwrap()
    }

    fn handler(dir: &Path, modules: Vec<ResolvedModule>) -> ObfuscatedDependencyHandler {
        let resolver = FakeResolver {
            modules: modules.into_iter().map(|m| (m.coordinate.clone(), m)).collect(),
        };
        let settings = Settings {
            cache_dir: dir.join("cache"),
            workspace_dir: dir.join("work"),
            ..Settings::default()
        };
        ObfuscatedDependencyHandler::new(Arc::new(resolver), &settings, dir.join("mappings.txt")).unwrap()
    }

    fn replace(handler: &ObfuscatedDependencyHandler, raw: &str) -> Result<Option<ReplacementResult>> {
        let coordinate = coordinate(raw);
        let dependency = Dependency::module(coordinate.clone());
        handler.try_replace(&ReplacementContext {
            dependency: &dependency,
            coordinate: &coordinate,
            configuration: "implementation",
        })
    }

    #[test]
    fn test_parse_manifest_continuations() {
        let manifest = parse_manifest("Manifest-Version: 1.0\r\nObfuscated-By: Some Very Long\r\n  Obfuscator\r\n\r\nName: a/B.class\r\nObfuscated: false\r\n");
        assert_eq!(manifest["Obfuscated-By"], "Some Very Long Obfuscator");
        assert!(!manifest.contains_key("Name"));
    }

    #[test]
    fn test_marked_game_with_unmarked_lib() {
        let dir = tempfile::tempdir().unwrap();
        let game_jar = dir.path().join("game.jar");
        let lib_jar = dir.path().join("lib.jar");
        jar(&game_jar, &[(MANIFEST_PATH, MARKED), ("a.class", "A")]);
        jar(&lib_jar, &[(MANIFEST_PATH, "Manifest-Version: 1.0\n"), ("Lib.class", "L")]);

        let lib = ResolvedModule::new(coordinate("com.example:lib:2.0")).with_file(&lib_jar);
        let game = ResolvedModule::new(coordinate("com.example:game:1.19-obf"))
            .with_file(&game_jar)
            .with_child(lib);
        let handler = handler(dir.path(), vec![game]);

        let result = replace(&handler, "com.example:game:1.19-obf").unwrap().unwrap();
        let entry = result.configured_entry();
        assert_eq!(entry.coordinate.group, "fg.deobf.official.com.example");
        assert_eq!(entry.coordinate.name, "game");
        assert_eq!(entry.coordinate.version, "1.19-obf");
        assert_eq!(entry.dependencies, vec![coordinate("com.example:lib:2.0")]);
        assert!(entry.description.unwrap().contains("ProGuard"));
        assert!(result.nested.is_empty());
        assert_eq!(result.raw.order(), vec!["provide", "rename"]);
    }

    #[test]
    fn test_marked_children_become_nested() {
        let dir = tempfile::tempdir().unwrap();
        let mut children = Vec::new();
        for name in ["core", "render"] {
            let path = dir.path().join(format!("{}.jar", name));
            jar(&path, &[(MANIFEST_PATH, MARKED)]);
            children.push(ResolvedModule::new(coordinate(&format!("com.example:{}:1.0", name))).with_file(&path));
        }
        let game_jar = dir.path().join("game.jar");
        jar(&game_jar, &[(MANIFEST_PATH, MARKED)]);
        let mut game = ResolvedModule::new(coordinate("com.example:game:1.19-obf")).with_file(&game_jar);
        game.children = children;

        let handler = handler(dir.path(), vec![game]);
        let result = Arc::new(replace(&handler, "com.example:game:1.19-obf").unwrap().unwrap());

        assert_eq!(result.flatten().len(), 3);
        assert_eq!(
            result.entry.dependencies,
            vec![
                coordinate("fg.deobf.official.com.example:core:1.0"),
                coordinate("fg.deobf.official.com.example:render:1.0"),
            ]
        );
    }

    #[test]
    fn test_unmarked_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jar");
        jar(&path, &[("a.class", "A")]);
        let handler = handler(
            dir.path(),
            vec![ResolvedModule::new(coordinate("com.example:plain:1.0")).with_file(&path)],
        );
        assert!(replace(&handler, "com.example:plain:1.0").unwrap().is_none());
    }

    #[test]
    fn test_ambiguous_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path(), Vec::new());
        let err = replace(&handler, "com.example:missing:1.0").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AmbiguousDependencyArtifact { .. })
        ));
    }
}
