//! crucible - run game-artifact pipelines and publish deobfuscated replacements

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crucible_lib::cache::{ArtifactKind, CacheSelector, DownloadDescriptor};
use crucible_lib::config::{Settings, VERSION_MANIFEST_URL};
use crucible_lib::maven::MavenCoordinate;
use crucible_lib::models::manifest::{VersionJson, VersionManifest};
use crucible_lib::models::Side;
use crucible_lib::pipeline::PipelineConfig;
use crucible_lib::replacement::{
    Configurations, Dependency, DependencyResolver, ObfuscatedDependencyHandler, ResolvedDependency, ResolvedModule,
};
use crucible_lib::reporter::LogProgressReporter;
use crucible_lib::utils::version::MinecraftVersion;
use crucible_lib::Session;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(author, version, about = "Reproducible decompile, patch and remap pipelines")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Never touch the network
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two game versions
    Compare { left: String, right: String },
    /// Download a game artifact into the cache
    Download {
        version: String,
        #[arg(value_enum)]
        artifact: Artifact,
    },
    /// Build and run a pipeline from an MCPConfig-style config.json
    Pipeline {
        config: PathBuf,
        #[arg(long, default_value = "joined")]
        side: Side,
        #[arg(long, default_value = "mcp")]
        variant: String,
        /// Print the step order without running anything
        #[arg(long)]
        plan: bool,
    },
    /// Replace an obfuscated jar and publish it into the synthetic repository
    Replace {
        /// Coordinate of the dependency, e.g. com.example:game:1.19-obf
        coordinate: MavenCoordinate,
        /// Jar backing the dependency
        #[arg(long)]
        jar: PathBuf,
        /// First-level children as coordinate=path
        #[arg(long = "child")]
        children: Vec<String>,
        /// Mappings handed to the rename tool
        #[arg(long)]
        mappings: PathBuf,
        #[arg(long, default_value = "implementation")]
        configuration: String,
    },
    /// Print the effective settings
    Settings,
}

#[derive(Clone, Copy, ValueEnum)]
enum Artifact {
    Client,
    Server,
    ClientMappings,
    ServerMappings,
}

impl From<Artifact> for ArtifactKind {
    fn from(artifact: Artifact) -> Self {
        match artifact {
            Artifact::Client => ArtifactKind::ClientJar,
            Artifact::Server => ArtifactKind::ServerJar,
            Artifact::ClientMappings => ArtifactKind::ClientMappings,
            Artifact::ServerMappings => ArtifactKind::ServerMappings,
        }
    }
}

/// Resolves exactly the modules given on the command line.
struct StaticResolver {
    modules: BTreeMap<MavenCoordinate, ResolvedModule>,
}

impl DependencyResolver for StaticResolver {
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

fn parse_child(raw: &str) -> Result<ResolvedModule> {
    let (coordinate, path) = raw
        .split_once('=')
        .with_context(|| format!("Expected coordinate=path, got '{}'", raw))?;
    Ok(ResolvedModule::new(MavenCoordinate::parse(coordinate)?).with_file(path))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().or_else(Settings::default_path);
    let mut settings = Settings::load(settings_path.as_deref())?;
    if cli.offline {
        settings.offline = true;
    }

    match cli.command {
        Commands::Compare { left, right } => {
            let (a, b) = (MinecraftVersion::parse(&left)?, MinecraftVersion::parse(&right)?);
            let symbol = match a.cmp(&b) {
                std::cmp::Ordering::Less => "<",
                std::cmp::Ordering::Equal => "==",
                std::cmp::Ordering::Greater => ">",
            };
            println!("{} {} {}", a, symbol, b);
        }
        Commands::Download { version, artifact } => {
            let session = Session::with_reporter(settings, Arc::new(LogProgressReporter))?;
            let cache = session.cache();

            let manifest_path = cache
                .cached(
                    &CacheSelector::launcher_manifest(),
                    &DownloadDescriptor::new(VERSION_MANIFEST_URL, ArtifactKind::Manifest),
                )
                .await?;
            let manifest: VersionManifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
            let entry = manifest
                .find(&version)
                .with_context(|| format!("Unknown version {}", version))?;

            let json_path = cache
                .cached(
                    &CacheSelector::version_json(&version),
                    &DownloadDescriptor::new(entry.url.clone(), ArtifactKind::VersionJson)
                        .with_sha1(entry.sha1.clone())
                        .with_version(version.as_str()),
                )
                .await?;
            let json: VersionJson = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;

            let kind = ArtifactKind::from(artifact);
            let info = json
                .download(kind)
                .with_context(|| format!("{} has no {:?} download", version, kind))?;
            let path = cache
                .cached(
                    &CacheSelector::versioned(&version, kind),
                    &DownloadDescriptor::new(info.url.clone(), kind)
                        .with_sha1(info.sha1.clone())
                        .with_version(version.as_str()),
                )
                .await?;
            println!("{}", path.display());
        }
        Commands::Pipeline {
            config,
            side,
            variant,
            plan,
        } => {
            let session = Session::with_reporter(settings, Arc::new(LogProgressReporter))?;
            let config = PipelineConfig::load(&config)?;
            let definition = session.definition(&config, side, &variant)?;
            if plan {
                for step in &definition.steps {
                    println!("{:<28} {:<20} {}", step.name, step.operation.name(), step.output.display());
                }
                return Ok(());
            }
            let output = session.run(&definition).await?;
            println!("{}", output.path.display());
        }
        Commands::Replace {
            coordinate,
            jar,
            children,
            mappings,
            configuration,
        } => {
            let mut root = ResolvedModule::new(coordinate.clone()).with_file(jar);
            for child in &children {
                root = root.with_child(parse_child(child)?);
            }
            let mut modules = BTreeMap::new();
            for child in &root.children {
                modules.insert(child.coordinate.clone(), child.clone());
            }
            modules.insert(coordinate.clone(), root);

            let resolver = Arc::new(StaticResolver { modules });
            let handler = ObfuscatedDependencyHandler::new(resolver, &settings, mappings)?;
            let mut session = Session::with_reporter(settings, Arc::new(LogProgressReporter))?;
            let definitions = session.definitions().clone();
            session.register_handler(Arc::new(handler.with_definitions(definitions)));

            let mut configurations = Configurations::new();
            session.add_dependency(&mut configurations, &configuration, Dependency::module(coordinate))?;
            for path in session.materialize_all().await? {
                println!("{}", path.display());
            }
            for dependency in configurations.get(&configuration) {
                log::info!("{} -> {}", configuration, dependency);
            }
        }
        Commands::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
