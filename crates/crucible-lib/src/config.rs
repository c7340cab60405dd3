//! Session settings and fixed endpoints.
//!
//! Settings are read from an optional JSON file. Missing fields fall back to
//! their defaults and `CRUCIBLE_OFFLINE` overrides the `offline` flag.
use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// URL Constants
pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const LIBRARIES_URL: &str = "https://libraries.minecraft.net/";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/";
pub const NEOFORGE_MAVEN_URL: &str = "https://maven.neoforged.net/releases/";

pub const OFFLINE_ENV: &str = "CRUCIBLE_OFFLINE";
pub const USER_AGENT: &str = concat!("crucible/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared artifact cache (version jars, manifests, libraries, tools)
    pub cache_dir: PathBuf,
    /// An existing game launcher installation consulted before downloading
    pub launcher_dir: Option<PathBuf>,
    pub offline: bool,
    /// Maximum number of pipeline steps running at once
    pub concurrency: usize,
    pub java: PathBuf,
    pub javac: PathBuf,
    pub naming_channel: String,
    pub synthetic_group_prefix: String,
    /// Backing directory of the synthetic repository
    pub repository_dir: PathBuf,
    /// Root under which per-pipeline workspaces are created
    pub workspace_dir: PathBuf,
    /// `None` leaves the HTTP client's default in place
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_root = default_data_root();
        Self {
            cache_dir: default_cache_dir(),
            launcher_dir: default_launcher_dir(),
            offline: false,
            concurrency: 4,
            java: PathBuf::from("java"),
            javac: PathBuf::from("javac"),
            naming_channel: "official".to_string(),
            synthetic_group_prefix: "fg.deobf".to_string(),
            repository_dir: data_root.join("repository"),
            workspace_dir: data_root.join("workspaces"),
            request_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Load settings from `path` when it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings at {:?}", path))?;
                serde_json::from_str::<Settings>(&content)
                    .with_context(|| format!("Failed to parse settings at {:?}", path))?
            }
            Some(path) => {
                log::debug!("No settings file at {:?}, using defaults", path);
                Settings::default()
            }
            None => Settings::default(),
        };
        settings.apply_env_overrides(std::env::var(OFFLINE_ENV).ok().as_deref());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        crate::utils::fs::write_atomically(path, |file| {
            use std::io::Write;
            file.write_all(&json)?;
            Ok(())
        })
    }

    fn apply_env_overrides(&mut self, offline: Option<&str>) {
        if let Some(value) = offline {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.offline = true,
                "0" | "false" | "no" | "off" => self.offline = false,
                other => log::warn!("Ignoring unrecognised {}={}", OFFLINE_ENV, other),
            }
        }
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.cache_dir.join("libraries")
    }

    /// `settings.json` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "crucible", "crucible").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Group prefix for synthetic coordinates: `<prefix>.<channel>`.
    pub fn synthetic_group_root(&self) -> String {
        format!("{}.{}", self.synthetic_group_prefix, self.naming_channel)
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        builder.build().context("Failed to build HTTP client")
    }
}

fn default_data_root() -> PathBuf {
    ProjectDirs::from("net", "crucible", "crucible")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".crucible"))
}

fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("net", "crucible", "crucible")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".crucible").join("cache"))
}

/// Where the official launcher keeps its files on this platform.
fn default_launcher_dir() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    if cfg!(target_os = "windows") {
        Some(base.config_dir().join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        Some(base.data_dir().join("minecraft"))
    } else {
        Some(base.home_dir().join(".minecraft"))
    }
}
