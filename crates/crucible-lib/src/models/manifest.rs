//! Version manifest and per-version JSON documents published by the game's
//! launcher metadata service.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cache::ArtifactKind;
use crate::maven::MavenCoordinate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub latest: Latest,
    pub versions: Vec<ManifestVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Latest {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVersion {
    pub id: String,

    #[serde(rename = "type")]
    pub release_type: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
}

impl VersionManifest {
    pub fn find(&self, id: &str) -> Option<&ManifestVersion> {
        self.versions.iter().find(|v| v.id == id)
    }
}

/// Per-version document (`<version>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    #[serde(default)]
    pub downloads: VersionDownloads,

    #[serde(default)]
    pub libraries: Vec<Library>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndex>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<DownloadInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<DownloadInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_mappings: Option<DownloadInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_mappings: Option<DownloadInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl VersionJson {
    pub fn download(&self, kind: ArtifactKind) -> Option<&DownloadInfo> {
        match kind {
            ArtifactKind::ClientJar => self.downloads.client.as_ref(),
            ArtifactKind::ServerJar => self.downloads.server.as_ref(),
            ArtifactKind::ClientMappings => self.downloads.client_mappings.as_ref(),
            ArtifactKind::ServerMappings => self.downloads.server_mappings.as_ref(),
            ArtifactKind::Manifest | ArtifactKind::VersionJson | ArtifactKind::Library => None,
        }
    }

    /// Libraries whose rules allow them on `os`.
    pub fn libraries_for(&self, os: OsType) -> impl Iterator<Item = &Library> {
        self.libraries.iter().filter(move |lib| lib.applies_to(os))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub id: String,
    pub sha1: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    pub component: String,
    pub major_version: u32,
}

/// Library definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    /// Maven coordinates
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    /// Custom Maven repository URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, LibraryArtifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Where a library comes from and where it lives under a `libraries/` root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub coordinate: MavenCoordinate,
    pub relative_path: String,
    pub url: String,
    pub sha1: Option<String>,
}

impl Library {
    pub fn applies_to(&self, os: OsType) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };

        let mut include = false;
        for rule in rules {
            if rule.matches(os) {
                include = matches!(rule.action, RuleAction::Allow);
            }
        }
        include
    }

    /// Resolve the main artifact. Libraries without explicit download info
    /// fall back to their Maven repository (or the default libraries host).
    pub fn resolve(&self, default_repository: &str) -> anyhow::Result<ResolvedLibrary> {
        let coordinate = MavenCoordinate::parse(&self.name)?;
        let artifact = self.downloads.as_ref().and_then(|d| d.artifact.as_ref());

        let relative_path = artifact
            .and_then(|a| a.path.clone())
            .unwrap_or_else(|| coordinate.to_path());
        let url = match artifact.and_then(|a| a.url.clone()).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => {
                let repo = self.url.as_deref().unwrap_or(default_repository);
                format!("{}/{}", repo.trim_end_matches('/'), relative_path)
            }
        };

        Ok(ResolvedLibrary {
            coordinate,
            relative_path,
            url,
            sha1: artifact.and_then(|a| a.sha1.clone()),
        })
    }
}

/// Rule for conditional libraries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl Rule {
    pub fn matches(&self, os: OsType) -> bool {
        if let Some(ref os_rule) = self.os {
            if let Some(ref os_name) = os_rule.name {
                if os_name != os.as_str() {
                    return false;
                }
            }

            if let Some(ref arch) = os_rule.arch {
                let normalized_arch = match arch.as_str() {
                    "x64" | "amd64" => "x86_64",
                    "arm64" => "aarch64",
                    other => other,
                };
                if normalized_arch != os.arch() {
                    return false;
                }
            }
        }

        // Pipelines never run as a demo user or with a custom resolution.
        if let Some(ref features) = self.features {
            if features.values().any(|required| *required) {
                return false;
            }
        }

        true
    }
}

/// Operating system types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Windows,
    MacOS,
    MacOSArm64,
    Linux,
    LinuxArm64,
}

impl OsType {
    /// Detect the current OS
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsType::Windows
        } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            OsType::MacOSArm64
        } else if cfg!(target_os = "macos") {
            OsType::MacOS
        } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
            OsType::LinuxArm64
        } else {
            OsType::Linux
        }
    }

    /// Get the OS name as a string (for rule matching)
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux | OsType::LinuxArm64 => "linux",
            OsType::MacOS | OsType::MacOSArm64 => "osx",
        }
    }

    pub fn arch(&self) -> &'static str {
        match self {
            OsType::MacOSArm64 | OsType::LinuxArm64 => "aarch64",
            OsType::Windows | OsType::MacOS | OsType::Linux => "x86_64",
        }
    }

    /// Get the classpath separator for this OS
    pub fn classpath_separator(&self) -> &'static str {
        match self {
            OsType::Windows => ";",
            _ => ":",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib_with_rules(rules: serde_json::Value) -> Library {
        serde_json::from_value(serde_json::json!({
            "name": "org.lwjgl:lwjgl:3.3.1",
            "rules": rules,
        }))
        .unwrap()
    }

    #[test]
    fn test_library_without_rules_is_included() {
        let lib: Library = serde_json::from_value(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18"
        }))
        .unwrap();
        assert!(lib.applies_to(OsType::Linux));
        assert!(lib.applies_to(OsType::Windows));
    }

    #[test]
    fn test_os_rules() {
        let lib = lib_with_rules(serde_json::json!([
            {"action": "allow"},
            {"action": "disallow", "os": {"name": "osx"}}
        ]));
        assert!(lib.applies_to(OsType::Linux));
        assert!(!lib.applies_to(OsType::MacOS));

        let only_osx = lib_with_rules(serde_json::json!([
            {"action": "allow", "os": {"name": "osx"}}
        ]));
        assert!(only_osx.applies_to(OsType::MacOSArm64));
        assert!(!only_osx.applies_to(OsType::Windows));
    }

    #[test]
    fn test_arch_rules() {
        let lib = lib_with_rules(serde_json::json!([
            {"action": "allow", "os": {"name": "linux", "arch": "arm64"}}
        ]));
        assert!(lib.applies_to(OsType::LinuxArm64));
        assert!(!lib.applies_to(OsType::Linux));
    }

    #[test]
    fn test_resolve_library_paths() {
        let lib: Library = serde_json::from_value(serde_json::json!({
            "name": "com.mojang:brigadier:1.0.18",
            "downloads": {"artifact": {
                "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                "sha1": "c1ef1234dd0e3ab1d5f9b4e7f6e0e4b1c2d3e4f5",
                "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"
            }}
        }))
        .unwrap();
        let resolved = lib.resolve("https://unused.example/").unwrap();
        assert_eq!(resolved.relative_path, "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar");
        assert!(resolved.url.starts_with("https://libraries.minecraft.net/"));
        assert!(resolved.sha1.is_some());

        let bare: Library = serde_json::from_value(serde_json::json!({
            "name": "net.sf.jopt-simple:jopt-simple:5.0.4",
            "url": "https://maven.example.com/"
        }))
        .unwrap();
        let resolved = bare.resolve("https://unused.example/").unwrap();
        assert_eq!(
            resolved.url,
            "https://maven.example.com/net/sf/jopt-simple/jopt-simple/5.0.4/jopt-simple-5.0.4.jar"
        );
        assert_eq!(resolved.sha1, None);
    }

    #[test]
    fn test_parse_version_json() {
        let json = serde_json::json!({
            "id": "1.19.2",
            "mainClass": "net.minecraft.client.main.Main",
            "downloads": {
                "client": {"url": "https://example.com/client.jar", "sha1": "aa", "size": 1},
                "server_mappings": {"url": "https://example.com/server.txt", "sha1": "bb"}
            },
            "libraries": []
        });
        let version: VersionJson = serde_json::from_value(json).unwrap();
        assert_eq!(version.download(ArtifactKind::ClientJar).unwrap().sha1.as_deref(), Some("aa"));
        assert!(version.download(ArtifactKind::ServerJar).is_none());
        assert!(version.download(ArtifactKind::ServerMappings).is_some());
    }
}
