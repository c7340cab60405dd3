use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::maven::MavenCoordinate;
use crate::models::Side;

/// What a downloadable artifact is, used to pick its cache slot and its
/// location inside a launcher installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Manifest,
    VersionJson,
    ClientJar,
    ServerJar,
    ClientMappings,
    ServerMappings,
    Library,
}

impl ArtifactKind {
    /// File name of this artifact inside `versions/<version>/` of the cache.
    pub fn versioned_file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Manifest => "launcher_metadata.json",
            ArtifactKind::VersionJson => "metadata.json",
            ArtifactKind::ClientJar => "client.jar",
            ArtifactKind::ServerJar => "server.jar",
            ArtifactKind::ClientMappings => "client_mappings.txt",
            ArtifactKind::ServerMappings => "server_mappings.txt",
            ArtifactKind::Library => "library.jar",
        }
    }

    /// The jar/mappings kind for a side. Joined pipelines start from the client.
    pub fn jar_for(side: Side) -> Self {
        match side {
            Side::Server => ArtifactKind::ServerJar,
            Side::Client | Side::Joined => ArtifactKind::ClientJar,
        }
    }

    pub fn mappings_for(side: Side) -> Self {
        match side {
            Side::Server => ArtifactKind::ServerMappings,
            Side::Client | Side::Joined => ArtifactKind::ClientMappings,
        }
    }
}

/// A logical slot in the artifact cache. Two selectors are the same slot
/// exactly when they compute the same relative file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheSelector {
    file_name: String,
}

impl CacheSelector {
    pub fn launcher_manifest() -> Self {
        Self::custom(ArtifactKind::Manifest.versioned_file_name())
    }

    pub fn version_json(version: &str) -> Self {
        Self::versioned(version, ArtifactKind::VersionJson)
    }

    pub fn versioned(version: &str, kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Manifest => Self::launcher_manifest(),
            _ => Self::custom(format!("versions/{}/{}", version, kind.versioned_file_name())),
        }
    }

    /// A library under `libraries/`, keyed by its repository-relative path.
    pub fn library(relative_path: &str) -> Self {
        Self::custom(format!("libraries/{}", relative_path.trim_start_matches('/')))
    }

    pub fn maven(coordinate: &MavenCoordinate) -> Self {
        Self::library(&coordinate.to_path())
    }

    pub fn custom(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path_in(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.file_name.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

impl fmt::Display for CacheSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// Everything needed to fetch one remote artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub sha1: Option<String>,
    pub kind: ArtifactKind,
    pub version: Option<String>,
    pub side: Option<Side>,
}

impl DownloadDescriptor {
    pub fn new(url: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            url: url.into(),
            sha1: None,
            kind,
            version: None,
            side: None,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    /// Path of the same artifact inside a launcher installation, if the
    /// launcher keeps one.
    pub fn launcher_path(&self, launcher_dir: &Path) -> Option<PathBuf> {
        let version = self.version.as_deref()?;
        let file_name = match self.kind {
            ArtifactKind::ClientJar => format!("{}.jar", version),
            ArtifactKind::VersionJson => format!("{}.json", version),
            _ => return None,
        };
        Some(launcher_dir.join("versions").join(version).join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_selector_identity_is_file_name() {
        let a = CacheSelector::versioned("1.19.2", ArtifactKind::ClientJar);
        let b = CacheSelector::custom("versions/1.19.2/client.jar");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
        assert!(set.insert(CacheSelector::versioned("1.19.2", ArtifactKind::ServerJar)));
    }

    #[test]
    fn test_manifest_selector_ignores_version() {
        assert_eq!(
            CacheSelector::versioned("1.20.1", ArtifactKind::Manifest),
            CacheSelector::launcher_manifest()
        );
    }

    #[test]
    fn test_selector_paths() {
        let root = Path::new("/cache");
        assert_eq!(
            CacheSelector::version_json("1.19.2").path_in(root),
            PathBuf::from("/cache/versions/1.19.2/metadata.json")
        );
        let lib = MavenCoordinate::parse("com.mojang:brigadier:1.0.18").unwrap();
        assert_eq!(
            CacheSelector::maven(&lib).file_name(),
            "libraries/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"
        );
    }

    #[test]
    fn test_launcher_path() {
        let launcher = Path::new("/home/user/.minecraft");
        let client = DownloadDescriptor::new("https://x/client.jar", ArtifactKind::ClientJar)
            .with_version("1.19.2");
        assert_eq!(
            client.launcher_path(launcher),
            Some(PathBuf::from("/home/user/.minecraft/versions/1.19.2/1.19.2.jar"))
        );

        let server = DownloadDescriptor::new("https://x/server.jar", ArtifactKind::ServerJar)
            .with_version("1.19.2");
        assert_eq!(server.launcher_path(launcher), None);

        let unversioned = DownloadDescriptor::new("https://x/client.jar", ArtifactKind::ClientJar);
        assert_eq!(unversioned.launcher_path(launcher), None);
    }
}
