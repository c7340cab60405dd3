//! Maven coordinates (`group:name:version[:classifier][@extension]`) and the
//! repository layout derived from them.
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MavenCoordinate {
    pub group: String,
    pub name: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoordinate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            classifier: None,
            extension: "jar".to_string(),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Parse `group:name:version[:classifier][@extension]`.
    pub fn parse(coords: &str) -> Result<Self> {
        let (body, extension) = match coords.split_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, ext),
            Some(_) => anyhow::bail!("Invalid Maven coordinates: {}", coords),
            None => (coords, "jar"),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            anyhow::bail!("Invalid Maven coordinates: {}", coords);
        }

        Ok(Self {
            group: parts[0].to_string(),
            name: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension: extension.to_string(),
        })
    }

    /// `group:name` without version, used as the module identity.
    pub fn module_id(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(clf) => format!("{}-{}-{}.{}", self.name, self.version, clf, self.extension),
            None => format!("{}-{}.{}", self.name, self.version, self.extension),
        }
    }

    /// Repository-relative path with forward slashes.
    pub fn to_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.name,
            self.version,
            self.file_name()
        )
    }

    pub fn path_in(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.group.split('.') {
            path.push(segment);
        }
        path.push(&self.name);
        path.push(&self.version);
        path.push(self.file_name());
        path
    }

    pub fn url_in(&self, repository: &str) -> String {
        format!("{}/{}", repository.trim_end_matches('/'), self.to_path())
    }

    /// The POM sitting next to this artifact in a repository.
    pub fn pom(&self) -> Self {
        Self {
            classifier: None,
            extension: "pom".to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(clf) = &self.classifier {
            write!(f, ":{}", clf)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

impl FromStr for MavenCoordinate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for MavenCoordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MavenCoordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let coord = MavenCoordinate::parse("net.minecraftforge:forge:1.20.1-47.2.0").unwrap();
        assert_eq!(coord.group, "net.minecraftforge");
        assert_eq!(coord.classifier, None);
        assert_eq!(coord.extension, "jar");
        assert_eq!(
            coord.to_path(),
            "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0.jar"
        );
    }

    #[test]
    fn test_parse_classifier_and_extension() {
        let coord = MavenCoordinate::parse("de.oceanlabs.mcp:mcp_config:1.19.2-20220805.130853@zip").unwrap();
        assert_eq!(coord.extension, "zip");
        assert_eq!(coord.classifier, None);

        let coord = MavenCoordinate::parse("net.minecraftforge:forge:1.19.2-43.1.1:userdev@zip").unwrap();
        assert_eq!(coord.classifier.as_deref(), Some("userdev"));
        assert_eq!(coord.file_name(), "forge-1.19.2-43.1.1-userdev.zip");
    }

    #[test]
    fn test_display_round_trips() {
        for raw in [
            "com.example:game:1.19-obf",
            "com.example:game:1.19-obf:sources",
            "com.example:game:1.19-obf@zip",
            "com.example:game:1.19-obf:natives-linux@zip",
        ] {
            assert_eq!(MavenCoordinate::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(MavenCoordinate::parse("com.example:game").is_err());
        assert!(MavenCoordinate::parse("com.example::1.0").is_err());
        assert!(MavenCoordinate::parse("a:b:c:d:e").is_err());
        assert!(MavenCoordinate::parse("a:b:c@").is_err());
    }

    #[test]
    fn test_path_in_and_url() {
        let coord = MavenCoordinate::new("com.example", "lib", "2.0");
        let root = Path::new("/repo");
        assert_eq!(
            coord.path_in(root),
            PathBuf::from("/repo/com/example/lib/2.0/lib-2.0.jar")
        );
        assert_eq!(
            coord.url_in("https://maven.example.com/releases/"),
            "https://maven.example.com/releases/com/example/lib/2.0/lib-2.0.jar"
        );
        assert_eq!(coord.pom().file_name(), "lib-2.0.pom");
    }
}
