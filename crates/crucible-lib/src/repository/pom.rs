use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::RepositoryEntry;
use crate::maven::MavenCoordinate;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "project", rename_all = "camelCase")]
struct PomDocument {
    model_version: String,
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependencies: Option<PomDependencies>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PomDependencies {
    #[serde(default, rename = "dependency")]
    items: Vec<PomDependency>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomDependency {
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classifier: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    dep_type: Option<String>,
    scope: String,
}

impl From<&MavenCoordinate> for PomDependency {
    fn from(coordinate: &MavenCoordinate) -> Self {
        Self {
            group_id: coordinate.group.clone(),
            artifact_id: coordinate.name.clone(),
            version: coordinate.version.clone(),
            classifier: coordinate.classifier.clone(),
            dep_type: (coordinate.extension != "jar").then(|| coordinate.extension.clone()),
            scope: "compile".to_string(),
        }
    }
}

/// Maven POM for `entry`, listing its dependencies at compile scope.
pub fn render_pom(entry: &RepositoryEntry) -> Result<String> {
    let coordinate = &entry.coordinate;
    let document = PomDocument {
        model_version: "4.0.0".to_string(),
        group_id: coordinate.group.clone(),
        artifact_id: coordinate.name.clone(),
        version: coordinate.version.clone(),
        description: entry.description.clone(),
        dependencies: (!entry.dependencies.is_empty()).then(|| PomDependencies {
            items: entry.dependencies.iter().map(PomDependency::from).collect(),
        }),
    };
    serde_xml_rs::to_string(&document)
        .with_context(|| format!("Failed to render POM for {}", coordinate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pom_lists_dependencies() {
        let entry = RepositoryEntry::new(MavenCoordinate::new("fg.deobf.official.com.example", "game", "1.19-obf"))
            .with_dependency(MavenCoordinate::new("com.example", "lib", "2.0"))
            .with_dependency(MavenCoordinate::new("com.example", "natives", "2.0").with_classifier("linux"));

        let xml = render_pom(&entry).unwrap();
        assert!(xml.contains("<modelVersion>4.0.0</modelVersion>"));
        assert!(xml.contains("<artifactId>game</artifactId>"));
        assert!(xml.contains("<artifactId>lib</artifactId>"));
        assert!(xml.contains("<classifier>linux</classifier>"));

        let parsed: PomDocument = serde_xml_rs::from_str(&xml).unwrap();
        assert_eq!(parsed.dependencies.unwrap().items.len(), 2);
    }

    #[test]
    fn test_pom_without_dependencies() {
        let entry = RepositoryEntry::new(MavenCoordinate::new("g", "n", "1"));
        let xml = render_pom(&entry).unwrap();
        assert!(!xml.contains("dependencies"));
        assert!(xml.contains("<version>1</version>"));
    }
}
