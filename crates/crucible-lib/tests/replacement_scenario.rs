use anyhow::Result;
use crucible_lib::config::Settings;
use crucible_lib::maven::MavenCoordinate;
use crucible_lib::pipeline::ops::write_entries;
use crucible_lib::replacement::obfuscated::MANIFEST_PATH;
use crucible_lib::replacement::{
    materialize_task_name, Configurations, Dependency, DependencyResolver, ObfuscatedDependencyHandler,
    ResolvedDependency, ResolvedModule,
};
use crucible_lib::Session;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MARKED: &str = "Manifest-Version: 1.0\nObfuscated: true\nObfuscated-By: ProGuard\n";
const PLAIN: &str = "Manifest-Version: 1.0\n";

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

fn coordinate(raw: &str) -> MavenCoordinate {
    MavenCoordinate::parse(raw).expect("valid coordinate")
}

fn jar(dir: &Path, name: &str, manifest: &str) -> PathBuf {
    let path = dir.join(name);
    let entries: BTreeMap<String, Vec<u8>> = [
        (MANIFEST_PATH.to_string(), manifest.as_bytes().to_vec()),
        ("a.class".to_string(), b"class bytes".to_vec()),
    ]
    .into_iter()
    .collect();
    write_entries(&path, &entries).expect("write jar");
    path
}

struct Fixture {
    _dir: tempfile::TempDir,
    session: Session,
}

/// `game` (marked) depends on `core` (marked) and `lib` (unmarked);
/// `tool` stands alone without the marker.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();

    let lib = ResolvedModule::new(coordinate("com.example:lib:2.0")).with_file(jar(root, "lib.jar", PLAIN));
    let core = ResolvedModule::new(coordinate("com.example:core:1.19-obf")).with_file(jar(root, "core.jar", MARKED));
    let game = ResolvedModule::new(coordinate("com.example:game:1.19-obf"))
        .with_file(jar(root, "game.jar", MARKED))
        .with_child(core.clone())
        .with_child(lib.clone());
    let tool = ResolvedModule::new(coordinate("com.example:tool:1.0")).with_file(jar(root, "tool.jar", PLAIN));

    let resolver = StaticResolver {
        modules: [game, core, lib, tool]
            .into_iter()
            .map(|m| (m.coordinate.clone(), m))
            .collect(),
    };

    let settings = Settings {
        cache_dir: root.join("cache"),
        repository_dir: root.join("repository"),
        workspace_dir: root.join("workspaces"),
        launcher_dir: None,
        ..Settings::default()
    };
    let mut session = Session::new(settings.clone()).expect("session");
    let handler = ObfuscatedDependencyHandler::new(Arc::new(resolver), &settings, root.join("mappings.txt"))
        .expect("handler")
        .with_definitions(session.definitions().clone());
    session.register_handler(Arc::new(handler));

    Fixture { _dir: dir, session }
}

fn modules(configurations: &Configurations, name: &str) -> Vec<String> {
    configurations
        .get(name)
        .iter()
        .filter_map(|d| d.coordinate().map(|c| c.to_string()))
        .collect()
}

#[test]
fn marked_game_is_replaced_with_its_marked_child() {
    let fixture = fixture();
    let session = &fixture.session;
    let mut configurations = Configurations::new();

    session
        .add_dependency(
            &mut configurations,
            "implementation",
            Dependency::module(coordinate("com.example:game:1.19-obf")),
        )
        .expect("replace game");

    assert_eq!(
        modules(&configurations, "implementation"),
        vec![
            "fg.deobf.official.com.example:game:1.19-obf",
            "fg.deobf.official.com.example:core:1.19-obf",
        ]
    );
    assert!(!configurations.contains(
        "implementation",
        &Dependency::module(coordinate("com.example:game:1.19-obf"))
    ));

    let game = session
        .repository()
        .entry(&coordinate("fg.deobf.official.com.example:game:1.19-obf"))
        .expect("game entry");
    assert_eq!(
        game.dependencies,
        vec![
            coordinate("fg.deobf.official.com.example:core:1.19-obf"),
            coordinate("com.example:lib:2.0"),
        ]
    );
    assert_eq!(session.repository().entries().len(), 2);

    let tasks = session.engine().tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.contains(&materialize_task_name(&game.coordinate)));
}

#[test]
fn repeated_declarations_reuse_the_first_replacement() {
    let fixture = fixture();
    let session = &fixture.session;
    let mut first = Configurations::new();
    let mut second = Configurations::new();

    let game = Dependency::module(coordinate("com.example:game:1.19-obf"));
    session.add_dependency(&mut first, "implementation", game.clone()).expect("first");
    session.add_dependency(&mut second, "implementation", game).expect("second");

    // core was answered by the game's nested result
    session
        .add_dependency(
            &mut second,
            "implementation",
            Dependency::module(coordinate("com.example:core:1.19-obf")),
        )
        .expect("core");

    assert_eq!(first.get("implementation"), second.get("implementation"));
    assert_eq!(session.engine().tasks().len(), 2);
    assert_eq!(session.repository().entries().len(), 2);
}

#[test]
fn unmarked_dependency_stays_in_place() {
    let fixture = fixture();
    let session = &fixture.session;
    let mut configurations = Configurations::new();
    let tool = Dependency::module(coordinate("com.example:tool:1.0"));

    session
        .add_dependency(&mut configurations, "runtimeOnly", tool.clone())
        .expect("tool");

    assert_eq!(configurations.get("runtimeOnly"), &[tool][..]);
    assert!(session.repository().entries().is_empty());
    assert!(session.engine().tasks().is_empty());
}
