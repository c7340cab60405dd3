use crucible_lib::cache::{ArtifactCache, ArtifactKind};
use crucible_lib::models::Side;
use crucible_lib::pipeline::graph;
use crucible_lib::pipeline::ops::{read_entries, write_entries};
use crucible_lib::pipeline::{
    ArgValue, DefinitionKey, ExecutorOptions, Operation, PipelineContext, PipelineDefinition,
    PipelineExecutor, StepState, StepTemplate, StripMode,
};
use crucible_lib::Error;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERSION: &str = "1.19.2";

fn client_jar_bytes(dir: &Path) -> Vec<u8> {
    let jar = dir.join("served-client.jar");
    let entries: BTreeMap<String, Vec<u8>> = [
        ("a.class", "obfuscated a"),
        ("b.class", "obfuscated b"),
        ("net/minecraft/client/main/Main.class", "library main"),
        ("assets/lang.json", "{}"),
    ]
    .iter()
    .map(|(n, c)| (n.to_string(), c.as_bytes().to_vec()))
    .collect();
    write_entries(&jar, &entries).expect("write served jar");
    std::fs::read(&jar).expect("read served jar")
}

async fn mount_launcher_metadata(server: &MockServer, jar: Vec<u8>) {
    let manifest = serde_json::json!({
        "latest": { "release": VERSION, "snapshot": VERSION },
        "versions": [
            { "id": VERSION, "type": "release", "url": format!("{}/v1/{}.json", server.uri(), VERSION) }
        ]
    });
    let version_json = serde_json::json!({
        "id": VERSION,
        "downloads": {
            "client": { "url": format!("{}/client.jar", server.uri()) }
        }
    });

    Mock::given(method("GET"))
        .and(path("/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{}.json", VERSION)))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_json))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(jar))
        .expect(1)
        .mount(server)
        .await;
}

fn templates(mappings: &Path) -> Vec<StepTemplate> {
    vec![
        StepTemplate::new("downloadManifest", Operation::DownloadManifest),
        StepTemplate::new("downloadJson", Operation::DownloadVersionJson)
            .arg("manifest", ArgValue::step("downloadManifest")),
        StepTemplate::new(
            "downloadClient",
            Operation::DownloadArtifact {
                kind: ArtifactKind::ClientJar,
            },
        )
        .arg("json", ArgValue::step("downloadJson")),
        StepTemplate::new(
            "strip",
            Operation::Strip {
                mode: StripMode::Whitelist,
            },
        )
        .arg("input", ArgValue::step("downloadClient"))
        .arg("mappings", ArgValue::file(mappings)),
    ]
}

fn definition(root: &Path, variant: &str, mappings: &Path) -> PipelineDefinition {
    let key = DefinitionKey::new(VERSION, Side::Client, variant);
    let context = PipelineContext::new(key, root.join("workspace").join(variant), root.join("cache"));
    graph::build(&templates(mappings), &context).expect("build definition")
}

fn executor(root: &Path, server: &MockServer) -> PipelineExecutor {
    let cache = ArtifactCache::new(root.join("cache"), reqwest::Client::new());
    let options = ExecutorOptions {
        concurrency: 2,
        manifest_url: format!("{}/version_manifest_v2.json", server.uri()),
        ..ExecutorOptions::default()
    };
    PipelineExecutor::new(Arc::new(cache), options)
}

#[tokio::test]
async fn two_variants_share_one_download_of_each_artifact() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("tempdir");
    let server = MockServer::start().await;
    mount_launcher_metadata(&server, client_jar_bytes(dir.path())).await;

    let mappings = dir.path().join("classes.txt");
    std::fs::write(&mappings, "a\nb\n").expect("write mappings");

    let first = definition(dir.path(), "a", &mappings);
    let second = definition(dir.path(), "b", &mappings);
    assert_eq!(
        first.step("downloadClient").map(|s| s.id.as_str()),
        Some("shared:downloadClient:1.19.2")
    );
    assert_eq!(
        first.step("downloadClient").map(|s| &s.output),
        second.step("downloadClient").map(|s| &s.output)
    );
    assert_ne!(
        first.step("strip").map(|s| &s.output),
        second.step("strip").map(|s| &s.output)
    );

    let executor = executor(dir.path(), &server);
    let first_run = executor.run_report(&first).await.expect("first run");
    assert_eq!(first_run.output.step, "strip");
    assert!(first_run.cached_steps().is_empty());

    let second_run = executor.run_report(&second).await.expect("second run");
    assert_eq!(
        second_run.state("downloadClient"),
        Some(StepState::Completed { cached: true })
    );
    assert_eq!(
        second_run.state("strip"),
        Some(StepState::Completed { cached: false })
    );

    let stripped = read_entries(&second_run.output.path).expect("read stripped jar");
    assert_eq!(stripped.keys().collect::<Vec<_>>(), vec!["a.class", "b.class"]);

    server.verify().await;
}

#[tokio::test]
async fn rerunning_a_definition_reuses_every_step() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = MockServer::start().await;
    mount_launcher_metadata(&server, client_jar_bytes(dir.path())).await;

    let mappings = dir.path().join("classes.txt");
    std::fs::write(&mappings, "a\n").expect("write mappings");
    let definition = definition(dir.path(), "mcp", &mappings);

    let executor = executor(dir.path(), &server);
    executor.run(&definition).await.expect("first run");
    let rerun = executor.run_report(&definition).await.expect("second run");

    assert_eq!(
        rerun.cached_steps(),
        vec!["downloadClient", "downloadJson", "downloadManifest", "strip"]
    );
}

#[tokio::test]
async fn failed_step_is_reported_by_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let definition = definition(dir.path(), "broken", &dir.path().join("missing.txt"));
    let err = executor(dir.path(), &server)
        .run(&definition)
        .await
        .expect_err("manifest download fails");

    match err.downcast_ref::<Error>() {
        Some(Error::StepFailed { step, .. }) => assert_eq!(step, "downloadManifest"),
        other => panic!("unexpected error: {:?}", other),
    }
}
