use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use serial_test::serial;
use std::fs::write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kb_sync::cli::{run, Cli};
use kb_sync::load_config::{ENV_API_KEY, ENV_KB_NAME, ENV_URL};

fn clear_env() {
    for var in [ENV_URL, ENV_API_KEY, ENV_KB_NAME] {
        std::env::remove_var(var);
    }
}

fn cli_for(config: &Path, folder: &Path, files: &[&str], strict: bool) -> Cli {
    Cli {
        files: files.iter().map(PathBuf::from).collect(),
        config: config.to_path_buf(),
        folder: Some(folder.to_path_buf()),
        concurrency: None,
        strict,
    }
}

#[test]
#[serial]
fn binary_without_config_writes_template_and_succeeds() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("kb-sync").expect("Binary exists");

    cmd.current_dir(dir.path())
        .arg("report.pdf")
        .env_remove(ENV_URL)
        .env_remove(ENV_API_KEY)
        .env_remove(ENV_KB_NAME);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No configuration file exists"));

    let template = std::fs::read_to_string(dir.path().join("answersUploadConf.json"))
        .expect("template should be written");
    assert!(template.contains("\"apiKey\""));
    assert!(template.contains("\"kbName\""));
}

#[test]
#[serial]
fn binary_with_blank_config_fails() {
    let dir = tempdir().unwrap();
    write(
        dir.path().join("answersUploadConf.json"),
        r#"{ "url": "", "apiKey": "", "kbName": "" }"#,
    )
    .unwrap();
    let mut cmd = Command::cargo_bin("kb-sync").expect("Binary exists");

    cmd.current_dir(dir.path())
        .env_remove(ENV_URL)
        .env_remove(ENV_API_KEY)
        .env_remove(ENV_KB_NAME);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Missing required configuration values"));
}

use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
#[serial]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempdir().unwrap();
    let cli = cli_for(&dir.path().join("conf.json"), dir.path(), &[], false);
    run(cli).await.expect("template bootstrap is not an error");

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

/// A tenant with one knowledge base whose file data source lists `old.pdf`.
async fn tenant() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/knowledgebases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "kb-1", "name": "Docs" }, { "id": "kb-2", "name": "Other" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/knowledgebases/kb-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "kb-1",
            "name": "Docs",
            "datasources": [{
                "id": "ds-1",
                "type": "file",
                "name": "Uploads",
                "fileConfig": { "files": ["old.pdf"] }
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/data-files"))
        .and(query_param("name", "old.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "f-old", "name": "old.pdf" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/data-files"))
        .and(query_param("name", "new.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/temp-contents"))
        .and(query_param("filename", "new.pdf"))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Location", "/api/v1/temp-contents/tmp-new"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/data-files"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "f-new", "name": "new.pdf" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/knowledgebases/kb-1/datasources/ds-1"))
        .and(body_partial_json(json!({
            "name": "Uploads",
            "fileConfig": { "files": ["old.pdf", "new.pdf"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/knowledgebases/kb-1/datasources/ds-1/actions/dryruns"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    server
}

#[tokio::test]
#[serial]
async fn run_uploads_missing_files_and_updates_knowledge_base() {
    clear_env();
    let server = tenant().await;
    let dir = tempdir().unwrap();
    write(dir.path().join("old.pdf"), b"old").unwrap();
    write(dir.path().join("new.pdf"), b"new").unwrap();
    let config = dir.path().join("answersUploadConf.json");
    write(
        &config,
        json!({ "url": server.uri(), "apiKey": "k", "kbName": "Docs" }).to_string(),
    )
    .unwrap();

    run(cli_for(&config, dir.path(), &["old.pdf", "new.pdf"], true))
        .await
        .expect("run should succeed");
    // Mock expectations (one upload, one PUT, one trigger) are verified when `server` drops.
}

#[tokio::test]
#[serial]
async fn strict_run_fails_when_knowledge_base_is_missing() {
    clear_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/knowledgebases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let config = dir.path().join("answersUploadConf.json");
    write(
        &config,
        json!({ "url": server.uri(), "apiKey": "k", "kbName": "Nope" }).to_string(),
    )
    .unwrap();

    run(cli_for(&config, dir.path(), &[], false))
        .await
        .expect("without --strict a missing knowledge base is only reported");
    let err = run(cli_for(&config, dir.path(), &[], true))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("knowledge base not updated"), "{err}");
}

#[tokio::test]
#[serial]
async fn rejected_api_key_aborts_run() {
    clear_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let config = dir.path().join("answersUploadConf.json");
    write(
        &config,
        json!({ "url": server.uri(), "apiKey": "bad", "kbName": "Docs" }).to_string(),
    )
    .unwrap();

    let err = run(cli_for(&config, dir.path(), &["a.pdf"], false))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Synchronisation aborted"), "{err}");
}
