//! End-to-end run of loglinkd against a fake metadata service

use axum::{routing::get, Json, Router};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

async fn fake_metadata() -> String {
    let app = Router::new()
        .route("/2016-07-29/version", get(|| async { "\"42\"" }))
        .route(
            "/2016-07-29/self/host",
            get(|| async { Json(json!({ "uuid": "host-1", "name": "node-1" })) }),
        )
        .route(
            "/2016-07-29/containers",
            get(|| async {
                Json(json!([
                    {
                        "name": "web",
                        "external_id": "abc123",
                        "state": "running",
                        "host_uuid": "host-1"
                    },
                    {
                        "name": "elsewhere",
                        "external_id": "fff999",
                        "state": "running",
                        "host_uuid": "host-2"
                    }
                ]))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

fn spawn_daemon(address: &str, dir: &Path) -> Child {
    Command::new(assert_cmd::cargo::cargo_bin("loglinkd"))
        .args(["--metadata-address", address, "--health-check-port", "0"])
        .arg("--docker-graph-dir")
        .arg(dir.join("docker"))
        .arg("--logging-containers-dir")
        .arg(dir.join("containers"))
        .arg("--logging-volumes-dir")
        .arg(dir.join("volumes"))
        .env_remove("DEBUG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(15), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

fn stdout_log(dir: &Path, id: &str) -> PathBuf {
    let log = dir.join(format!("docker/containers/{id}/{id}-json.log"));
    fs::create_dir_all(log.parent().unwrap()).unwrap();
    fs::write(&log, "{\"log\":\"hello\\n\"}\n").unwrap();
    log
}

#[tokio::test]
async fn test_links_converge_heal_and_stop_on_sigterm() {
    let dir = TempDir::new().unwrap();
    let log = stdout_log(dir.path(), "abc123");
    let address = fake_metadata().await;

    let mut child = spawn_daemon(&address, dir.path());
    let link = dir.path().join("containers/web_abc123");

    eventually("stdout link", || link.exists()).await;
    assert_eq!(fs::read_link(&link).unwrap(), log);
    assert!(!dir.path().join("containers/elsewhere_fff999").exists());

    // Someone deletes the link behind our back
    fs::remove_file(&link).unwrap();
    eventually("link restored", || link.exists()).await;

    let pid = child.id().to_string();
    let sent = Command::new("kill").args(["-TERM", &pid]).status().unwrap();
    assert!(sent.success());

    let status = tokio::time::timeout(
        Duration::from_secs(15),
        tokio::task::spawn_blocking(move || child.wait()),
    )
    .await
    .expect("daemon exits after SIGTERM")
    .unwrap()
    .unwrap();
    assert!(status.success());
}
