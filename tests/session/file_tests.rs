//! getFile request tests

use std::time::Duration;

use serde_json::json;

use crate::common::{TestDaemon, TestWorkspace};

#[tokio::test]
async fn test_get_file_returns_content_and_path() {
    let ws = TestWorkspace::new();
    ws.add_file("src/app.ts", "export const answer = 42;\n");
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let path = ws.client_path("src/app.ts");
    let reply = client.get_file(&path).await;

    assert_eq!(
        reply,
        json!({"type": "fileContent", "data": "export const answer = 42;\n", "file": path})
    );
}

#[tokio::test]
async fn test_get_file_is_idempotent() {
    let ws = TestWorkspace::new();
    ws.add_file("notes.md", "same every time");
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let path = ws.client_path("notes.md");
    let first = client.get_file(&path).await;
    let second = client.get_file(&path).await;

    assert_eq!(first, second);
    assert_eq!(first["data"], "same every time");
}

#[tokio::test]
async fn test_get_file_missing_omits_path() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let reply = client.get_file(&ws.client_path("nope.ts")).await;

    assert_eq!(reply, json!({"type": "fileContent", "data": "File not found"}));
}

#[tokio::test]
async fn test_get_file_missing_with_path_echo() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.protocol.include_path_on_missing = true;
    let daemon = TestDaemon::start(config).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let path = ws.client_path("nope.ts");
    let reply = client.get_file(&path).await;

    assert_eq!(
        reply,
        json!({"type": "fileContent", "data": "File not found", "file": path})
    );
}

#[tokio::test]
async fn test_get_file_on_directory_is_not_found() {
    let ws = TestWorkspace::new();
    ws.add_dir("src");
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let reply = client.get_file(&ws.client_path("src")).await;

    assert_eq!(reply["data"], "File not found");
}

#[tokio::test]
async fn test_get_file_empty_file_has_empty_content() {
    let ws = TestWorkspace::new();
    ws.add_file("empty.txt", "");
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let path = ws.client_path("empty.txt");
    let reply = client.get_file(&path).await;

    assert_eq!(reply, json!({"type": "fileContent", "data": "", "file": path}));
}

#[tokio::test]
async fn test_unknown_and_malformed_messages_are_ignored() {
    let ws = TestWorkspace::new();
    ws.add_file("a.txt", "alpha");
    let daemon = TestDaemon::start(ws.config()).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    client
        .send_json(json!({"type": "chat", "data": "hello"}))
        .await;
    client.send_text("this is not json").await;
    client.send_json(json!({"type": "getFile"})).await;
    client.expect_silence(Duration::from_millis(300)).await;

    // The session is still serving requests
    let reply = client.get_file(&ws.client_path("a.txt")).await;
    assert_eq!(reply["data"], "alpha");
}
