//! Initial directory snapshot tests

use serde_json::json;

use crate::common::{connect_duplex, find, names, TestDaemon, TestWorkspace};

#[tokio::test]
async fn test_initial_tree_is_first_message() {
    let ws = TestWorkspace::new();
    ws.with_web_project();
    let daemon = TestDaemon::start(ws.config()).await;

    let mut client = daemon.connect().await;
    let tree = client.initial_tree().await;

    // node_modules, .next and .git are excluded
    assert_eq!(names(&tree), vec!["src", "package.json", "README.md"]);
}

#[tokio::test]
async fn test_tree_ordering_scenario() {
    let ws = TestWorkspace::new();
    ws.add_file("b.txt", "b")
        .add_file("A.txt", "A")
        .add_dir("z")
        .add_file("a.txt", "a");
    let daemon = TestDaemon::start(ws.config()).await;

    let mut client = daemon.connect().await;
    let tree = client.initial_tree().await;

    assert_eq!(names(&tree), vec!["z", "a.txt", "A.txt", "b.txt"]);
}

#[tokio::test]
async fn test_tree_node_shape() {
    let ws = TestWorkspace::new();
    ws.add_file("src/app.ts", "12345").add_file("src/util.ts", "123");
    let daemon = TestDaemon::start(ws.config()).await;

    let mut client = daemon.connect().await;
    let tree = client.initial_tree().await;

    let src = find(&tree, "src").expect("src present");
    assert_eq!(src["type"], "directory");
    assert_eq!(src["path"], ws.client_path("src"));
    assert_eq!(src["label"], "src");
    assert_eq!(src["value"], ws.client_path("src"));
    assert_eq!(src["size"], 8);
    assert!(src.get("extension").is_none());

    let children = src["children"].as_array().expect("children");
    assert_eq!(names(children), vec!["app.ts", "util.ts"]);

    let app = &children[0];
    assert_eq!(
        *app,
        json!({
            "name": "app.ts",
            "path": ws.client_path("src/app.ts"),
            "type": "file",
            "size": 5,
            "extension": ".ts",
            "label": "app.ts",
            "value": ws.client_path("src/app.ts"),
        })
    );
}

#[tokio::test]
async fn test_excluded_segment_is_pruned_at_any_depth() {
    let ws = TestWorkspace::new();
    ws.add_file("packages/ui/node_modules/x/index.js", "")
        .add_file("packages/ui/index.ts", "");
    let daemon = TestDaemon::start(ws.config()).await;

    let mut client = daemon.connect().await;
    let tree = client.initial_tree().await;

    let packages = find(&tree, "packages").expect("packages");
    let ui = find(packages["children"].as_array().unwrap(), "ui").expect("ui");
    assert_eq!(names(ui["children"].as_array().unwrap()), vec!["index.ts"]);
}

#[tokio::test]
async fn test_missing_workspace_root_sends_empty_tree() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.workspace_root = ws.path().join("does-not-exist");
    let daemon = TestDaemon::start(config).await;

    let mut client = daemon.connect().await;
    let msg = client.recv_json().await;

    assert_eq!(msg, json!({"type": "directory-tree", "data": []}));
}

#[tokio::test]
async fn test_session_over_duplex_stream() {
    let ws = TestWorkspace::new();
    ws.add_file("index.html", "<html></html>");
    let daemon = TestDaemon::start(ws.config()).await;

    let (mut client, session) = connect_duplex(daemon.registry.clone()).await;
    let tree = client.initial_tree().await;
    assert_eq!(names(&tree), vec!["index.html"]);

    client.close().await;
    session.await.unwrap();
    assert_eq!(daemon.registry.session_count(), 0);
}
