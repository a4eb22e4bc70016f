//! Dev server supervision tests
//!
//! These use `sh -c` scripts as the dev server, so they only run on Unix.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::common::{TestDaemon, TestWorkspace, WAIT};

#[tokio::test]
async fn test_stderr_is_batched_and_stripped() {
    let ws = TestWorkspace::new();
    let script = r"echo 'first' >&2; printf '\033[31msecond\033[0m\n' >&2; echo 'stdout is ignored'; sleep 30";
    let daemon = TestDaemon::start(ws.config_with_script(script, 1)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let mut collected = Vec::new();
    while collected.len() < 2 {
        let msg = client.recv_type("error").await;
        let data = msg["data"].as_str().expect("data is a string");
        collected.extend(data.split('\n').map(str::to_string));
    }

    assert_eq!(collected, vec!["first", "second"]);
}

#[tokio::test]
async fn test_quiet_process_sends_nothing() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config_with_script("sleep 30", 1)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    // Several flush windows pass without a message
    client.expect_silence(Duration::from_millis(2500)).await;
}

#[tokio::test]
async fn test_exit_notice_is_plain_text() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config_with_script("exit 3", 5)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    assert_eq!(client.recv_text().await, "Process exited with code 3");
}

#[tokio::test]
async fn test_remaining_stderr_arrives_before_exit_notice() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config_with_script("echo 'boom' >&2; exit 1", 5)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let started = Instant::now();
    let batch = client.recv_json().await;
    assert_eq!(batch, json!({"type": "error", "data": "boom"}));
    assert_eq!(client.recv_text().await, "Process exited with code 1");
    // Flushed on exit, not on the 5s tick
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_killed_process_reports_null_code() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config_with_script("kill -9 $$", 5)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    assert_eq!(client.recv_text().await, "Process exited with code null");
}

#[tokio::test]
async fn test_structured_exit_notice() {
    let ws = TestWorkspace::new();
    let mut config = ws.config_with_script("exit 2", 5);
    config.protocol.structured_notices = true;
    let daemon = TestDaemon::start(config).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    assert_eq!(
        client.recv_json().await,
        json!({"type": "process-exit", "code": 2})
    );
}

#[tokio::test]
async fn test_spawn_failure_notice() {
    let ws = TestWorkspace::new();
    let mut config = ws.config();
    config.process.enabled = true;
    config.process.command = "workspace-sync-no-such-command".to_string();
    config.process.args = Vec::new();
    let daemon = TestDaemon::start(config).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let notice = client.recv_text().await;
    assert!(
        notice.starts_with("Failed to start process: "),
        "unexpected notice: {}",
        notice
    );

    // The session keeps working without a dev server
    ws.add_file("after.txt", "still here");
    let reply = client.get_file(&ws.client_path("after.txt")).await;
    assert_eq!(reply["data"], "still here");
}

#[cfg(target_os = "linux")]
async fn wait_for_pid(pid_file: &Path) -> u32 {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Ok(text) = std::fs::read_to_string(pid_file) {
            if let Ok(pid) = text.trim().parse::<u32>() {
                return pid;
            }
        }
        assert!(Instant::now() < deadline, "dev server never wrote {}", pid_file.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Running, as opposed to gone or a zombie awaiting its reaper
#[cfg(target_os = "linux")]
fn is_alive(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .is_some_and(|state| state != 'Z' && state != 'X')
}

#[cfg(target_os = "linux")]
async fn wait_until_dead(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while is_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !is_alive(pid)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_disconnect_terminates_dev_server() {
    let ws = TestWorkspace::new();
    let daemon = TestDaemon::start(ws.config_with_script("echo $$ > dev.pid; exec sleep 30", 5)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let pid = wait_for_pid(&ws.path().join("dev.pid")).await;
    assert!(is_alive(pid));

    client.close().await;
    daemon.wait_for_sessions(0).await;

    assert!(wait_until_dead(pid).await, "dev server {} still running", pid);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_disconnect_terminates_forked_dev_server() {
    let ws = TestWorkspace::new();
    // Like `npm run dev`: the server is a child of the supervised process
    let script = "sleep 300 & echo $! > server.pid; wait";
    let daemon = TestDaemon::start(ws.config_with_script(script, 5)).await;
    let mut client = daemon.connect().await;
    client.initial_tree().await;

    let server = wait_for_pid(&ws.path().join("server.pid")).await;
    assert!(is_alive(server));

    client.close().await;
    daemon.wait_for_sessions(0).await;

    assert!(wait_until_dead(server).await, "forked dev server {} survived", server);
}
