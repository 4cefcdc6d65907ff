//! CLI and shutdown integration tests.
//!
//! Tests:
//! - CLI help output verification
//! - Graceful shutdown on SIGTERM

use std::process::Command;
use std::time::Duration;

/// CLI --help output should show expected options.
#[test]
fn test_cli_help_output() {
    let output = Command::new(env!("CARGO_BIN_EXE_roomcast"))
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    for option in ["--port", "--database", "--amqp-url", "--heartbeat-secs", "--history-limit"] {
        assert!(stdout.contains(option), "help should mention {option}");
    }
    assert!(
        stdout.contains("Roomcast") || stdout.contains("roomcast"),
        "help should mention Roomcast"
    );
}

/// CLI --version should show version.
#[test]
fn test_cli_version_output() {
    let output = Command::new(env!("CARGO_BIN_EXE_roomcast"))
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {}",
        stdout
    );
}

/// Zero heartbeat is rejected at parse time.
#[test]
fn test_cli_rejects_zero_heartbeat() {
    let output = Command::new(env!("CARGO_BIN_EXE_roomcast"))
        .args(["--heartbeat-secs", "0"])
        .output()
        .expect("failed to run");

    assert!(!output.status.success());
}

/// The server exits cleanly on SIGTERM and leaves its database behind.
#[cfg(unix)]
#[tokio::test]
async fn test_graceful_shutdown_on_sigterm() {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("data").join("roomcast.db");

    let mut child = TokioCommand::new(env!("CARGO_BIN_EXE_roomcast"))
        .args([
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--database",
            db_path.to_str().unwrap(),
            "--shutdown-grace-secs",
            "2",
        ])
        .env_remove("RABBITMQ_URL")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn server");

    let started = timeout(Duration::from_secs(10), async {
        while !db_path.exists() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "server did not create its database");
    // Give the signal handler time to install.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let pid = child.id().expect("no pid");
    let _ = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    match timeout(Duration::from_secs(10), child.wait()).await {
        Ok(Ok(status)) => assert!(status.success(), "server exited with {status}"),
        Ok(Err(e)) => panic!("failed to wait for child: {}", e),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("server did not respond to SIGTERM within timeout");
        }
    }
}
