//! Test utilities and server harness for Roomcast tests.
//!
//! Provides:
//! - In-process test server on an ephemeral loopback port
//! - HTTP client helpers
//! - Test database fixtures

#![allow(dead_code)]

use roomcast::client::RoomcastClient;
use roomcast::config::Config;
use roomcast::observability::tracing::init_test_tracing;
use roomcast::server::{serve, ServerError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("roomcast.db");
        Self { temp_dir, db_path }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A Roomcast server running inside the test process.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Start a server with the in-memory store and no broker.
    pub async fn start() -> Self {
        Self::start_with(Config::test_config()).await
    }

    pub async fn start_with(config: Config) -> Self {
        init_test_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("no local addr");
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, config, shutdown.clone()));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> RoomcastClient {
        RoomcastClient::new(&self.url("/")).expect("invalid test endpoint")
    }

    /// Stop the server and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server returned error");
    }
}

/// POST a raw body with a JSON content type.
pub async fn post_raw(url: &str, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .expect("request failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.db_path.ends_with("roomcast.db"));
    }
}
