//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p nasdrop-web`. Each app gets its own
//! in-memory store, staging directory and mounted-share directory.

use axum_test::TestServer;
use nasdrop_core::{OriginIdentity, Token};
use nasdrop_db::{connect_in_memory, UploadJobRepository};
use nasdrop_storage::{LocalStorage, RemoteStorage};
use nasdrop_web::setup::routes::setup_routes;
use nasdrop_web::state::{AppState, IngressConfig};
use std::sync::Arc;
use tempfile::TempDir;

pub const APP_BASE_URL: &str = "http://files.example.test";

/// Test application: server, state, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub cache_dir: TempDir,
    pub mount_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Issue a live token as if the command front had handed out a link.
    pub async fn issue_token(&self) -> Token {
        self.state
            .tokens
            .issue(&origin())
            .await
            .expect("Failed to issue token")
    }

    /// Files currently in the staging directory.
    pub fn staged_files(&self) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.cache_dir.path())
            .expect("Failed to read staging directory")
            .map(|entry| entry.expect("Failed to read entry").path())
            .collect()
    }
}

pub fn origin() -> OriginIdentity {
    OriginIdentity::new("user-42", "channel-7")
}

/// Setup test app with the default upload limit.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_limit(10 * 1024 * 1024).await
}

/// Setup test app with a custom upload size limit in bytes.
pub async fn setup_test_app_with_limit(max_upload_size_bytes: usize) -> TestApp {
    build_test_app(max_upload_size_bytes, false).await
}

/// Setup test app whose job store rejects every write. Tokens and notices
/// still use the working store.
pub async fn setup_test_app_with_failing_job_store() -> TestApp {
    build_test_app(10 * 1024 * 1024, true).await
}

async fn build_test_app(max_upload_size_bytes: usize, failing_jobs: bool) -> TestApp {
    let pool = connect_in_memory()
        .await
        .expect("Failed to open in-memory database");

    let cache_dir = tempfile::tempdir().expect("Failed to create staging directory");
    let mount_dir = tempfile::tempdir().expect("Failed to create mount directory");

    let storage: Arc<dyn RemoteStorage> = Arc::new(
        LocalStorage::new(mount_dir.path())
            .await
            .expect("Failed to create local storage"),
    );

    let ingress = IngressConfig {
        cache_dir: cache_dir.path().to_path_buf(),
        max_upload_size_bytes,
        max_concurrent_uploads: 4,
        app_base_url: APP_BASE_URL.to_string(),
        target_folder: "/DiscordUploads".to_string(),
    };

    let mut state = AppState::new(pool, chrono::Duration::hours(1), Some(storage), ingress);
    if failing_jobs {
        let closed = connect_in_memory()
            .await
            .expect("Failed to open in-memory database");
        closed.close().await;
        state.jobs = UploadJobRepository::new(closed);
    }
    let state = Arc::new(state);

    let server = TestServer::new(setup_routes(state.clone())).expect("Failed to start test server");

    TestApp {
        server,
        state,
        cache_dir,
        mount_dir,
    }
}
