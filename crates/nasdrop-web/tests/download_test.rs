//! Download and job status integration tests.
//!
//! Run with: `cargo test -p nasdrop-web --test download_test`

mod helpers;

use axum::http::StatusCode;
use helpers::{origin, setup_test_app, TestApp};
use nasdrop_core::{JobState, NewUploadJob};
use uuid::Uuid;

/// Record a job whose staged copy holds `data`.
async fn staged_job(app: &TestApp, name: &str, data: &[u8]) -> Uuid {
    let id = Uuid::new_v4();
    let local_path = app.cache_dir.path().join(format!("{}_{}", id, name));
    std::fs::write(&local_path, data).unwrap();
    app.state
        .jobs
        .create(&NewUploadJob {
            id,
            display_name: name.to_string(),
            local_path,
            origin: origin(),
            content_type: Some("text/plain".to_string()),
            size_bytes: data.len() as i64,
        })
        .await
        .unwrap();
    id
}

/// Move a job to `stored` with its bytes on the mounted share and the staged copy gone.
async fn relay_to_share(app: &TestApp, id: Uuid, name: &str, data: &[u8]) {
    let remote_path = format!("/DiscordUploads/{}_{}", id, name);
    let on_share = app.mount_dir.path().join(remote_path.trim_start_matches('/'));
    std::fs::create_dir_all(on_share.parent().unwrap()).unwrap();
    std::fs::write(&on_share, data).unwrap();

    assert!(app.state.jobs.try_claim(id).await.unwrap());
    assert!(app.state.jobs.mark_stored(id, &remote_path).await.unwrap());

    let job = app.state.jobs.get(id).await.unwrap().unwrap();
    std::fs::remove_file(job.local_path.unwrap()).unwrap();
}

#[tokio::test]
async fn test_download_from_staging() {
    let app = setup_test_app().await;
    let id = staged_job(&app, "notes.txt", b"staged bytes").await;

    let response = app.client().get(&format!("/download/{}", id)).await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"staged bytes");
    assert_eq!(response.header("content-type"), "text/plain");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"notes.txt\""
    );
}

#[tokio::test]
async fn test_download_while_relaying_uses_staging() {
    let app = setup_test_app().await;
    let id = staged_job(&app, "notes.txt", b"in flight").await;
    assert!(app.state.jobs.try_claim(id).await.unwrap());

    let response = app.client().get(&format!("/download/{}", id)).await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"in flight");
}

#[tokio::test]
async fn test_download_stored_job_from_remote() {
    let app = setup_test_app().await;
    let id = staged_job(&app, "notes.txt", b"original").await;
    relay_to_share(&app, id, "notes.txt", b"from the nas").await;

    let response = app.client().get(&format!("/download/{}", id)).await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"from the nas");
}

#[tokio::test]
async fn test_download_error_job_without_staged_copy() {
    let app = setup_test_app().await;
    let id = staged_job(&app, "notes.txt", b"x").await;
    let job = app.state.jobs.get(id).await.unwrap().unwrap();
    std::fs::remove_file(job.local_path.unwrap()).unwrap();
    assert!(app.state.jobs.mark_error(id).await.unwrap());

    let response = app.client().get(&format!("/download/{}", id)).await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "File not found or is still processing.");
}

#[tokio::test]
async fn test_download_unknown_or_malformed_id() {
    let app = setup_test_app().await;

    for path in [format!("/download/{}", Uuid::new_v4()), "/download/abc".to_string()] {
        let response = app.client().get(&path).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.text(), "File not found or is still processing.");
    }
}

#[tokio::test]
async fn test_job_status() {
    let app = setup_test_app().await;
    let id = staged_job(&app, "notes.txt", b"x").await;

    let response = app.client().get(&format!("/api/jobs/{}", id)).await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "received");
    assert_eq!(body["display_name"], "notes.txt");
    assert_eq!(
        body["download_url"],
        format!("{}/download/{}", helpers::APP_BASE_URL, id)
    );
    assert!(body.get("local_path").is_none());

    relay_to_share(&app, id, "notes.txt", b"x").await;
    let body: serde_json::Value = app
        .client()
        .get(&format!("/api/jobs/{}", id))
        .await
        .json();
    assert_eq!(body["state"], JobState::Stored.as_str());
}

#[tokio::test]
async fn test_job_status_not_found() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get(&format!("/api/jobs/{}", Uuid::new_v4()))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}
