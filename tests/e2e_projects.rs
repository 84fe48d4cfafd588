//! Version lookup E2E tests against a fake GitHub

mod helper;

use axum::http::StatusCode;
use chrono::{TimeDelta, Utc};
use serde_json::json;

use helper::{FakeGitHub, NOT_FOUND_BODY, create_test_app};
use etelemetry_server::project::types::TIMESTAMP_FORMAT;

#[tokio::test]
async fn latest_release_is_reported_and_cached() {
    let mut github = FakeGitHub::start().await;
    let release = github
        .release("nipy/nipype", 200, r#"{"tag_name": "v2.3.0"}"#, 1)
        .await;
    let metadata = github
        .metadata_file("nipy/nipype", 404, "404: Not Found", 1)
        .await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/nipy/nipype").await;
    let (second_status, second_body) = app.get("/projects/nipy/nipype").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "2.3.0"}));
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second_body, body);
    // The second lookup is served from the cache file
    release.assert_async().await;
    metadata.assert_async().await;

    let record: serde_json::Value =
        serde_json::from_slice(&std::fs::read(app.cache_file("nipy", "nipype")).unwrap())
            .unwrap();
    assert_eq!(record["version"], "2.3.0");
    assert_eq!(record["status"], 200);
    assert!(record["last_update"].as_str().unwrap().contains("'T'"));
}

#[tokio::test]
async fn first_tag_is_used_without_release() {
    let mut github = FakeGitHub::start().await;
    github.release("mgxd/taggedrepo", 404, NOT_FOUND_BODY, 1).await;
    github
        .tags("mgxd/taggedrepo", 200, r#"[{"name": "v0.1"}]"#, 1)
        .await;
    github
        .metadata_file("mgxd/taggedrepo", 404, "404: Not Found", 1)
        .await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/mgxd/taggedrepo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "0.1"}));
}

#[tokio::test]
async fn repository_without_releases_or_tags_is_unknown() {
    let mut github = FakeGitHub::start().await;
    github.release("mgxd/mytestrepo", 404, NOT_FOUND_BODY, 1).await;
    github.tags("mgxd/mytestrepo", 200, "[]", 1).await;
    github
        .metadata_file("mgxd/mytestrepo", 404, "404: Not Found", 1)
        .await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/mgxd/mytestrepo").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "Unknown"}));
}

#[tokio::test]
async fn missing_repository_is_not_found() {
    let mut github = FakeGitHub::start().await;
    github.release("nipy/missing", 404, NOT_FOUND_BODY, 1).await;
    github.tags("nipy/missing", 404, NOT_FOUND_BODY, 1).await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/nipy/missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": "Version not found"}));
    assert!(!app.cache_file("nipy", "missing").exists());
}

#[tokio::test]
async fn invalid_project_path_is_rejected() {
    let github = FakeGitHub::start().await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/nipy").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Invalid project"}));
}

#[tokio::test]
async fn bad_versions_from_metadata_file_are_reported() {
    let mut github = FakeGitHub::start().await;
    github
        .release("nipy/nipype", 200, r#"{"tag_name": "1.3.0"}"#, 1)
        .await;
    github
        .metadata_file("nipy/nipype", 200, r#"{"bad_versions": ["1.2.0"]}"#, 1)
        .await;
    let app = create_test_app(&github.url());

    let (status, body) = app.get("/projects/nipy/nipype").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "1.3.0", "bad_versions": ["1.2.0"]}));
}

fn write_stale_record(path: &std::path::Path, version: &str) -> Vec<u8> {
    let last_update = (Utc::now() - TimeDelta::hours(10)).format(TIMESTAMP_FORMAT);
    let contents = serde_json::to_vec(&json!({
        "version": version,
        "status": 200,
        "last_update": last_update.to_string(),
        "stats": {}
    }))
    .unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, &contents).unwrap();
    contents
}

#[tokio::test]
async fn stale_record_is_refetched() {
    let mut github = FakeGitHub::start().await;
    let release = github
        .release("nipy/nipype", 200, r#"{"tag_name": "v2.4.0"}"#, 1)
        .await;
    github
        .metadata_file("nipy/nipype", 404, "404: Not Found", 1)
        .await;
    let app = create_test_app(&github.url());
    write_stale_record(&app.cache_file("nipy", "nipype"), "2.3.0");

    let (status, body) = app.get("/projects/nipy/nipype").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "2.4.0"}));
    release.assert_async().await;
}

#[tokio::test]
async fn rate_limit_serves_stale_version_and_keeps_record() {
    let mut github = FakeGitHub::start().await;
    github
        .release(
            "nipy/nipype",
            403,
            r#"{"message": "API rate limit exceeded"}"#,
            1,
        )
        .await;
    let app = create_test_app(&github.url());
    let path = app.cache_file("nipy", "nipype");
    let before = write_stale_record(&path, "2.3.0");

    let (status, body) = app.get("/projects/nipy/nipype").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "2.3.0", "status": 403}));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn corrupt_record_is_replaced() {
    let mut github = FakeGitHub::start().await;
    github
        .release("nipy/nipype", 200, r#"{"tag_name": "v2.3.0"}"#, 1)
        .await;
    github
        .metadata_file("nipy/nipype", 404, "404: Not Found", 1)
        .await;
    let app = create_test_app(&github.url());
    let path = app.cache_file("nipy", "nipype");
    std::fs::write(&path, b"{not json").unwrap();

    let (status, body) = app.get("/projects/nipy/nipype").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "2.3.0"}));
    let record: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(record["version"], "2.3.0");
}
