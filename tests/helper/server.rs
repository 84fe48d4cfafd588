//! Application wiring for end-to-end tests

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use etelemetry_server::config::{Config, ForgeConfig};
use etelemetry_server::server::routes::create_router;
use etelemetry_server::server::state::AppContext;

pub struct TestApp {
    pub temp_dir: TempDir,
    pub router: Router,
}

impl TestApp {
    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    pub fn cache_file(&self, owner: &str, repo: &str) -> PathBuf {
        self.cache_dir().join(format!("{owner}--{repo}.json"))
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }
}

/// Configuration pointing every forge endpoint at `base_url`
pub fn test_config(temp_dir: &TempDir, base_url: &str) -> Config {
    Config {
        cache_dir: temp_dir.path().join("cache"),
        database_path: Some(temp_dir.path().join("requests.db")),
        forge: ForgeConfig {
            release_url: format!("{base_url}/repos/{{owner}}/{{repo}}/releases/latest"),
            tags_url: format!("{base_url}/repos/{{owner}}/{{repo}}/tags"),
            metadata_url: format!("{base_url}/{{owner}}/{{repo}}/master/.et"),
            timeout_ms: 2_000,
            ..ForgeConfig::default()
        },
        ..Config::default()
    }
}

pub fn create_test_app(base_url: &str) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    create_test_app_with(temp_dir, |dir| test_config(dir, base_url))
}

/// Builds the app from a config derived from the test's temp dir
pub fn create_test_app_with(
    temp_dir: TempDir,
    make_config: impl FnOnce(&TempDir) -> Config,
) -> TestApp {
    let config = make_config(&temp_dir);
    let context = AppContext::from_config(config).unwrap();
    TestApp {
        temp_dir,
        router: create_router(Arc::new(context)),
    }
}
