//! HTTP routes

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::project::request_log::RequestRecord;
use crate::project::types::{ProjectKey, WeeklyStats, now_seconds};
use crate::server::error::ApiError;
use crate::server::state::AppContext;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Public view of a project entry
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub version: String,
    /// Last forge status, present only when it was not 200
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_versions: Option<Vec<String>>,
}

pub fn create_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/projects/{*project}", get(project_version))
        .route("/stats/{*project}", get(project_stats))
        .with_state(context)
}

async fn index() -> Json<Value> {
    Json(json!({
        "package": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "message": "ET phones home",
    }))
}

async fn project_version(
    State(context): State<Arc<AppContext>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = parse_project(&path)?;
    let remote_addr = remote_addr(&request);
    drop(request);

    let resolution = context.resolver.resolve(&project).await;

    let record = RequestRecord {
        access_time: now_seconds(),
        remote_addr,
        owner: project.owner.clone(),
        repo: project.repo.clone(),
        version: resolution.info.version.clone(),
        cached: resolution.cached,
        status: resolution.info.status,
    };
    if let Err(e) = context.request_log.insert(record).await {
        error!("Failed to log request for {}: {}", project, e);
    }

    let info = resolution.info;
    let version = info
        .version
        .ok_or_else(|| ApiError::NotFound("Version not found".to_string()))?;

    Ok(Json(ProjectResponse {
        version,
        status: info.status.filter(|status| *status != 200),
        bad_versions: info.bad_versions,
    }))
}

async fn project_stats(
    State(context): State<Arc<AppContext>>,
    Path(path): Path<String>,
) -> Result<Json<WeeklyStats>, ApiError> {
    let project = parse_project(&path)?;

    context
        .stats
        .weekly_stats(&project)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No stats available".to_string()))
}

fn parse_project(path: &str) -> Result<ProjectKey, ApiError> {
    ProjectKey::parse(path).ok_or_else(|| {
        debug!("Rejecting project path {:?}", path);
        ApiError::BadRequest("Invalid project".to_string())
    })
}

/// The first `X-Forwarded-For` entry, else the peer address
fn remote_addr(request: &Request) -> Option<String> {
    let forwarded = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty());

    match forwarded {
        Some(addr) => Some(addr.to_string()),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}
