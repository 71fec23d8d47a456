//! REST API handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use axum_extra::extract::Query;
use dtsmap_core::{Analysis, Diagram, IdleTopology, SourceSpan, StructuralDiff, SubsystemSummary};
use dtsmap_projects::{
    FilePreview, LOG_TAIL_LINES, ProjectInfo, ProjectMeta, SourceFile, SyncState,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{ApiError, ServerState};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub meta: ProjectMeta,
    pub cloned: bool,
    pub files: Vec<String>,
    pub sync: SyncState,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub state: SyncState,
    pub tail: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub project: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IdleResponse {
    #[serde(flatten)]
    pub topology: IdleTopology,
    pub mermaid: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub filename: String,
    pub node_count: usize,
    pub incomplete: bool,
    pub mermaid: String,
    pub diagram: Diagram,
    pub spans: BTreeMap<String, SourceSpan>,
    pub summary: SubsystemSummary,
    pub idle: Option<IdleResponse>,
}

impl AnalyzeResponse {
    fn build(filename: String, text: &str) -> Self {
        let analysis = Analysis::new(text);
        let idle = analysis.idle.diagram().map(|diagram| IdleResponse {
            mermaid: diagram.to_mermaid(),
            topology: analysis.idle.clone(),
        });
        AnalyzeResponse {
            filename,
            node_count: analysis.hierarchy.len(),
            incomplete: analysis.is_incomplete(),
            mermaid: analysis.diagram.to_mermaid(),
            spans: analysis.source_spans(),
            diagram: analysis.diagram,
            summary: analysis.summary,
            idle,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub a: String,
    pub b: String,
    #[serde(flatten)]
    pub diff: StructuralDiff,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(health)
}

pub async fn list_projects(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<ProjectInfo>> {
    Ok(Json(state.store.list_projects()?))
}

pub async fn create_project(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectMeta>), ApiError> {
    let meta = state
        .store
        .create_project(&request.name, request.repo.as_deref())?;
    Ok((StatusCode::CREATED, Json(meta)))
}

pub async fn get_project(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<ProjectDetail> {
    let meta = state.store.project(&name)?;
    let files = state.store.list_files(&name)?;
    Ok(Json(ProjectDetail {
        cloned: state.store.is_synced(&name),
        sync: state.syncs.state(&name),
        meta,
        files,
    }))
}

pub async fn start_sync(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = state.store.sync_request(&name)?;
    state.syncs.start(request)?;
    info!(project = %name, "sync requested");
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn sync_status(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<SyncStatusResponse> {
    state.store.project(&name)?;
    Ok(Json(SyncStatusResponse {
        state: state.syncs.state(&name),
        tail: state.syncs.tail(&name, LOG_TAIL_LINES).await,
    }))
}

pub async fn list_files(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<FilesResponse> {
    let files = state.store.list_files(&name)?;
    Ok(Json(FilesResponse {
        project: name,
        files,
    }))
}

pub async fn preview_file(
    State(state): State<Arc<ServerState>>,
    Path((name, file)): Path<(String, String)>,
) -> ApiResult<FilePreview> {
    Ok(Json(state.store.preview(&name, &file)?))
}

pub async fn analyze_file(
    State(state): State<Arc<ServerState>>,
    Path((name, file)): Path<(String, String)>,
) -> ApiResult<AnalyzeResponse> {
    let SourceFile { filename, text } = state.store.load_file(&name, &file)?;
    let response =
        tokio::task::spawn_blocking(move || AnalyzeResponse::build(filename, &text)).await?;
    if response.incomplete {
        warn!(project = %name, file = %response.filename, "unbalanced braces, nodes closed at end of file");
    }
    Ok(Json(response))
}

pub async fn diff_files(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<DiffResponse> {
    let old = state.store.read_file(&name, &query.a)?;
    let new = state.store.read_file(&name, &query.b)?;
    let diff = tokio::task::spawn_blocking(move || StructuralDiff::between_texts(&old, &new)).await?;
    Ok(Json(DiffResponse {
        a: query.a,
        b: query.b,
        diff,
    }))
}
