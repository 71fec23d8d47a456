//! Axum router setup for the dtsmap server

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{
        analyze_file, create_project, diff_files, get_project, health_check, list_files,
        list_projects, preview_file, start_sync, sync_status,
    },
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/:name", get(get_project))
        .route("/api/projects/:name/sync", post(start_sync).get(sync_status))
        .route("/api/projects/:name/files", get(list_files))
        .route("/api/projects/:name/files/:file/preview", get(preview_file))
        .route("/api/projects/:name/files/:file/analyze", get(analyze_file))
        .route("/api/projects/:name/diff", get(diff_files))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsmap_projects::{ProjectStore, WorkspaceConfig};

    #[test]
    fn test_router_creation() {
        let store = ProjectStore::new(WorkspaceConfig::default()).unwrap();
        let state = Arc::new(ServerState::new(store));
        let _router = create_router(state);
    }
}
