//! HTTP API over device-tree analysis and the project store

pub mod error;
pub mod handlers;
pub mod router;

use std::sync::Arc;

use dtsmap_projects::{ProjectStore, SyncRegistry};
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;

/// Where the server listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// State shared by every handler.
pub struct ServerState {
    pub store: ProjectStore,
    pub syncs: SyncRegistry,
}

impl ServerState {
    pub fn new(store: ProjectStore) -> Self {
        ServerState {
            store,
            syncs: SyncRegistry::new(),
        }
    }
}

pub struct DtsServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl DtsServer {
    pub fn new(store: ProjectStore, config: ServerConfig) -> Self {
        DtsServer {
            state: Arc::new(ServerState::new(store)),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router::create_router(self.state);
        let listener = TcpListener::bind(self.config.addr()).await?;
        info!(addr = %listener.local_addr()?, "dtsmap server listening");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        assert_eq!(ServerConfig::default().addr(), "127.0.0.1:8080");
    }
}
