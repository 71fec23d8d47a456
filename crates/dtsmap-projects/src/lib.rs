//! dtsmap projects: workspace config, on-disk project store, repository sync

pub mod config;
pub mod progress;
pub mod store;
pub mod sync;

pub use config::{ConfigError, WorkspaceConfig};
pub use progress::ProgressTracker;
pub use store::{
    FilePreview, PREVIEW_LINES, ProjectInfo, ProjectMeta, ProjectStore, SourceFile, StoreError,
    source_globs,
};
pub use sync::{
    LOG_TAIL_LINES, SyncError, SyncJob, SyncRegistry, SyncRequest, SyncState, SyncStatus, tail_log,
};
