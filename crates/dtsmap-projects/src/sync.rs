//! Background repository sync: git subprocesses, progress, status registry

use std::path::{Path, PathBuf};
use std::process::Stdio;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::progress::{ProgressTracker, split_progress_lines};

/// Lines of log returned by [`SyncRegistry::tail`] by default.
pub const LOG_TAIL_LINES: usize = 200;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync is already running for project {0}")]
    AlreadyRunning(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`git {command}` exited with {status}")]
    GitFailed { command: String, status: String },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Cloning,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub percent: u8,
    pub message: String,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState {
            status: SyncStatus::Idle,
            percent: 0,
            message: String::new(),
        }
    }
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        self.status == SyncStatus::Cloning
    }
}

/// Parameters of one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub project: String,
    pub repo_url: String,
    pub checkout_dir: PathBuf,
    pub log_path: PathBuf,
    pub dts_subdir: String,
    pub branch: String,
    pub sparse: bool,
    pub git_program: PathBuf,
}

/// A single sync run. Publishes its state on a watch channel.
pub struct SyncJob {
    request: SyncRequest,
    state: watch::Sender<SyncState>,
}

impl SyncJob {
    /// The job starts in the `Cloning` state so observers never see a gap
    /// between acceptance and the first git command.
    pub fn new(request: SyncRequest) -> (Self, watch::Receiver<SyncState>) {
        let (state, receiver) = watch::channel(SyncState {
            status: SyncStatus::Cloning,
            percent: 0,
            message: "Starting...".to_string(),
        });
        (SyncJob { request, state }, receiver)
    }

    fn update(&self, f: impl FnOnce(&mut SyncState)) {
        self.state.send_modify(f);
    }

    /// Run to completion and return the final state.
    pub async fn run(self) -> SyncState {
        let project = self.request.project.clone();
        info!(project = %project, url = %self.request.repo_url, sparse = self.request.sparse, "sync started");

        match self.run_logged().await {
            Ok(()) => {
                info!(project = %project, "sync finished");
                self.update(|s| {
                    s.status = SyncStatus::Ready;
                    s.percent = 100;
                    s.message = "Ready".to_string();
                });
            }
            Err(err) => {
                warn!(project = %project, error = %err, "sync failed");
                self.append_log(&format!("ERROR: {err}\n")).await;
                self.update(|s| {
                    s.status = SyncStatus::Error;
                    s.percent = 0;
                    s.message = err.to_string();
                });
            }
        }
        self.state.borrow().clone()
    }

    async fn run_logged(&self) -> Result<(), SyncError> {
        let log_path = &self.request.log_path;
        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let mut log = File::create(log_path).await.map_err(io_error(log_path))?;

        let result = if self.request.sparse {
            self.sparse_checkout(&mut log).await
        } else {
            self.shallow_clone(&mut log).await
        };
        log.flush().await.map_err(io_error(log_path))?;
        result
    }

    async fn sparse_checkout(&self, log: &mut File) -> Result<(), SyncError> {
        let dir = &self.request.checkout_dir;
        if !dir.join(".git").exists() {
            self.reset_dir(dir).await?;
            tokio::fs::create_dir_all(dir).await.map_err(io_error(dir))?;

            self.step("Initializing repository");
            self.git(log, dir, &["init"], false).await?;
            self.git(log, dir, &["remote", "add", "origin", self.request.repo_url.as_str()], false)
                .await?;
            self.step("Configuring sparse checkout");
            self.git(log, dir, &["config", "core.sparseCheckout", "true"], false)
                .await?;

            let info_dir = dir.join(".git").join("info");
            tokio::fs::create_dir_all(&info_dir).await.map_err(io_error(&info_dir))?;
            let patterns = info_dir.join("sparse-checkout");
            let subdir = self.request.dts_subdir.trim_matches('/');
            tokio::fs::write(&patterns, format!("{subdir}/\n"))
                .await
                .map_err(io_error(&patterns))?;
        }

        self.step("Fetching data...");
        let branch = self.request.branch.as_str();
        self.git(log, dir, &["pull", "--depth", "1", "origin", branch, "--progress"], true)
            .await
    }

    async fn shallow_clone(&self, log: &mut File) -> Result<(), SyncError> {
        let dir = &self.request.checkout_dir;
        self.reset_dir(dir).await?;
        let parent = dir.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;

        self.step("Cloning...");
        let target = dir.to_string_lossy();
        self.git(
            log,
            parent,
            &["clone", "--progress", "--depth", "1", self.request.repo_url.as_str(), &*target],
            true,
        )
        .await
    }

    async fn reset_dir(&self, dir: &Path) -> Result<(), SyncError> {
        if dir.exists() {
            debug!(dir = %dir.display(), "removing stale checkout");
            tokio::fs::remove_dir_all(dir).await.map_err(io_error(dir))?;
        }
        Ok(())
    }

    fn step(&self, message: &str) {
        debug!(project = %self.request.project, "{message}");
        self.update(|s| s.message = message.to_string());
    }

    /// Run one git command, copying its output to the log. With
    /// `track_progress` the percentages it prints advance the job state.
    async fn git(
        &self,
        log: &mut File,
        cwd: &Path,
        args: &[&str],
        track_progress: bool,
    ) -> Result<(), SyncError> {
        let program = &self.request.git_program;
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SyncError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }
        drop(tx);

        let log_path = &self.request.log_path;
        let mut progress = ProgressTracker::new();
        while let Some(line) = rx.recv().await {
            log.write_all(line.as_bytes()).await.map_err(io_error(log_path))?;
            log.write_all(b"\n").await.map_err(io_error(log_path))?;
            if !track_progress {
                continue;
            }
            if let Some(percent) = progress.observe(&line) {
                self.update(|s| {
                    s.percent = percent;
                    s.message = line.trim().to_string();
                });
            }
        }

        let status = child.wait().await.map_err(|source| SyncError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        if !status.success() {
            return Err(SyncError::GitFailed {
                command: args.join(" "),
                status: status
                    .code()
                    .map_or_else(|| "a signal".to_string(), |c| format!("status {c}")),
            });
        }
        Ok(())
    }

    async fn append_log(&self, text: &str) {
        let path = &self.request.log_path;
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(text.as_bytes()).await
        }
        .await;
        if let Err(err) = result {
            debug!(path = %path.display(), error = %err, "could not append to sync log");
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a child pipe, splitting on both `\r` and `\n` so in-place progress
/// updates arrive as separate lines.
fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\r');
        while let Ok(Some(segment)) = segments.next_segment().await {
            let text = String::from_utf8_lossy(&segment);
            for line in split_progress_lines(&text) {
                if tx.send(line.to_string()).is_err() {
                    return;
                }
            }
        }
    });
}

/// Last `n` lines of a log file; empty when the file does not exist.
pub async fn tail_log(path: &Path, n: usize) -> Vec<String> {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

struct SyncHandle {
    state: watch::Receiver<SyncState>,
    log_path: PathBuf,
}

/// Per-project sync status, shared across request handlers.
#[derive(Default)]
pub struct SyncRegistry {
    jobs: DashMap<String, SyncHandle>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a sync job for the request's project on the current tokio
    /// runtime. At most one job runs per project.
    pub fn start(&self, request: SyncRequest) -> Result<watch::Receiver<SyncState>, SyncError> {
        let project = request.project.clone();
        let log_path = request.log_path.clone();
        let (job, receiver) = SyncJob::new(request);
        let handle = SyncHandle {
            state: receiver.clone(),
            log_path,
        };

        match self.jobs.entry(project.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().state.borrow().is_running() {
                    return Err(SyncError::AlreadyRunning(project));
                }
                occupied.insert(handle);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
            }
        }

        tokio::spawn(job.run());
        Ok(receiver)
    }

    /// Current state; `Idle` for projects never synced in this process.
    pub fn state(&self, project: &str) -> SyncState {
        self.jobs
            .get(project)
            .map(|h| h.state.borrow().clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, project: &str) -> Option<watch::Receiver<SyncState>> {
        self.jobs.get(project).map(|h| h.state.clone())
    }

    /// Wait until the project's current job leaves the `Cloning` state.
    pub async fn wait(&self, project: &str) -> Option<SyncState> {
        let mut receiver = self.subscribe(project)?;
        let state = receiver.wait_for(|s| !s.is_running()).await.ok()?.clone();
        Some(state)
    }

    /// Tail of the log written by the project's last job.
    pub async fn tail(&self, project: &str, n: usize) -> Vec<String> {
        let Some(path) = self.jobs.get(project).map(|h| h.log_path.clone()) else {
            return Vec::new();
        };
        tail_log(&path, n).await
    }
}
