//! On-disk project store: one directory per project under the work dir

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::WorkspaceConfig;
use crate::sync::SyncRequest;

pub const PROJECT_META: &str = "project.json";
pub const SYNC_LOG: &str = "clone.log";
/// Lines returned by [`ProjectStore::preview`].
pub const PREVIEW_LINES: usize = 220;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const SOURCE_PATTERNS: &[&str] = &["*.dts", "*.dtsi"];

/// Matcher for device-tree source file names (`*.dts`, `*.dtsi`).
pub fn source_globs() -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in SOURCE_PATTERNS {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),
    #[error("unknown repository: {0}")]
    UnknownRepo(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("project already exists: {0}")]
    ProjectExists(String),
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt project metadata at {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Persisted `project.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub created: Option<String>,
}

/// Listing entry for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub repo: String,
    pub created: Option<String>,
    pub last_modified: Option<String>,
    pub cloned: bool,
    pub file_count: usize,
}

/// A source file read from a project, under its resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePreview {
    pub filename: String,
    pub total_lines: usize,
    pub head: String,
}

/// Reduce a user-supplied name to `[A-Za-z0-9_-]`.
pub fn sanitize_name(raw: &str) -> Result<String, StoreError> {
    let clean: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if clean.is_empty() {
        return Err(StoreError::InvalidProjectName(raw.to_string()));
    }
    Ok(clean)
}

/// Names used for lookup must already be in sanitized form.
fn validate_name(name: &str) -> Result<(), StoreError> {
    match sanitize_name(name) {
        Ok(clean) if clean == name => Ok(()),
        _ => Err(StoreError::InvalidProjectName(name.to_string())),
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string()
}

pub struct ProjectStore {
    config: WorkspaceConfig,
    sources: GlobSet,
}

impl ProjectStore {
    pub fn new(config: WorkspaceConfig) -> Result<Self, StoreError> {
        Ok(ProjectStore {
            config,
            sources: source_globs()?,
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn project_dir(&self, name: &str) -> PathBuf {
        self.config.projects_dir().join(name)
    }

    pub fn checkout_dir(&self, name: &str) -> PathBuf {
        self.project_dir(name).join(&self.config.checkout_dir)
    }

    pub fn dts_dir(&self, name: &str) -> PathBuf {
        self.checkout_dir(name).join(&self.config.dts_subdir)
    }

    pub fn log_path(&self, name: &str) -> PathBuf {
        self.project_dir(name).join(SYNC_LOG)
    }

    /// Create a project directory with its metadata. Returns the stored
    /// metadata, whose name is the sanitized form of `raw_name`.
    pub fn create_project(
        &self,
        raw_name: &str,
        repo: Option<&str>,
    ) -> Result<ProjectMeta, StoreError> {
        let name = sanitize_name(raw_name)?;
        let repo = repo.unwrap_or_else(|| self.config.default_repo());
        if self.config.repo_url(repo).is_none() {
            return Err(StoreError::UnknownRepo(repo.to_string()));
        }

        let dir = self.project_dir(&name);
        if dir.join(PROJECT_META).exists() {
            return Err(StoreError::ProjectExists(name));
        }
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let meta = ProjectMeta {
            name: name.clone(),
            repo: repo.to_string(),
            created: Some(Local::now().format(TIMESTAMP_FORMAT).to_string()),
        };
        self.write_meta(&meta)?;
        info!(project = %name, repo = %repo, "project created");
        Ok(meta)
    }

    fn write_meta(&self, meta: &ProjectMeta) -> Result<(), StoreError> {
        let path = self.project_dir(&meta.name).join(PROJECT_META);
        let json = serde_json::to_string_pretty(meta).map_err(|source| StoreError::Metadata {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_error(&path))
    }

    /// Metadata for an existing project. A directory without `project.json`
    /// is still a project, tracking the default repository.
    pub fn project(&self, name: &str) -> Result<ProjectMeta, StoreError> {
        validate_name(name)?;
        let dir = self.project_dir(name);
        if !dir.is_dir() {
            return Err(StoreError::ProjectNotFound(name.to_string()));
        }
        let path = dir.join(PROJECT_META);
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|source| StoreError::Metadata { path, source }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ProjectMeta {
                name: name.to_string(),
                repo: self.config.default_repo().to_string(),
                created: None,
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Whether the project's source directory has been fetched.
    pub fn is_synced(&self, name: &str) -> bool {
        self.dts_dir(name).is_dir()
    }

    /// All projects, sorted by name.
    pub fn list_projects(&self) -> Result<Vec<ProjectInfo>, StoreError> {
        let root = self.config.projects_dir();
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: root, source }),
        };

        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&root))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = match self.project(&name) {
                Ok(meta) => meta,
                Err(err @ StoreError::InvalidProjectName(_)) => {
                    debug!(project = %name, error = %err, "skipping foreign directory");
                    continue;
                }
                Err(err) => {
                    debug!(project = %name, error = %err, "unreadable project metadata");
                    ProjectMeta {
                        name: name.clone(),
                        repo: self.config.default_repo().to_string(),
                        created: None,
                    }
                }
            };
            let last_modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(format_time);
            projects.push(ProjectInfo {
                cloned: self.is_synced(&name),
                file_count: self.list_files(&name).map_or(0, |files| files.len()),
                name,
                repo: meta.repo,
                created: meta.created,
                last_modified,
            });
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// Source file names (`.dts`/`.dtsi`) in the project's source directory,
    /// sorted. Empty when the project has not been synced yet.
    pub fn list_files(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.project(name)?;
        let dir = self.dts_dir(name);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&dir))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_file() && self.sources.is_match(&file_name) {
                files.push(file_name);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Resolve a file name to a path inside the project's source directory.
    /// Any directory components in `filename` are discarded.
    pub fn resolve_file(&self, name: &str, filename: &str) -> Result<PathBuf, StoreError> {
        self.project(name)?;
        let base = Path::new(filename)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .filter(|f| self.sources.is_match(f))
            .ok_or_else(|| StoreError::InvalidFilename(filename.to_string()))?;
        let path = self.dts_dir(name).join(&base);
        if !path.is_file() {
            return Err(StoreError::FileNotFound(base));
        }
        Ok(path)
    }

    /// Resolve and read a file in one step, decoding lossily.
    pub fn load_file(&self, name: &str, filename: &str) -> Result<SourceFile, StoreError> {
        let path = self.resolve_file(name, filename)?;
        let bytes = std::fs::read(&path).map_err(io_error(&path))?;
        Ok(SourceFile {
            filename: path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// File contents, decoded lossily.
    pub fn read_file(&self, name: &str, filename: &str) -> Result<String, StoreError> {
        Ok(self.load_file(name, filename)?.text)
    }

    /// The first [`PREVIEW_LINES`] lines of a file.
    pub fn preview(&self, name: &str, filename: &str) -> Result<FilePreview, StoreError> {
        let SourceFile { filename, text } = self.load_file(name, filename)?;
        let total_lines = text.lines().count();
        let head = text
            .lines()
            .take(PREVIEW_LINES)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(FilePreview {
            filename,
            total_lines,
            head,
        })
    }

    /// Everything a sync job needs to fetch this project's repository.
    pub fn sync_request(&self, name: &str) -> Result<SyncRequest, StoreError> {
        let meta = self.project(name)?;
        let repo_url = self
            .config
            .repo_url(&meta.repo)
            .ok_or_else(|| StoreError::UnknownRepo(meta.repo.clone()))?;
        Ok(SyncRequest {
            project: meta.name,
            repo_url: repo_url.to_string(),
            checkout_dir: self.checkout_dir(name),
            log_path: self.log_path(name),
            dts_subdir: self.config.dts_subdir.clone(),
            branch: self.config.branch.clone(),
            sparse: self.config.sparse_checkout,
            git_program: self.config.git_program.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let dir = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            work_dir: dir.path().to_path_buf(),
            ..WorkspaceConfig::default()
        };
        (dir, ProjectStore::new(config).unwrap())
    }

    fn seed_sources(store: &ProjectStore, name: &str, files: &[(&str, &str)]) {
        let dts = store.dts_dir(name);
        std::fs::create_dir_all(&dts).unwrap();
        for (file, text) in files {
            std::fs::write(dts.join(file), text).unwrap();
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name(" my board!/v2 ").unwrap(), "myboardv2");
        assert_eq!(sanitize_name("sm8550_dev-1").unwrap(), "sm8550_dev-1");
        assert!(matches!(sanitize_name("../.."), Err(StoreError::InvalidProjectName(_))));
    }

    #[test]
    fn test_create_and_list_projects() {
        let (_dir, store) = store();
        let meta = store.create_project("board a", Some("linux-next")).unwrap();
        assert_eq!(meta.name, "boarda");
        assert_eq!(meta.repo, "linux-next");
        assert!(meta.created.is_some());
        store.create_project("alpha", None).unwrap();

        let projects = store.list_projects().unwrap();
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "boarda"]);
        assert_eq!(projects[0].repo, "linux");
        assert!(!projects[0].cloned);
        assert_eq!(projects[0].file_count, 0);
        assert!(projects[0].last_modified.is_some());
    }

    #[test]
    fn test_create_rejects_unknown_repo_and_duplicates() {
        let (_dir, store) = store();
        assert!(matches!(
            store.create_project("p", Some("freebsd")),
            Err(StoreError::UnknownRepo(_))
        ));
        store.create_project("p", None).unwrap();
        assert!(matches!(store.create_project("p", None), Err(StoreError::ProjectExists(_))));
    }

    #[test]
    fn test_project_lookup_errors() {
        let (_dir, store) = store();
        assert!(matches!(store.project("missing"), Err(StoreError::ProjectNotFound(_))));
        assert!(matches!(store.project("../etc"), Err(StoreError::InvalidProjectName(_))));
    }

    #[test]
    fn test_corrupt_metadata_degrades_in_listing() {
        let (_dir, store) = store();
        let dir = store.project_dir("broken");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PROJECT_META), "{not json").unwrap();
        assert!(matches!(store.project("broken"), Err(StoreError::Metadata { .. })));

        let projects = store.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].repo, "linux");
    }

    #[test]
    fn test_directory_without_metadata_is_a_project() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.project_dir("legacy")).unwrap();
        let meta = store.project("legacy").unwrap();
        assert_eq!(meta.repo, "linux");
        assert_eq!(meta.created, None);
    }

    #[test]
    fn test_list_files_filters_sources() {
        let (_dir, store) = store();
        store.create_project("p", None).unwrap();
        assert!(store.list_files("p").unwrap().is_empty());

        seed_sources(
            &store,
            "p",
            &[("sm8550.dtsi", ""), ("sm8550-mtp.dts", ""), ("Makefile", ""), ("notes.txt", "")],
        );
        assert_eq!(store.list_files("p").unwrap(), vec!["sm8550-mtp.dts", "sm8550.dtsi"]);
        assert!(store.is_synced("p"));
        let info = &store.list_projects().unwrap()[0];
        assert!(info.cloned);
        assert_eq!(info.file_count, 2);
    }

    #[test]
    fn test_resolve_file_strips_directories() {
        let (_dir, store) = store();
        store.create_project("p", None).unwrap();
        seed_sources(&store, "p", &[("a.dtsi", "soc {\n};\n")]);

        let path = store.resolve_file("p", "../../../a.dtsi").unwrap();
        assert_eq!(path, store.dts_dir("p").join("a.dtsi"));
        assert!(matches!(store.resolve_file("p", "Makefile"), Err(StoreError::InvalidFilename(_))));
        assert!(matches!(store.resolve_file("p", "b.dtsi"), Err(StoreError::FileNotFound(_))));
    }

    #[test]
    fn test_preview_truncates() {
        let (_dir, store) = store();
        store.create_project("p", None).unwrap();
        let text: String = (1..=300).map(|i| format!("line {i}\n")).collect();
        seed_sources(&store, "p", &[("big.dts", text.as_str())]);

        let preview = store.preview("p", "big.dts").unwrap();
        assert_eq!(preview.total_lines, 300);
        assert_eq!(preview.head.lines().count(), PREVIEW_LINES);
        assert!(preview.head.ends_with("line 220"));
    }

    #[test]
    fn test_load_file_reports_resolved_name() {
        let (_dir, store) = store();
        store.create_project("p", None).unwrap();
        seed_sources(&store, "p", &[("a.dtsi", "soc {\n};\n")]);

        let file = store.load_file("p", "nested/../a.dtsi").unwrap();
        assert_eq!(file.filename, "a.dtsi");
        assert_eq!(file.text, "soc {\n};\n");
        assert!(matches!(store.load_file("p", "b.dtsi"), Err(StoreError::FileNotFound(_))));
    }

    #[test]
    fn test_source_globs() {
        let globs = source_globs().unwrap();
        assert!(globs.is_match("sm8550.dtsi"));
        assert!(globs.is_match("sm8550-mtp.dts"));
        assert!(!globs.is_match("Makefile"));
        assert!(!globs.is_match("sm8550.dtb"));
    }

    #[test]
    fn test_read_file_is_lossy() {
        let (_dir, store) = store();
        store.create_project("p", None).unwrap();
        let dts = store.dts_dir("p");
        std::fs::create_dir_all(&dts).unwrap();
        std::fs::write(dts.join("bad.dts"), b"soc {\xff\n};\n").unwrap();
        let text = store.read_file("p", "bad.dts").unwrap();
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_sync_request() {
        let (_dir, store) = store();
        store.create_project("p", Some("linux-next")).unwrap();
        let request = store.sync_request("p").unwrap();
        assert!(request.repo_url.ends_with("linux-next.git"));
        assert_eq!(request.checkout_dir, store.project_dir("p").join("linux"));
        assert_eq!(request.log_path, store.project_dir("p").join(SYNC_LOG));
        assert!(request.sparse);
    }
}
