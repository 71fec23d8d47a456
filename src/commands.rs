//! CLI command implementations

use anyhow::{Context, bail};
use dtsmap_core::{
    Analysis, Hierarchy, IdleTopology, StructuralDiff, SubsystemSummary, SummaryLimits,
    strip_comments,
};
use dtsmap_projects::{
    ProjectStore, StoreError, SyncRegistry, SyncStatus, WorkspaceConfig, source_globs,
    store::sanitize_name,
};
use dtsmap_server::{DtsServer, ServerConfig};
use rayon::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::OutputFormat;

/// Log lines echoed when a foreground sync fails.
const FAILURE_TAIL_LINES: usize = 20;

fn read_source(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn env_port() -> anyhow::Result<Option<u16>> {
    match std::env::var("PORT") {
        Ok(value) => Ok(Some(
            value
                .parse()
                .with_context(|| format!("invalid PORT value {value:?}"))?,
        )),
        Err(_) => Ok(None),
    }
}

fn open_store() -> anyhow::Result<ProjectStore> {
    let workspace = WorkspaceConfig::from_env().context("loading workspace configuration")?;
    Ok(ProjectStore::new(workspace)?)
}

pub async fn serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: host
            .or_else(|| std::env::var("HOST").ok())
            .unwrap_or(defaults.host),
        port: match port {
            Some(port) => port,
            None => env_port()?.unwrap_or(defaults.port),
        },
    };
    let store = open_store()?;
    tracing::info!(
        "Starting dtsmap server on {} (projects in {})",
        config.addr(),
        store.config().projects_dir().display()
    );

    let server = DtsServer::new(store, config);
    server.start().await
}

pub fn analyze(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let analysis = Analysis::new(&read_source(file)?);
    tracing::debug!(nodes = analysis.hierarchy.len(), "analyzed {}", file.display());
    if analysis.is_incomplete() {
        tracing::warn!(
            forced_closes = analysis.hierarchy.forced_closes(),
            "{} has unbalanced braces; open nodes were closed at end of file",
            file.display()
        );
    }

    match format {
        OutputFormat::Mermaid => {
            println!("{}", analysis.diagram.to_mermaid());
            Ok(())
        }
        OutputFormat::Json => print_json(&json!({
            "file": file.display().to_string(),
            "node_count": analysis.hierarchy.len(),
            "incomplete": analysis.is_incomplete(),
            "nodes": analysis.hierarchy.nodes(),
            "edges": analysis.hierarchy.edges(),
            "summary": analysis.summary,
            "idle": analysis.idle.found.then_some(&analysis.idle),
        })),
    }
}

pub fn diff(a: &Path, b: &Path) -> anyhow::Result<()> {
    let diff = StructuralDiff::between_texts(&read_source(a)?, &read_source(b)?);
    tracing::info!(
        added = diff.added_paths.len(),
        removed = diff.removed_paths.len(),
        "compared {} with {}",
        a.display(),
        b.display()
    );
    print_json(&diff)
}

pub fn summary(file: &Path, top: usize, soc_top: usize) -> anyhow::Result<()> {
    let hierarchy = Hierarchy::parse(&read_source(file)?);
    let limits = SummaryLimits { top, soc: soc_top };
    print_json(&SubsystemSummary::from_paths(hierarchy.paths(), limits))
}

pub fn idle(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let topology = IdleTopology::extract(&strip_comments(&read_source(file)?));
    if topology.assumed_quad_core {
        tracing::warn!("no CPU nodes declared in {}; assuming four cores", file.display());
    }

    match format {
        OutputFormat::Json => print_json(&topology),
        OutputFormat::Mermaid => match topology.diagram() {
            Some(diagram) => {
                println!("{}", diagram.to_mermaid());
                Ok(())
            }
            None => bail!("no idle-state topology found in {}", file.display()),
        },
    }
}

pub fn scan(dir: &Path) -> anyhow::Result<()> {
    let globs = source_globs()?;
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|name| globs.is_match(Path::new(name)))
        })
        .collect();
    files.sort();
    tracing::info!("Scanning {} files in {}", files.len(), dir.display());

    let results: Vec<(String, anyhow::Result<Hierarchy>)> = files
        .par_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let hierarchy = std::fs::read(path)
                .map(|bytes| Hierarchy::parse_bytes(&bytes))
                .with_context(|| format!("reading {}", path.display()));
            (name, hierarchy)
        })
        .collect();

    let mut total = 0;
    for (name, hierarchy) in results {
        match hierarchy {
            Ok(h) => {
                total += h.len();
                let marker = if h.is_incomplete() { "\tincomplete" } else { "" };
                println!("{name}\t{}{marker}", h.len());
            }
            Err(err) => tracing::warn!("skipping {name}: {err:#}"),
        }
    }
    tracing::info!("Scanned {} nodes", total);
    Ok(())
}

pub async fn sync(project: &str, repo: Option<&str>) -> anyhow::Result<()> {
    let store = open_store()?;
    let name = sanitize_name(project)?;
    match store.project(&name) {
        Ok(meta) => tracing::info!("Syncing existing project {} ({})", meta.name, meta.repo),
        Err(StoreError::ProjectNotFound(_)) => {
            let meta = store.create_project(&name, repo)?;
            tracing::info!("Created project {} ({})", meta.name, meta.repo);
        }
        Err(err) => return Err(err.into()),
    }

    let registry = SyncRegistry::new();
    let mut progress = registry.start(store.sync_request(&name)?)?;
    let final_state = loop {
        let state = progress.borrow_and_update().clone();
        eprint!("\r{:>3}% {:<72}", state.percent, state.message);
        if !state.is_running() {
            break state;
        }
        if progress.changed().await.is_err() {
            break progress.borrow().clone();
        }
    };
    eprintln!();

    if final_state.status == SyncStatus::Error {
        for line in registry.tail(&name, FAILURE_TAIL_LINES).await {
            eprintln!("  {line}");
        }
        bail!("sync of {name} failed: {}", final_state.message);
    }
    println!(
        "{name}: {} source files in {}",
        store.list_files(&name)?.len(),
        store.dts_dir(&name).display()
    );
    Ok(())
}
