//! dtsmap CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "dtsmap")]
#[command(about = "Device-tree structure maps, diffs and idle-state topology", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Mermaid,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (defaults to $PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to $HOST or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },
    /// Analyze one source file
    Analyze {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Structural diff of two source files
    Diff { a: PathBuf, b: PathBuf },
    /// Node counts per top-level group
    Summary {
        file: PathBuf,

        /// Top-level groups to keep
        #[arg(long, default_value = "18")]
        top: usize,

        /// Children of the soc group to keep
        #[arg(long, default_value = "18")]
        soc_top: usize,
    },
    /// CPU idle-state topology
    Idle {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Parse every .dts/.dtsi file in a directory
    Scan { dir: PathBuf },
    /// Fetch a project's kernel sources in the foreground
    Sync {
        project: String,

        /// Repository key used when the project is created
        #[arg(long)]
        repo: Option<String>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve { port, host } => commands::serve(host, port).await,
        Commands::Analyze { file, format } => commands::analyze(&file, format),
        Commands::Diff { a, b } => commands::diff(&a, &b),
        Commands::Summary { file, top, soc_top } => commands::summary(&file, top, soc_top),
        Commands::Idle { file, format } => commands::idle(&file, format),
        Commands::Scan { dir } => commands::scan(&dir),
        Commands::Sync { project, repo } => commands::sync(&project, repo.as_deref()).await,
        Commands::Version => {
            println!("dtsmap v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
