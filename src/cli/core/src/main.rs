/* src/cli/core/src/main.rs */

mod app;
mod build;
mod config;
mod routes;
mod serve;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use config::{TrellisConfig, find_trellis_config, load_trellis_config};

#[derive(Parser)]
#[command(name = "trellis", about = "Trellis RSC framework CLI")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Statically generate every eligible page into the dist directory
  Build {
    /// Path to trellis.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
  /// Generate, then serve pages with on-demand regeneration
  Serve {
    /// Path to trellis.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
  },
  /// Show how a URL resolves, or list every page route
  Routes {
    /// URL path to resolve, e.g. /blog/hello
    path: Option<String>,
    /// Path to trellis.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
}

fn init_logging() {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(fmt::layer().with_target(false))
    .init();
}

/// Resolve config path (explicit or auto-detected) and parse it
fn resolve_config(explicit: Option<PathBuf>) -> Result<(PathBuf, TrellisConfig)> {
  let path = match explicit {
    Some(p) => p,
    None => {
      let cwd = std::env::current_dir().context("failed to get cwd")?;
      find_trellis_config(&cwd)?
    }
  };
  let config = load_trellis_config(&path)?;
  tracing::debug!(config = %path.display(), project = %config.project.name, "config loaded");
  Ok((path, config))
}

fn base_dir_of(config_path: &Path) -> &Path {
  config_path.parent().unwrap_or_else(|| Path::new("."))
}

#[tokio::main]
async fn main() -> Result<()> {
  init_logging();
  let cli = Cli::parse();

  match cli.command {
    Command::Build { config } => {
      let (config_path, trellis_config) = resolve_config(config)?;
      build::run_build(&trellis_config, base_dir_of(&config_path)).await?;
    }
    Command::Serve { config, port } => {
      let (config_path, trellis_config) = resolve_config(config)?;
      let port = port.unwrap_or(trellis_config.server.port);
      serve::run_serve(&trellis_config, base_dir_of(&config_path), port).await?;
    }
    Command::Routes { path, config } => {
      let (config_path, trellis_config) = resolve_config(config)?;
      let app_dir = trellis_config.app_dir(base_dir_of(&config_path));
      routes::run_routes(&app_dir, path.as_deref())?;
    }
  }

  Ok(())
}
