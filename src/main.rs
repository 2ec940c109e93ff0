use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use smbshare::config::{format_config, Config};
use smbshare::events::EventBus;
use smbshare::host::{RootMapFiles, StaticUsers};
use smbshare::logging::{init_logging, LogConfig, Verbosity};
use smbshare::mount::ExternalMounts;
use smbshare::process::SystemRunner;
use smbshare::store::Store;
use smbshare::watcher::FileWatcher;
use smbshare::Samba;

#[derive(Parser)]
#[command(name = "smbshare")]
#[command(version)]
#[command(about = "Share server directories over SMB")]
#[command(
    long_about = "Keeps a registry of shared directories and a Samba configuration generated from it. Adding or removing a share rewrites smb.conf and starts, reloads or stops smbd to match."
)]
struct Cli {
    /// Path to the config file (default: ~/.config/smbshare/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write debug logs to this file
    #[arg(long, global = true)]
    log_file: Option<String>,

    /// Write stderr logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply shares, watch shared roots and run until interrupted
    Daemon,
    /// Share a directory
    Add {
        /// Virtual path of the directory, e.g. /Home/Photos
        path: String,
    },
    /// Stop sharing a directory
    Remove {
        /// Virtual path of the directory
        path: String,
    },
    /// List shares whose directory exists
    List,
    /// Regenerate smb.conf and sync smbd
    Apply,
    /// Mount a remote SMB share onto a local directory
    Mount {
        /// Remote share, e.g. //nas.local/Media
        remote: String,
        /// Local mount point (created if missing)
        path: PathBuf,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

fn build_samba(config: &Config, events: EventBus) -> Result<Arc<Samba>> {
    let db_path = config.db_path()?;
    let store = Store::open(&db_path)
        .with_context(|| format!("Failed to open share registry at {}", db_path.display()))?;

    Ok(Arc::new(Samba::new(
        Arc::new(store),
        Arc::new(RootMapFiles::new(config.roots.clone())),
        Arc::new(StaticUsers::new(config.username.clone())),
        Arc::new(SystemRunner::new()),
        events,
        config.samba_settings()?,
    )))
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(&LogConfig {
        verbosity: Verbosity::from_flags(cli.verbose, cli.quiet),
        log_file: cli.log_file.clone(),
        json: cli.log_json,
    });

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Daemon => {
            let events = EventBus::new();
            let samba = build_samba(&config, events.clone())?;

            samba.start().await;
            let _watcher = FileWatcher::new(config.watch_paths(), events)
                .context("Failed to watch shared roots")?;

            info!("smbshare running");
            shutdown_signal().await;

            samba.stop().await;
        }
        Commands::Add { path } => {
            let samba = build_samba(&config, EventBus::new())?;
            let share = samba
                .add_share(&path)
                .await
                .with_context(|| format!("Failed to share {}", path))?;
            println!("Shared {} as \"{}\"", share.path, share.name);
        }
        Commands::Remove { path } => {
            let samba = build_samba(&config, EventBus::new())?;
            if samba.remove_share(&path).await? {
                println!("Stopped sharing {}", path);
            } else {
                println!("{} was not shared", path);
            }
        }
        Commands::List => {
            let samba = build_samba(&config, EventBus::new())?;
            let shares = samba.list_shares().await?;
            if shares.is_empty() {
                println!("No shares");
            }
            for share in shares {
                println!("{}\t{}", share.name, share.path);
            }
        }
        Commands::Apply => {
            let samba = build_samba(&config, EventBus::new())?;
            let action = samba.apply_shares().await?;
            println!("Applied shares ({:?})", action);
        }
        Commands::Mount {
            remote,
            path,
            username,
            password,
        } => {
            let mounts = ExternalMounts::new(Arc::new(SystemRunner::new()), config.mount_options());
            mounts
                .mount(&remote, &path, &username, &password)
                .await
                .with_context(|| format!("Failed to mount {}", remote))?;
            println!("Mounted {} at {}", remote, path.display());
        }
        Commands::Config => {
            println!("{}", format_config(&config));
        }
    }

    Ok(())
}
