//! Device Provisioner - command-line entry point
//!
//! Loads configuration, sets up logging, then runs one command. Device runs
//! happen on a worker thread; the mirror supervisor gets its own event loop
//! thread; this thread prints whatever they report.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use provision_core::config::ConfigManager;
use provision_core::logging::{init_tracing, init_tracing_with_file, LogLevel};

mod commands;

/// Default config path: .config/settings.toml (relative to current working directory)
fn default_config_path() -> PathBuf {
    PathBuf::from(".config").join("settings.toml")
}

#[derive(Parser)]
#[command(name = "device-provisioner", version, about = "Provision and mirror networked Android devices")]
struct Cli {
    /// Settings file (created with defaults if missing).
    #[arg(long, global = true, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Debug-level logging and inline device-tool output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the payload onto one or more devices.
    Install {
        /// Device addresses (`ip` or `ip:port`).
        #[arg(required = true)]
        devices: Vec<String>,

        /// Install from this backup folder instead of the payload folder.
        #[arg(long, value_name = "NAME")]
        from_backup: Option<String>,

        /// Do not start screen mirroring.
        #[arg(long)]
        no_mirror: bool,
    },

    /// Back up one device into a new folder under the backups folder.
    Backup {
        #[arg(required = true)]
        devices: Vec<String>,
    },

    /// Mirror a device's screen until Enter is pressed.
    Mirror { device: String },

    /// List backups, newest first.
    Backups,

    /// Check that the device tool and mirror tool can be run.
    CheckTools,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logs directory path)
    let mut config_manager = ConfigManager::new(&cli.config);
    if let Err(e) = config_manager.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let logs_dir = config_manager.logs_folder();
    let _log_guard = match init_tracing_with_file(level, &logs_dir, "device-provisioner.log") {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Log folder {} unavailable: {}", logs_dir.display(), e);
            init_tracing(level);
            None
        }
    };

    tracing::info!("Device provisioner starting");
    tracing::info!("Config: {}", cli.config.display());
    tracing::info!("Core version: {}", provision_core::version());

    if let Err(e) = config_manager.ensure_dirs_exist() {
        tracing::error!("Failed to create directories: {}", e);
    }

    let app = commands::App::new(&config_manager, cli.verbose);
    match cli.command {
        Command::Install {
            devices,
            from_backup,
            no_mirror,
        } => app
            .install(&devices, from_backup, !no_mirror)
            .context("install failed"),
        Command::Backup { devices } => app.backup(&devices).context("backup failed"),
        Command::Mirror { device } => app.mirror(&device).context("mirroring failed"),
        Command::Backups => {
            app.list_backups();
            Ok(())
        }
        Command::CheckTools => app.check_tools(),
    }
}
