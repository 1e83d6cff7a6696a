use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Keeps an installed script package in step with its release manifest",
    long_about = None
)]
pub struct Cli {
    /// Settings file to use instead of the per-user one.
    #[arg(long, global = true, value_name = "FILE", env = "SHELFUP_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Override the release manifest URL.
    #[arg(long, global = true, value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Override the directory the package is installed into.
    #[arg(long, global = true, value_name = "DIRECTORY_PATH")]
    pub install_root: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare the installed version with the release manifest
    Check,

    /// Check, ask for confirmation, and install the latest release
    Update {
        /// Install without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Install a specific archive regardless of the manifest
    #[command(arg_required_else_help = true)]
    Install {
        /// Archive URL
        #[arg(long)]
        url: String,

        /// Version to record for the installed archive
        #[arg(long)]
        version: String,

        /// Expected SHA-256 of the archive
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Show the installed version and cached manifest
    Status,

    /// Inspect or clear the manifest cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Version string utilities
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Show or write the effective settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show where the cache lives and how large it is
    Info,
    /// Delete the cached manifest
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the settings after applying command-line overrides
    Show,
    /// Write the settings file so it can be edited
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum VersionAction {
    /// Exit successfully if VERSION is well formed
    Validate { version: String },
    /// Print -1, 0, or 1 as A is older than, equal to, or newer than B
    Compare { a: String, b: String },
}
