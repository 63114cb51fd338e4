//! sbefi - Secure Boot unified kernel image builder.
//!
//! For every `{prefix}{version}` kernel in the boot directory:
//! - Decompress its initramfs variants and append CPU microcode
//! - Embed os-release, cmdline, kernel and initramfs into the systemd EFI stub
//! - Sign the result with sbsign
//! - Copy the signed image to the boot loader's directory

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sbefi::commands;
use sbefi::commands::build::BuildOptions;
use sbefi::config::Config;
use sbefi::RunMode;

#[derive(Parser)]
#[command(name = "sbefi")]
#[command(version, about = "Build, sign and deploy Secure Boot unified kernel images")]
#[command(
    after_help = "QUICK START:\n  sbefi preflight       Check tools, stub and keys\n  sbefi build --dry-run Show what would be done\n  sbefi build           Build, sign and deploy every kernel"
)]
struct Cli {
    /// Configuration file (default: $SBEFI_CONFIG or /etc/sbefi.json)
    #[arg(short = 'c', long = "conf", global = true)]
    conf: Option<PathBuf>,

    /// Log level filter, e.g. "debug" or "sbefi=trace" (RUST_LOG wins if set)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, sign and deploy images for every kernel
    Build {
        /// Log external commands and copies instead of running them
        #[arg(short = 'd', long)]
        dry_run: bool,
        /// Write a placeholder rEFInd stanza into the target directory
        #[arg(long)]
        refind: bool,
        /// Create firmware boot entries with efibootmgr
        #[arg(long)]
        register: bool,
    },

    /// Remove build artifacts (default) or deployed images
    Clean {
        #[command(subcommand)]
        what: Option<CleanTarget>,
        /// Only print what would be removed
        #[arg(short = 'd', long, global = true)]
        dry_run: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Run preflight checks (tools, stub, keys, kernels)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum CleanTarget {
    /// Per-version working directories
    Build,
    /// Deployed images in the target and archive directories
    Target,
    /// Everything
    All,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show effective configuration
    Config,
    /// List kernels and whether their companion files resolve
    Kernels,
}

fn mode(dry_run: bool) -> RunMode {
    if dry_run {
        RunMode::DryRun
    } else {
        RunMode::Execute
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::load(&Config::resolve_path(cli.conf))?;

    match cli.command {
        Commands::Build {
            dry_run,
            refind,
            register,
        } => {
            let opts = BuildOptions {
                mode: mode(dry_run),
                refind,
                register,
            };
            commands::cmd_build(&config, opts)?;
        }

        Commands::Clean { what, dry_run } => {
            let target = match what {
                None | Some(CleanTarget::Build) => commands::clean::CleanTarget::Build,
                Some(CleanTarget::Target) => commands::clean::CleanTarget::Target,
                Some(CleanTarget::All) => commands::clean::CleanTarget::All,
            };
            commands::cmd_clean(&config, target, mode(dry_run))?;
        }

        Commands::Show { what } => {
            let target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Kernels => commands::show::ShowTarget::Kernels,
            };
            commands::cmd_show(&config, target)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
