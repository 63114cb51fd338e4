//! Build command - builds, signs and deploys unified kernel images.

use anyhow::{bail, Context, Result};

use crate::bootloader;
use crate::config::Config;
use crate::context::BuildContext;
use crate::kernel;
use crate::pipeline::{self, RunReport};
use crate::process::RunMode;
use crate::timing::Timer;

/// Flags for the build command.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub mode: RunMode,
    /// Write the rEFInd placeholder stanza.
    pub refind: bool,
    /// Create firmware boot entries with efibootmgr.
    pub register: bool,
}

/// Execute the build command.
///
/// Fails if any kernel failed, after every kernel has been attempted.
pub fn cmd_build(config: &Config, opts: BuildOptions) -> Result<RunReport> {
    if opts.register && config.bootentry.is_none() {
        bail!("--register needs a \"bootentry\" section in the configuration");
    }

    println!("=== sbefi build ===");
    if opts.mode.is_dry_run() {
        println!("[DRY RUN] Nothing will be written.");
    }
    let timer = Timer::start("full build");

    let kernels = kernel::discover_kernels(&config.source.bootdir, &config.source.prefix)
        .with_context(|| format!("Failed to scan {}", config.source.bootdir.display()))?;
    if kernels.is_empty() {
        println!(
            "No kernels matching '{}*' in {}",
            config.source.prefix,
            config.source.bootdir.display()
        );
    }

    let ctx = BuildContext::from_config(config, opts.mode);
    let scheme = config.naming_scheme();
    let policy = config.deployment_policy();
    let report = pipeline::run(&kernels, &scheme, &ctx, &policy);

    if opts.refind {
        bootloader::write_refind_placeholder(&policy.targetdir, opts.mode)?;
    }

    if let Some(entry) = config.bootentry.as_ref().filter(|_| opts.register) {
        let created = bootloader::register_boot_entries(entry, &report.succeeded, &ctx)?;
        println!("  {} boot entr(ies) registered", created.len());
    }

    timer.finish();
    report.print();

    if !report.all_passed() {
        bail!("{} of {} kernel(s) failed", report.failed.len(), kernels.len());
    }
    Ok(report)
}
