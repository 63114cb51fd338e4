//! Per-kernel pipeline: resolve, assemble, sign, deploy.
//!
//! Kernels are processed one after another. A failure ends that kernel's
//! pipeline and is recorded; the remaining kernels still run.

use std::path::{Path, PathBuf};

use tracing::{error, info, info_span};

use crate::assemble;
use crate::context::BuildContext;
use crate::deploy::{self, Deployment, DeploymentPolicy};
use crate::error::{Error, Result};
use crate::kernel::{KernelDescriptor, NamingScheme};
use crate::manifest::BuildManifest;
use crate::sign;
use crate::timing::Timer;

/// A kernel that went all the way through.
#[derive(Debug)]
pub struct KernelSuccess {
    pub kernel: PathBuf,
    pub version: String,
    pub deployments: Vec<Deployment>,
    /// Absent for dry runs.
    pub manifest: Option<PathBuf>,
}

/// A kernel whose pipeline stopped.
#[derive(Debug)]
pub struct KernelFailure {
    pub kernel: PathBuf,
    pub error: Error,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<KernelSuccess>,
    pub failed: Vec<KernelFailure>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }

    /// Print the end-of-run summary to stdout.
    pub fn print(&self) {
        println!("\n=== Summary ===\n");
        for ok in &self.succeeded {
            println!("  ✓ {}", ok.version);
            for d in &ok.deployments {
                if let Some(target) = &d.target {
                    println!("      {}", target.display());
                }
                if let Some(archive) = &d.archive {
                    println!("      {} (archive)", archive.display());
                }
            }
        }
        for failed in &self.failed {
            println!("  ✗ {}: {}", failed.kernel.display(), failed.error);
        }
        println!();
        println!(
            "{} kernel(s) deployed, {} failed",
            self.succeeded.len(),
            self.failed.len()
        );
    }
}

/// Run one kernel through every stage.
pub fn process_kernel(
    path: &Path,
    scheme: &NamingScheme,
    ctx: &BuildContext,
    policy: &DeploymentPolicy,
) -> Result<KernelSuccess> {
    let kernel = KernelDescriptor::resolve(path, scheme)?;
    let version = kernel.version().to_string();
    let span = info_span!("kernel", %version);
    let _enter = span.enter();
    println!("\nKernel {}", version);

    let timer = Timer::start(format!("build {}", version));
    let build = assemble::assemble(kernel, ctx)?;
    let signed = sign::sign_build(&build, ctx)?;
    timer.finish();

    let manifest = if ctx.is_dry_run() {
        None
    } else {
        Some(BuildManifest::collect(&build, &signed)?.write(&build.workdir)?)
    };

    let deployments = deploy::deploy(&signed, policy, ctx.mode)?;
    info!(images = deployments.len(), "kernel deployed");

    Ok(KernelSuccess {
        kernel: path.to_path_buf(),
        version,
        deployments,
        manifest,
    })
}

/// Process every kernel, isolating failures.
pub fn run(
    kernels: &[PathBuf],
    scheme: &NamingScheme,
    ctx: &BuildContext,
    policy: &DeploymentPolicy,
) -> RunReport {
    let mut report = RunReport::default();

    for path in kernels {
        match process_kernel(path, scheme, ctx, policy) {
            Ok(ok) => report.succeeded.push(ok),
            Err(e) => {
                error!(kernel = %path.display(), error = %e, "kernel failed");
                report.failed.push(KernelFailure {
                    kernel: path.clone(),
                    error: e,
                });
            }
        }
    }

    report
}
