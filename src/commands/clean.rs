//! Clean command - removes build artifacts and deployed images.

use anyhow::Result;

use crate::clean;
use crate::config::Config;
use crate::process::RunMode;

/// Clean target for the clean command.
pub enum CleanTarget {
    /// Per-version working directories
    Build,
    /// Deployed images in the target and archive directories
    Target,
    /// Both
    All,
}

/// Execute the clean command.
pub fn cmd_clean(config: &Config, target: CleanTarget, mode: RunMode) -> Result<()> {
    let deployed = || {
        let mut dirs = vec![config.write.targetdir.as_path()];
        if let Some(archive) = &config.write.archive_dir {
            dirs.push(archive.as_path());
        }
        clean::clean_deployed(&dirs, &config.source.prefix, mode)
    };

    match target {
        CleanTarget::Build => {
            clean::clean_build(&config.build.builddir, mode)?;
        }
        CleanTarget::Target => {
            deployed()?;
        }
        CleanTarget::All => {
            clean::clean_build(&config.build.builddir, mode)?;
            deployed()?;
            println!("\nFull clean complete.");
        }
    }
    Ok(())
}
