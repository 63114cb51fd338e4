//! Build and deployment cleaning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::process::RunMode;

/// Number of regular files below `dir`.
fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Remove the whole build root (every version's working directory).
pub fn clean_build(builddir: &Path, mode: RunMode) -> Result<usize> {
    if !builddir.exists() {
        println!("No build artifacts to clean.");
        return Ok(0);
    }

    let files = count_files(builddir);
    if mode.is_dry_run() {
        println!("[DRY RUN] Would remove {} ({} files)", builddir.display(), files);
        return Ok(files);
    }

    println!("Removing {} ({} files)...", builddir.display(), files);
    fs::remove_dir_all(builddir)
        .with_context(|| format!("Failed to remove {}", builddir.display()))?;
    println!("Build artifacts cleaned.");
    Ok(files)
}

/// Deployed images in `dir`: regular files named `{prefix}*`, not recursing.
pub fn deployed_images(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Remove deployed images from the target (and archive) directories.
///
/// The rEFInd placeholder and anything not named `{prefix}*` is left alone.
pub fn clean_deployed(dirs: &[&Path], prefix: &str, mode: RunMode) -> Result<usize> {
    let mut removed = 0;

    for dir in dirs {
        for image in deployed_images(dir, prefix) {
            if mode.is_dry_run() {
                println!("[DRY RUN] Would remove {}", image.display());
            } else {
                println!("Removing {}...", image.display());
                fs::remove_file(&image)
                    .with_context(|| format!("Failed to remove {}", image.display()))?;
            }
            removed += 1;
        }
    }

    if removed == 0 {
        println!("No deployed images to clean.");
    } else if !mode.is_dry_run() {
        println!("{} deployed image(s) cleaned.", removed);
    }
    Ok(removed)
}
