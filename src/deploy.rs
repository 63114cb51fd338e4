//! Copying signed images to where the boot loader looks for them.
//!
//! The target directory gets the boot-ready file under the unsigned image's
//! name. The optional archive directory gets every variant, regardless of the
//! fallback policy, as `{unsigned name}.signed`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kernel::VariantTag;
use crate::process::RunMode;
use crate::sign::SignedImage;

/// Where signed images go and which of them.
#[derive(Debug, Clone)]
pub struct DeploymentPolicy {
    pub targetdir: PathBuf,
    /// Copy fallback variants into `targetdir`.
    pub copy_fallback: bool,
    pub archive_dir: Option<PathBuf>,
}

impl DeploymentPolicy {
    pub fn deploys_to_target(&self, tag: &VariantTag) -> bool {
        self.copy_fallback || !tag.is_fallback()
    }
}

/// Where one variant ended up.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub tag: VariantTag,
    pub target: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// Deploy every signed image of one kernel.
pub fn deploy(
    images: &[SignedImage],
    policy: &DeploymentPolicy,
    mode: RunMode,
) -> Result<Vec<Deployment>> {
    let mut deployed = Vec::with_capacity(images.len());

    for image in images {
        let name = image
            .unsigned
            .file_name()
            .ok_or_else(|| Error::Deployment {
                from: image.signed.clone(),
                to: policy.targetdir.clone(),
                source: std::io::Error::other("unsigned image has no file name"),
            })?;

        ensure_dir(&policy.targetdir, &image.signed, mode)?;

        let archive = match &policy.archive_dir {
            Some(dir) => {
                ensure_dir(dir, &image.signed, mode)?;
                let mut archived = OsString::from(name);
                archived.push(".signed");
                let dest = dir.join(archived);
                copy(&image.signed, &dest, mode)?;
                Some(dest)
            }
            None => None,
        };

        let target = if policy.deploys_to_target(&image.tag) {
            let dest = policy.targetdir.join(name);
            copy(&image.signed, &dest, mode)?;
            Some(dest)
        } else {
            debug!(variant = %image.tag, "fallback deployment disabled");
            None
        };

        deployed.push(Deployment {
            tag: image.tag.clone(),
            target,
            archive,
        });
    }

    Ok(deployed)
}

fn ensure_dir(dir: &Path, from: &Path, mode: RunMode) -> Result<()> {
    if mode.is_dry_run() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| Error::Deployment {
        from: from.to_path_buf(),
        to: dir.to_path_buf(),
        source,
    })
}

fn copy(from: &Path, to: &Path, mode: RunMode) -> Result<()> {
    if mode.is_dry_run() {
        info!(from = %from.display(), to = %to.display(), "[DRY RUN] would copy");
        return Ok(());
    }
    fs::copy(from, to).map_err(|source| Error::Deployment {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    println!("  Deployed {}", to.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(dir: &Path, unsigned: &str, tag: VariantTag) -> SignedImage {
        let unsigned = dir.join(unsigned);
        let signed = crate::sign::signed_path(&unsigned);
        fs::write(&signed, unsigned.file_name().unwrap().as_encoded_bytes()).unwrap();
        SignedImage {
            tag,
            unsigned,
            signed,
        }
    }

    #[test]
    fn test_fallback_policy_with_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir(&work).unwrap();
        let images = [
            signed(&work, "vmlinuz-6.1.0", VariantTag::primary()),
            signed(&work, "vmlinuz-6.1.0-fallback", VariantTag::fallback()),
        ];
        let policy = DeploymentPolicy {
            targetdir: tmp.path().join("EFI/Linux"),
            copy_fallback: false,
            archive_dir: Some(tmp.path().join("archive")),
        };

        let deployed = deploy(&images, &policy, RunMode::Execute).unwrap();

        assert_eq!(deployed.len(), 2);
        assert_eq!(
            fs::read(policy.targetdir.join("vmlinuz-6.1.0")).unwrap(),
            b"vmlinuz-6.1.0"
        );
        assert!(!policy.targetdir.join("vmlinuz-6.1.0-fallback").exists());
        assert!(deployed[1].target.is_none());

        let archive = tmp.path().join("archive");
        assert!(archive.join("vmlinuz-6.1.0.signed").is_file());
        assert!(archive.join("vmlinuz-6.1.0-fallback.signed").is_file());
    }

    #[test]
    fn test_missing_signed_image_is_deployment_error() {
        let tmp = tempfile::tempdir().unwrap();
        let image = SignedImage {
            tag: VariantTag::primary(),
            unsigned: tmp.path().join("vmlinuz-6.1.0"),
            signed: tmp.path().join("vmlinuz-6.1.0.signed.efi"),
        };
        let policy = DeploymentPolicy {
            targetdir: tmp.path().join("target"),
            copy_fallback: true,
            archive_dir: None,
        };

        let err = deploy(&[image], &policy, RunMode::Execute).unwrap_err();
        assert!(matches!(err, Error::Deployment { .. }));
    }

    #[test]
    fn test_dry_run_copies_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let images = [signed(tmp.path(), "vmlinuz-6.1.0", VariantTag::primary())];
        let policy = DeploymentPolicy {
            targetdir: tmp.path().join("target"),
            copy_fallback: true,
            archive_dir: None,
        };

        let deployed = deploy(&images, &policy, RunMode::DryRun).unwrap();
        assert_eq!(deployed[0].target, Some(policy.targetdir.join("vmlinuz-6.1.0")));
        assert!(!policy.targetdir.exists());
    }
}
