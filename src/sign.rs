//! Secure Boot signing via sbsign.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::assemble::KernelBuild;
use crate::context::BuildContext;
use crate::error::Result;
use crate::kernel::VariantTag;
use crate::process::Cmd;

/// Suffix appended to the full unsigned file name.
pub const SIGNED_SUFFIX: &str = ".signed.efi";

/// Private key and certificate used for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl KeyPair {
    /// `{prefix}.key` and `{prefix}.crt`.
    pub fn from_prefix(prefix: &Path) -> Self {
        Self {
            key: append(prefix, ".key"),
            cert: append(prefix, ".crt"),
        }
    }
}

fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// `{unsigned}.signed.efi`, next to the unsigned image.
pub fn signed_path(unsigned: &Path) -> PathBuf {
    append(unsigned, SIGNED_SUFFIX)
}

/// A signed image and the unsigned image it came from.
#[derive(Debug, Clone)]
pub struct SignedImage {
    pub tag: VariantTag,
    pub unsigned: PathBuf,
    pub signed: PathBuf,
}

/// sbsign invocation for one image.
pub fn sign_command(ctx: &BuildContext, unsigned: &Path, output: &Path) -> Cmd {
    ctx.cmd(&ctx.tools.sbsign)
        .arg("--key")
        .arg_path(&ctx.keys.key)
        .arg("--cert")
        .arg_path(&ctx.keys.cert)
        .arg("--output")
        .arg_path(output)
        .arg_path(unsigned)
}

/// Sign one unsigned image.
pub fn sign_image(ctx: &BuildContext, unsigned: &Path) -> Result<PathBuf> {
    let output = signed_path(unsigned);
    sign_command(ctx, unsigned, &output).run()?;
    if !ctx.is_dry_run() {
        info!(path = %output.display(), "signed");
        println!("  Signed {}", output.display());
    }
    Ok(output)
}

/// Sign every variant of a kernel build, stopping at the first failure.
pub fn sign_build(build: &KernelBuild, ctx: &BuildContext) -> Result<Vec<SignedImage>> {
    build
        .images
        .iter()
        .map(|image| {
            let signed = sign_image(ctx, &image.unsigned)?;
            Ok(SignedImage {
                tag: image.tag.clone(),
                unsigned: image.unsigned.clone(),
                signed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_from_prefix() {
        let keys = KeyPair::from_prefix(Path::new("/etc/refind.d/keys/refind_local"));
        assert_eq!(keys.key, PathBuf::from("/etc/refind.d/keys/refind_local.key"));
        assert_eq!(keys.cert, PathBuf::from("/etc/refind.d/keys/refind_local.crt"));
    }

    #[test]
    fn test_signed_path_appends_suffix() {
        assert_eq!(
            signed_path(Path::new("/b/6.1.0/vmlinuz-6.1.0-fallback")),
            PathBuf::from("/b/6.1.0/vmlinuz-6.1.0-fallback.signed.efi")
        );
        // Dots in the version are kept, nothing is treated as an extension.
        assert_eq!(
            signed_path(Path::new("vmlinuz-6.1.0")),
            PathBuf::from("vmlinuz-6.1.0.signed.efi")
        );
    }
}
