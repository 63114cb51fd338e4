//! Kernel discovery and descriptor resolution.
//!
//! A kernel named `{prefix}{version}` is joined to its companions by version:
//! `{initramfs_prefix}{version}{tag}.img` for every required variant tag, plus
//! an optional shared microcode image in the same directory.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Suffix distinguishing initramfs/image flavors. Empty is the primary image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantTag(String);

impl VariantTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn primary() -> Self {
        Self(String::new())
    }

    pub fn fallback() -> Self {
        Self("-fallback".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_primary(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.0.ends_with("fallback")
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primary() {
            f.write_str("(primary)")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// How kernels and their companion files are named.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    pub prefix: String,
    pub initramfs_prefix: Option<String>,
    pub ucode: Option<String>,
    pub cmdline: String,
    pub variants: Vec<VariantTag>,
}

/// One discovered kernel with every companion verified on disk.
#[derive(Debug, Clone)]
pub struct KernelDescriptor {
    path: PathBuf,
    file_name: String,
    version: String,
    cmdline: String,
    variants: Vec<VariantTag>,
    initramfs: Option<Vec<(VariantTag, PathBuf)>>,
    ucode: Option<PathBuf>,
}

impl KernelDescriptor {
    /// Resolve a kernel path into a descriptor.
    ///
    /// Fails without side effects if the name does not carry the prefix or
    /// any required companion file is absent.
    pub fn resolve(path: &Path, scheme: &NamingScheme) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidName {
                name: path.display().to_string(),
                prefix: scheme.prefix.clone(),
            })?
            .to_string();
        let version = extract_version(&file_name, &scheme.prefix)?.to_string();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let initramfs = match &scheme.initramfs_prefix {
            Some(initramfs_prefix) => {
                let mut found = Vec::with_capacity(scheme.variants.len());
                for tag in &scheme.variants {
                    let candidate =
                        dir.join(format!("{}{}{}.img", initramfs_prefix, version, tag.as_str()));
                    require(&candidate)?;
                    found.push((tag.clone(), candidate));
                }
                Some(found)
            }
            None => None,
        };

        let ucode = match &scheme.ucode {
            Some(name) => {
                let candidate = dir.join(name);
                require(&candidate)?;
                Some(candidate)
            }
            None => None,
        };

        debug!(%version, path = %path.display(), "resolved kernel");

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            version,
            cmdline: scheme.cmdline.clone(),
            variants: scheme.variants.clone(),
            initramfs,
            ucode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    pub fn ucode(&self) -> Option<&Path> {
        self.ucode.as_deref()
    }

    pub fn has_initramfs(&self) -> bool {
        self.initramfs.is_some()
    }

    /// Resolved initramfs for a variant, if initramfs is configured.
    pub fn initramfs(&self, tag: &VariantTag) -> Option<&Path> {
        self.initramfs
            .as_ref()?
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, p)| p.as_path())
    }

    /// Variant tags to build images for, in configured order.
    ///
    /// Every configured tag gets an image, with or without initramfs.
    pub fn variants(&self) -> &[VariantTag] {
        &self.variants
    }
}

/// Strip `prefix` from a kernel file name, leaving a non-empty version.
pub fn extract_version<'a>(file_name: &'a str, prefix: &str) -> Result<&'a str> {
    match file_name.strip_prefix(prefix) {
        Some(version) if !version.is_empty() => Ok(version),
        _ => Err(Error::InvalidName {
            name: file_name.to_string(),
            prefix: prefix.to_string(),
        }),
    }
}

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::MissingCompanionFile {
            path: path.to_path_buf(),
        })
    }
}

fn is_signed_output(name: &str) -> bool {
    name.ends_with(".signed") || name.ends_with(crate::sign::SIGNED_SUFFIX)
}

/// Find kernel images directly under `bootdir`, sorted by name.
///
/// Skips anything that is not a regular file named `{prefix}{version}`, and
/// our own signed outputs (`.signed`, `.signed.efi`).
pub fn discover_kernels(bootdir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut kernels = Vec::new();

    for entry in WalkDir::new(bootdir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to scan {}", bootdir.display());
            match e.into_io_error() {
                Some(io) => Error::io(context, io),
                None => Error::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if extract_version(name, prefix).is_err() {
            continue;
        }
        if is_signed_output(name) {
            debug!(name, "skipping signed image");
            continue;
        }
        kernels.push(entry.into_path());
    }

    kernels.sort();
    Ok(kernels)
}
