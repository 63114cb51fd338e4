//! Per-kernel build manifest.
//!
//! `{workdir}/manifest.json` records what went into a build and SHA256
//! digests of what came out. It is an audit trail only; nothing reads it back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::assemble::KernelBuild;
use crate::error::{Error, Result};
use crate::sign::SignedImage;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: String,
    pub kernel: PathBuf,
    pub cmdline: String,
    pub ucode: Option<PathBuf>,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub variant: String,
    pub initramfs: Option<PathBuf>,
    pub unsigned: PathBuf,
    pub unsigned_sha256: String,
    pub signed: PathBuf,
    pub signed_sha256: String,
}

/// SHA256 of a file's contents, hex encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let content =
        fs::read(path).map_err(|e| Error::io(format!("failed to hash {}", path.display()), e))?;
    Ok(format!("{:x}", Sha256::digest(&content)))
}

impl BuildManifest {
    pub fn collect(build: &KernelBuild, signed: &[SignedImage]) -> Result<Self> {
        let images = build
            .images
            .iter()
            .zip(signed)
            .map(|(image, signed)| {
                Ok(ImageRecord {
                    variant: image.tag.as_str().to_string(),
                    initramfs: image.initramfs.clone(),
                    unsigned: image.unsigned.clone(),
                    unsigned_sha256: hash_file(&image.unsigned)?,
                    signed: signed.signed.clone(),
                    signed_sha256: hash_file(&signed.signed)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: build.kernel.version().to_string(),
            kernel: build.kernel.path().to_path_buf(),
            cmdline: build.kernel.cmdline().to_string(),
            ucode: build.kernel.ucode().map(Path::to_path_buf),
            images,
        })
    }

    /// Write to `{workdir}/manifest.json`, replacing any previous run's.
    pub fn write(&self, workdir: &Path) -> Result<PathBuf> {
        let path = workdir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::io("failed to serialize manifest", e.into()))?;
        fs::write(&path, json + "\n")
            .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))?;
        Ok(path)
    }
}
