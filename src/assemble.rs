//! Unified kernel image assembly.
//!
//! For each kernel: a working directory `{builddir}/{version}` holding
//! `cmdline.txt`, one composed initramfs per variant, and one unsigned image
//! per variant produced by the section embedder (objcopy) from the boot stub.
//!
//! The section layout is a contract with the systemd EFI stub:
//!
//! | section    | content                      | VMA         |
//! |------------|------------------------------|-------------|
//! | `.osrel`   | os-release                   | `0x20000`   |
//! | `.cmdline` | `cmdline.txt`                | `0x30000`   |
//! | `.linux`   | raw kernel                   | `0x40000`   |
//! | `.initrd`  | composed initramfs           | `0x3000000` |

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::kernel::{KernelDescriptor, VariantTag};
use crate::process::Cmd;

pub const OSREL_VMA: u64 = 0x20000;
pub const CMDLINE_VMA: u64 = 0x30000;
pub const LINUX_VMA: u64 = 0x40000;
pub const INITRD_VMA: u64 = 0x3000000;

pub const CMDLINE_FILE: &str = "cmdline.txt";

/// A named blob placed at a fixed virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub source: PathBuf,
    pub vma: u64,
}

impl Section {
    fn new(name: &'static str, source: &Path, vma: u64) -> Self {
        Self {
            name,
            source: source.to_path_buf(),
            vma,
        }
    }
}

/// Sections in embedding order. `.initrd` is left out when there is no initramfs.
pub fn sections(osrel: &Path, cmdline: &Path, kernel: &Path, initrd: Option<&Path>) -> Vec<Section> {
    let mut sections = vec![
        Section::new(".osrel", osrel, OSREL_VMA),
        Section::new(".cmdline", cmdline, CMDLINE_VMA),
        Section::new(".linux", kernel, LINUX_VMA),
    ];
    if let Some(initrd) = initrd {
        sections.push(Section::new(".initrd", initrd, INITRD_VMA));
    }
    sections
}

/// Section embedder invocation: `--add-section`/`--change-section-vma` pairs,
/// then the stub, then the output path.
pub fn embed_command(ctx: &BuildContext, sections: &[Section], output: &Path) -> Cmd {
    let mut cmd = ctx.cmd(&ctx.tools.objcopy);
    for section in sections {
        cmd = cmd
            .arg("--add-section")
            .arg(format!("{}={}", section.name, section.source.display()))
            .arg("--change-section-vma")
            .arg(format!("{}={:#x}", section.name, section.vma));
    }
    cmd.arg_path(&ctx.stub).arg_path(output)
}

/// Outputs for one variant of one kernel.
#[derive(Debug, Clone)]
pub struct VariantImage {
    pub tag: VariantTag,
    /// Composed initramfs; `None` for initramfs-less kernels.
    pub initramfs: Option<PathBuf>,
    pub unsigned: PathBuf,
}

impl VariantImage {
    /// `{unsigned}.signed.efi`
    pub fn signed_path(&self) -> PathBuf {
        crate::sign::signed_path(&self.unsigned)
    }
}

/// Everything built for one kernel, handed unchanged to signing and deployment.
#[derive(Debug, Clone)]
pub struct KernelBuild {
    pub kernel: KernelDescriptor,
    pub workdir: PathBuf,
    pub cmdline_file: PathBuf,
    pub images: Vec<VariantImage>,
}

/// Working directory for a kernel version.
pub fn workdir(builddir: &Path, version: &str) -> PathBuf {
    builddir.join(version)
}

/// Build unsigned images for every variant of `kernel`.
pub fn assemble(kernel: KernelDescriptor, ctx: &BuildContext) -> Result<KernelBuild> {
    let workdir = workdir(&ctx.builddir, kernel.version());
    let cmdline_file = workdir.join(CMDLINE_FILE);

    if ctx.is_dry_run() {
        info!(workdir = %workdir.display(), "[DRY RUN] would write {}", CMDLINE_FILE);
    } else {
        fs::create_dir_all(&workdir)
            .map_err(|e| Error::io(format!("failed to create {}", workdir.display()), e))?;
        fs::write(&cmdline_file, format!("{}\n", kernel.cmdline()))
            .map_err(|e| Error::io(format!("failed to write {}", cmdline_file.display()), e))?;
    }

    if !kernel.has_initramfs() && kernel.ucode().is_some() {
        warn!(
            version = kernel.version(),
            "no initramfs configured; microcode will not be embedded"
        );
    }

    let mut images = Vec::new();
    for tag in kernel.variants() {
        println!("  Building {}{}", kernel.file_name(), tag.as_str());

        let initramfs = match kernel.initramfs(tag) {
            Some(source) => {
                let out = workdir.join(format!("initramfs{}", tag.as_str()));
                compose_initramfs(ctx, source, kernel.ucode(), &out)?;
                Some(out)
            }
            None => None,
        };

        let unsigned = workdir.join(format!("{}{}", kernel.file_name(), tag.as_str()));
        let sections = sections(&ctx.osrel, &cmdline_file, kernel.path(), initramfs.as_deref());
        embed_command(ctx, &sections, &unsigned).run()?;

        images.push(VariantImage {
            tag: tag.clone(),
            initramfs,
            unsigned,
        });
    }

    Ok(KernelBuild {
        kernel,
        workdir,
        cmdline_file,
        images,
    })
}

/// Decompress `source` into `out`, then append the raw microcode.
///
/// Returns the composed length (0 for a dry run).
pub fn compose_initramfs(
    ctx: &BuildContext,
    source: &Path,
    ucode: Option<&Path>,
    out: &Path,
) -> Result<u64> {
    ctx.cmd(&ctx.tools.decompress)
        .arg_path(source)
        .stdout_to(out)
        .run()?;

    if ctx.is_dry_run() {
        return Ok(0);
    }

    if let Some(ucode) = ucode {
        let mut src = fs::File::open(ucode)
            .map_err(|e| Error::io(format!("failed to open {}", ucode.display()), e))?;
        let mut dst = OpenOptions::new()
            .append(true)
            .open(out)
            .map_err(|e| Error::io(format!("failed to open {}", out.display()), e))?;
        io::copy(&mut src, &mut dst)
            .map_err(|e| Error::io(format!("failed to append microcode to {}", out.display()), e))?;
    }

    let len = fs::metadata(out)
        .map_err(|e| Error::io(format!("failed to stat {}", out.display()), e))?
        .len();
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_order_and_offsets() {
        let s = sections(
            Path::new("/etc/os-release"),
            Path::new("/b/6.1/cmdline.txt"),
            Path::new("/boot/vmlinuz-6.1"),
            Some(Path::new("/b/6.1/initramfs")),
        );
        let names: Vec<_> = s.iter().map(|s| s.name).collect();
        assert_eq!(names, [".osrel", ".cmdline", ".linux", ".initrd"]);
        let vmas: Vec<_> = s.iter().map(|s| s.vma).collect();
        assert_eq!(vmas, [0x20000, 0x30000, 0x40000, 0x3000000]);
    }

    #[test]
    fn test_sections_without_initrd() {
        let s = sections(
            Path::new("/etc/os-release"),
            Path::new("cmdline.txt"),
            Path::new("vmlinuz-6.1"),
            None,
        );
        assert_eq!(s.len(), 3);
        assert!(s.iter().all(|s| s.name != ".initrd"));
    }

    #[test]
    fn test_workdir_keyed_by_version() {
        assert_eq!(
            workdir(Path::new("/var/lib/sbefi/build"), "6.1.0"),
            PathBuf::from("/var/lib/sbefi/build/6.1.0")
        );
    }
}
