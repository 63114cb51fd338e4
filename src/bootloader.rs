//! Boot loader integration: rEFInd placeholder and firmware boot entries.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::BootEntryConfig;
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::pipeline::KernelSuccess;
use crate::process::RunMode;

pub const REFIND_CONF: &str = "refind_linux.conf";

/// Static stanza; rEFInd scans the directory for images on its own.
pub const REFIND_PLACEHOLDER: &str = "\"Boot\"  \"\"";

/// Write `{targetdir}/refind_linux.conf` unless it already exists.
///
/// Returns the path when a file was (or would be) written.
pub fn write_refind_placeholder(targetdir: &Path, mode: RunMode) -> Result<Option<PathBuf>> {
    let path = targetdir.join(REFIND_CONF);
    if path.exists() {
        debug!(path = %path.display(), "rEFInd config present, leaving it alone");
        return Ok(None);
    }
    if mode.is_dry_run() {
        info!(path = %path.display(), "[DRY RUN] would write rEFInd placeholder");
        return Ok(Some(path));
    }
    fs::create_dir_all(targetdir)
        .map_err(|e| Error::io(format!("failed to create {}", targetdir.display()), e))?;
    fs::write(&path, REFIND_PLACEHOLDER)
        .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))?;
    println!("  Wrote {}", path.display());
    Ok(Some(path))
}

/// Labels of existing firmware boot entries, from `efibootmgr` output.
///
/// ```text
/// BootCurrent: 0001
/// Boot0001* Linux 6.1.0	HD(1,GPT,...)/File(\EFI\Linux\vmlinuz-6.1.0)
/// Boot0002  Windows Boot Manager
/// ```
pub fn parse_boot_labels(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("Boot")?;
            let (num, rest) = (rest.get(..4)?, rest.get(4..)?);
            if !num.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            let rest = rest.strip_prefix('*').unwrap_or(rest);
            let label = rest.split('\t').next()?.trim();
            (!label.is_empty()).then(|| label.to_string())
        })
        .collect()
}

/// A boot entry to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub label: String,
    pub loader: String,
}

/// Entries for every image deployed to the target directory.
pub fn planned_entries(entry: &BootEntryConfig, kernels: &[KernelSuccess]) -> Vec<BootEntry> {
    let dir = entry.loader_dir.trim_end_matches('\\');
    kernels
        .iter()
        .flat_map(|k| {
            k.deployments.iter().filter_map(move |d| {
                let name = d.target.as_ref()?.file_name()?.to_string_lossy().into_owned();
                Some(BootEntry {
                    label: format!("{} {}{}", entry.label_prefix, k.version, d.tag.as_str()),
                    loader: format!("{}\\{}", dir, name),
                })
            })
        })
        .collect()
}

/// Create firmware boot entries that do not exist yet.
pub fn register_boot_entries(
    entry: &BootEntryConfig,
    kernels: &[KernelSuccess],
    ctx: &BuildContext,
) -> Result<Vec<BootEntry>> {
    let listing = ctx.cmd(&ctx.tools.efibootmgr).run()?;
    let existing = parse_boot_labels(&listing.stdout);

    let mut created = Vec::new();
    for planned in planned_entries(entry, kernels) {
        if existing.contains(&planned.label) {
            debug!(label = %planned.label, "boot entry exists");
            continue;
        }
        ctx.cmd(&ctx.tools.efibootmgr)
            .arg("--create")
            .arg("--disk")
            .arg(&entry.disk)
            .arg("--part")
            .arg(entry.partition.to_string())
            .arg("--label")
            .arg(&planned.label)
            .arg("--loader")
            .arg(&planned.loader)
            .run()?;
        info!(label = %planned.label, loader = %planned.loader, "boot entry registered");
        created.push(planned);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::Deployment;
    use crate::kernel::VariantTag;

    #[test]
    fn test_parse_boot_labels() {
        let output = "BootCurrent: 0001\nTimeout: 1 seconds\nBootOrder: 0001,0002\n\
                      Boot0001* Linux 6.1.0\tHD(1,GPT)/File(\\EFI\\Linux\\vmlinuz-6.1.0)\n\
                      Boot0002  Windows Boot Manager\n";
        assert_eq!(
            parse_boot_labels(output),
            vec!["Linux 6.1.0", "Windows Boot Manager"]
        );
    }

    #[test]
    fn test_planned_entries_skip_undeployed() {
        let config = BootEntryConfig {
            disk: "/dev/nvme0n1".to_string(),
            partition: 1,
            label_prefix: "Linux".to_string(),
            loader_dir: "\\EFI\\Linux\\".to_string(),
        };
        let kernels = [KernelSuccess {
            kernel: PathBuf::from("/boot/vmlinuz-6.1.0"),
            version: "6.1.0".to_string(),
            deployments: vec![
                Deployment {
                    tag: VariantTag::primary(),
                    target: Some(PathBuf::from("/efi/EFI/Linux/vmlinuz-6.1.0")),
                    archive: None,
                },
                Deployment {
                    tag: VariantTag::fallback(),
                    target: None,
                    archive: Some(PathBuf::from("/archive/vmlinuz-6.1.0-fallback.signed")),
                },
            ],
            manifest: None,
        }];

        assert_eq!(
            planned_entries(&config, &kernels),
            vec![BootEntry {
                label: "Linux 6.1.0".to_string(),
                loader: "\\EFI\\Linux\\vmlinuz-6.1.0".to_string(),
            }]
        );
    }

    #[test]
    fn test_refind_placeholder_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_refind_placeholder(dir.path(), RunMode::Execute).unwrap();
        assert_eq!(written, Some(dir.path().join("refind_linux.conf")));
        assert_eq!(
            fs::read_to_string(dir.path().join(REFIND_CONF)).unwrap(),
            "\"Boot\"  \"\""
        );

        fs::write(dir.path().join(REFIND_CONF), "custom").unwrap();
        assert_eq!(write_refind_placeholder(dir.path(), RunMode::Execute).unwrap(), None);
        assert_eq!(
            fs::read_to_string(dir.path().join(REFIND_CONF)).unwrap(),
            "custom"
        );
    }
}
