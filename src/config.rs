//! Configuration management for sbefi.
//!
//! Reads a JSON configuration file into typed sections. A handful of
//! directories can be overridden from the environment (or a `.env` file,
//! loaded by `main`); environment variables take precedence over the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::deploy::DeploymentPolicy;
use crate::kernel::{NamingScheme, VariantTag};
use crate::sign::KeyPair;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sbefi.json";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "SBEFI_CONFIG";

/// sbefi configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub sign: SignConfig,
    pub write: WriteConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// efibootmgr registration; `--register` requires it.
    #[serde(default)]
    pub bootentry: Option<BootEntryConfig>,
}

/// Where kernels are found and how their companions are named.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_bootdir")]
    pub bootdir: PathBuf,
    /// Kernel file-name prefix, e.g. `vmlinuz-`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Initramfs file-name prefix, e.g. `initramfs-`. Unset means no initramfs.
    #[serde(default)]
    pub initramfs: Option<String>,
    /// Microcode image file name, e.g. `intel-ucode.img`. Unset means no microcode.
    #[serde(default)]
    pub ucode: Option<String>,
    pub cmdline: String,
    /// Initramfs variant tags every kernel must have.
    #[serde(default = "default_variants")]
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_builddir")]
    pub builddir: PathBuf,
    /// Boot stub template sections are added to.
    #[serde(default = "default_stub")]
    pub stub: PathBuf,
    /// Release file embedded as `.osrel`.
    #[serde(default = "default_osrel")]
    pub osrel: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            builddir: default_builddir(),
            stub: default_stub(),
            osrel: default_osrel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignConfig {
    /// `{key_prefix}.key` and `{key_prefix}.crt` form the key pair.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: PathBuf,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteConfig {
    pub targetdir: PathBuf,
    #[serde(default = "default_true")]
    pub copy_fallback: bool,
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default = "default_decompress")]
    pub decompress: String,
    #[serde(default = "default_objcopy")]
    pub objcopy: String,
    #[serde(default = "default_sbsign")]
    pub sbsign: String,
    #[serde(default = "default_efibootmgr")]
    pub efibootmgr: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            decompress: default_decompress(),
            objcopy: default_objcopy(),
            sbsign: default_sbsign(),
            efibootmgr: default_efibootmgr(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootEntryConfig {
    /// Disk holding the EFI system partition, e.g. `/dev/nvme0n1`.
    pub disk: String,
    pub partition: u32,
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    /// Loader directory as firmware sees it, e.g. `\EFI\Linux`.
    pub loader_dir: String,
}

fn default_bootdir() -> PathBuf {
    PathBuf::from("/boot")
}
fn default_prefix() -> String {
    "vmlinuz-".to_string()
}
fn default_variants() -> Vec<String> {
    vec![String::new(), "-fallback".to_string()]
}
fn default_builddir() -> PathBuf {
    PathBuf::from("/var/lib/sbefi/build")
}
fn default_stub() -> PathBuf {
    PathBuf::from("/usr/lib/systemd/boot/efi/linuxx64.efi.stub")
}
fn default_osrel() -> PathBuf {
    PathBuf::from("/etc/os-release")
}
fn default_key_prefix() -> PathBuf {
    PathBuf::from("/etc/refind.d/keys/refind_local")
}
fn default_true() -> bool {
    true
}
fn default_decompress() -> String {
    "zcat".to_string()
}
fn default_objcopy() -> String {
    "objcopy".to_string()
}
fn default_sbsign() -> String {
    "sbsign".to_string()
}
fn default_efibootmgr() -> String {
    "efibootmgr".to_string()
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_label_prefix() -> String {
    "Linux".to_string()
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without validating it.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve the configuration path: flag, then `SBEFI_CONFIG`, then the default.
    pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Override directories from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("SBEFI_BOOTDIR") {
            self.source.bootdir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SBEFI_BUILDDIR") {
            self.build.builddir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SBEFI_TARGETDIR") {
            self.write.targetdir = PathBuf::from(dir);
        }
    }

    /// Check invariants once so the pipeline never has to.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.source.prefix.is_empty(), "source.prefix must not be empty");
        ensure!(
            !self.source.cmdline.trim().is_empty(),
            "source.cmdline must not be empty"
        );
        ensure!(self.tools.timeout_secs > 0, "tools.timeout_secs must be positive");

        for (field, name) in [
            ("source.initramfs", &self.source.initramfs),
            ("source.ucode", &self.source.ucode),
        ] {
            if let Some(name) = name {
                if name.is_empty() || name.contains('/') {
                    bail!("{} must be a bare file name, got '{}'", field, name);
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for tag in &self.source.variants {
            if !seen.insert(tag.as_str()) {
                bail!("duplicate variant tag '{}'", tag);
            }
            if tag.contains('/') {
                bail!("variant tag '{}' must not contain '/'", tag);
            }
        }
        ensure!(
            seen.contains(""),
            "source.variants must include the primary variant \"\""
        );

        // Deployed images share the kernel prefix; copying them into the
        // boot dir would overwrite the raw kernels.
        ensure!(
            !same_dir(&self.write.targetdir, &self.source.bootdir),
            "write.targetdir must not be source.bootdir ({})",
            self.source.bootdir.display()
        );
        if let Some(archive) = &self.write.archive_dir {
            ensure!(
                !same_dir(archive, &self.source.bootdir),
                "write.archive_dir must not be source.bootdir ({})",
                self.source.bootdir.display()
            );
        }

        if let Some(entry) = &self.bootentry {
            ensure!(!entry.disk.is_empty(), "bootentry.disk must not be empty");
            ensure!(
                !entry.loader_dir.is_empty(),
                "bootentry.loader_dir must not be empty"
            );
        }

        Ok(())
    }

    /// Naming rules for the resolver.
    pub fn naming_scheme(&self) -> NamingScheme {
        NamingScheme {
            prefix: self.source.prefix.clone(),
            initramfs_prefix: self.source.initramfs.clone(),
            ucode: self.source.ucode.clone(),
            cmdline: self.source.cmdline.clone(),
            variants: self
                .source
                .variants
                .iter()
                .map(|t| VariantTag::new(t.clone()))
                .collect(),
        }
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair::from_prefix(&self.sign.key_prefix)
    }

    pub fn deployment_policy(&self) -> DeploymentPolicy {
        DeploymentPolicy {
            targetdir: self.write.targetdir.clone(),
            copy_fallback: self.write.copy_fallback,
            archive_dir: self.write.archive_dir.clone(),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "(none)".to_string());
        println!("Configuration:");
        println!("  bootdir:       {}", self.source.bootdir.display());
        println!("  prefix:        {}", self.source.prefix);
        println!("  initramfs:     {}", opt(&self.source.initramfs));
        println!("  ucode:         {}", opt(&self.source.ucode));
        println!("  cmdline:       {}", self.source.cmdline);
        println!("  variants:      {:?}", self.source.variants);
        println!("  builddir:      {}", self.build.builddir.display());
        println!("  stub:          {}", self.build.stub.display());
        println!("  osrel:         {}", self.build.osrel.display());
        println!("  key prefix:    {}", self.sign.key_prefix.display());
        println!("  targetdir:     {}", self.write.targetdir.display());
        println!("  copy fallback: {}", self.write.copy_fallback);
        match &self.write.archive_dir {
            Some(dir) => println!("  archive dir:   {}", dir.display()),
            None => println!("  archive dir:   (none)"),
        }
        println!(
            "  tools:         {} / {} / {} (timeout {}s)",
            self.tools.decompress, self.tools.objcopy, self.tools.sbsign, self.tools.timeout_secs
        );
        match &self.bootentry {
            Some(entry) => println!(
                "  boot entries:  {} part {} -> {}",
                entry.disk, entry.partition, entry.loader_dir
            ),
            None => println!("  boot entries:  (not configured)"),
        }
    }
}

/// Same directory after canonicalization, or lexically if either is missing.
fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.components().eq(b.components()),
    }
}
