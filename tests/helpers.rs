//! Shared test utilities for sbefi tests.
//!
//! External tools are replaced by shell scripts so tests run without
//! binutils or sbsigntools. Decompression uses the host `zcat`.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sbefi::config::Config;
use sbefi::context::BuildContext;
use sbefi::RunMode;
use tempfile::TempDir;

/// Test environment with a fake /boot, build root, target and tool scripts.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub boot: PathBuf,
    pub build: PathBuf,
    pub target: PathBuf,
    pub archive: PathBuf,
    pub tools: PathBuf,
    pub stub: PathBuf,
    pub osrel: PathBuf,
    pub key_prefix: PathBuf,
}

impl TestEnv {
    /// Create a new environment with fake objcopy and sbsign installed.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let env = Self {
            boot: base.join("boot"),
            build: base.join("build"),
            target: base.join("efi/EFI/Linux"),
            archive: base.join("archive"),
            tools: base.join("tools"),
            stub: base.join("linuxx64.efi.stub"),
            osrel: base.join("os-release"),
            key_prefix: base.join("keys/db"),
            _temp_dir: temp_dir,
        };

        fs::create_dir_all(&env.boot).expect("Failed to create boot dir");
        fs::create_dir_all(&env.tools).expect("Failed to create tools dir");
        fs::create_dir_all(env.key_prefix.parent().unwrap()).expect("Failed to create keys dir");
        fs::write(&env.stub, b"MZ-STUB").expect("Failed to write stub");
        fs::write(&env.osrel, "NAME=\"Test Linux\"\nID=test\n").expect("Failed to write os-release");
        fs::write(env.key_prefix.with_extension("key"), "KEY").expect("Failed to write key");
        fs::write(env.key_prefix.with_extension("crt"), "CRT").expect("Failed to write cert");

        env.install_fake_objcopy();
        env.install_fake_sbsign();
        env
    }

    /// Log of every fake objcopy invocation, one argument per line.
    pub fn objcopy_log(&self) -> PathBuf {
        self.tools.join("objcopy.log")
    }

    /// Copies the stub, then appends every `--add-section` file in order.
    fn install_fake_objcopy(&self) {
        let script = format!(
            r#"#!/bin/sh
set -e
printf '%s\n' "$@" >> "{log}"
n=$#
eval "out=\${{$n}}"
eval "stub=\${{$((n-1))}}"
cat "$stub" > "$out"
prev=""
for a in "$@"; do
  if [ "$prev" = "--add-section" ]; then cat "${{a#*=}}" >> "$out"; fi
  prev="$a"
done
"#,
            log = self.objcopy_log().display()
        );
        write_script(&self.tools.join("objcopy"), &script);
    }

    /// Writes `SIGNED:` followed by the input to `--output`.
    fn install_fake_sbsign(&self) {
        let script = r#"#!/bin/sh
set -e
out=""
while [ $# -gt 1 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --key|--cert) shift 2 ;;
    *) shift ;;
  esac
done
{ printf 'SIGNED:'; cat "$1"; } > "$out"
"#;
        write_script(&self.tools.join("sbsign"), script);
    }

    /// Replace sbsign with one that always fails.
    pub fn install_failing_sbsign(&self) {
        let script = "#!/bin/sh\necho 'reading key' \necho 'cannot load key' >&2\nexit 1\n";
        write_script(&self.tools.join("sbsign"), script);
    }

    /// Configuration pointing every path and tool into this environment.
    pub fn config(&self) -> Config {
        let json = serde_json::json!({
            "source": {
                "bootdir": self.boot,
                "prefix": "vmlinuz-",
                "initramfs": "initramfs-",
                "ucode": "intel-ucode.img",
                "cmdline": "root=/dev/sda2 rw quiet",
                "variants": ["", "-fallback"],
            },
            "build": {
                "builddir": self.build,
                "stub": self.stub,
                "osrel": self.osrel,
            },
            "sign": { "key_prefix": self.key_prefix },
            "write": {
                "targetdir": self.target,
                "copy_fallback": true,
            },
            "tools": {
                "decompress": "zcat",
                "objcopy": self.tools.join("objcopy"),
                "sbsign": self.tools.join("sbsign"),
                "timeout_secs": 30,
            },
        });
        let config = Config::parse(&json.to_string()).expect("Failed to parse test config");
        config.validate().expect("Test config invalid");
        config
    }

    pub fn context(&self, config: &Config) -> BuildContext {
        BuildContext::from_config(config, RunMode::Execute)
    }

    /// Create `vmlinuz-{version}` in the boot dir.
    pub fn add_kernel(&self, version: &str) -> PathBuf {
        let path = self.boot.join(format!("vmlinuz-{}", version));
        fs::write(&path, format!("KERNEL-{}", version)).expect("Failed to write kernel");
        path
    }

    /// Create a gzip-compressed `initramfs-{version}{tag}.img`.
    pub fn add_initramfs(&self, version: &str, tag: &str, content: &[u8]) -> PathBuf {
        let path = self.boot.join(format!("initramfs-{}{}.img", version, tag));
        write_gzip(&path, content);
        path
    }

    pub fn add_ucode(&self, content: &[u8]) -> PathBuf {
        let path = self.boot.join("intel-ucode.img");
        fs::write(&path, content).expect("Failed to write microcode");
        path
    }

    /// Kernel with both initramfs variants and microcode present.
    pub fn add_complete_kernel(&self, version: &str) -> PathBuf {
        self.add_initramfs(version, "", b"primary-initramfs");
        self.add_initramfs(version, "-fallback", b"fallback-initramfs-bigger");
        self.add_ucode(b"UCODE");
        self.add_kernel(version)
    }
}

/// Write an executable script.
pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

pub fn write_gzip(path: &Path, content: &[u8]) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).expect("Failed to compress");
    fs::write(path, encoder.finish().expect("Failed to finish gzip")).expect("Failed to write gzip");
}

/// Count regular files below `dir` (0 if it does not exist).
pub fn count_files(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file to exist: {}", path.display());
}
