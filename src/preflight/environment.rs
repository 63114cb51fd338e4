//! Input file and directory checks.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::kernel;

use super::types::CheckResult;

/// Check the files every build reads and the directories it writes.
pub fn check_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![
        CheckResult::file(
            "boot stub",
            &config.build.stub,
            "Install systemd-boot (systemd-ukify or systemd-boot-efi package).",
        ),
        CheckResult::file("os-release", &config.build.osrel, "Set build.osrel."),
    ];

    let keys = config.key_pair();
    results.push(CheckResult::file(
        "signing key",
        &keys.key,
        "Generate a key pair or set sign.key_prefix.",
    ));
    results.push(CheckResult::file(
        "signing certificate",
        &keys.cert,
        "Generate a key pair or set sign.key_prefix.",
    ));

    results.push(check_kernels(config));
    results.push(check_writable("build dir", &config.build.builddir));

    results
}

fn check_kernels(config: &Config) -> CheckResult {
    let bootdir = &config.source.bootdir;
    if !bootdir.is_dir() {
        return CheckResult::fail("kernels", format!("{} is not a directory", bootdir.display()));
    }
    match kernel::discover_kernels(bootdir, &config.source.prefix) {
        Ok(found) if found.is_empty() => CheckResult::warn(
            "kernels",
            format!(
                "No '{}*' files in {}",
                config.source.prefix,
                bootdir.display()
            ),
        ),
        Ok(found) => CheckResult::pass_with("kernels", format!("{} found", found.len())),
        Err(e) => CheckResult::fail("kernels", e.to_string()),
    }
}

/// Nearest existing ancestor must be writable; nothing is created.
fn check_writable(name: &str, dir: &Path) -> CheckResult {
    let Some(existing) = dir.ancestors().find(|p| p.exists()) else {
        return CheckResult::fail(name, format!("{} has no existing ancestor", dir.display()));
    };
    match fs::metadata(existing) {
        Ok(meta) if meta.permissions().readonly() => CheckResult::fail(
            name,
            format!("{} is read-only", existing.display()),
        ),
        Ok(_) => CheckResult::pass_with(name, dir.display().to_string()),
        Err(e) => CheckResult::fail(name, format!("Cannot stat {}: {}", existing.display(), e)),
    }
}
