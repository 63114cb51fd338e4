//! Host tool availability checks.

use crate::config::Config;
use crate::process;

use super::types::CheckResult;

/// Check the external tools named in the config are installed.
pub fn check_host_tools(config: &Config) -> Vec<CheckResult> {
    let tools = &config.tools;
    let mut results = vec![
        check_tool_exists(&tools.decompress, "gzip", "Required to decompress initramfs", true),
        check_tool_exists(&tools.objcopy, "binutils", "Required to embed PE sections", true),
        check_tool_exists(&tools.sbsign, "sbsigntools", "Required to sign images", true),
    ];

    // Only `--register` needs efibootmgr.
    results.push(check_tool_exists(
        &tools.efibootmgr,
        "efibootmgr",
        "Required for `sbefi build --register`",
        config.bootentry.is_some(),
    ));

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, path.display().to_string()),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, msg)
            } else {
                CheckResult::warn(tool, msg)
            }
        }
    }
}
