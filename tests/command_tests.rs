//! Tests for the command layer: config loading, build, clean.

mod helpers;

use std::fs;

use helpers::{assert_file_exists, TestEnv};
use sbefi::bootloader::REFIND_CONF;
use sbefi::commands::build::BuildOptions;
use sbefi::commands::clean::CleanTarget;
use sbefi::config::Config;
use sbefi::RunMode;
use serial_test::serial;

#[test]
#[serial]
fn test_config_load_from_file() {
    let env = TestEnv::new();
    let path = env.tools.join("sbefi.json");
    fs::write(
        &path,
        r#"{
            "source": { "cmdline": "root=/dev/sda2 rw", "ucode": "amd-ucode.img" },
            "write": { "targetdir": "/efi/EFI/Linux", "archive_dir": "/var/lib/sbefi/signed" }
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.source.ucode.as_deref(), Some("amd-ucode.img"));
    assert_eq!(
        config.deployment_policy().archive_dir,
        Some("/var/lib/sbefi/signed".into())
    );
}

#[test]
#[serial]
fn test_config_load_rejects_invalid() {
    let env = TestEnv::new();
    let path = env.tools.join("sbefi.json");
    fs::write(
        &path,
        r#"{ "source": { "cmdline": "" }, "write": { "targetdir": "/t" } }"#,
    )
    .unwrap();

    assert!(Config::load(&path).is_err());
    assert!(Config::load(&env.tools.join("missing.json")).is_err());
}

#[test]
#[serial]
fn test_config_load_rejects_targetdir_equal_to_bootdir() {
    let env = TestEnv::new();
    let kernel = env.add_kernel("6.1.0");
    let mut config = env.config();
    config.write.targetdir = env.boot.clone();

    let path = env.tools.join("sbefi.json");
    fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("targetdir"));
    assert_eq!(fs::read_to_string(&kernel).unwrap(), "KERNEL-6.1.0");
}

#[test]
#[serial]
fn test_cmd_build_writes_refind_placeholder() {
    let env = TestEnv::new();
    env.add_complete_kernel("6.1.0");
    let config = env.config();

    let report = sbefi::commands::cmd_build(
        &config,
        BuildOptions {
            mode: RunMode::Execute,
            refind: true,
            register: false,
        },
    )
    .unwrap();

    assert!(report.all_passed());
    assert_file_exists(&env.target.join("vmlinuz-6.1.0"));
    assert_eq!(
        fs::read_to_string(env.target.join(REFIND_CONF)).unwrap(),
        "\"Boot\"  \"\""
    );
}

#[test]
#[serial]
fn test_cmd_build_fails_when_a_kernel_fails() {
    let env = TestEnv::new();
    env.install_failing_sbsign();
    env.add_complete_kernel("6.1.0");
    let config = env.config();

    let err = sbefi::commands::cmd_build(&config, BuildOptions::default()).unwrap_err();
    assert!(err.to_string().contains("1 of 1 kernel(s) failed"));
}

#[test]
#[serial]
fn test_cmd_build_register_requires_bootentry() {
    let env = TestEnv::new();
    let config = env.config();
    let opts = BuildOptions {
        register: true,
        ..BuildOptions::default()
    };

    assert!(sbefi::commands::cmd_build(&config, opts).is_err());
}

#[test]
#[serial]
fn test_cmd_clean_all() {
    let env = TestEnv::new();
    env.add_complete_kernel("6.1.0");
    let config = env.config();
    sbefi::commands::cmd_build(&config, BuildOptions::default()).unwrap();
    assert!(env.build.exists());

    sbefi::commands::cmd_clean(&config, CleanTarget::All, RunMode::Execute).unwrap();

    assert!(!env.build.exists());
    assert!(!env.target.join("vmlinuz-6.1.0").exists());
    assert!(!env.target.join("vmlinuz-6.1.0-fallback").exists());
}
