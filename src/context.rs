//! Run-wide settings shared by every pipeline stage.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ToolsConfig};
use crate::process::{Cmd, RunMode};
use crate::sign::KeyPair;

/// Immutable settings for one run, built once from the config.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Root of the per-version working directories.
    pub builddir: PathBuf,
    /// Boot stub template, copied (never modified) by the section embedder.
    pub stub: PathBuf,
    /// Release file embedded as `.osrel`.
    pub osrel: PathBuf,
    pub keys: KeyPair,
    pub tools: ToolsConfig,
    pub mode: RunMode,
}

impl BuildContext {
    pub fn from_config(config: &Config, mode: RunMode) -> Self {
        Self {
            builddir: config.build.builddir.clone(),
            stub: config.build.stub.clone(),
            osrel: config.build.osrel.clone(),
            keys: config.key_pair(),
            tools: config.tools.clone(),
            mode,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.tools.timeout()
    }

    /// A command for `program` bound to this run's mode and timeout.
    pub fn cmd(&self, program: &str) -> Cmd {
        Cmd::new(program).mode(self.mode).timeout(self.timeout())
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }
}
