//! Error taxonomy for the per-kernel pipeline.
//!
//! Every variant is fatal for the kernel it belongs to. Nothing is retried.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    /// File name does not follow the `{prefix}{version}` convention.
    #[error("'{name}' does not match kernel prefix '{prefix}'")]
    InvalidName { name: String, prefix: String },

    /// A required initramfs or microcode file is absent.
    #[error("missing companion file: {}", path.display())]
    MissingCompanionFile { path: PathBuf },

    /// External tool exited non-zero.
    #[error("command failed (exit code {code}): {command}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Subprocess {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// External tool did not exit within the configured bound.
    #[error("command timed out after {}s: {command}", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Copy into the target or archive directory failed.
    #[error("failed to deploy {} to {}: {source}", from.display(), to.display())]
    Deployment {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Working directory I/O.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Pipeline result.
pub type Result<T> = std::result::Result<T, Error>;
