//! Centralized command execution with consistent error handling.
//!
//! Every external tool (decompressor, section embedder, signer, efibootmgr)
//! goes through [`Cmd`], which captures both output streams, enforces a
//! bounded wait, and honours the run's [`RunMode`].

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Whether side effects are performed or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run external tools and write files.
    #[default]
    Execute,
    /// Log what would be done; touch nothing.
    DryRun,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        self == RunMode::DryRun
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status, `None` for a dry run.
    pub status: Option<ExitStatus>,
    /// Captured stdout (empty when redirected to a file).
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandResult {
    fn dry() -> Self {
        Self {
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Returns true if the command exited successfully (or was not run).
    pub fn success(&self) -> bool {
        self.status.map_or(true, |s| s.success())
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    mode: RunMode,
    timeout: Option<Duration>,
    stdout_file: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            mode: RunMode::Execute,
            timeout: None,
            stdout_file: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Execute or only log, depending on the run mode.
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Kill the child and fail if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stream stdout into `path` (truncated) instead of capturing it.
    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_file = Some(path.to_path_buf());
        self
    }

    /// The command line as it would be typed into a shell.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| shell_escape::escape(Cow::Borrowed(a.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let command_line = self.display();

        if self.mode.is_dry_run() {
            info!(command = %command_line, "[DRY RUN] would run");
            return Ok(CommandResult::dry());
        }
        debug!(command = %command_line, "running");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());

        match &self.stdout_file {
            Some(path) => {
                let file = File::create(path)
                    .map_err(|e| Error::io(format!("failed to create {}", path.display()), e))?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::io(
                format!("failed to execute '{}'. Is it installed?", self.program),
                e,
            )
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait(&mut child, self.timeout).map_err(|e| match e {
            WaitError::TimedOut(timeout) => {
                error!(command = %command_line, "timed out after {}s", timeout.as_secs());
                Error::Timeout {
                    command: command_line.clone(),
                    timeout,
                }
            }
            WaitError::Io(e) => Error::io(format!("failed to wait for '{}'", self.program), e),
        })?;

        let result = CommandResult {
            status: Some(status),
            stdout: join(stdout),
            stderr: join(stderr),
        };

        if !result.success() {
            error!(
                command = %command_line,
                code = result.code(),
                stdout = %result.stdout.trim(),
                stderr = %result.stderr.trim(),
                "command failed"
            );
            return Err(Error::Subprocess {
                command: command_line,
                code: result.code(),
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

enum WaitError {
    TimedOut(Duration),
    Io(std::io::Error),
}

fn wait(child: &mut Child, timeout: Option<Duration>) -> std::result::Result<ExitStatus, WaitError> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(WaitError::Io);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            // Already-exited races are harmless here.
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::TimedOut(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Read a pipe to the end on its own thread so a chatty child never blocks.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    ::which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}
