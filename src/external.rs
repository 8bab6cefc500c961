//! Extraction through an external 7-Zip binary
//!
//! [`ExternalExtractor`] hands the whole archive to `7za.exe` (Windows) or
//! `7zz` (Linux) and trusts the tool with path safety. There is no filtering
//! and no per-entry handling: the archive is extracted unconditionally.
//!
//! # Locating the binary
//!
//! 1. `<tool dir>/<name>` when a tool directory is configured
//! 2. `<directory of current executable>/resources/<name>` if it exists
//! 3. `<name>` looked up on `PATH`

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::extract::blocking;
use crate::fs::{DirectoryAllocator, TempDirAllocator};
use crate::observer::{ExtractionObserver, LogObserver};

/// Operating system families that matter for picking the 7-Zip binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    Unsupported(&'static str),
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Unsupported(env::consts::OS)
        }
    }
}

/// File name of the 7-Zip binary for `platform`.
///
/// # Examples
///
/// ```
/// use sevenx::external::{Platform, executable_name};
///
/// assert_eq!(executable_name(Platform::Linux).unwrap(), "7zz");
/// assert!(executable_name(Platform::Unsupported("macos")).is_err());
/// ```
pub fn executable_name(platform: Platform) -> Result<&'static str> {
    match platform {
        Platform::Windows => Ok("7za.exe"),
        Platform::Linux => Ok("7zz"),
        Platform::Unsupported(os) => Err(Error::PlatformNotSupported { os }),
    }
}

/// Arguments for "extract with full paths into `output`, assume yes".
pub fn extraction_args(archive: &Path, output: &Path) -> Vec<OsString> {
    let mut out = OsString::from("-o");
    out.push(output.as_os_str());
    vec![
        OsString::from("x"),
        archive.as_os_str().to_os_string(),
        out,
        OsString::from("-y"),
    ]
}

/// Result of a finished external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Starts external processes.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` to completion.
    ///
    /// Launch failures surface as [`Error::ExternalTool`]; a firing `cancel`
    /// kills the child and yields [`Error::Cancelled`].
    fn run<'a>(
        &'a self,
        program: &'a Path,
        args: &'a [OsString],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ProcessOutput>>;
}

/// Runs processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        program: &'a Path,
        args: &'a [OsString],
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(async move {
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| Error::ExternalTool {
                    program: program.to_path_buf(),
                    reason: format!("failed to start: {e}"),
                })?;

            // dropping the wait future kills the child
            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                output = child.wait_with_output() => output,
            };
            let output = output.map_err(|e| Error::ExternalTool {
                program: program.to_path_buf(),
                reason: format!("failed to wait: {e}"),
            })?;

            Ok(ProcessOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Unconditional full extraction through the platform's 7-Zip binary.
#[derive(Clone)]
pub struct ExternalExtractor {
    platform: Platform,
    tool_dir: Option<PathBuf>,
    runner: Arc<dyn ProcessRunner>,
    directories: Arc<dyn DirectoryAllocator>,
    observer: Arc<dyn ExtractionObserver>,
}

impl Default for ExternalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalExtractor {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            tool_dir: None,
            runner: Arc::new(TokioProcessRunner),
            directories: Arc::new(TempDirAllocator::new()),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Look for the binary in `dir` only.
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_directories(mut self, directories: Arc<dyn DirectoryAllocator>) -> Self {
        self.directories = directories;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Path of the 7-Zip binary that [`extract`](Self::extract) would run.
    pub fn executable(&self) -> Result<PathBuf> {
        let name = executable_name(self.platform)?;

        if let Some(dir) = &self.tool_dir {
            return Ok(dir.join(name));
        }

        let bundled = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("resources").join(name)));
        if let Some(bundled) = bundled.filter(|path| path.is_file()) {
            return Ok(bundled);
        }

        which::which(name).map_err(|e| Error::ExternalTool {
            program: PathBuf::from(name),
            reason: format!("not found: {e}"),
        })
    }

    /// Extract all of `archive` into a new temp directory and return it.
    ///
    /// # Errors
    ///
    /// - [`Error::PlatformNotSupported`] before any I/O on unknown platforms
    /// - [`Error::ExternalTool`] if the binary is missing, fails to launch, or
    ///   exits unsuccessfully
    /// - [`Error::Cancelled`] once `cancel` fires
    pub async fn extract(&self, archive: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        let program = self.executable()?;

        let directories = Arc::clone(&self.directories);
        let temp_dir = blocking(cancel, move || {
            directories
                .create_temp_directory()
                .map_err(|source| Error::Directory {
                    path: directories.location(),
                    source,
                })
        })
        .await?;
        self.observer.extraction_started(archive, &temp_dir);

        let args = extraction_args(archive, &temp_dir);
        self.observer.external_tool_started(&program, &args);

        let output = self.runner.run(&program, &args, cancel).await?;
        if !output.success() {
            let status = output
                .code
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
            return Err(Error::ExternalTool {
                program,
                reason: format!("{status}: {}", stderr_tail(&output.stderr)),
            });
        }

        self.observer.external_tool_finished(&program);
        Ok(temp_dir)
    }
}

/// Last few lines of stderr, enough to explain a failure.
fn stderr_tail(stderr: &str) -> String {
    const LINES: usize = 5;

    let lines: Vec<_> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(LINES);
    lines[start..].join(" | ")
}
