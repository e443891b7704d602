use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::ToolConfig;
use crate::error::{DefragError, Result};
use crate::parser::{self, CandidateRecord, ExtentCount, ExtentListing, OutputMode, Response};

/// Flags understood by `snfsdefrag`.
///
/// Tokens are always rendered in the same order so command lines are
/// reproducible in logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefragOptions {
    /// `-c` count extents
    pub count_extents: bool,
    /// `-e` list extents of fragmented files
    pub list_extents: bool,
    /// `-E` list extents of every file
    pub list_all_extents: bool,
    /// `-l` list candidates only, do not defragment
    pub list_candidates: bool,
    /// `-r` recurse into directories
    pub recursive: bool,
    /// `-G` only touch files on this stripe group
    pub stripe_group: Option<String>,
    /// `-K` only touch files with this affinity key
    pub only_key: Option<String>,
    /// `-k` move data onto stripe groups with this affinity key
    pub target_key: Option<String>,
    /// `-m` minimum extent count for a file to be a candidate
    pub min_extents: Option<u32>,
    /// `-t` print totals
    pub totals: bool,
    /// `-T` print totals only
    pub totals_only: bool,
    /// `-b` report sizes in blocks
    pub blocks: bool,
    /// `-D` debug output
    pub debug: bool,
    /// `-v` verbose output
    pub verbose: bool,
    /// `-p` prune unused preallocated space
    pub prune: bool,
}

impl DefragOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn min_extents(mut self, count: Option<u32>) -> Self {
        self.min_extents = count;
        self
    }

    pub fn stripe_group(mut self, group: Option<String>) -> Self {
        self.stripe_group = group;
        self
    }

    pub fn target_key(mut self, key: Option<String>) -> Self {
        self.target_key = key;
        self
    }

    pub fn only_key(mut self, key: Option<String>) -> Self {
        self.only_key = key;
        self
    }

    /// Render flags followed by the operands
    pub fn to_args<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut flag = |on: bool, token: &str| {
            if on {
                args.push(token.into());
            }
        };

        flag(self.count_extents, "-c");
        flag(self.list_extents, "-e");
        flag(self.list_all_extents, "-E");
        flag(self.list_candidates, "-l");
        flag(self.recursive, "-r");

        for (token, value) in [
            ("-G", &self.stripe_group),
            ("-K", &self.only_key),
            ("-k", &self.target_key),
        ] {
            if let Some(value) = value {
                args.push(token.into());
                args.push(value.into());
            }
        }
        if let Some(count) = self.min_extents {
            args.push("-m".into());
            args.push(count.to_string().into());
        }

        let mut flag = |on: bool, token: &str| {
            if on {
                args.push(token.into());
            }
        };
        flag(self.totals, "-t");
        flag(self.totals_only, "-T");
        flag(self.blocks, "-b");
        flag(self.debug, "-D");
        flag(self.verbose, "-v");
        flag(self.prune, "-p");

        args.extend(paths.iter().map(|p| p.as_ref().as_os_str().to_os_string()));
        args
    }
}

/// Outcome of one subprocess invocation
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Why the invocation failed; None on success
    pub error: Option<DefragError>,
}

impl ExecutionResult {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        ExecutionResult {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            error: None,
        }
    }

    pub fn failed(error: DefragError) -> Self {
        ExecutionResult {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Captured stdout, or the failure
    pub fn into_output(self) -> Result<String> {
        match self.error {
            None => Ok(self.stdout),
            Some(err) => Err(err),
        }
    }
}

/// Runs the external utility, one subprocess per call
#[derive(Debug, Clone)]
pub struct Invoker {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Invoker {
            executable: executable.into(),
            timeout: None,
        }
    }

    pub fn from_config(tool: &ToolConfig) -> Self {
        Invoker {
            executable: tool.executable.clone(),
            timeout: tool.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Execute the utility with an explicit argument vector.
    ///
    /// Launch failures and timeouts come back as failed results, never as
    /// panics or `Err`.
    pub async fn run(&self, args: &[OsString]) -> ExecutionResult {
        let program = self.executable.display().to_string();
        log::debug!("running {} {:?}", program, args);

        let mut command = Command::new(&self.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(source) => return ExecutionResult::failed(DefragError::SubprocessLaunch { program, source }),
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                // dropping the future drops the child, which kills it
                Err(_) => {
                    return ExecutionResult::failed(DefragError::Timeout {
                        seconds: limit.as_secs(),
                    })
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(source) => return ExecutionResult::failed(DefragError::SubprocessLaunch { program, source }),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();
        let error = (!output.status.success()).then(|| DefragError::SubprocessReported {
            code: exit_code,
            stderr: stderr.trim().to_string(),
        });

        ExecutionResult {
            exit_code,
            stdout,
            stderr,
            error,
        }
    }

    /// Defragment one file, optionally migrating it with `-G`/`-k`
    pub async fn defragment(&self, path: &Path, options: &DefragOptions) -> ExecutionResult {
        self.run(&options.to_args(&[path])).await
    }

    /// Release unused preallocated space (`-p`)
    pub async fn prune(&self, path: &Path) -> ExecutionResult {
        let options = DefragOptions {
            prune: true,
            ..DefragOptions::default()
        };
        self.run(&options.to_args(&[path])).await
    }

    /// Count extents (`-c`)
    pub async fn count_extents(&self, paths: &[PathBuf], options: &DefragOptions) -> Result<Vec<ExtentCount>> {
        let options = DefragOptions {
            count_extents: true,
            ..options.clone()
        };
        let text = self.listing(&options, paths).await?;
        parser::parse_extent_counts(&text)
    }

    /// List extents (`-e`)
    pub async fn list_extents(
        &self,
        paths: &[PathBuf],
        options: &DefragOptions,
        mode: OutputMode,
    ) -> Result<Response<ExtentListing>> {
        let options = DefragOptions {
            list_extents: true,
            ..options.clone()
        };
        let text = self.listing(&options, paths).await?;
        Ok(match mode {
            OutputMode::Raw => Response::Raw(text),
            OutputMode::Structured => Response::Records(parser::parse_extents(&text)),
        })
    }

    /// List defragmentation candidates (`-l`)
    pub async fn list_candidates(
        &self,
        paths: &[PathBuf],
        options: &DefragOptions,
        mode: OutputMode,
    ) -> Result<Response<Vec<CandidateRecord>>> {
        let options = DefragOptions {
            list_candidates: true,
            ..options.clone()
        };
        let text = self.listing(&options, paths).await?;
        Ok(match mode {
            OutputMode::Raw => Response::Raw(text),
            OutputMode::Structured => Response::Records(parser::parse_candidates(&text, options.verbose)?),
        })
    }

    async fn listing(&self, options: &DefragOptions, paths: &[PathBuf]) -> Result<String> {
        let result = self.run(&options.to_args(paths)).await;
        if result.stdout.trim_start().starts_with(parser::ERROR_PREFIX) {
            return Err(DefragError::ToolReported(result.stdout.trim().to_string()));
        }
        result.into_output()
    }
}
