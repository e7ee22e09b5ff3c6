//! Process runner used for git, tmux, screen, and exec sessions.
//!
//! A non-zero exit is data (`CommandOutput::exit_code`); only a failure to run
//! the program at all, or cancellation, is an `Err`. Nothing is retried.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::WorksetError;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// A command to execute: program, arguments, extra environment, working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub workdir: Option<PathBuf>,
    /// Inherit the terminal instead of capturing output.
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// `program arg1 arg2`, for messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stderr, falling back to stdout, for error messages.
    pub fn message(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Executes external commands.
pub trait ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Resolve `program` on `PATH`.
    fn look_path(&self, program: &str) -> Result<PathBuf>;

    /// Run and turn a non-zero exit into an error naming the command.
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec)?;
        if !output.success() {
            return Err(anyhow!(
                "{} failed (exit {}): {}",
                spec.display(),
                output.exit_code,
                output.message()
            ));
        }
        Ok(output)
    }
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        (**self).run(spec)
    }

    fn look_path(&self, program: &str) -> Result<PathBuf> {
        (**self).look_path(program)
    }
}

/// Caller-owned cancellation flag shared with in-flight commands.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    cancel: CancelToken,
    output_limit_bytes: usize,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(CancelToken::new())
    }
}

impl SystemRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }

    fn cancelled(&self, spec: &CommandSpec) -> anyhow::Error {
        WorksetError::Cancelled(format!("{} cancelled", spec.display())).into()
    }
}

impl ProcessRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %spec.program, interactive = spec.interactive))]
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled(spec));
        }
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(spec.env.iter().map(|(key, value)| (key, value)));
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }
        if spec.interactive {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        debug!(command = %spec.display(), "spawning child process");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn command");
                return Err(e).with_context(|| format!("spawn {}", spec.program));
            }
        };

        let limit = self.output_limit_bytes;
        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| thread::spawn(move || read_stream_limited(stdout, limit)));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || read_stream_limited(stderr, limit)));

        let status = loop {
            if let Some(status) = child
                .wait_timeout(POLL_INTERVAL)
                .with_context(|| format!("wait for {}", spec.program))?
            {
                break status;
            }
            if self.cancel.is_cancelled() {
                warn!(command = %spec.display(), "cancelled, killing child");
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?;
                return Err(self.cancelled(spec));
            }
        };

        let stdout = join_output(stdout_handle).context("join stdout")?;
        let stderr = join_output(stderr_handle).context("join stderr")?;
        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, "command finished");
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn look_path(&self, program: &str) -> Result<PathBuf> {
        which::which(program).with_context(|| format!("{program} not found on PATH"))
    }
}

fn join_output(handle: Option<thread::JoinHandle<Result<String>>>) -> Result<String> {
    match handle {
        None => Ok(String::new()),
        Some(handle) => match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("output reader thread panicked")),
        },
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<String> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }
    if truncated > 0 {
        warn!(truncated, "output truncated");
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
