//! External command execution.
//!
//! Every workflow step that touches a tool (`xcodebuild`, `xcrun`, `agvtool`,
//! `pod`, `security`, `zip`, `which`) goes through a [`CommandRunner`]. The
//! process-backed implementation is [`ProcessRunner`]; tests substitute a
//! recording fake.
//!
//! ## Output capture
//!
//! stdout and stderr are merged into a single OS pipe, read line by line and
//! joined *without* a separator. Callers that parse output (the build number
//! read-back, the `which` probe) rely on the tool printing a single line.

use std::io::{BufRead, BufReader, ErrorKind, PipeReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::types::ExecError;

const SECRET_MASK: &str = "******";

/// Number of trailing output lines repeated in the log when a command fails.
const FAILURE_TAIL_LINES: usize = 20;

/// One external command invocation.
///
/// `argv()[0]` is the executable. Built once with the builder methods and
/// never modified afterwards.
///
/// # Example
///
/// ```
/// use xcship_sdk::exec::ExecutionRequest;
///
/// let request = ExecutionRequest::new("security")
///     .arg("unlock-keychain")
///     .arg("-p")
///     .secret_arg("hunter2")
///     .arg("/k.keychain");
/// assert_eq!(request.argv().len(), 5);
/// assert_eq!(
///     request.display_command(),
///     "security unlock-keychain -p ****** /k.keychain"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    secret: Vec<usize>,
}

impl ExecutionRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![program.into()],
            working_dir: None,
            env: Vec::new(),
            secret: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends an argument that is masked in [`display_command`](Self::display_command).
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }

    /// Full argv including the program.
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env_overrides(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn is_secret(&self, index: usize) -> bool {
        self.secret.contains(&index)
    }

    /// Space-joined command line with secret arguments masked.
    pub fn display_command(&self) -> String {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if self.is_secret(i) {
                    SECRET_MASK
                } else {
                    arg.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs external commands.
pub trait CommandRunner {
    /// Runs `request` to completion and returns its merged output.
    ///
    /// Succeeds only when the process exits with code 0.
    fn execute(&self, request: &ExecutionRequest) -> Result<String, ExecError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn execute(&self, request: &ExecutionRequest) -> Result<String, ExecError> {
        (**self).execute(request)
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<String, ExecError> {
        let program = request.program().to_string();
        info!("Executing '{}'", request.display_command());

        let launch_failed = |source| ExecError::LaunchFailed {
            program: program.clone(),
            source,
        };

        let (reader, writer) = std::io::pipe().map_err(launch_failed)?;
        let writer_err = writer.try_clone().map_err(launch_failed)?;

        let mut cmd = Command::new(&program);
        cmd.args(&request.argv()[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(writer_err));
        if let Some(dir) = request.working_dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in request.env_overrides() {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(launch_failed)?;
        // The parent's copies of the write end must be gone before reading,
        // otherwise the reader never sees EOF.
        drop(cmd);

        let lines = read_merged_output(reader);

        let status = child.wait().map_err(|source| {
            if source.kind() == ErrorKind::Interrupted {
                ExecError::Interrupted {
                    program: program.clone(),
                }
            } else {
                ExecError::IoFailure {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        let lines = lines.map_err(|source| ExecError::IoFailure {
            program: program.clone(),
            source,
        })?;

        match status.code() {
            Some(0) => Ok(lines.concat()),
            code => {
                let code = code.unwrap_or(-1);
                let tail_start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
                warn!(
                    "'{}' exited with code {}. Last output:\n{}",
                    program,
                    code,
                    lines[tail_start..].join("\n")
                );
                Err(ExecError::NonZeroExit { program, code })
            }
        }
    }
}

fn read_merged_output(reader: PipeReader) -> std::io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        debug!("{line}");
        lines.push(line.to_string());
    }
    Ok(lines)
}
