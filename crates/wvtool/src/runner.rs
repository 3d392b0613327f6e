//! Child process launching
//!
//! The runner starts test programs with stdout and stderr joined into one
//! pipe, so a banner on one and its checks on the other arrive in the order
//! they were written. On Unix each child leads a process group of its own so
//! that a whole test tree can be signalled at once. It knows nothing about
//! the protocol.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error};
use wvtest::Termination;

use crate::error::HarnessError;

/// How long a child gets to exit after SIGTERM before it is killed
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Read end of the pipe a child writes both stdout and stderr into
#[cfg(unix)]
pub type OutputPipe = tokio::net::unix::pipe::Receiver;
#[cfg(windows)]
pub type OutputPipe = tokio::fs::File;

/// A program invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Directory to run in, defaults to the current one
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ProcessCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a command from an argument vector
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::InvalidCommand` if `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Result<Self, HarnessError> {
        let (program, args) = argv.split_first().ok_or_else(|| HarnessError::InvalidCommand {
            command: String::new(),
            message: "no program given".to_string(),
        })?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    /// Build a command from a shell-style command line (no shell is run)
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::InvalidCommand` if the line has unbalanced
    /// quotes or contains no words.
    pub fn parse(line: &str) -> Result<Self, HarnessError> {
        let words = shell_words::split(line).map_err(|e| HarnessError::InvalidCommand {
            command: line.to_string(),
            message: e.to_string(),
        })?;
        Self::from_argv(&words).map_err(|_| HarnessError::InvalidCommand {
            command: line.to_string(),
            message: "no program given".to_string(),
        })
    }

    /// The command line as shown to humans
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// A started child whose output has not been touched yet
#[derive(Debug)]
pub struct SpawnedChild {
    /// The command line, used to label the stream
    pub label: String,
    /// The running process
    pub child: Child,
    /// Combined stdout and stderr of the child
    pub output: OutputPipe,
}

impl SpawnedChild {
    /// OS process id, `None` once the child has been reaped
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Result of running a child to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub termination: Termination,
    /// Everything written to stdout and stderr, in write order
    pub output: String,
}

/// Launches child processes with tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Start `command` with stdout and stderr sharing one pipe
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Spawn` if the executable cannot be found or
    /// started, or `HarnessError::Io` if its output pipe cannot be set up.
    pub fn spawn(&self, command: &ProcessCommand) -> Result<SpawnedChild, HarnessError> {
        let label = command.display();
        debug!("Executing subprocess: {}", label);

        let spawn_error = |source: std::io::Error| {
            error!(command = %label, error = %source, "failed to start child");
            HarnessError::Spawn {
                command: label.clone(),
                source,
            }
        };
        let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
        let error_writer = writer.try_clone().map_err(spawn_error)?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        // New process group so the whole test tree can be signalled together
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.stdin(Stdio::null())
            .stdout(writer)
            .stderr(error_writer)
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(spawn_error)?;
        // Only the child may keep the write end open, or EOF never arrives
        drop(cmd);
        let output = output_pipe(reader)?;
        debug!(command = %label, pid = ?child.id(), "child started");
        Ok(SpawnedChild {
            label,
            child,
            output,
        })
    }

    /// Run `command` to completion and capture its output
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Spawn` if the command cannot be started, or
    /// `HarnessError::Io` if waiting on it fails.
    pub async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput, HarnessError> {
        let SpawnedChild {
            mut child,
            mut output,
            ..
        } = self.spawn(command)?;
        let mut bytes = Vec::new();
        let (read, status) = tokio::join!(output.read_to_end(&mut bytes), child.wait());
        read?;
        Ok(ProcessOutput {
            termination: termination_from_status(status?),
            output: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[cfg(unix)]
fn output_pipe(reader: std::io::PipeReader) -> std::io::Result<OutputPipe> {
    tokio::net::unix::pipe::Receiver::from_owned_fd(std::os::fd::OwnedFd::from(reader))
}

#[cfg(windows)]
fn output_pipe(reader: std::io::PipeReader) -> std::io::Result<OutputPipe> {
    let handle = std::os::windows::io::OwnedHandle::from(reader);
    Ok(tokio::fs::File::from_std(std::fs::File::from(handle)))
}

/// Convert an OS exit status into a [`Termination`]
#[must_use]
pub fn termination_from_status(status: std::process::ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Termination::Signaled(signal);
        }
    }
    Termination::Exited(-1)
}

/// Ask a child (and its process group) to stop, escalating to a kill
///
/// # Errors
///
/// Returns an IO error if the child cannot be waited on.
pub async fn terminate(child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(status) => return status,
            Err(_) => {
                debug!(pid, "child ignored SIGTERM, killing process group");
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
        }
    }
    child.start_kill().ok();
    child.wait().await
}

/// Kill every process left in the group led by `pid`
///
/// Used once the leader has been reaped but descendants still hold its
/// output pipes open.
pub fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(errno) = killpg(Pid::from_raw(raw), signal) {
        // ESRCH: the group is already gone
        debug!(pid, ?signal, %errno, "could not signal process group");
    }
}
