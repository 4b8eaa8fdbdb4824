//! Builder for spawning the long-running stream process.

use std::process::Stdio;

use tokio::process::{Child, ChildStderr, Command};

/// A spawned child together with its diagnostic stream.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child handle. Killed on drop.
    pub child: Child,
    /// OS process id (also the process group id on unix).
    pub pid: u32,
    /// Piped standard error, handed to the telemetry monitor.
    pub stderr: ChildStderr,
}

/// A builder for constructing the stream process invocation.
///
/// # Example
///
/// ```no_run
/// use sg_av::StreamCommand;
///
/// # fn example() -> sg_core::Result<()> {
/// let spawned = StreamCommand::new("ffmpeg")
///     .args(["-i", "srt://10.0.0.5:1935?mode=caller", "-f", "null", "-"])
///     .env("SOURCE_IP", "10.0.0.5")
///     .spawn()?;
/// println!("pid {}", spawned.pid);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamCommand {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl StreamCommand {
    /// Create a new command for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child (inherits the rest).
    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined for logging.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the process with stdin/stdout detached and stderr piped.
    ///
    /// On unix the child leads its own process group so that signals reach
    /// any helpers it starts (e.g. a wrapper script launching ffmpeg).
    ///
    /// # Errors
    ///
    /// Returns [`sg_core::Error::SpawnFailed`] carrying the OS error text if
    /// the program cannot be executed.
    pub fn spawn(&self) -> sg_core::Result<SpawnedProcess> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| sg_core::Error::spawn_failed(&self.program, e.to_string()))?;

        let pid = child.id().ok_or_else(|| {
            sg_core::Error::Internal(format!("{} exited before its pid was read", self.program))
        })?;

        let stderr = child.stderr.take().ok_or_else(|| {
            sg_core::Error::Internal(format!("stderr of {} was not piped", self.program))
        })?;

        Ok(SpawnedProcess { child, pid, stderr })
    }
}

/// Ask the process group led by `pid` to exit (SIGTERM).
///
/// A group that no longer exists is treated as success.
#[cfg(unix)]
pub fn signal_graceful(pid: u32) -> std::io::Result<()> {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Forcefully kill the process group led by `pid` (SIGKILL).
#[cfg(unix)]
pub fn signal_kill(pid: u32) -> std::io::Result<()> {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;

    match nix::sys::signal::killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_nonexistent_program() {
        let err = StreamCommand::new("nonexistent_stream_tool_xyz_12345")
            .spawn()
            .unwrap_err();
        match err {
            sg_core::Error::SpawnFailed { program, message } => {
                assert_eq!(program, "nonexistent_stream_tool_xyz_12345");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_joins_program_and_args() {
        let mut cmd = StreamCommand::new("ffmpeg");
        cmd.args(["-i", "in.ts"]).args(["-"]);
        assert_eq!(cmd.display(), "ffmpeg -i in.ts -");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_pipes_stderr_and_passes_env() {
        use tokio::io::AsyncReadExt;

        let mut spawned = StreamCommand::new("sh")
            .args(["-c", "echo \"$GREETING\" >&2"])
            .env("GREETING", "hello")
            .spawn()
            .unwrap();

        let mut out = String::new();
        spawned.stderr.read_to_string(&mut out).await.unwrap();
        assert_eq!(out.trim(), "hello");

        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_reaches_process_group() {
        let mut spawned = StreamCommand::new("sh")
            .args(["-c", "sleep 30"])
            .spawn()
            .unwrap();

        signal_kill(spawned.pid).unwrap();
        let status = spawned.child.wait().await.unwrap();
        assert!(!status.success());

        // Group is gone now; signalling again is not an error.
        signal_graceful(spawned.pid).unwrap();
    }
}
