use std::process::{ExitStatus, Stdio};

use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

use crate::error::Result;

/// Handle for one external producer process.
///
/// Owns the child process and the read side of its stdout pipe. The receiver
/// being present is the definition of "running": `start` sets both fields or
/// neither, and `stop` is the single place where they are released.
#[derive(Debug)]
pub struct Producer {
    argv: Vec<String>,
    child: Option<Child>,
    stdout: Option<pipe::Receiver>,
}

impl Producer {
    /// Creates a stopped producer for the given command line.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            child: None,
            stdout: None,
        }
    }

    /// The command line this producer runs.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Whether the producer is considered running (its stdout is held open).
    pub fn is_running(&self) -> bool {
        self.stdout.is_some()
    }

    /// Spawns the producer with its stdout piped back to us.
    ///
    /// The pipe end is non-blocking and close-on-exec. Fails atomically: if the
    /// spawn or the pipe registration fails, the handle is left stopped and a
    /// partially spawned child is killed and reaped by the runtime.
    pub fn start(&mut self) -> Result<()> {
        let (program, args) = match self.argv.split_first() {
            Some(split) => split,
            None => {
                return Err(std::io::Error::other("empty command line").into());
            }
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                return Err(std::io::Error::other("spawned child has no stdout").into());
            }
        };
        // Dropping `child` on the error paths below kills and reaps it.
        let receiver = pipe::Receiver::from_owned_fd(stdout.into_owned_fd()?)?;

        self.child = Some(child);
        self.stdout = Some(receiver);
        Ok(())
    }

    /// Releases the stdout pipe and the child handle.
    ///
    /// Idempotent: stopping an already stopped producer is a no-op. A child
    /// that is still alive is killed and reaped in the background.
    pub fn stop(&mut self) {
        self.stdout = None;
        self.child = None;
    }

    /// Non-blocking reap. Returns the exit status exactly once when the child
    /// has exited; `None` while it is still running or after `stop`.
    ///
    /// Reaping releases the child handle but keeps the pipe open: bytes the
    /// producer wrote before exiting are still read out, and the end-of-stream
    /// on that pipe is what finally stops the stream.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        let status = match self.child.as_mut()?.try_wait() {
            Ok(status) => status?,
            Err(_) => return None,
        };
        self.child = None;
        Some(status)
    }

    /// OS process id of the running child, if any.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Non-blocking read from the producer's stdout.
    pub fn try_read(&self, buf: &mut [u8]) -> Option<std::io::Result<usize>> {
        Some(self.stdout.as_ref()?.try_read(buf))
    }

    /// Borrows the pipe receiver and, when not yet reaped, the child for
    /// readiness waiting.
    pub(crate) fn event_parts(&mut self) -> Option<(&pipe::Receiver, Option<&mut Child>)> {
        let rx = self.stdout.as_ref()?;
        Some((rx, self.child.as_mut()))
    }
}
