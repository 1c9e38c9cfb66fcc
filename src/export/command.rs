//! External process invocation.
//!
//! The exporter only sees the `CommandRunner` seam: it hands over an
//! `Invocation` and gets back the captured output together with the exit
//! classification. `ProcessRunner` is the real implementation; tests plug in
//! closures instead.

use crate::export::function_path;
use crate::export::redacted::RedactedString;
use crate::export::result_error::error::Error;
use crate::export::result_error::result::Result;
use crate::export::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

static DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long output of a killed child is still drained; its own children may keep the pipes open
static ABORTED_OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// One run of an external program
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct Invocation {
    #[builder(into)]
    program: PathBuf,
    #[builder(default, into)]
    args: Vec<String>,
    #[builder(default)]
    envs: Vec<(String, RedactedString)>,
}

/// What came back from running an `Invocation`
///
/// `output` is stdout followed by stderr. `status` is `Ok` only when the
/// process started and exited successfully.
#[derive(Debug)]
pub struct CommandOutput {
    pub output: String,
    pub status: Result<()>,
}

impl CommandOutput {
    pub fn success<S: Into<String>>(output: S) -> Self {
        Self {
            output: output.into(),
            status: Ok(()),
        }
    }

    pub fn failure<S: Into<String>>(output: S, error: Error) -> Self {
        Self {
            output: output.into(),
            status: Err(error),
        }
    }
}

pub trait CommandRunner {
    /// Runs the invocation to completion, blocking the calling thread.
    fn execute(&self, invocation: &Invocation) -> CommandOutput;
}

impl<F: Fn(&Invocation) -> CommandOutput> CommandRunner for F {
    fn execute(&self, invocation: &Invocation) -> CommandOutput {
        self(invocation)
    }
}

/// Shared flag used to abort a running child from another thread
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs invocations as real child processes
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    cancel: Option<CancelHandle>,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    #[getset(skip)]
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CommandRunner for ProcessRunner {
    #[named]
    fn execute(&self, invocation: &Invocation) -> CommandOutput {
        tracing::debug!("Spawning {:?}", invocation);
        let mut child = match Command::new(invocation.program())
            .args(invocation.args())
            .envs(
                invocation
                    .envs()
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.inner().as_str())),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let error = Error::from(e)
                    .add_msg(format!("Failed to launch {:?}", invocation.program()))
                    .add_fn_name(function_path!());
                return CommandOutput::failure(String::new(), error);
            }
        };

        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        let status = self.wait(&mut child);

        let grace = status.is_err().then_some(ABORTED_OUTPUT_GRACE);
        let mut output = collect_pipe(stdout_reader, grace);
        output.push_str(&collect_pipe(stderr_reader, grace));

        let status = status
            .and_then(|status| classify_exit_status(&status))
            .add_fn_name(function_path!());
        if let Err(e) = &status {
            tracing::warn!("{:?} did not succeed: {}", invocation.program(), e.root());
        }

        CommandOutput { output, status }
    }
}

impl ProcessRunner {
    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        if self.timeout.is_none() && self.cancel.is_none() {
            return Ok(child.wait()?);
        }

        let deadline = self.timeout.map(|t| (t, Instant::now() + t));
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            if self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled) {
                tracing::info!("Cancellation requested, killing child {}", child.id());
                kill_and_reap(child)?;
                return Err(Error::cancelled());
            }

            if let Some((timeout, deadline)) = deadline {
                if Instant::now() >= deadline {
                    tracing::info!("Child {} exceeded {:?}, killing it", child.id(), timeout);
                    kill_and_reap(child)?;
                    return Err(Error::timed_out(timeout));
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

fn kill_and_reap(child: &mut Child) -> Result<()> {
    // kill fails with InvalidInput if the child already exited
    if let Err(e) = child.kill() {
        if e.kind() != std::io::ErrorKind::InvalidInput {
            return Err(e.into());
        }
    }
    child.wait()?;
    Ok(())
}

fn classify_exit_status(status: &ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::non_zero_exit(status.code()))
    }
}

struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done) = channel();
    let thread_buf = buf.clone();
    std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => match thread_buf.lock() {
                    Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                    Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                },
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Reading child output failed: {e}");
                    break;
                }
            }
        }
        let _ = done_tx.send(());
    });
    PipeReader { buf, done }
}

/// Waits for EOF, or at most `grace` when the child was killed.
fn collect_pipe(reader: Option<PipeReader>, grace: Option<Duration>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match grace {
        // Err means the reader thread is gone, the buffer is final either way
        None => {
            let _ = reader.done.recv();
        }
        Some(grace) => {
            if reader.done.recv_timeout(grace).is_err() {
                tracing::warn!("Child output still open after {:?}, keeping what was read", grace);
            }
        }
    }
    let buf = match reader.buf.lock() {
        Ok(buf) => buf,
        Err(poisoned) => poisoned.into_inner(),
    };
    let output = String::from_utf8_lossy(&buf).into_owned();
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::builder()
            .program("sh")
            .args(vec!["-c".to_string(), script.to_string()])
            .build()
    }

    #[test]
    fn test_closure_runner() {
        let runner = |invocation: &Invocation| CommandOutput::success(invocation.args().join(" "));
        let invocation = Invocation::builder()
            .program("pg_dump")
            .args(vec!["-dshop".to_string(), "-fout".to_string()])
            .build();

        let out = runner.execute(&invocation);
        assert_eq!(out.output, "-dshop -fout");
        assert!(out.status.is_ok());
    }

    #[test]
    fn test_invocation_debug_redacts_envs() {
        let invocation = Invocation::builder()
            .program("pg_dump")
            .envs(vec![(
                "PGPASSWORD".to_string(),
                RedactedString::builder().inner("hunter22").build(),
            )])
            .build();

        let debug_str = format!("{:?}", invocation);
        assert!(debug_str.contains("PGPASSWORD"));
        assert!(!debug_str.contains("hunter22"));
    }

    #[test]
    fn test_launch_failure() {
        let invocation = Invocation::builder()
            .program("/nonexistent/definitely-not-a-dump-tool")
            .build();

        let out = ProcessRunner::default().execute(&invocation);
        assert!(out.output.is_empty());
        let error = out.status.unwrap_err();
        assert!(matches!(error.root(), Error::Io(_)));
        assert!(error.to_string().contains("Failed to launch"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_success_captures_stdout() {
        let out = ProcessRunner::default().execute(&sh("printf ok"));
        assert!(out.status.is_ok());
        assert_eq!(out.output, "ok");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_failure_captures_stderr() {
        let out = ProcessRunner::default().execute(&sh("printf 'disk full' >&2; exit 3"));
        assert_eq!(out.output, "disk full");
        let error = out.status.unwrap_err();
        assert!(matches!(error.root(), Error::NonZeroExit { code: Some(3) }));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_env_is_passed() {
        let invocation = Invocation::builder()
            .program("sh")
            .args(vec!["-c".to_string(), "printf \"$PGPASSWORD\"".to_string()])
            .envs(vec![(
                "PGPASSWORD".to_string(),
                RedactedString::builder().inner("hunter22").build(),
            )])
            .build();

        let out = ProcessRunner::default().execute(&invocation);
        assert_eq!(out.output, "hunter22");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_timeout() {
        let runner = ProcessRunner::builder()
            .timeout(Duration::from_millis(200))
            .build();

        let started = Instant::now();
        let out = runner.execute(&sh("printf started; exec sleep 10"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(out.status.unwrap_err().root(), Error::TimedOut { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_timeout_with_child_holding_output() {
        let runner = ProcessRunner::builder()
            .timeout(Duration::from_millis(200))
            .build();

        let started = Instant::now();
        let out = runner.execute(&sh("printf started; sleep 4; printf done"));

        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert!(matches!(out.status.unwrap_err().root(), Error::TimedOut { .. }));
        assert_eq!(out.output, "started");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_cancel() {
        let cancel = CancelHandle::default();
        let runner = ProcessRunner::builder().cancel(cancel.clone()).build();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });
        let out = runner.execute(&sh("exec sleep 10"));
        canceller.join().unwrap();

        assert!(matches!(out.status.unwrap_err().root(), Error::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_with_timeout_finishing_early() {
        let runner = ProcessRunner::builder()
            .timeout(Duration::from_secs(10))
            .build();

        let out = runner.execute(&sh("printf done"));
        assert!(out.status.is_ok());
        assert_eq!(out.output, "done");
    }
}
