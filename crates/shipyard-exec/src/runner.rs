use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use shipyard_types::ExitOutcome;
use tracing::{debug, trace, warn};

use crate::command::CommandSpec;
use crate::decode::Utf8Stream;
use crate::error::{ProcessError, Result};
use crate::sink::{NullSink, OutputSink};

/// Exit code reported when the child was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

const READ_BUFFER_SIZE: usize = 8 * 1024;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// ExecMode / ProcessOutput
// ---------------------------------------------------------------------------

/// How a non-zero exit code is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// Non-zero exit is an error ([`ProcessError::NonZeroExit`]).
    Strict,
    /// The exit code is returned to the caller, who interprets it.
    Passthrough,
}

impl ExecMode {
    /// Apply this mode to a finished command.
    pub fn check(self, spec: &CommandSpec, output: ProcessOutput) -> Result<ProcessOutput> {
        match self {
            Self::Strict if output.exit_code != 0 => Err(ProcessError::NonZeroExit {
                command: spec.to_string(),
                code: output.exit_code,
                output: output.output,
            }),
            _ => Ok(output),
        }
    }
}

/// Exit code and combined output of a finished command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn outcome(&self) -> ExitOutcome {
        ExitOutcome::from_code(self.exit_code)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// CommandRunner trait
// ---------------------------------------------------------------------------

/// Runs external commands to completion.
///
/// Implementations stream combined output into the caller's sink while
/// also capturing it for the returned [`ProcessOutput`]. `run` never fails
/// because of the exit code; the mode-aware helpers layer that on top.
pub trait CommandRunner: Send + Sync {
    /// Run `spec`, blocking until it exits or `timeout` elapses.
    fn run(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput>;

    /// Run `spec` and apply `mode` to its exit code.
    fn execute(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
        mode: ExecMode,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        let output = self.run(spec, sink, timeout)?;
        mode.check(spec, output)
    }

    /// Strict mode without a live sink.
    fn check(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.execute(spec, &mut NullSink, ExecMode::Strict, None)
    }

    /// Passthrough mode without a live sink.
    fn status(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.execute(spec, &mut NullSink, ExecMode::Passthrough, None)
    }
}

// ---------------------------------------------------------------------------
// SystemRunner
// ---------------------------------------------------------------------------

/// Runs commands as real child processes.
///
/// stdout and stderr are each drained by a reader thread; the calling thread
/// receives the chunks in arrival order and writes them to the sink, so the
/// sink itself never crosses a thread boundary.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy, Debug)]
enum Stream {
    Stdout = 0,
    Stderr = 1,
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        sink: &mut dyn OutputSink,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        let command_line = spec.to_string();
        debug!(command = %command_line, dir = ?spec.dir(), "spawning command");

        let mut command = Command::new(spec.program());
        command
            .args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = spec.dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program().to_string(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut decoders = [Utf8Stream::new(), Utf8Stream::new()];
        let mut captured = String::new();

        loop {
            let next = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        Err(RecvTimeoutError::Timeout)
                    } else {
                        rx.recv_timeout(remaining)
                    }
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok((stream, bytes)) => {
                    let text = decoders[stream as usize].push(&bytes);
                    forward(&text, sink, &mut captured);
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    kill(&mut child)?;
                    for decoder in &mut decoders {
                        forward(&decoder.finish(), sink, &mut captured);
                    }
                    sink.finish();
                    return Err(timed_out(command_line, timeout, captured));
                }
            }
        }

        for decoder in &mut decoders {
            forward(&decoder.finish(), sink, &mut captured);
        }
        sink.finish();

        for handle in pumps {
            if handle.join().is_err() {
                warn!(command = %command_line, "output reader thread panicked");
            }
        }

        // The child may close its pipes long before it exits.
        let status = match deadline {
            None => child.wait()?,
            Some(deadline) => match wait_until(&mut child, deadline)? {
                Some(status) => status,
                None => {
                    kill(&mut child)?;
                    return Err(timed_out(command_line, timeout, captured));
                }
            },
        };
        let exit_code = status.code().unwrap_or(SIGNALLED_EXIT_CODE);
        debug!(command = %command_line, exit_code, bytes = captured.len(), "command finished");

        Ok(ProcessOutput {
            exit_code,
            output: captured,
        })
    }
}

fn forward(text: &str, sink: &mut dyn OutputSink, captured: &mut String) {
    if text.is_empty() {
        return;
    }
    trace!(target: "shipyard::output", "{text}");
    sink.write(text);
    captured.push_str(text);
}

fn pump<R>(mut reader: R, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

/// Poll `child` until it exits or `deadline` passes. `None` means it is
/// still running.
fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        thread::sleep(remaining.min(WAIT_POLL_INTERVAL));
    }
}

fn timed_out(command: String, timeout: Option<Duration>, output: String) -> ProcessError {
    let after = timeout.unwrap_or_default();
    warn!(command = %command, ?after, "command timed out, killed it");
    ProcessError::TimedOut {
        command,
        after,
        output,
    }
}

fn kill(child: &mut Child) -> Result<()> {
    match child.kill() {
        Ok(()) => {}
        // Already exited between the deadline and the kill.
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
        Err(e) => return Err(e.into()),
    }
    child.wait()?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[derive(Default)]
    struct Recording {
        text: String,
        finished: usize,
    }

    impl OutputSink for Recording {
        fn write(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn finish(&mut self) {
            self.finished += 1;
        }
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let mut sink = Recording::default();
        let output = SystemRunner
            .run(&sh("echo out; echo err >&2"), &mut sink, None)
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.output.contains("out\n"));
        assert!(output.output.contains("err\n"));
        assert_eq!(sink.text, output.output);
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn strict_mode_fails_on_non_zero_exit() {
        let err = SystemRunner.check(&sh("echo broken; exit 3")).unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.output(), "broken\n");
    }

    #[test]
    fn passthrough_mode_returns_reserved_codes() {
        let output = SystemRunner.status(&sh("exit 66")).unwrap();
        assert_eq!(output.outcome(), ExitOutcome::Stop);

        let output = SystemRunner.status(&sh("exit 67")).unwrap();
        assert_eq!(output.outcome(), ExitOutcome::NotReady);
    }

    #[test]
    fn runs_in_the_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("pwd").current_dir(dir.path());
        let output = SystemRunner.check(&spec).unwrap();
        let reported = std::path::PathBuf::from(output.output.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = SystemRunner
            .check(&CommandSpec::new("definitely-not-a-real-program-7c1f"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn timeout_kills_the_child_and_keeps_output() {
        let mut sink = Recording::default();
        let err = SystemRunner
            .run(
                &sh("echo started; sleep 5"),
                &mut sink,
                Some(Duration::from_millis(300)),
            )
            .unwrap_err();
        match err {
            ProcessError::TimedOut { output, .. } => assert_eq!(output, "started\n"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn timeout_applies_after_the_child_closes_its_output() {
        let started = Instant::now();
        let err = SystemRunner
            .run(
                &sh("exec >/dev/null 2>&1; sleep 3"),
                &mut NullSink,
                Some(Duration::from_millis(200)),
            )
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
