//! Streaming command execution over SSH
//!
//! [`run_command`] opens one execution channel on a session, splits the
//! channel's event stream into two pipes (stdout, stderr), drains each pipe
//! with its own line reader task into an unbounded queue, and surfaces the
//! lines to an [`OutputSink`] as they arrive.
//!
//! ```text
//!                      +--> stdout pipe --> reader task --> queue --+
//! channel --> pump ----+                                            +--> sink
//!                      +--> stderr pipe --> reader task --> queue --+
//! ```
//!
//! The pump is the only task touching the channel after `exec`; readers and
//! the calling flow share nothing but the two queues.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::channel::{ChannelEvent, ExecChannel, ExecSession};
use crate::error::{AdminError, ExecErrorKind, Result};

/// Buffer between the pump and a line reader
const PIPE_CAPACITY: usize = 64 * 1024;

/// Which remote stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Order in which lines of the two streams reach the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputOrder {
    /// Every stdout line, then every stderr line
    #[default]
    StdoutFirst,
    /// Whichever queue yields a line first
    Arrival,
}

/// What to do when the remote command does not exit cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Non-zero status, signal, or missing status is an error
    #[default]
    Strict,
    /// Log it and report success
    LogOnly,
}

/// Knobs for [`run_command`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub order: OutputOrder,
    pub exit_policy: ExitPolicy,
    /// Limit on output consumption plus the completion wait.
    /// `None` waits forever.
    pub deadline: Option<Duration>,
}

/// Receives output lines as they are surfaced
pub trait OutputSink: Send {
    fn line(&mut self, stream: StreamKind, line: &str);
}

/// Prints `STDOUT: ...` / `STDERR: ...` to standard output
#[derive(Debug, Default)]
pub struct PrintSink;

impl OutputSink for PrintSink {
    fn line(&mut self, stream: StreamKind, line: &str) {
        match stream {
            StreamKind::Stdout => println!("STDOUT: {}", line),
            StreamKind::Stderr => println!("STDERR: {}", line),
        }
    }
}

/// One surfaced line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Records surfaced lines in order
#[derive(Debug, Default)]
pub struct CollectedOutput {
    pub lines: Vec<OutputLine>,
}

impl CollectedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines from one stream, in order
    pub fn stream(&self, stream: StreamKind) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.text.as_str())
            .collect()
    }
}

impl OutputSink for CollectedOutput {
    fn line(&mut self, stream: StreamKind, line: &str) {
        self.lines.push(OutputLine {
            stream,
            text: line.to_string(),
        });
    }
}

/// How a remote command finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    /// Exit status, if the server reported one
    pub exit_status: Option<u32>,

    /// Terminating signal, if the server reported one
    pub exit_signal: Option<String>,

    /// Lines surfaced from stdout
    pub stdout_lines: usize,

    /// Lines surfaced from stderr
    pub stderr_lines: usize,
}

impl ExitOutcome {
    /// Exited with status 0 and no signal
    pub fn success(&self) -> bool {
        self.exit_status == Some(0) && self.exit_signal.is_none()
    }
}

/// Status reported on the channel before it went away
#[derive(Debug, Default)]
struct Completion {
    exit_status: Option<u32>,
    exit_signal: Option<String>,
}

/// Run `command` on `session`, streaming its output to `sink`
///
/// Consumes the session: it is closed on every path out of this function,
/// as is the execution channel.
///
/// # Returns
/// * `Ok(ExitOutcome)` - The command exited 0, or any exit under
///   [`ExitPolicy::LogOnly`]
/// * `Err(AdminError::Exec { .. })` - Channel open, start, or drain failed
/// * `Err(AdminError::RemoteNonZeroExit { .. })` - Unclean exit under
///   [`ExitPolicy::Strict`]
/// * `Err(AdminError::Timeout)` - The deadline in `options` expired
pub async fn run_command<S: ExecSession>(
    session: S,
    command: &str,
    options: &RunOptions,
    sink: &mut dyn OutputSink,
) -> Result<ExitOutcome> {
    let result = execute(&session, command, options, sink).await;
    session.close().await;
    result
}

async fn execute<S: ExecSession>(
    session: &S,
    command: &str,
    options: &RunOptions,
    sink: &mut dyn OutputSink,
) -> Result<ExitOutcome> {
    let mut channel = session.open_channel().await.map_err(|e| {
        error!("Failed to open execution channel: {}", e);
        match e {
            AdminError::Exec { .. } => e,
            other => AdminError::exec(ExecErrorKind::ChannelOpenFailed, other.to_string()),
        }
    })?;

    let (stdout_pipe, mut stdout_rx, stdout_reader) = spawn_line_reader(StreamKind::Stdout);
    let (stderr_pipe, mut stderr_rx, stderr_reader) = spawn_line_reader(StreamKind::Stderr);

    debug!("Starting remote command: {}", command);
    if let Err(e) = channel.exec(command).await {
        error!("Failed to start remote command: {}", e);
        // Readers see end-of-stream once the pipes are gone
        drop(stdout_pipe);
        drop(stderr_pipe);
        let _ = join_readers(stdout_reader, stderr_reader).await;
        close_channel(&mut channel).await;
        return Err(AdminError::exec(
            ExecErrorKind::StartFailed,
            format!("Failed to exec command: {}", e),
        ));
    }

    let mut pump = tokio::spawn(pump_events(channel, stdout_pipe, stderr_pipe));

    let waited = async {
        surface_lines(options.order, &mut stdout_rx, &mut stderr_rx, sink).await;
        (&mut pump).await
    };

    let pumped = match options.deadline {
        None => Some(waited.await),
        Some(limit) => timeout(limit, waited).await.ok(),
    };

    let Some(pumped) = pumped else {
        let limit_ms = options.deadline.unwrap_or_default().as_millis() as u64;
        warn!("Command timed out after {}ms, closing session", limit_ms);
        // Tearing down the session ends the channel, which ends both pipes
        session.close().await;
        if let Ok((mut channel, _)) = pump.await {
            close_channel(&mut channel).await;
        }
        let _ = join_readers(stdout_reader, stderr_reader).await;
        return Err(AdminError::Timeout(limit_ms));
    };

    let drained = join_readers(stdout_reader, stderr_reader).await;

    let (mut channel, completion) = pumped.map_err(|e| {
        error!("Output pump failed: {}", e);
        AdminError::exec(ExecErrorKind::StreamFailed, e.to_string())
    })?;
    close_channel(&mut channel).await;

    let (stdout_lines, stderr_lines) = drained?;
    let outcome = ExitOutcome {
        exit_status: completion.exit_status,
        exit_signal: completion.exit_signal,
        stdout_lines,
        stderr_lines,
    };

    debug!(
        "Command completed: exit_status={:?}, exit_signal={:?}, stdout_lines={}, stderr_lines={}",
        outcome.exit_status, outcome.exit_signal, outcome.stdout_lines, outcome.stderr_lines
    );

    check_exit(outcome, options.exit_policy)
}

fn check_exit(outcome: ExitOutcome, policy: ExitPolicy) -> Result<ExitOutcome> {
    if outcome.success() {
        return Ok(outcome);
    }

    match policy {
        ExitPolicy::Strict => Err(AdminError::RemoteNonZeroExit {
            status: outcome.exit_status,
            signal: outcome.exit_signal,
        }),
        ExitPolicy::LogOnly => {
            warn!(
                "Remote command did not exit cleanly: status={:?}, signal={:?}",
                outcome.exit_status, outcome.exit_signal
            );
            Ok(outcome)
        }
    }
}

/// Deliver queued lines to the sink until both queues are closed
async fn surface_lines(
    order: OutputOrder,
    stdout_rx: &mut UnboundedReceiver<String>,
    stderr_rx: &mut UnboundedReceiver<String>,
    sink: &mut dyn OutputSink,
) {
    match order {
        OutputOrder::StdoutFirst => {
            while let Some(line) = stdout_rx.recv().await {
                sink.line(StreamKind::Stdout, &line);
            }
            while let Some(line) = stderr_rx.recv().await {
                sink.line(StreamKind::Stderr, &line);
            }
        }
        OutputOrder::Arrival => {
            let mut stdout_open = true;
            let mut stderr_open = true;
            while stdout_open || stderr_open {
                tokio::select! {
                    line = stdout_rx.recv(), if stdout_open => match line {
                        Some(line) => sink.line(StreamKind::Stdout, &line),
                        None => stdout_open = false,
                    },
                    line = stderr_rx.recv(), if stderr_open => match line {
                        Some(line) => sink.line(StreamKind::Stderr, &line),
                        None => stderr_open = false,
                    },
                }
            }
        }
    }
}

/// Create a pipe for one stream and start the task that drains it
fn spawn_line_reader(
    stream: StreamKind,
) -> (DuplexStream, UnboundedReceiver<String>, JoinHandle<usize>) {
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(forward_lines(stream, reader, tx));
    (writer, rx, handle)
}

/// Split `reader` into lines and queue them until end-of-stream
///
/// Keeps reading even if the queue's receiver is gone so the pump feeding
/// the pipe can never stall.
async fn forward_lines<R>(stream: StreamKind, reader: R, tx: UnboundedSender<String>) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                let _ = tx.send(decode_line(&buf));
            }
            Err(e) => {
                warn!("Reading {:?} failed: {}", stream, e);
                break;
            }
        }
    }

    debug!("{:?} drained: {} lines", stream, count);
    count
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Route channel events into the two pipes until the channel is done
///
/// Returns the channel so the caller can close it.
async fn pump_events<C: ExecChannel>(
    mut channel: C,
    stdout: DuplexStream,
    stderr: DuplexStream,
) -> (C, Completion) {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    let mut completion = Completion::default();
    let mut got_eof = false;

    while let Some(event) = channel.next_event().await {
        match event {
            ChannelEvent::Stdout(data) => write_pipe(&mut stdout, StreamKind::Stdout, &data).await,
            ChannelEvent::Stderr(data) => write_pipe(&mut stderr, StreamKind::Stderr, &data).await,
            ChannelEvent::ExitStatus(status) => {
                completion.exit_status = Some(status);
                if got_eof {
                    break;
                }
            }
            ChannelEvent::ExitSignal(signal) => {
                completion.exit_signal = Some(signal);
            }
            ChannelEvent::Eof => {
                got_eof = true;
                // No more output: let the readers finish now
                stdout = None;
                stderr = None;
                if completion.exit_status.is_some() {
                    break;
                }
            }
            ChannelEvent::Close => break,
        }
    }

    (channel, completion)
}

async fn write_pipe(pipe: &mut Option<DuplexStream>, stream: StreamKind, data: &[u8]) {
    let Some(writer) = pipe.as_mut() else {
        return;
    };
    if let Err(e) = writer.write_all(data).await {
        warn!("Dropping {:?} output, reader gone: {}", stream, e);
        *pipe = None;
    }
}

async fn join_readers(
    stdout_reader: JoinHandle<usize>,
    stderr_reader: JoinHandle<usize>,
) -> Result<(usize, usize)> {
    let stdout = stdout_reader.await;
    let stderr = stderr_reader.await;
    match (stdout, stderr) {
        (Ok(stdout), Ok(stderr)) => Ok((stdout, stderr)),
        (Err(e), _) | (_, Err(e)) => {
            error!("Line reader failed: {}", e);
            Err(AdminError::exec(ExecErrorKind::StreamFailed, e.to_string()))
        }
    }
}

async fn close_channel<C: ExecChannel>(channel: &mut C) {
    if let Err(e) = channel.close().await {
        debug!("Closing channel reported: {}", e);
    }
}
