//! Async subprocess driver
//!
//! Spawns prepared commands, tails stdout/stderr concurrently into
//! per-invocation session logs, enforces wall-clock deadlines, supports
//! graceful cancellation, detects interactive prompts, and maps exit codes
//! into the closed execution-error taxonomy.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::events::InputKind;
use crate::exec::PreparedCommand;
use crate::{Error, Result};

/// Grace window between SIGTERM and SIGKILL on cancellation
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Prompt patterns only look at the tail of the pending partial line
const PROMPT_LOOKBACK: usize = 160;
/// Pending partial-line buffer bound; older bytes are already logged
const PENDING_CAP: usize = 64 * 1024;

const TRUNCATION_MARKER: &str = "[OUTPUT TRUNCATED - size cap reached]";

static YES_NO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\[y/n\]|\(y(es)?/no?\))\s*[:?]?\s*$").expect("valid yes/no regex")
});
static PASSWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)pass(word|phrase)( for [^:]{1,64})?\s*:\s*$").expect("valid password regex")
});

/// Final state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Exit codes 126/127: privilege prompt refused or wrapper missing
    AuthorizationDenied(i32),
    NonZero(i32),
    /// Terminated by a signal not sent by us
    Crashed,
    TimedOut,
    Cancelled,
}

impl ExitStatus {
    fn from_exit(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitStatus::Success,
            Some(code @ (126 | 127)) => ExitStatus::AuthorizationDenied(code),
            Some(code) => ExitStatus::NonZero(code),
            None => ExitStatus::Crashed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Corresponding execution error, if this status is a failure.
    pub fn to_error(&self, timeout: Duration) -> Option<Error> {
        match self {
            ExitStatus::Success => None,
            ExitStatus::AuthorizationDenied(code) => {
                Some(Error::AuthorizationDenied { code: *code })
            }
            ExitStatus::NonZero(code) => Some(Error::NonZeroExit { code: *code }),
            ExitStatus::Crashed => Some(Error::Crashed),
            ExitStatus::TimedOut => Some(Error::TimedOut {
                seconds: timeout.as_secs(),
            }),
            ExitStatus::Cancelled => Some(Error::Cancelled),
        }
    }
}

/// Streamed events for one invocation. For each invocation the sequence is
/// exactly one `Started`, interleaved lines and prompts, one `Completed`.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started {
        pid: Option<u32>,
    },
    StdoutLine(String),
    StderrLine(String),
    InputRequested(InputKind),
    Completed {
        status: ExitStatus,
        stdout_path: PathBuf,
        stderr_path: PathBuf,
        duration: Duration,
    },
}

/// Live handle on a spawned invocation.
#[derive(Debug)]
pub struct RunHandle {
    pub invocation_id: String,
    pub session_dir: PathBuf,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    cancel_tx: mpsc::Sender<()>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
}

/// Detached cancellation handle for a running invocation.
#[derive(Clone)]
pub struct Canceller {
    tx: mpsc::Sender<()>,
}

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

impl RunHandle {
    /// Request graceful termination. The process gets SIGTERM, then SIGKILL
    /// after the grace window; the `Completed` event still fires, carrying
    /// `ExitStatus::Cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Cancellation handle that outlives this handle.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Detached stdin sender; each payload is written with a trailing
    /// newline, like [`RunHandle::write_input`].
    pub fn input_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.stdin_tx.clone()
    }

    /// Append bytes plus a newline to the child's stdin. Used to answer
    /// `InputRequested` events; the runner never answers prompts itself.
    pub async fn write_input(&self, bytes: &[u8]) -> Result<()> {
        self.stdin_tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| Error::Cancelled)
    }
}

/// Spawns subprocesses with a bounded concurrency budget. Privileged
/// invocations additionally share a single slot, so at most one
/// escalation prompt is ever outstanding.
pub struct ProcessRunner {
    limits: LimitsConfig,
    slots: Arc<Semaphore>,
    priv_slot: Arc<Semaphore>,
}

impl ProcessRunner {
    pub fn new(limits: LimitsConfig) -> Self {
        let slots = Arc::new(Semaphore::new(limits.max_concurrent.max(1)));
        Self {
            limits,
            slots,
            priv_slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Spawn with the configured default timeout.
    pub async fn spawn(&self, prepared: &PreparedCommand) -> Result<RunHandle> {
        self.spawn_with_timeout(prepared, Duration::from_secs(self.limits.timeout_secs))
            .await
    }

    /// Spawn with an explicit wall-clock deadline.
    pub async fn spawn_with_timeout(
        &self,
        prepared: &PreparedCommand,
        timeout: Duration,
    ) -> Result<RunHandle> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        let priv_permit = if prepared.privileged {
            Some(
                self.priv_slot
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Cancelled)?,
            )
        } else {
            None
        };

        let invocation_id = Uuid::new_v4().to_string();
        let session_dir = prepared.temp_dir.join(&invocation_id);
        tokio::fs::create_dir_all(&session_dir).await?;

        let stdout_path = session_dir.join("stdout.log");
        let stderr_path = session_dir.join("stderr.log");
        let combined_path = session_dir.join("combined.log");

        let stdout_log = tokio::fs::File::create(&stdout_path).await?;
        let stderr_log = tokio::fs::File::create(&stderr_path).await?;
        let mut combined_log = tokio::fs::File::create(&combined_path).await?;
        combined_log
            .write_all(
                format!(
                    "[SESSION {invocation_id}] {} {}\n",
                    prepared.binary,
                    prepared.argv.join(" ")
                )
                .as_bytes(),
            )
            .await?;
        let combined = Arc::new(Mutex::new(combined_log));

        debug!("spawning {} {:?}", prepared.binary, prepared.argv);
        let mut child = Command::new(&prepared.binary)
            .args(&prepared.argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound(prepared.binary.clone()),
                _ => Error::Io(e),
            })?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = mpsc::channel::<()>(1);
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(16);

        let _ = event_tx.send(ProcessEvent::Started { pid: child.id() });

        // Stdin writer: owns the pipe; closes it when the handle drops
        let mut child_stdin = child.stdin.take();
        tokio::spawn(async move {
            while let Some(bytes) = stdin_rx.recv().await {
                if let Some(stdin) = child_stdin.as_mut() {
                    if stdin.write_all(&bytes).await.is_err() {
                        break;
                    }
                    if stdin.write_all(b"\n").await.is_err() {
                        break;
                    }
                    let _ = stdin.flush().await;
                }
            }
        });

        let cap = self.limits.output_cap_bytes;
        let stdout_task = tokio::spawn(tail_stream(
            child.stdout.take(),
            true,
            stdout_log,
            Arc::clone(&combined),
            event_tx.clone(),
            cap,
        ));
        let stderr_task = tokio::spawn(tail_stream(
            child.stderr.take(),
            false,
            stderr_log,
            Arc::clone(&combined),
            event_tx.clone(),
            cap,
        ));

        let driver_stdout_path = stdout_path.clone();
        let driver_stderr_path = stderr_path.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let status = tokio::select! {
                result = child.wait() => match result {
                    Ok(status) => ExitStatus::from_exit(status),
                    Err(e) => {
                        warn!("wait failed: {}", e);
                        ExitStatus::Crashed
                    }
                },
                _ = cancel_rx.recv() => {
                    stop_child(&mut child).await;
                    ExitStatus::Cancelled
                }
                _ = &mut deadline => {
                    warn!("invocation exceeded {}s deadline", timeout.as_secs());
                    stop_child(&mut child).await;
                    ExitStatus::TimedOut
                }
            };

            // Pipes close when the child dies; wait for the tails to drain
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let _ = event_tx.send(ProcessEvent::Completed {
                status,
                stdout_path: driver_stdout_path,
                stderr_path: driver_stderr_path,
                duration: started.elapsed(),
            });
            drop(priv_permit);
            drop(permit);
        });

        Ok(RunHandle {
            invocation_id,
            session_dir,
            events: event_rx,
            cancel_tx,
            stdin_tx,
        })
    }
}

/// Graceful stop: SIGTERM first, SIGKILL after the grace window.
async fn stop_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid is a live child of this process
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!("process ignored SIGTERM, sending SIGKILL");
    }
    let _ = child.kill().await;
}

/// Tail one stream: log to its own file plus the combined log (capped with
/// a truncation marker), emit UTF-8 lines as events, and watch the pending
/// partial line for interactive prompts.
async fn tail_stream<R>(
    reader: Option<R>,
    is_stdout: bool,
    mut own_log: tokio::fs::File,
    combined: Arc<Mutex<tokio::fs::File>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    cap: u64,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut pending: Vec<u8> = Vec::new();
    let mut written: u64 = 0;
    let mut truncated = false;
    let mut last_prompt_tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("stream read error: {}", e);
                break;
            }
        };
        let chunk = &buf[..n];

        if !truncated {
            let allowed = ((cap - written).min(n as u64)) as usize;
            let _ = own_log.write_all(&chunk[..allowed]).await;
            {
                let mut combined = combined.lock().await;
                let _ = combined.write_all(&chunk[..allowed]).await;
            }
            written += allowed as u64;
            if written >= cap {
                truncated = true;
                let marker = format!("\n{TRUNCATION_MARKER}\n");
                let _ = own_log.write_all(marker.as_bytes()).await;
                {
                    let mut combined = combined.lock().await;
                    let _ = combined.write_all(marker.as_bytes()).await;
                }
                emit_line(&events, is_stdout, TRUNCATION_MARKER.to_string());
            }
        }

        pending.extend_from_slice(chunk);

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
            if truncated {
                continue;
            }
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim_end_matches('\r')
                .to_string();
            emit_line(&events, is_stdout, line);
        }

        // A prompt is a partial line waiting for input; detect it on the
        // bounded tail so long outputs stay O(line)
        if !pending.is_empty() && pending != last_prompt_tail {
            if let Some(kind) = detect_prompt(&pending) {
                let _ = events.send(ProcessEvent::InputRequested(kind));
                last_prompt_tail = pending.clone();
            }
        }
        if pending.len() > PENDING_CAP {
            let keep = pending.len() - PROMPT_LOOKBACK;
            pending.drain(..keep);
        }
    }

    let _ = own_log.flush().await;
    if !pending.is_empty() && !truncated {
        let line = String::from_utf8_lossy(&pending)
            .trim_end_matches('\r')
            .to_string();
        emit_line(&events, is_stdout, line);
    }
}

fn emit_line(events: &mpsc::UnboundedSender<ProcessEvent>, is_stdout: bool, line: String) {
    let event = if is_stdout {
        ProcessEvent::StdoutLine(line)
    } else {
        ProcessEvent::StderrLine(line)
    };
    let _ = events.send(event);
}

/// Classify a pending partial line as an interactive prompt.
fn detect_prompt(pending: &[u8]) -> Option<InputKind> {
    let start = pending.len().saturating_sub(PROMPT_LOOKBACK);
    let tail = String::from_utf8_lossy(&pending[start..]);
    let tail = tail.trim_end_matches(' ');

    if YES_NO_RE.is_match(tail) {
        return Some(InputKind::YesNo);
    }
    if PASSWORD_RE.is_match(tail) {
        return Some(InputKind::Password);
    }
    None
}
