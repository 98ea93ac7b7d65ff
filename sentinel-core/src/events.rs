//! Typed event stream consumed by the UI collaborator

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::planner::{Intent, RiskLevel};
use crate::state::ExecutionStatus;

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Kind of interactive input a running tool is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Password,
    YesNo,
    FreeText,
}

/// Events emitted by the coordinator for the UI collaborator.
///
/// For a given invocation the sequence is strictly: one `ToolStarted`,
/// interleaved `ToolOutputChunk`/`InputRequested`, then exactly one
/// `ToolCompleted` or `ToolError`.
#[derive(Debug, Clone)]
pub enum SentinelEvent {
    ToolStarted {
        execution_id: String,
        tool_id: String,
        argv: Vec<String>,
        target: String,
    },
    ToolOutputChunk {
        execution_id: String,
        stream: OutputStream,
        text: String,
    },
    InputRequested {
        execution_id: String,
        kind: InputKind,
    },
    ApprovalRequired {
        intent: Intent,
        risk: RiskLevel,
        reason: String,
    },
    ToolCompleted {
        execution_id: String,
        status: ExecutionStatus,
        entities_created: u64,
        stdout_path: String,
        stderr_path: String,
        duration_ms: u64,
    },
    ToolError {
        execution_id: String,
        kind: String,
        message: String,
    },
}

/// Cloneable handle for emitting events toward the UI.
///
/// Sends are best-effort: a disconnected UI never fails the engine.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SentinelEvent>,
}

impl EventSender {
    /// Create a sender/receiver pair
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SentinelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event; drops silently if the receiver is gone
    pub fn send(&self, event: SentinelEvent) {
        let _ = self.tx.send(event);
    }
}

/// Bounded per-invocation line buffer for the UI forwarder.
///
/// Keeps at most `capacity` lines, head-trimming the oldest once full. The
/// raw session log on disk is unaffected by trimming.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: std::collections::VecDeque<String>,
    capacity: usize,
    trimmed: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            trimmed: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.trimmed += 1;
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines head-trimmed so far
    pub fn trimmed(&self) -> u64 {
        self.trimmed
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}
