//! Coordinator: binds the planner, execution layer, parsers, and the
//! knowledge store, and emits the boundary event stream.
//!
//! Knowledge writes happen only when a parse succeeds; history writes
//! happen on every invocation, whatever its outcome. Parser failures are
//! recorded, never raised.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::SentinelConfig;
use crate::events::{EventSender, OutputBuffer, OutputStream, SentinelEvent};
use crate::exec::{
    Canceller, ExecutionManager, ExitStatus, ProcessEvent, ProcessRunner, RunHandle,
};
use crate::parsers::{run_parser, ParseContext, ParserRegistry};
use crate::planner::{
    build_command, FinalCommand, GateOutcome, Intent, IntentResolver, PolicyGate, Suggestion,
    SuggestionEngine, ToolRegistry,
};
use crate::providers::LlmProvider;
use crate::state::{ExecutionRecord, ExecutionStatus, KnowledgeStore, ParseStatus};
use crate::{Error, Result};

/// What became of a user request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Command is running; events follow under this execution id
    Started { execution_id: String },
    /// Policy requires approval; resubmit via [`Coordinator::run_approved`]
    AwaitingApproval { pending: PendingCommand },
    /// Policy refused; nothing was built or spawned
    Denied { reason: String },
    /// Intent produces no command (informational or unclear)
    NoCommand { rationale: String },
}

/// A gated request waiting for user approval.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub intent: Intent,
    pub reason: String,
}

/// Live handles on one running invocation.
struct ActiveInvocation {
    canceller: Canceller,
    input: tokio::sync::mpsc::Sender<Vec<u8>>,
    /// Bounded recent-output buffer for UIs attaching mid-run
    buffer: Arc<Mutex<OutputBuffer>>,
}

/// Central orchestrator for the request → knowledge loop.
pub struct Coordinator {
    resolver: IntentResolver,
    gate: PolicyGate,
    registry: ToolRegistry,
    parsers: Arc<ParserRegistry>,
    manager: ExecutionManager,
    runner: ProcessRunner,
    store: Arc<Mutex<KnowledgeStore>>,
    events: EventSender,
    active: Arc<Mutex<HashMap<String, ActiveInvocation>>>,
    timeout: Duration,
    line_buffer: usize,
}

impl Coordinator {
    /// Build a coordinator from configuration, opening the store at its
    /// configured path. Returns the event receiver for the UI collaborator.
    pub fn new(
        config: &SentinelConfig,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<SentinelEvent>)> {
        let store = KnowledgeStore::open(config.store.clone())?;
        Self::from_parts(
            config,
            provider,
            store,
            ExecutionManager::new(config.runtime.clone()),
        )
    }

    /// Assemble from pre-built parts (tests inject an in-memory store and a
    /// pinned runtime mode here).
    pub fn from_parts(
        config: &SentinelConfig,
        provider: Arc<dyn LlmProvider>,
        store: KnowledgeStore,
        manager: ExecutionManager,
    ) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<SentinelEvent>)> {
        let (events, event_rx) = EventSender::channel();
        let coordinator = Self {
            resolver: IntentResolver::new(provider),
            gate: PolicyGate::default(),
            registry: ToolRegistry::new()?,
            parsers: Arc::new(ParserRegistry::with_default_parsers()),
            manager,
            runner: ProcessRunner::new(config.limits.clone()),
            store: Arc::new(Mutex::new(store)),
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
            timeout: Duration::from_secs(config.limits.timeout_secs),
            line_buffer: config.limits.line_buffer,
        };
        Ok((coordinator, event_rx))
    }

    /// Shared handle on the knowledge store.
    pub fn store(&self) -> Arc<Mutex<KnowledgeStore>> {
        Arc::clone(&self.store)
    }

    /// Resolve a free-text request and run it through policy and, when
    /// allowed, execution. Dropping the returned future during the resolver
    /// call aborts cleanly: no command is built.
    pub async fn handle_request(
        &self,
        user_text: &str,
        target_hint: Option<&str>,
    ) -> Result<RequestOutcome> {
        let intent = self.resolver.resolve(user_text, target_hint).await?;
        self.handle_intent(intent).await
    }

    /// Run an already-resolved intent through the gate and execution.
    pub async fn handle_intent(&self, intent: Intent) -> Result<RequestOutcome> {
        if !intent.kind.is_actionable() {
            return Ok(RequestOutcome::NoCommand {
                rationale: intent.rationale,
            });
        }

        match self.gate.check(&intent, &self.registry) {
            GateOutcome::Denied { reason } => {
                info!("policy denied {}: {}", intent.kind.as_str(), reason);
                Ok(RequestOutcome::Denied { reason })
            }
            GateOutcome::NeedsConfirmation { reason, risk } => {
                self.events.send(SentinelEvent::ApprovalRequired {
                    intent: intent.clone(),
                    risk,
                    reason: reason.clone(),
                });
                Ok(RequestOutcome::AwaitingApproval {
                    pending: PendingCommand { intent, reason },
                })
            }
            GateOutcome::Allowed => {
                let execution_id = self.execute_intent(&intent).await?;
                Ok(RequestOutcome::Started { execution_id })
            }
        }
    }

    /// Execute a previously gated command after explicit user approval.
    pub async fn run_approved(&self, pending: &PendingCommand) -> Result<RequestOutcome> {
        let execution_id = self.execute_intent(&pending.intent).await?;
        Ok(RequestOutcome::Started { execution_id })
    }

    /// Cancel a running invocation. The `ToolCompleted`/`ToolError` event
    /// still fires, carrying the cancelled status.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let active = self.active.lock().expect("active map poisoned");
        match active.get(execution_id) {
            Some(invocation) => {
                invocation.canceller.cancel();
                true
            }
            None => false,
        }
    }

    /// Answer an `InputRequested` event: the bytes reach the child's stdin
    /// with a trailing newline. Returns false when the invocation is gone.
    pub async fn send_input(&self, execution_id: &str, bytes: &[u8]) -> bool {
        let sender = {
            let active = self.active.lock().expect("active map poisoned");
            active.get(execution_id).map(|invocation| invocation.input.clone())
        };
        match sender {
            Some(tx) => tx.send(bytes.to_vec()).await.is_ok(),
            None => false,
        }
    }

    /// Recent output lines of a running invocation, head-trimmed to the
    /// configured line buffer. Lets a UI attach mid-run without replaying
    /// the raw log file.
    pub fn recent_output(&self, execution_id: &str) -> Vec<String> {
        let active = self.active.lock().expect("active map poisoned");
        match active.get(execution_id) {
            Some(invocation) => {
                let buffer = invocation.buffer.lock().expect("buffer poisoned");
                buffer.iter().map(str::to_string).collect()
            }
            None => Vec::new(),
        }
    }

    /// Next-step proposals from the knowledge store.
    pub fn suggestions(&self) -> Result<Vec<Suggestion>> {
        let engine = SuggestionEngine::new(&self.registry, self.gate.policy());
        let store = self.store.lock().expect("store poisoned");
        engine.suggest(&store)
    }

    /// Synthesize, prepare, and spawn the command for an intent.
    async fn execute_intent(&self, intent: &Intent) -> Result<String> {
        let def = self
            .registry
            .get(intent.kind)
            .ok_or_else(|| Error::UnknownIntent(intent.kind.as_str().to_string()))?;
        let target = intent
            .target
            .as_deref()
            .ok_or_else(|| Error::InvalidTarget("no target provided".to_string()))?;

        let command = build_command(def, target, &intent.params)?;
        self.spawn_command(command).await
    }

    async fn spawn_command(&self, command: FinalCommand) -> Result<String> {
        let prepared = self.manager.prepare(&command).await?;

        let mut record = ExecutionRecord::new(&command.tool_id, &command.target);
        let execution_id = record.execution_id.clone();

        let handle: RunHandle = match self.runner.spawn_with_timeout(&prepared, self.timeout).await
        {
            Ok(handle) => handle,
            Err(e) => {
                // Execution errors always leave an audit row and a ToolError
                record.execution_status = ExecutionStatus::Failed;
                record.parse_status = ParseStatus::EmptyOutput;
                record.completed_at = Utc::now();
                record.error_message = Some(e.to_string());
                self.store
                    .lock()
                    .expect("store poisoned")
                    .record_execution(&record)?;
                self.events.send(SentinelEvent::ToolError {
                    execution_id: execution_id.clone(),
                    kind: e.kind_str().to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut argv = vec![prepared.binary.clone()];
        argv.extend(prepared.argv.iter().cloned());
        self.events.send(SentinelEvent::ToolStarted {
            execution_id: execution_id.clone(),
            tool_id: command.tool_id.clone(),
            argv: argv.clone(),
            target: command.target.clone(),
        });

        let buffer = Arc::new(Mutex::new(OutputBuffer::new(self.line_buffer)));
        self.active
            .lock()
            .expect("active map poisoned")
            .insert(
                execution_id.clone(),
                ActiveInvocation {
                    canceller: handle.canceller(),
                    input: handle.input_sender(),
                    buffer: Arc::clone(&buffer),
                },
            );

        let ctx = ParseContext {
            tool_id: command.tool_id.clone(),
            target: command.target.clone(),
            argv,
            host_id: None,
            service_id: None,
        };
        tokio::spawn(forward_invocation(
            handle,
            record,
            ctx,
            Arc::clone(&self.parsers),
            Arc::clone(&self.store),
            self.events.clone(),
            Arc::clone(&self.active),
            buffer,
            self.timeout,
        ));

        Ok(execution_id)
    }
}

/// Per-invocation event pump: forwards output, then settles the invocation
/// into the store and the event stream on completion.
#[allow(clippy::too_many_arguments)]
async fn forward_invocation(
    mut handle: RunHandle,
    record: ExecutionRecord,
    ctx: ParseContext,
    parsers: Arc<ParserRegistry>,
    store: Arc<Mutex<KnowledgeStore>>,
    events: EventSender,
    active: Arc<Mutex<HashMap<String, ActiveInvocation>>>,
    buffer: Arc<Mutex<OutputBuffer>>,
    timeout: Duration,
) {
    let execution_id = record.execution_id.clone();

    while let Some(event) = handle.events.recv().await {
        match event {
            ProcessEvent::Started { .. } => {}
            ProcessEvent::StdoutLine(text) => {
                buffer
                    .lock()
                    .expect("buffer poisoned")
                    .push(text.clone());
                events.send(SentinelEvent::ToolOutputChunk {
                    execution_id: execution_id.clone(),
                    stream: OutputStream::Stdout,
                    text,
                });
            }
            ProcessEvent::StderrLine(text) => {
                buffer
                    .lock()
                    .expect("buffer poisoned")
                    .push(text.clone());
                events.send(SentinelEvent::ToolOutputChunk {
                    execution_id: execution_id.clone(),
                    stream: OutputStream::Stderr,
                    text,
                });
            }
            ProcessEvent::InputRequested(kind) => events.send(SentinelEvent::InputRequested {
                execution_id: execution_id.clone(),
                kind,
            }),
            ProcessEvent::Completed {
                status,
                stdout_path,
                stderr_path,
                duration,
            } => {
                settle_invocation(
                    record,
                    ctx,
                    status,
                    &stdout_path.to_string_lossy(),
                    &stderr_path.to_string_lossy(),
                    duration,
                    timeout,
                    parsers.as_ref(),
                    &store,
                    &events,
                );
                break;
            }
        }
    }

    active
        .lock()
        .expect("active map poisoned")
        .remove(&execution_id);
}

/// Parse, persist, and report one completed invocation.
///
/// History is written on every path. Knowledge is written only when the
/// tool succeeded AND its parser produced entities; a parser failure after
/// a clean exit is recorded as a partial success with zero entities.
#[allow(clippy::too_many_arguments)]
fn settle_invocation(
    mut record: ExecutionRecord,
    ctx: ParseContext,
    status: ExitStatus,
    stdout_path: &str,
    stderr_path: &str,
    duration: Duration,
    timeout: Duration,
    parsers: &ParserRegistry,
    store: &Arc<Mutex<KnowledgeStore>>,
    events: &EventSender,
) {
    record.completed_at = record.started_at
        + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    record.raw_stdout_path = Some(stdout_path.to_string());
    record.raw_stderr_path = Some(stderr_path.to_string());
    let execution_id = record.execution_id.clone();

    if let Some(error) = status.to_error(timeout) {
        record.execution_status = ExecutionStatus::Failed;
        record.parse_status = ParseStatus::EmptyOutput;
        record.error_message = Some(error.to_string());

        let mut store = store.lock().expect("store poisoned");
        if let Err(e) = store.record_execution(&record) {
            warn!("failed to record execution {}: {}", execution_id, e);
        }
        drop(store);

        events.send(SentinelEvent::ToolError {
            execution_id,
            kind: error.kind_str().to_string(),
            message: error.to_string(),
        });
        return;
    }

    // Clean exit: parse the retained raw output
    let raw_output = std::fs::read_to_string(stdout_path).unwrap_or_default();
    let parser = parsers.get(&ctx.tool_id);
    let outcome = run_parser(parser, &raw_output, &ctx);

    record.parse_status = outcome.status;
    record.error_message = outcome.error;
    record.execution_status = match outcome.status {
        ParseStatus::ParseFailed => ExecutionStatus::Partial,
        _ => ExecutionStatus::Success,
    };

    let mut guard = store.lock().expect("store poisoned");
    if outcome.status == ParseStatus::Parsed {
        match guard.upsert_entities(&outcome.batch) {
            Ok(count) => record.entities_created = count,
            Err(e) => {
                // Store failure after retry: knowledge stays untouched, the
                // run is still auditable
                warn!("knowledge write failed for {}: {}", execution_id, e);
                record.execution_status = ExecutionStatus::Partial;
                record.parse_status = ParseStatus::ParseFailed;
                record.entities_created = 0;
                record.error_message = Some(e.to_string());
            }
        }
    }
    if let Err(e) = guard.record_execution(&record) {
        warn!("failed to record execution {}: {}", execution_id, e);
    }
    drop(guard);

    events.send(SentinelEvent::ToolCompleted {
        execution_id,
        status: record.execution_status,
        entities_created: record.entities_created,
        stdout_path: stdout_path.to_string(),
        stderr_path: stderr_path.to_string(),
        duration_ms: duration.as_millis() as u64,
    });
}
