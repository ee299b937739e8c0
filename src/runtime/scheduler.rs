//! Session scheduling and the run-loop event handlers.
//!
//! One task per session consumes that session's inbound messages strictly in
//! order, so turns within a session never interleave, while different
//! sessions run concurrently. The task drives the engine, demultiplexes its
//! token stream, emits outbound events, and parks on the inbound queue
//! whenever a run suspends for human input.

use std::sync::{Arc, Mutex, MutexGuard};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::agents::Collaborators;
use crate::emitter::{OutboundEmitter, OutboundTransport, TransportTable};
use crate::graphs::{GraphError, GraphProfile, Workflow};
use crate::message::InboundMessage;
use crate::runtime::checkpoint::CheckpointStore;
use crate::runtime::engine::{EngineError, RunInput, WorkflowRunner};
use crate::runtime::store::ConversationStore;
use crate::state::{AgentId, ConversationState, QueryKind};
use crate::stream::{AnswerDemux, DemuxStep, StreamEvent};
use crate::tools::format_rows;

/// Errors that tear down a session.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error("run task panicked: {0}")]
    #[diagnostic(code(colloquy::scheduler::run_panicked))]
    RunPanicked(String),
}

struct SessionHandle {
    inbound: flume::Sender<InboundMessage>,
    task: JoinHandle<()>,
}

type SessionMap = Arc<Mutex<FxHashMap<String, SessionHandle>>>;

/// Conversation stores by session id. Owned by the scheduler rather than
/// the session tasks, so a session that dies on a fatal turn error keeps
/// its thread id and per-context histories for the respawned task.
type StoreTable = Arc<Mutex<FxHashMap<String, Arc<AsyncMutex<ConversationStore>>>>>;

fn lock_sessions(map: &SessionMap) -> MutexGuard<'_, FxHashMap<String, SessionHandle>> {
    map.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Tracks live sessions and their client transports. An explicit object,
/// injected wherever it is needed; there are no process globals.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: SessionMap,
    transports: TransportTable,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport table emitters consult per send.
    #[must_use]
    pub fn transports(&self) -> TransportTable {
        self.transports.clone()
    }

    /// Registers the client transport for a session.
    pub fn connect(&self, session_id: &str, transport: Arc<dyn OutboundTransport>) {
        self.transports.register(session_id, transport);
    }

    /// Drops the client transport; subsequent emissions for the session are
    /// dropped with a warning. The session task keeps running.
    pub fn disconnect(&self, session_id: &str) {
        self.transports.remove(session_id);
    }

    /// Whether a session task is currently running.
    #[must_use]
    pub fn is_active(&self, session_id: &str) -> bool {
        lock_sessions(&self.sessions).contains_key(session_id)
    }

    /// Number of live session tasks.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        lock_sessions(&self.sessions).len()
    }

    fn deregister(&self, session_id: &str) {
        if lock_sessions(&self.sessions).remove(session_id).is_some() {
            debug!(session = session_id, "session deregistered");
        }
    }

    /// Aborts every session task. Used on server shutdown.
    pub fn abort_all(&self) {
        for (_, handle) in lock_sessions(&self.sessions).drain() {
            handle.task.abort();
        }
    }
}

/// Prebuilt compiled workflows, one per profile. Built once at scheduler
/// construction so graph errors surface at startup, not mid-conversation.
struct WorkflowSet {
    single: Arc<Workflow>,
    document: Arc<Workflow>,
    combined: Arc<Workflow>,
}

impl WorkflowSet {
    fn build(deps: &Collaborators) -> Result<Self, GraphError> {
        Ok(Self {
            single: Arc::new(GraphProfile::SingleContext.build(deps)?),
            document: Arc::new(GraphProfile::DocumentOnly.build(deps)?),
            combined: Arc::new(GraphProfile::Combined.build(deps)?),
        })
    }

    fn get(&self, profile: GraphProfile) -> Arc<Workflow> {
        match profile {
            GraphProfile::SingleContext => self.single.clone(),
            GraphProfile::DocumentOnly => self.document.clone(),
            GraphProfile::Combined => self.combined.clone(),
        }
    }
}

/// Accepts inbound messages and routes each to its session's task, spawning
/// the task on first contact.
pub struct Scheduler {
    registry: SessionRegistry,
    deps: Collaborators,
    checkpoints: CheckpointStore,
    workflows: Arc<WorkflowSet>,
    stores: StoreTable,
}

impl Scheduler {
    /// Builds the scheduler with a fresh registry, compiling all workflow
    /// profiles up front.
    pub fn new(deps: Collaborators) -> Result<Self, GraphError> {
        Self::with_registry(deps, SessionRegistry::new())
    }

    /// Builds the scheduler around an existing registry (shared with the
    /// server layer for connect/disconnect bookkeeping).
    pub fn with_registry(
        deps: Collaborators,
        registry: SessionRegistry,
    ) -> Result<Self, GraphError> {
        let workflows = Arc::new(WorkflowSet::build(&deps)?);
        Ok(Self {
            registry,
            deps,
            checkpoints: CheckpointStore::new(),
            workflows,
            stores: StoreTable::default(),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Enqueues a message for its session, spawning the session task if
    /// none is running. Messages for one session are processed strictly in
    /// arrival order.
    pub fn submit(&self, session_id: &str, msg: InboundMessage) {
        let mut sessions = lock_sessions(&self.registry.sessions);
        if let Some(handle) = sessions.get(session_id) {
            if handle.inbound.send(msg.clone()).is_ok() {
                return;
            }
            // The task ended between deregistration and now; fall through
            // and respawn.
            sessions.remove(session_id);
        }

        let (tx, rx) = flume::unbounded();
        let task = tokio::spawn(run_session(
            session_id.to_string(),
            rx,
            self.session_store(session_id),
            self.deps.clone(),
            self.workflows.clone(),
            self.checkpoints.clone(),
            self.registry.clone(),
        ));
        if tx.send(msg).is_err() {
            warn!(session = session_id, "freshly spawned session rejected its first message");
        }
        sessions.insert(
            session_id.to_string(),
            SessionHandle { inbound: tx, task },
        );
    }

    /// The session's conversation store, created on first contact and kept
    /// for the process lifetime. A respawned session task picks up where
    /// the previous one left off.
    fn session_store(&self, session_id: &str) -> Arc<AsyncMutex<ConversationStore>> {
        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        stores
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(ConversationStore::new())))
            .clone()
    }
}

/// Per-turn handler bookkeeping, reset for every inbound turn.
#[derive(Default)]
struct TurnState {
    /// Agent currently credited with output, for usage attribution and
    /// placeholder dedup.
    cur_agent: Option<AgentId>,
    /// State from the most recent `RunEnd`, persisted when the turn ends.
    last_state: Option<ConversationState>,
}

/// The per-session task: consumes inbound messages until the queue closes
/// or a turn fails fatally.
#[instrument(skip_all, fields(session = %session_id))]
async fn run_session(
    session_id: String,
    inbound: flume::Receiver<InboundMessage>,
    store: Arc<AsyncMutex<ConversationStore>>,
    deps: Collaborators,
    workflows: Arc<WorkflowSet>,
    checkpoints: CheckpointStore,
    registry: SessionRegistry,
) {
    let thread_id = store.lock().await.thread_id().to_string();
    let mut emitter = OutboundEmitter::new(
        session_id.clone(),
        thread_id.clone(),
        registry.transports(),
    );

    while let Ok(msg) = inbound.recv_async().await {
        let mut store = store.lock().await;
        if let Err(err) = handle_turn(
            &session_id,
            &msg,
            &inbound,
            &mut store,
            &mut emitter,
            &deps,
            &workflows,
            &checkpoints,
        )
        .await
        {
            error!(session = %session_id, error = %err, "turn failed, ending session");
            break;
        }
    }

    checkpoints.clear(&thread_id);
    registry.deregister(&session_id);
}

/// Runs one inbound message to completion, including any interrupt/resume
/// round-trips it triggers.
#[allow(clippy::too_many_arguments)]
async fn handle_turn(
    session_id: &str,
    msg: &InboundMessage,
    inbound: &flume::Receiver<InboundMessage>,
    store: &mut ConversationStore,
    emitter: &mut OutboundEmitter,
    deps: &Collaborators,
    workflows: &WorkflowSet,
    checkpoints: &CheckpointStore,
) -> Result<(), SchedulerError> {
    let Some(profile) = GraphProfile::select(msg) else {
        warn!(session = session_id, "message names no table or document, ignoring");
        return Ok(());
    };
    emitter.set_context(msg.table_name.clone(), msg.document_name.clone());

    // Combined runs always start fresh; single-context runs continue their
    // context's stored history.
    let context_key = match profile {
        GraphProfile::SingleContext => msg
            .table_name
            .as_deref()
            .map(ConversationStore::table_key),
        GraphProfile::DocumentOnly => msg
            .document_name
            .as_deref()
            .map(ConversationStore::document_key),
        GraphProfile::Combined => None,
    };
    let state = match context_key.as_deref().and_then(|key| store.state(key)) {
        Some(existing) => {
            let mut continued = existing.clone();
            continued.begin_turn(msg, profile.entry());
            continued
        }
        None => ConversationState::from_inbound(msg, profile.entry()),
    };

    let thread_id = store.thread_id().to_string();
    let runner = WorkflowRunner::new(
        workflows.get(profile),
        checkpoints.clone(),
        session_id.to_string(),
        thread_id.clone(),
    );

    // Demux and handler bookkeeping span the whole turn, including any
    // suspend/resume round-trips inside it.
    let mut demux = AnswerDemux::new();
    let mut turn = TurnState::default();
    let mut input = Some(RunInput::Fresh(state));

    loop {
        let run_input = match input.take() {
            Some(fresh) => fresh,
            None => {
                // Suspended: the next inbound message is the resume value.
                let resume_msg = match inbound.recv_async().await {
                    Ok(resume_msg) => resume_msg,
                    Err(_) => {
                        debug!("inbound queue closed while suspended");
                        return Ok(());
                    }
                };
                if let Some(task) = checkpoints.pending(&thread_id) {
                    emitter.timing.start(task.agent.name());
                    emitter.agent_start(task.agent.name());
                }
                RunInput::Resume(resume_msg.text)
            }
        };

        let handle = runner.launch(run_input);
        while let Ok(event) = handle.events.recv_async().await {
            handle_event(event, &mut demux, &mut turn, emitter, deps).await;
        }
        match handle.task.await {
            Ok(Ok(())) => {}
            Ok(Err(engine_err)) => return Err(engine_err.into()),
            Err(join_err) => return Err(SchedulerError::RunPanicked(join_err.to_string())),
        }

        if checkpoints.has_pending(&thread_id) {
            debug!("turn suspended, awaiting user reply");
            continue;
        }
        break;
    }

    if let Some(key) = context_key.as_deref() {
        if let Some(final_state) = turn.last_state.take() {
            store.save(key, final_state);
        }
    }
    Ok(())
}

/// Dispatches one engine event to the outbound side.
async fn handle_event(
    event: StreamEvent,
    demux: &mut AnswerDemux,
    turn: &mut TurnState,
    emitter: &mut OutboundEmitter,
    deps: &Collaborators,
) {
    match event {
        StreamEvent::RunStart { entry, .. } => {
            // Announce the upcoming speaker once per agent change. Entry
            // states carrying a finished tool call get their result at
            // RunEnd instead.
            if let Some(next) = entry.next_agent {
                if next != AgentId::End
                    && turn.cur_agent.as_ref() != Some(&next)
                    && !entry.has_function_call
                {
                    emitter.timing.start(next.name());
                    emitter.agent_start(next.name());
                    turn.cur_agent = Some(next);
                }
            }
        }
        StreamEvent::Token { agent, chunk } => {
            let role = agent.name().to_string();
            match demux.push(&chunk.text) {
                DemuxStep::Display(segment) | DemuxStep::Final(segment) => {
                    if !segment.is_empty() {
                        emitter.answer_chunk(&role, &segment);
                    }
                }
                DemuxStep::Silent => {}
            }
            if chunk.is_natural_stop() {
                if let DemuxStep::Final(segment) = demux.finish() {
                    if !segment.is_empty() {
                        emitter.answer_chunk(&role, &segment);
                    }
                }
            }
        }
        StreamEvent::ModelCallEnd {
            agent,
            usage,
            model_name,
            tool_name,
            run_id,
        } => {
            let role = turn
                .cur_agent
                .as_ref()
                .map(|a| a.name().to_string())
                .unwrap_or_else(|| agent.name().to_string());
            emitter.usage(&role, usage, &model_name, tool_name, &run_id);
        }
        StreamEvent::RunEnd { agent, state } => {
            // Query results surface only at the terminal node, the
            // equivalent of the whole graph finishing; intermediate
            // hand-offs (including into a suspension) stay quiet.
            if state.is_terminal() {
                if state.has_function_call || state.query_failed == Some(true) {
                    emit_query_result(&state, emitter, deps).await;
                }
                let role = state
                    .current_agent
                    .as_ref()
                    .map(AgentId::name)
                    .unwrap_or(agent.name());
                emitter.timing.reset(role);
            }
            turn.last_state = Some(*state);
        }
    }
}

/// Emits the per-agent query result: the query echo plus fetched rows on
/// success, or the echo alone after a failed test run. The query runs here a
/// second time to fetch display rows; a failure at this point degrades to an
/// error string in the result text.
async fn emit_query_result(
    state: &ConversationState,
    emitter: &mut OutboundEmitter,
    deps: &Collaborators,
) {
    let role = state
        .current_agent
        .as_ref()
        .map(AgentId::name)
        .unwrap_or(AgentId::SQL)
        .to_string();

    match state.query_kind {
        Some(QueryKind::Retrieval) => {
            let Some(query) = state.retrieval_query.as_deref() else {
                warn!("retrieval result requested without a retrieval query");
                return;
            };
            if state.query_failed == Some(true) {
                emitter.query_result(
                    &role,
                    &format!(" <br><br> Query: {query}"),
                    None,
                    None,
                    state.query_kind,
                );
            } else if let Some(table) = state.table_name.as_deref() {
                let body = match deps.query.execute(table, query, QueryKind::Retrieval).await {
                    Ok(rows) => format_rows(&rows),
                    Err(err) => {
                        warn!(error = %err, "result fetch failed after a successful test run");
                        format!("Error: {err}")
                    }
                };
                emitter.query_result(
                    &role,
                    &format!(" <br><br> Query: {query}<br><br> Query Result: <br>{body}"),
                    state.visualization_query.clone(),
                    state.visualization_label.clone(),
                    state.query_kind,
                );
            }
        }
        Some(QueryKind::Manipulation) => {
            if let Some(query) = state.manipulation_query.as_deref() {
                emitter.query_result(
                    &role,
                    &format!(" <br><br> Query: {query}"),
                    Some(query.to_string()),
                    state.manipulation_label.clone(),
                    state.query_kind,
                );
            }
        }
        None => {}
    }
    emitter.timing.reset(&role);
}
