//! Outbound event emission.
//!
//! [`OutboundEmitter`] builds the typed client events and pushes them
//! through the session's registered [`OutboundTransport`]. A missing or
//! disconnected transport drops the message with a warning; emission never
//! fails the run. [`TimingTable`] tracks per-agent wall time so every event
//! carries elapsed seconds.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::message::{EventKind, OutboundMessage};
use crate::model::TokenUsage;
use crate::state::QueryKind;

/// Errors a transport may report on send.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Delivery seam to a connected client.
pub trait OutboundTransport: Send + Sync {
    /// Whether the peer is still connected. A disconnected transport is
    /// skipped without attempting a send.
    fn is_connected(&self) -> bool {
        true
    }

    fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// A transport backed by a flume channel; the receiver side belongs to the
/// server layer (or a test).
pub struct ChannelTransport {
    tx: flume::Sender<OutboundMessage>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(tx: flume::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }
}

impl OutboundTransport for ChannelTransport {
    fn is_connected(&self) -> bool {
        !self.tx.is_disconnected()
    }

    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Shared session-id -> transport map. Registered on connect, removed on
/// disconnect; emitters look their session up per send.
#[derive(Clone, Default)]
pub struct TransportTable {
    inner: Arc<Mutex<FxHashMap<String, Arc<dyn OutboundTransport>>>>,
}

impl TransportTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, Arc<dyn OutboundTransport>>> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn register(&self, session_id: &str, transport: Arc<dyn OutboundTransport>) {
        self.lock().insert(session_id.to_string(), transport);
    }

    pub fn remove(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<dyn OutboundTransport>> {
        self.lock().get(session_id).cloned()
    }
}

/// Wall-clock timing per agent role. Elapsed values are truncated to
/// millisecond precision so clients get stable display strings.
#[derive(Debug, Default)]
pub struct TimingTable {
    starts: FxHashMap<String, Instant>,
}

impl TimingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an agent as started now. Restarting an already-running agent
    /// resets its clock.
    pub fn start(&mut self, role: &str) {
        self.starts.insert(role.to_string(), Instant::now());
    }

    /// Seconds since the agent started, 0.0 if it never did.
    #[must_use]
    pub fn elapsed(&self, role: &str) -> f64 {
        self.starts
            .get(role)
            .map(|start| truncate_ms(start.elapsed().as_secs_f64()))
            .unwrap_or(0.0)
    }

    /// Clears an agent's clock once it is done speaking.
    pub fn reset(&mut self, role: &str) {
        self.starts.remove(role);
    }
}

fn truncate_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).floor() / 1000.0
}

/// Builds and delivers the session's outbound events.
pub struct OutboundEmitter {
    session_id: String,
    thread_id: String,
    transports: TransportTable,
    table_name: Option<String>,
    document_name: Option<String>,
    /// Per-agent clocks; the scheduler starts and resets them as agents
    /// come and go.
    pub timing: TimingTable,
}

impl OutboundEmitter {
    #[must_use]
    pub fn new(session_id: String, thread_id: String, transports: TransportTable) -> Self {
        Self {
            session_id,
            thread_id,
            transports,
            table_name: None,
            document_name: None,
            timing: TimingTable::new(),
        }
    }

    /// Sets the active contexts stamped onto every subsequent event.
    pub fn set_context(&mut self, table_name: Option<String>, document_name: Option<String>) {
        self.table_name = table_name;
        self.document_name = document_name;
    }

    /// Placeholder announcing the agent about to speak.
    pub fn agent_start(&mut self, role: &str) {
        let message = self.base(EventKind::AgentStart, role, "");
        self.deliver(message);
    }

    /// Display update carrying the whole visible segment so far.
    pub fn answer_chunk(&mut self, role: &str, text: &str) {
        let message = self.base(EventKind::AnswerChunk, role, text);
        self.deliver(message);
    }

    /// Terminal per-agent result: query echo plus rows or failure text.
    pub fn query_result(
        &mut self,
        role: &str,
        text: &str,
        visualization_query: Option<String>,
        visualization_label: Option<String>,
        query_kind: Option<QueryKind>,
    ) {
        let mut message = self.base(EventKind::QueryResult, role, text);
        message.visualization_query = visualization_query;
        message.visualization_label = visualization_label;
        message.query_kind = query_kind;
        self.deliver(message);
    }

    /// Token usage report for one completed model call.
    pub fn usage(
        &mut self,
        role: &str,
        usage: TokenUsage,
        model_name: &str,
        tool_name: Option<String>,
        run_id: &str,
    ) {
        let mut message = self.base(EventKind::Usage, role, "");
        message.usage = Some(usage);
        message.model_name = Some(model_name.to_string());
        message.tool_name = tool_name;
        message.run_id = Some(run_id.to_string());
        self.deliver(message);
    }

    fn base(&self, event: EventKind, role: &str, text: &str) -> OutboundMessage {
        OutboundMessage {
            event,
            role: role.to_string(),
            message: text.to_string(),
            table_name: self.table_name.clone(),
            document_name: self.document_name.clone(),
            elapsed_seconds: self.timing.elapsed(role),
            visualization_query: None,
            visualization_label: None,
            query_kind: None,
            usage: None,
            run_id: None,
            model_name: None,
            tool_name: None,
            thread_id: Some(self.thread_id.clone()),
            timestamp: Utc::now(),
        }
    }

    /// Send-or-drop: a gone or broken client never fails the run.
    fn deliver(&self, message: OutboundMessage) {
        match self.transports.get(&self.session_id) {
            None => {
                debug!(session = %self.session_id, event = message.event.as_str(), "no transport registered, dropping event");
            }
            Some(transport) if !transport.is_connected() => {
                warn!(session = %self.session_id, event = message.event.as_str(), "client disconnected, dropping event");
            }
            Some(transport) => {
                if let Err(err) = transport.send(message) {
                    warn!(session = %self.session_id, error = %err, "transport send failed, dropping event");
                }
            }
        }
    }
}
